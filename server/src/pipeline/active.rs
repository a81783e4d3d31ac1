use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::{
    error::{AppError, AppResult},
    model::user::UserWithAccountAccess,
    ServerState,
};

use super::processor::EmailPipeline;

type PipelineMap = HashMap<i32, Arc<EmailPipeline>>;

/// One pipeline per user at a time. A second trigger while a run is in
/// flight is a no-op; runs for different users proceed in parallel.
#[derive(Clone, Default)]
pub struct ActivePipelineMap {
    active: Arc<RwLock<PipelineMap>>,
}

impl ActivePipelineMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, user_id: i32) -> bool {
        self.active.read().unwrap().contains_key(&user_id)
    }

    pub fn cancel(&self, user_id: i32) {
        if let Some(pipeline) = self.active.read().unwrap().get(&user_id) {
            tracing::info!("Cancelling pipeline for user {}", user_id);
            pipeline.cancel();
        }
    }

    /// Spawns an inbox run for the user. Returns false when a run is already
    /// active (the new trigger is dropped, not queued).
    pub async fn spawn_run(
        &self,
        state: ServerState,
        user: UserWithAccountAccess,
        max_results: u32,
    ) -> AppResult<bool> {
        let user_id = user.id;

        {
            let active = self.active.read().unwrap();
            if active.contains_key(&user_id) {
                tracing::info!("Pipeline already running for user {}", user_id);
                return Ok(false);
            }
        }

        let pipeline = Arc::new(
            EmailPipeline::new(&state, user)
                .await
                .map_err(|e| match e {
                    AppError::ReAuthRequired(msg) => AppError::ReAuthRequired(msg),
                    e => AppError::Internal(anyhow::anyhow!(
                        "Could not create email pipeline: {:?}",
                        e
                    )),
                })?,
        );

        self.active
            .write()
            .unwrap()
            .insert(user_id, pipeline.clone());

        let map = self.clone();
        tokio::spawn(async move {
            match pipeline.process_inbox(max_results).await {
                Ok(report) => {
                    tracing::info!("Pipeline for user {} finished: {}", user_id, report);
                }
                Err(e) => {
                    tracing::error!("Pipeline for user {} failed: {:?}", user_id, e);
                }
            }
            map.active.write().unwrap().remove(&user_id);
        });

        Ok(true)
    }

    pub fn running_users(&self) -> Vec<i32> {
        self.active.read().unwrap().keys().copied().collect()
    }
}
