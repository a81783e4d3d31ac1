use std::sync::{Arc, RwLock};

use anyhow::Context;

use crate::{
    blob::{BlobStore, BlobStoreHandle},
    server_config::cfg,
};

use super::{LabelEncoder, PriorityModel, TrainedPipeline};

/// Read-mostly handle to the current classifier. Loads are copy-on-replace;
/// readers keep whatever Arc they grabbed.
#[derive(Clone)]
pub struct ModelStore {
    current: Arc<RwLock<Option<Arc<PriorityModel>>>>,
}

impl ModelStore {
    pub fn empty() -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
        }
    }

    pub fn current(&self) -> Option<Arc<PriorityModel>> {
        self.current.read().unwrap().clone()
    }

    pub fn replace(&self, model: PriorityModel) {
        *self.current.write().unwrap() = Some(Arc::new(model));
    }

    fn pipeline_path() -> String {
        format!(
            "{}{}",
            cfg.ml_settings.model_prefix, cfg.ml_settings.pipeline_filename
        )
    }

    fn encoder_path() -> String {
        format!(
            "{}{}",
            cfg.ml_settings.model_prefix, cfg.ml_settings.label_encoder_filename
        )
    }

    /// Loads the artifact pair from the blob store. A missing artifact is not
    /// an error: the reasoning engine runs without a model.
    pub async fn load(&self, blob_store: &BlobStoreHandle) -> anyhow::Result<bool> {
        let pipeline_bytes = blob_store.get_bytes(&Self::pipeline_path()).await?;
        let encoder_bytes = blob_store.get_bytes(&Self::encoder_path()).await?;

        let (Some(pipeline_bytes), Some(encoder_bytes)) = (pipeline_bytes, encoder_bytes) else {
            tracing::info!("Classifier artifacts not found; running without ML predictions");
            return Ok(false);
        };

        let mut trained: TrainedPipeline =
            serde_json::from_slice(&pipeline_bytes).context("Corrupt pipeline artifact")?;
        trained.pipeline.purpose_encoder.rebuild_index();
        trained.pipeline.domain_encoder.rebuild_index();

        let label_encoder: LabelEncoder =
            serde_json::from_slice(&encoder_bytes).context("Corrupt label encoder artifact")?;

        self.replace(PriorityModel {
            trained,
            label_encoder,
        });
        tracing::info!("Classifier artifacts loaded");

        Ok(true)
    }

    /// Persists both artifacts, then swaps the in-memory model.
    pub async fn publish(
        &self,
        blob_store: &BlobStoreHandle,
        model: PriorityModel,
    ) -> anyhow::Result<()> {
        let pipeline_bytes =
            serde_json::to_vec(&model.trained).context("Error serializing pipeline")?;
        let encoder_bytes =
            serde_json::to_vec(&model.label_encoder).context("Error serializing label encoder")?;

        blob_store
            .put_bytes(&Self::pipeline_path(), &pipeline_bytes)
            .await?;
        blob_store
            .put_bytes(&Self::encoder_path(), &encoder_bytes)
            .await?;

        self.replace(model);

        Ok(())
    }
}
