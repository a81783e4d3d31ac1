use crate::{error::AppResult, model::user::UserCtrl, ServerState};

const DEFAULT_MAX_RESULTS: u32 = 20;

/// Scheduler entry point: kick off an inbox run for every connected user.
/// Users run in parallel; a user whose previous run is still active is
/// skipped this tick.
pub async fn process_all_inboxes(state: ServerState) -> AppResult<()> {
    let users = UserCtrl::all_connected(&state.conn).await?;

    for user in users {
        let email = user.email.clone();
        match state
            .active_pipelines
            .clone()
            .spawn_run(state.clone(), user, DEFAULT_MAX_RESULTS)
            .await
        {
            Ok(true) => tracing::info!("Started inbox run for {}", email),
            Ok(false) => tracing::debug!("Inbox run already active for {}", email),
            Err(e) => tracing::error!("Could not start inbox run for {}: {:?}", email, e),
        }
    }

    Ok(())
}
