use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppResult;

mod auth;
mod calendar;
mod client;
mod parse;

pub use auth::*;
pub use calendar::*;
pub use client::*;
pub use parse::*;

/// Deadline applied to every mail provider call.
pub const MAIL_DEADLINE: Duration = Duration::from_secs(20);

/// The side-effecting subset of the mail provider the action worker drives.
/// The Gmail client implements it; tests substitute a double.
#[async_trait]
pub trait MailPort: Send + Sync {
    async fn remove_labels(&self, message_id: &str, label_ids: &[String]) -> AppResult<()>;

    async fn add_labels(&self, message_id: &str, label_ids: &[String]) -> AppResult<()>;

    async fn send_raw(&self, raw_b64u: String) -> AppResult<()>;

    /// Resolves a label name to its id, creating the label (and any absent
    /// `/`-separated parents) on the way.
    async fn resolve_label_id(&self, name: &str) -> AppResult<String>;
}
