use serde::{Deserialize, Serialize};

mod worker;

pub use worker::*;

/// Typed payloads for each action kind, stored in the request's `params`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendDraftParams {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub is_html: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyLabelParams {
    pub labels: Vec<String>,
}
