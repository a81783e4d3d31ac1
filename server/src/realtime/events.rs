use chrono::Utc;
use entity::sea_orm_active_enums::Priority;
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    analysis::{EmailAnalysis, Suggestion},
    mail::ParsedEmail,
    reasoning::ClassificationResult,
};

pub const SUBJECT_LIMIT: usize = 100;
pub const SUMMARY_LIMIT: usize = 200;
pub const SUGGESTION_LIMIT: usize = 300;
pub const DETAILS_LIMIT: usize = 200;

/// Char-aware truncation; event payloads stay small on the wire.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

/// One realtime event, broadcast to the user's room and mirrored into the
/// activity log. Serialized as `{"event": ..., "data": {...}}`; every payload
/// carries an ISO-8601 UTC timestamp.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    EmailProcessingStarted {
        email_id: String,
        subject: String,
        sender: String,
        timestamp: String,
    },
    LlmAnalysisComplete {
        email_id: String,
        purpose: String,
        priority: String,
        urgency: i32,
        confidence: f32,
        summary: String,
        timestamp: String,
    },
    ClassificationComplete {
        email_id: String,
        priority: String,
        confidence: f32,
        ml_features: Value,
        timestamp: String,
    },
    SuggestionGenerated {
        email_id: String,
        suggestion: String,
        #[serde(rename = "type")]
        suggestion_type: String,
        timestamp: String,
    },
    AutonomousActionExecuted {
        email_id: String,
        action: String,
        details: String,
        timestamp: String,
    },
    MlTrainingStarted {
        timestamp: String,
    },
    MlTrainingProgress {
        step: String,
        message: String,
        progress_percent: Option<u8>,
        timestamp: String,
    },
    MlTrainingComplete {
        samples: usize,
        feedback_count: u64,
        timestamp: String,
    },
    MlTrainingError {
        error: String,
        timestamp: String,
    },
    ReportGenerationStarted {
        timestamp: String,
    },
    ReportGenerationProgress {
        step: String,
        message: String,
        progress_percent: Option<u8>,
        timestamp: String,
    },
    ReportGenerationComplete {
        report: Value,
        timestamp: String,
    },
    SecurityScanStarted {
        hours_back: u32,
        timestamp: String,
    },
    SecurityScanProgress {
        step: String,
        message: String,
        progress_percent: Option<u8>,
        timestamp: String,
    },
    SecurityScanComplete {
        results: Value,
        timestamp: String,
    },
    ActionQueued {
        action_id: String,
        email_id: Option<String>,
        action_type: String,
        status: String,
        timestamp: String,
    },
    SystemStatusUpdate {
        is_processing: bool,
        last_email_check: Option<String>,
        active_tasks: Vec<String>,
        autonomous_mode: bool,
        ml_training_status: Option<String>,
        timestamp: String,
    },
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

impl AgentEvent {
    pub fn email_processing_started(email: &ParsedEmail) -> Self {
        Self::EmailProcessingStarted {
            email_id: email.id.clone(),
            subject: truncate(&email.subject, SUBJECT_LIMIT),
            sender: email.sender.clone(),
            timestamp: now(),
        }
    }

    pub fn llm_analysis_complete(
        email_id: &str,
        analysis: &EmailAnalysis,
        priority: Option<Priority>,
        confidence: f32,
        summary: Option<&str>,
    ) -> Self {
        Self::LlmAnalysisComplete {
            email_id: email_id.to_string(),
            purpose: analysis.purpose.clone(),
            priority: priority.map(|p| p.to_string()).unwrap_or_default(),
            urgency: analysis.urgency_score,
            confidence,
            summary: truncate(summary.unwrap_or_default(), SUMMARY_LIMIT),
            timestamp: now(),
        }
    }

    pub fn classification_complete(email_id: &str, result: &ClassificationResult) -> Self {
        Self::ClassificationComplete {
            email_id: email_id.to_string(),
            priority: result.priority.to_string(),
            confidence: result.confidence,
            ml_features: json!({
                "decision_method": result.decision_method,
                "decision_factors": result.decision_factors,
            }),
            timestamp: now(),
        }
    }

    pub fn suggestion_generated(email_id: &str, suggestion: &Suggestion) -> Self {
        Self::SuggestionGenerated {
            email_id: email_id.to_string(),
            suggestion: truncate(&suggestion.text, SUGGESTION_LIMIT),
            suggestion_type: suggestion.suggestion_type.clone(),
            timestamp: now(),
        }
    }

    pub fn autonomous_action_executed(email_id: &str, action: &str, details: &str) -> Self {
        Self::AutonomousActionExecuted {
            email_id: email_id.to_string(),
            action: action.to_string(),
            details: truncate(details, DETAILS_LIMIT),
            timestamp: now(),
        }
    }

    pub fn action_queued(request: &entity::action_request::Model) -> Self {
        Self::ActionQueued {
            action_id: request.id.clone(),
            email_id: request.message_id.clone(),
            action_type: request.action.to_string(),
            status: request.status.to_string(),
            timestamp: now(),
        }
    }

    pub fn ml_training_started() -> Self {
        Self::MlTrainingStarted { timestamp: now() }
    }

    pub fn ml_training_progress(step: &str, message: &str, progress_percent: Option<u8>) -> Self {
        Self::MlTrainingProgress {
            step: step.to_string(),
            message: message.to_string(),
            progress_percent,
            timestamp: now(),
        }
    }

    pub fn ml_training_complete(samples: usize, feedback_count: u64) -> Self {
        Self::MlTrainingComplete {
            samples,
            feedback_count,
            timestamp: now(),
        }
    }

    pub fn ml_training_error(error: &str) -> Self {
        Self::MlTrainingError {
            error: truncate(error, DETAILS_LIMIT),
            timestamp: now(),
        }
    }

    /// Event name, used as the activity `kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmailProcessingStarted { .. } => "email_processing_started",
            Self::LlmAnalysisComplete { .. } => "llm_analysis_complete",
            Self::ClassificationComplete { .. } => "classification_complete",
            Self::SuggestionGenerated { .. } => "suggestion_generated",
            Self::AutonomousActionExecuted { .. } => "autonomous_action_executed",
            Self::MlTrainingStarted { .. } => "ml_training_started",
            Self::MlTrainingProgress { .. } => "ml_training_progress",
            Self::MlTrainingComplete { .. } => "ml_training_complete",
            Self::MlTrainingError { .. } => "ml_training_error",
            Self::ReportGenerationStarted { .. } => "report_generation_started",
            Self::ReportGenerationProgress { .. } => "report_generation_progress",
            Self::ReportGenerationComplete { .. } => "report_generation_complete",
            Self::SecurityScanStarted { .. } => "security_scan_started",
            Self::SecurityScanProgress { .. } => "security_scan_progress",
            Self::SecurityScanComplete { .. } => "security_scan_complete",
            Self::ActionQueued { .. } => "action_queued",
            Self::SystemStatusUpdate { .. } => "system_status_update",
        }
    }

    /// Pipeline stage recorded in the mirrored activity entry.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::EmailProcessingStarted { .. } => "fetch",
            Self::LlmAnalysisComplete { .. } => "analysis",
            Self::ClassificationComplete { .. } => "classification",
            Self::SuggestionGenerated { .. } => "suggestions",
            Self::AutonomousActionExecuted { .. } => "autonomous",
            Self::MlTrainingStarted { .. }
            | Self::MlTrainingProgress { .. }
            | Self::MlTrainingComplete { .. }
            | Self::MlTrainingError { .. } => "training",
            Self::ReportGenerationStarted { .. }
            | Self::ReportGenerationProgress { .. }
            | Self::ReportGenerationComplete { .. } => "report",
            Self::SecurityScanStarted { .. }
            | Self::SecurityScanProgress { .. }
            | Self::SecurityScanComplete { .. } => "security",
            Self::ActionQueued { .. } => "actions",
            Self::SystemStatusUpdate { .. } => "status",
        }
    }

    pub fn activity_status(&self) -> &'static str {
        match self {
            Self::MlTrainingError { .. } => crate::model::activity::STATUS_FAILED,
            Self::EmailProcessingStarted { .. }
            | Self::MlTrainingStarted { .. }
            | Self::MlTrainingProgress { .. }
            | Self::ReportGenerationStarted { .. }
            | Self::ReportGenerationProgress { .. }
            | Self::SecurityScanStarted { .. }
            | Self::SecurityScanProgress { .. } => crate::model::activity::STATUS_IN_PROGRESS,
            _ => crate::model::activity::STATUS_COMPLETED,
        }
    }

    pub fn payload(&self) -> Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get("data").cloned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_limits_chars() {
        let long = "x".repeat(500);
        assert_eq!(truncate(&long, SUGGESTION_LIMIT).chars().count(), 300);
        assert_eq!(truncate("short", 100), "short");
    }

    #[test]
    fn test_event_serialization_shape() {
        let email = ParsedEmail {
            id: "m1".to_string(),
            subject: "Subject".to_string(),
            sender: "a@b.com".to_string(),
            ..Default::default()
        };
        let event = AgentEvent::email_processing_started(&email);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["event"], "email_processing_started");
        assert_eq!(value["data"]["email_id"], "m1");
        assert!(value["data"]["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_subject_truncated_in_event() {
        let email = ParsedEmail {
            id: "m1".to_string(),
            subject: "s".repeat(250),
            ..Default::default()
        };
        let event = AgentEvent::email_processing_started(&email);
        match event {
            AgentEvent::EmailProcessingStarted { subject, .. } => {
                assert_eq!(subject.chars().count(), SUBJECT_LIMIT);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_kind_and_stage() {
        let event = AgentEvent::ml_training_started();
        assert_eq!(event.kind(), "ml_training_started");
        assert_eq!(event.stage(), "training");
        assert_eq!(event.activity_status(), "in_progress");

        let error = AgentEvent::ml_training_error("boom");
        assert_eq!(error.activity_status(), "failed");
    }
}
