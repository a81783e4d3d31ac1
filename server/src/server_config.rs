use config::{Config, ConfigError};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::result::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct GmailConfig {
    pub client_id: String,
    pub project_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub auth_provider_x509_cert_url: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
    pub scopes: Vec<String>,
}

impl GmailConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        builder.try_deserialize()
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_rate_limit_per_sec")]
    pub rate_limit_per_sec: usize,
    #[serde(default = "default_refill_interval_ms")]
    pub refill_interval_ms: usize,
    #[serde(default = "default_refill_amount")]
    pub refill_amount: usize,
}

fn default_rate_limit_per_sec() -> usize {
    4
}

fn default_refill_interval_ms() -> usize {
    1000
}

fn default_refill_amount() -> usize {
    4
}

#[derive(Debug, Deserialize)]
pub struct LlmSettings {
    pub model: String,
    #[serde(default = "default_analysis_max_input_chars")]
    pub analysis_max_input_chars: usize,
    #[serde(default = "default_summary_max_input_chars")]
    pub summary_max_input_chars: usize,
    #[serde(default = "default_analysis_max_tokens")]
    pub analysis_max_tokens: u32,
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,
    #[serde(default = "default_analysis_temperature")]
    pub analysis_temperature: f32,
    #[serde(default = "default_summary_temperature")]
    pub summary_temperature: f32,
}

fn default_analysis_max_input_chars() -> usize {
    2500
}

fn default_summary_max_input_chars() -> usize {
    5000
}

fn default_analysis_max_tokens() -> u32 {
    300
}

fn default_summary_max_tokens() -> u32 {
    400
}

fn default_analysis_temperature() -> f32 {
    0.2
}

fn default_summary_temperature() -> f32 {
    0.4
}

#[derive(Debug, Default, Deserialize)]
pub struct ClassificationRules {
    #[serde(default)]
    pub important_senders: Vec<String>,
    #[serde(default)]
    pub sender_keywords_low: Vec<String>,
    #[serde(default)]
    pub subject_keywords_low: Vec<String>,
    #[serde(default)]
    pub subject_keywords_high: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MlSettings {
    #[serde(default = "default_pipeline_filename")]
    pub pipeline_filename: String,
    #[serde(default = "default_label_encoder_filename")]
    pub label_encoder_filename: String,
    #[serde(default = "default_model_prefix")]
    pub model_prefix: String,
    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,
}

fn default_pipeline_filename() -> String {
    "feature_pipeline.json".to_string()
}

fn default_label_encoder_filename() -> String {
    "label_encoder.json".to_string()
}

fn default_model_prefix() -> String {
    "models/v1/".to_string()
}

fn default_min_training_samples() -> usize {
    5
}

#[derive(Debug, Deserialize)]
pub struct RetrainingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_trigger_feedback_count")]
    pub trigger_feedback_count: u64,
}

fn default_trigger_feedback_count() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub hybrid_llm: bool,
    #[serde(default)]
    pub confidence_thresholds: ConfidenceThresholds,
}

#[derive(Debug, Deserialize)]
pub struct ConfidenceThresholds {
    pub archive: f32,
    pub label: f32,
    pub priority_adjust: f32,
    pub suggestion: f32,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            archive: 0.95,
            label: 0.85,
            priority_adjust: 0.80,
            suggestion: 0.70,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AutoArchiveTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_hour_interval")]
    pub interval_minutes: i64,
    #[serde(default = "default_archive_confidence")]
    pub confidence_threshold: f32,
    #[serde(default = "default_purposes_to_archive")]
    pub purposes_to_archive: Vec<String>,
    #[serde(default = "default_archive_after_days")]
    pub archive_after_days: i64,
    #[serde(default)]
    pub excluded_senders: Vec<String>,
    #[serde(default)]
    pub excluded_domains: Vec<String>,
    #[serde(default = "default_archive_batch")]
    pub max_per_run: u64,
}

fn default_archive_confidence() -> f32 {
    0.95
}

fn default_purposes_to_archive() -> Vec<String> {
    vec!["promotion".to_string(), "forum_digest".to_string()]
}

fn default_archive_after_days() -> i64 {
    7
}

fn default_archive_batch() -> u64 {
    25
}

#[derive(Debug, Deserialize)]
pub struct DailySummaryTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_hour_interval")]
    pub interval_minutes: i64,
    #[serde(default = "default_summary_hour")]
    pub hour_utc: u32,
    #[serde(default = "default_true")]
    pub priority_only: bool,
}

fn default_summary_hour() -> u32 {
    7
}

#[derive(Debug, Deserialize)]
pub struct FollowUpTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_hour_interval")]
    pub interval_minutes: i64,
    #[serde(default = "default_remind_days")]
    pub remind_days: i64,
}

fn default_remind_days() -> i64 {
    3
}

#[derive(Debug, Deserialize)]
pub struct ReEvaluateTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_day_interval")]
    pub interval_minutes: i64,
    #[serde(default = "default_reevaluate_batch")]
    pub batch_size: u64,
}

fn default_reevaluate_batch() -> u64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct MeetingPrepTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_hour_interval")]
    pub interval_minutes: i64,
    #[serde(default = "default_meeting_confidence")]
    pub confidence_threshold: f32,
}

fn default_meeting_confidence() -> f32 {
    0.6
}

#[derive(Debug, Deserialize)]
pub struct TaskExtractionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_tasks_per_message")]
    pub max_per_message: usize,
}

fn default_tasks_per_message() -> usize {
    3
}

fn default_hour_interval() -> i64 {
    60
}

fn default_day_interval() -> i64 {
    1440
}

#[derive(Debug, Deserialize)]
pub struct AutonomousTasksConfig {
    #[serde(default = "default_auto_archive")]
    pub auto_archive: AutoArchiveTask,
    #[serde(default = "default_daily_summary")]
    pub daily_summary: DailySummaryTask,
    #[serde(default = "default_follow_up")]
    pub follow_up: FollowUpTask,
    #[serde(default = "default_re_evaluate")]
    pub re_evaluate: ReEvaluateTask,
    #[serde(default = "default_meeting_prep")]
    pub meeting_prep: MeetingPrepTask,
    #[serde(default = "default_task_extraction")]
    pub task_extraction: TaskExtractionConfig,
}

fn default_auto_archive() -> AutoArchiveTask {
    toml_default()
}

fn default_daily_summary() -> DailySummaryTask {
    toml_default()
}

fn default_follow_up() -> FollowUpTask {
    toml_default()
}

fn default_re_evaluate() -> ReEvaluateTask {
    toml_default()
}

fn default_meeting_prep() -> MeetingPrepTask {
    toml_default()
}

fn default_task_extraction() -> TaskExtractionConfig {
    toml_default()
}

fn toml_default<T: serde::de::DeserializeOwned>() -> T {
    T::deserialize(toml::Value::Table(Default::default())).expect("defaults must deserialize")
}

#[derive(Debug, Deserialize)]
pub struct AgendaSynthesis {
    #[serde(default = "default_agenda_max_emails")]
    pub max_emails: usize,
    #[serde(default = "default_agenda_tone")]
    pub tone: String,
}

fn default_agenda_max_emails() -> usize {
    10
}

fn default_agenda_tone() -> String {
    "concise".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AgentConfigFile {
    pub api: ApiConfig,
    pub llm_settings: LlmSettings,
    #[serde(default)]
    pub classification: ClassificationRules,
    pub ml_settings: MlSettings,
    pub retraining: RetrainingConfig,
    pub reasoning: ReasoningConfig,
    pub autonomous_tasks: AutonomousTasksConfig,
    pub agenda_synthesis: AgendaSynthesis,
    #[serde(default = "default_blob_root")]
    pub blob_root: String,
}

fn default_blob_root() -> String {
    "./data".to_string()
}

pub struct AgentConfig {
    pub api: ApiConfig,
    pub llm_settings: LlmSettings,
    pub classification: ClassificationRules,
    pub ml_settings: MlSettings,
    pub retraining: RetrainingConfig,
    pub reasoning: ReasoningConfig,
    pub autonomous_tasks: AutonomousTasksConfig,
    pub agenda_synthesis: AgendaSynthesis,
    pub blob_root: String,
    pub gmail_config: GmailConfig,
}

pub const AGENT_NAME: &str = "Mailsense";

lazy_static! {
    #[allow(non_upper_case_globals)]
    pub static ref cfg: AgentConfig = {
        let root = std::env::var("APP_DIR").unwrap_or_else(|_| env!("CARGO_MANIFEST_DIR").to_string());
        let path = format!("{root}/client_secret.toml");
        let gmail_config = GmailConfig::from_file(&path).expect("client_secret.toml is required");
        let path = format!("{root}/config.toml");
        let file: AgentConfigFile = Config::builder()
            .add_source(config::File::with_name(&path))
            .add_source(config::Environment::with_prefix("MAILSENSE").separator("__"))
            .build()
            .expect("config.toml is required")
            .try_deserialize()
            .expect("config.toml is invalid");

        let mut api = file.api;
        if api.key.is_empty() {
            // Key may come from the environment rather than the config file.
            api.key = std::env::var("LLM_API_KEY").unwrap_or_default();
            if api.key.is_empty() {
                tracing::warn!("No LLM API key configured; analysis features are disabled");
            }
        }

        AgentConfig {
            api,
            llm_settings: file.llm_settings,
            classification: file.classification,
            ml_settings: file.ml_settings,
            retraining: file.retraining,
            reasoning: file.reasoning,
            autonomous_tasks: file.autonomous_tasks,
            agenda_synthesis: file.agenda_synthesis,
            blob_root: file.blob_root,
            gmail_config,
        }
    };
}
