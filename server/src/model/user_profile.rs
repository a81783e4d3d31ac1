use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{db_core::prelude::*, error::AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailPreferences {
    pub important_senders: Vec<String>,
    pub filtered_domains: Vec<String>,
    pub notification_preferences: serde_json::Map<String, Value>,
}

impl Default for EmailPreferences {
    fn default() -> Self {
        Self {
            important_senders: Vec::new(),
            filtered_domains: Vec::new(),
            notification_preferences: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentPreferences {
    pub autonomous_mode_enabled: bool,
    pub suggestion_frequency: String,
    pub allow_auto_archiving: bool,
    pub allow_auto_categorization: bool,
    pub allow_auto_draft: bool,
    pub daily_summary_enabled: bool,
}

impl Default for AgentPreferences {
    fn default() -> Self {
        Self {
            autonomous_mode_enabled: false,
            suggestion_frequency: "normal".to_string(),
            allow_auto_archiving: false,
            allow_auto_categorization: true,
            allow_auto_draft: false,
            daily_summary_enabled: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub user_id: i32,
    pub email_preferences: EmailPreferences,
    pub agent_preferences: AgentPreferences,
    pub autonomous_tasks: serde_json::Map<String, Value>,
    pub interaction_patterns: serde_json::Map<String, Value>,
    pub last_autonomous_run_summary: Option<String>,
}

impl Profile {
    fn from_model(model: user_profile::Model) -> Self {
        Self {
            user_id: model.user_id,
            email_preferences: serde_json::from_value(model.email_preferences)
                .unwrap_or_default(),
            agent_preferences: serde_json::from_value(model.agent_preferences)
                .unwrap_or_default(),
            autonomous_tasks: match model.autonomous_tasks {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
            interaction_patterns: match model.interaction_patterns {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
            last_autonomous_run_summary: model.last_autonomous_run_summary,
        }
    }

    pub fn task_last_run(&self, task: &str) -> Option<DateTime<Utc>> {
        self.autonomous_tasks
            .get(task)
            .and_then(|t| t.get("last_run_utc"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

pub struct UserProfileCtrl;

impl UserProfileCtrl {
    /// Profiles materialize with defaults on first access.
    pub async fn get_or_create(conn: &DatabaseConnection, user_id: i32) -> AppResult<Profile> {
        if let Some(model) = UserProfile::find_by_id(user_id).one(conn).await? {
            return Ok(Profile::from_model(model));
        }

        let defaults = user_profile::ActiveModel {
            user_id: ActiveValue::Set(user_id),
            email_preferences: ActiveValue::Set(
                serde_json::to_value(EmailPreferences::default()).unwrap_or_default(),
            ),
            agent_preferences: ActiveValue::Set(
                serde_json::to_value(AgentPreferences::default()).unwrap_or_default(),
            ),
            autonomous_tasks: ActiveValue::Set(json!({})),
            interaction_patterns: ActiveValue::Set(json!({})),
            last_autonomous_run_summary: ActiveValue::Set(None),
            updated_at: ActiveValue::Set(Utc::now().into()),
        };

        let insert = UserProfile::insert(defaults)
            .on_conflict(
                OnConflict::column(user_profile::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(conn)
            .await;

        match insert {
            Ok(_) | Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e.into()),
        }

        let model = UserProfile::find_by_id(user_id)
            .one(conn)
            .await?
            .context("Profile missing after create")?;

        Ok(Profile::from_model(model))
    }

    /// Profiles are only ever updated via partial merges; a full-document
    /// overwrite would race concurrent executors.
    pub async fn merge_update(
        conn: &DatabaseConnection,
        user_id: i32,
        updates: Value,
    ) -> AppResult<Profile> {
        let current = Self::get_or_create(conn, user_id).await?;

        let mut email_preferences =
            serde_json::to_value(&current.email_preferences).unwrap_or_default();
        let mut agent_preferences =
            serde_json::to_value(&current.agent_preferences).unwrap_or_default();
        let mut autonomous_tasks = Value::Object(current.autonomous_tasks.clone());
        let mut interaction_patterns = Value::Object(current.interaction_patterns.clone());

        if let Some(patch) = updates.get("email_preferences") {
            merge_json(&mut email_preferences, patch);
        }
        if let Some(patch) = updates.get("agent_preferences") {
            merge_json(&mut agent_preferences, patch);
        }
        if let Some(patch) = updates.get("autonomous_tasks") {
            merge_json(&mut autonomous_tasks, patch);
        }
        if let Some(patch) = updates.get("interaction_patterns") {
            merge_json(&mut interaction_patterns, patch);
        }

        let mut model = user_profile::ActiveModel {
            user_id: ActiveValue::Set(user_id),
            email_preferences: ActiveValue::Set(email_preferences),
            agent_preferences: ActiveValue::Set(agent_preferences),
            autonomous_tasks: ActiveValue::Set(autonomous_tasks),
            interaction_patterns: ActiveValue::Set(interaction_patterns),
            updated_at: ActiveValue::Set(Utc::now().into()),
            ..Default::default()
        };

        if let Some(summary) = updates.get("last_autonomous_run_summary") {
            model.last_autonomous_run_summary =
                ActiveValue::Set(summary.as_str().map(|s| s.to_string()));
        }

        let updated = UserProfile::update(model).exec(conn).await?;

        Ok(Profile::from_model(updated))
    }

    pub async fn set_task_last_run(
        conn: &DatabaseConnection,
        user_id: i32,
        task: &str,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        UserProfileCtrl::merge_update(
            conn,
            user_id,
            json!({
                "autonomous_tasks": {
                    task: { "last_run_utc": at.to_rfc3339() }
                }
            }),
        )
        .await?;

        Ok(())
    }

    pub async fn set_last_run_summary(
        conn: &DatabaseConnection,
        user_id: i32,
        summary: &str,
    ) -> AppResult<()> {
        UserProfileCtrl::merge_update(
            conn,
            user_id,
            json!({ "last_autonomous_run_summary": summary }),
        )
        .await?;

        Ok(())
    }
}

/// Recursive object merge; scalars and arrays in the patch replace the base.
pub fn merge_json(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(base_value) => merge_json(base_value, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_json_is_partial() {
        let mut base = json!({
            "autonomous_mode_enabled": false,
            "allow_auto_archiving": true,
            "nested": { "a": 1, "b": 2 }
        });

        merge_json(
            &mut base,
            &json!({ "autonomous_mode_enabled": true, "nested": { "b": 3 } }),
        );

        assert_eq!(base["autonomous_mode_enabled"], json!(true));
        assert_eq!(base["allow_auto_archiving"], json!(true));
        assert_eq!(base["nested"]["a"], json!(1));
        assert_eq!(base["nested"]["b"], json!(3));
    }

    #[test]
    fn test_task_last_run_parses_rfc3339() {
        let mut tasks = serde_json::Map::new();
        tasks.insert(
            "auto_archive".to_string(),
            json!({ "last_run_utc": "2025-02-10T08:30:00+00:00" }),
        );
        let profile = Profile {
            user_id: 1,
            email_preferences: EmailPreferences::default(),
            agent_preferences: AgentPreferences::default(),
            autonomous_tasks: tasks,
            interaction_patterns: serde_json::Map::new(),
            last_autonomous_run_summary: None,
        };

        let last_run = profile.task_last_run("auto_archive").unwrap();
        assert_eq!(last_run.to_rfc3339(), "2025-02-10T08:30:00+00:00");
        assert!(profile.task_last_run("daily_summary").is_none());
    }

    #[test]
    fn test_default_agent_preferences_are_conservative() {
        let prefs = AgentPreferences::default();
        assert!(!prefs.autonomous_mode_enabled);
        assert!(!prefs.allow_auto_archiving);
        assert!(!prefs.allow_auto_draft);
    }
}
