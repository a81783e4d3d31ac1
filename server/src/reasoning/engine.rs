use std::collections::BTreeMap;

use entity::sea_orm_active_enums::Priority;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    analysis::EmailAnalysis,
    classify::{
        features::{extract_domain, sender_key, EmailFeatures},
        PriorityModel,
    },
    model::feedback::FeedbackMap,
    server_config::{cfg, ConfidenceThresholds},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    FeedbackCheck,
    LlmAnalysis,
    MlPrediction,
    RuleMatch,
}

/// One appended entry in the decision chain. The chain is append-only while
/// the engine runs and frozen into the persisted record afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub step_type: StepKind,
    pub description: String,
    pub weight: f32,
    pub confidence: f32,
    pub result: Option<String>,
    pub details: serde_json::Value,
}

/// Side-effect kinds the autonomy gate arbitrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutonomyAction {
    Archive,
    Label,
    PriorityAdjust,
    Suggestion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub priority: Priority,
    pub confidence: f32,
    pub decision_method: String,
    pub explanation: Vec<String>,
    pub decision_factors: BTreeMap<String, f32>,
    pub chain: Vec<ReasoningStep>,
}

impl ClassificationResult {
    /// Confidence gate for an autonomous side effect. The caller still has to
    /// check the user's own autonomous-mode switches.
    pub fn authorizes(&self, action: AutonomyAction, thresholds: &ConfidenceThresholds) -> bool {
        let required = match action {
            AutonomyAction::Archive => thresholds.archive,
            AutonomyAction::Label => thresholds.label,
            AutonomyAction::PriorityAdjust => thresholds.priority_adjust,
            AutonomyAction::Suggestion => thresholds.suggestion,
        };
        self.confidence >= required
    }

    pub fn to_record(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// The weighted decision chain: user feedback first, then LLM analysis,
/// trained classifier, critical-sender rules and keyword rules, resolved by
/// a fixed precedence order. Pure and deterministic given its inputs; all
/// I/O (LLM analysis, model loading) happens before the call.
pub struct ReasoningEngine<'a> {
    feedback_map: &'a FeedbackMap,
    user_important_senders: &'a [String],
    model: Option<&'a PriorityModel>,
    steps: Vec<ReasoningStep>,
    decision_factors: BTreeMap<String, f32>,
}

struct KeywordHits {
    high: Vec<String>,
    low: Vec<String>,
}

impl<'a> ReasoningEngine<'a> {
    pub fn new(
        feedback_map: &'a FeedbackMap,
        user_important_senders: &'a [String],
        model: Option<&'a PriorityModel>,
    ) -> Self {
        Self {
            feedback_map,
            user_important_senders,
            model,
            steps: Vec::new(),
            decision_factors: BTreeMap::new(),
        }
    }

    pub fn classify(
        mut self,
        sender: &str,
        subject: &str,
        body_text: &str,
        analysis: Option<&EmailAnalysis>,
    ) -> ClassificationResult {
        // Step 1: user feedback short-circuits everything else.
        if let Some(result) = self.check_feedback(sender) {
            return result;
        }

        // Step 2: LLM analysis, recorded but never decisive on its own yet.
        self.record_llm_analysis(analysis);

        // Step 3: trained classifier.
        let ml_step = self.predict_with_model(sender, subject, body_text, analysis);

        // Step 4: critical-sender rules.
        let critical = self.check_critical_senders(sender);

        // Step 5: keyword rules.
        let keyword_hits = self.check_keyword_rules(sender, subject);

        // Step 6: unified decision.
        self.decide(analysis, ml_step, critical, keyword_hits)
    }

    fn check_feedback(&mut self, sender: &str) -> Option<ClassificationResult> {
        let key = sender_key(sender);

        if let Some(&priority) = self.feedback_map.get(&key) {
            self.steps.push(ReasoningStep {
                step_type: StepKind::FeedbackCheck,
                description: format!("Found previous feedback for sender '{key}'"),
                weight: 1.0,
                confidence: 0.95,
                result: Some(priority.as_str().to_string()),
                details: json!({ "sender_key": key, "original_sender": sender }),
            });
            self.decision_factors.insert("user_feedback".to_string(), 1.0);

            return Some(ClassificationResult {
                priority,
                confidence: 0.95,
                decision_method: "feedback_history".to_string(),
                explanation: vec![format!("Used previous feedback for this sender ({key})")],
                decision_factors: std::mem::take(&mut self.decision_factors),
                chain: std::mem::take(&mut self.steps),
            });
        }

        // A miss is still worth a step so the chain explains itself.
        self.steps.push(ReasoningStep {
            step_type: StepKind::FeedbackCheck,
            description: format!("No previous feedback found for sender '{key}'"),
            weight: 0.0,
            confidence: 1.0,
            result: None,
            details: json!({ "sender_key": key }),
        });

        None
    }

    fn record_llm_analysis(&mut self, analysis: Option<&EmailAnalysis>) {
        match analysis {
            Some(analysis) => {
                let confidence =
                    (analysis.urgency_score as f32 / 5.0 * 0.8 + 0.2).min(0.9);
                self.steps.push(ReasoningStep {
                    step_type: StepKind::LlmAnalysis,
                    description: format!(
                        "LLM analyzed urgency: {}/5, purpose: {}",
                        analysis.urgency_score, analysis.purpose
                    ),
                    weight: 0.6,
                    confidence,
                    result: Some(analysis.purpose.clone()),
                    details: json!({
                        "urgency_score": analysis.urgency_score,
                        "purpose": analysis.purpose,
                        "response_needed": analysis.response_needed,
                        "estimated_time": analysis.estimated_time,
                    }),
                });
                self.decision_factors.insert("llm_analysis".to_string(), 0.6);
            }
            None => {
                self.steps.push(ReasoningStep {
                    step_type: StepKind::LlmAnalysis,
                    description: "LLM analysis not available".to_string(),
                    weight: 0.0,
                    confidence: 0.0,
                    result: None,
                    details: json!({}),
                });
            }
        }
    }

    fn predict_with_model(
        &mut self,
        sender: &str,
        subject: &str,
        body_text: &str,
        analysis: Option<&EmailAnalysis>,
    ) -> Option<(Priority, f32)> {
        let Some(model) = self.model else {
            self.steps.push(ReasoningStep {
                step_type: StepKind::MlPrediction,
                description: "ML model not available".to_string(),
                weight: 0.0,
                confidence: 0.0,
                result: None,
                details: json!({ "reason": "Model not loaded" }),
            });
            return None;
        };

        let features = EmailFeatures::new(
            subject,
            body_text,
            sender,
            analysis.map(|a| a.purpose.as_str()),
            analysis.map(|a| a.urgency_score),
        );

        match model.predict(&features) {
            Some((label, model_confidence)) => match Priority::parse(&label) {
                Some(priority) => {
                    // The step carries the fixed prediction confidence; the
                    // learner's own probability rides along in the details.
                    let step_confidence = 0.75;
                    self.steps.push(ReasoningStep {
                        step_type: StepKind::MlPrediction,
                        description: format!("ML model predicted: {label}"),
                        weight: 0.7,
                        confidence: step_confidence,
                        result: Some(label),
                        details: json!({
                            "model_confidence": model_confidence,
                            "features_used": ["text", "sender", "llm_analysis"],
                        }),
                    });
                    self.decision_factors.insert("ml_model".to_string(), 0.7);
                    Some((priority, step_confidence))
                }
                None => {
                    self.steps.push(ReasoningStep {
                        step_type: StepKind::MlPrediction,
                        description: format!("ML model returned unknown label: {label}"),
                        weight: 0.0,
                        confidence: 0.0,
                        result: None,
                        details: json!({}),
                    });
                    None
                }
            },
            None => {
                self.steps.push(ReasoningStep {
                    step_type: StepKind::MlPrediction,
                    description: "ML prediction failed".to_string(),
                    weight: 0.0,
                    confidence: 0.0,
                    result: None,
                    details: json!({}),
                });
                None
            }
        }
    }

    fn check_critical_senders(&mut self, sender: &str) -> bool {
        let sender_lower = sender.to_lowercase();
        let user_senders: Vec<String> = self
            .user_important_senders
            .iter()
            .map(|s| s.to_lowercase())
            .collect();
        let config_senders: Vec<String> = cfg
            .classification
            .important_senders
            .iter()
            .map(|s| s.to_lowercase())
            .collect();

        let mut checked = 0;
        for rule in config_senders.iter().chain(user_senders.iter()) {
            checked += 1;
            let matched = if let Some(domain_rule) = rule.strip_prefix('@') {
                extract_domain(&sender_lower) == domain_rule
            } else {
                sender_lower.contains(rule.as_str())
            };

            if matched {
                let source = if user_senders.contains(rule) {
                    "User Preference"
                } else {
                    "Configuration"
                };
                self.steps.push(ReasoningStep {
                    step_type: StepKind::RuleMatch,
                    description: format!("Sender matches critical sender rule ({source})"),
                    weight: 0.9,
                    confidence: 0.95,
                    result: Some(Priority::Critical.as_str().to_string()),
                    details: json!({
                        "matched_rule": rule,
                        "rule_source": source,
                        "rule_type": if rule.starts_with('@') { "domain" } else { "specific" },
                    }),
                });
                self.decision_factors
                    .insert("critical_sender".to_string(), 0.9);
                return true;
            }
        }

        self.steps.push(ReasoningStep {
            step_type: StepKind::RuleMatch,
            description: "No critical sender rules matched".to_string(),
            weight: 0.0,
            confidence: 1.0,
            result: None,
            details: json!({ "checked_rules": checked }),
        });

        false
    }

    fn check_keyword_rules(&mut self, sender: &str, subject: &str) -> KeywordHits {
        let sender = sender.to_lowercase();
        let subject = subject.to_lowercase();
        let mut hits = KeywordHits {
            high: Vec::new(),
            low: Vec::new(),
        };

        let rules = &cfg.classification;
        for keyword in rules
            .sender_keywords_low
            .iter()
            .chain(rules.subject_keywords_low.iter())
        {
            let keyword = keyword.to_lowercase();
            if sender.contains(&keyword) || subject.contains(&keyword) {
                self.steps.push(ReasoningStep {
                    step_type: StepKind::RuleMatch,
                    description: format!("Low priority keyword '{keyword}' found"),
                    weight: 0.4,
                    confidence: 0.8,
                    result: Some(Priority::Low.as_str().to_string()),
                    details: json!({
                        "keyword": keyword,
                        "location": if sender.contains(&keyword) { "sender" } else { "subject" },
                    }),
                });
                hits.low.push(keyword);
            }
        }

        for keyword in rules.subject_keywords_high.iter() {
            let keyword = keyword.to_lowercase();
            if subject.contains(&keyword) {
                self.steps.push(ReasoningStep {
                    step_type: StepKind::RuleMatch,
                    description: format!("High priority keyword '{keyword}' found in subject"),
                    weight: 0.5,
                    confidence: 0.8,
                    result: Some(Priority::High.as_str().to_string()),
                    details: json!({ "keyword": keyword, "location": "subject" }),
                });
                hits.high.push(keyword);
            }
        }

        if hits.high.is_empty() && hits.low.is_empty() {
            self.steps.push(ReasoningStep {
                step_type: StepKind::RuleMatch,
                description: "No keyword rules matched".to_string(),
                weight: 0.0,
                confidence: 1.0,
                result: None,
                details: json!({}),
            });
        }

        hits
    }

    fn decide(
        mut self,
        analysis: Option<&EmailAnalysis>,
        ml_step: Option<(Priority, f32)>,
        critical_sender: bool,
        keyword_hits: KeywordHits,
    ) -> ClassificationResult {
        // (a) A critical-sender match is the decision.
        if critical_sender {
            return self.finish(
                Priority::Critical,
                0.95,
                "critical_sender_rule",
                vec!["Sender matches a critical sender rule".to_string()],
            );
        }

        // (b) A confident classifier prediction wins next.
        if let Some((priority, confidence)) = ml_step {
            if confidence > 0.7 {
                let mut explanation = vec![format!(
                    "ML model prediction: {} (confidence: {:.0}%)",
                    priority,
                    confidence * 100.0
                )];
                if let Some(analysis) = analysis {
                    explanation.push(format!(
                        "Based on urgency score {}/5 and purpose '{}'",
                        analysis.urgency_score, analysis.purpose
                    ));
                }
                return self.finish(priority, confidence, "ml_prediction", explanation);
            }
        }

        // (c) LLM analysis tiers, adjusted by keyword rule hits.
        if let Some(analysis) = analysis {
            let urgency = analysis.urgency_score;
            let purpose = analysis.purpose.to_lowercase();
            let response_needed = analysis.response_needed;
            let estimated_time = analysis.estimated_time;

            let (mut priority, mut confidence, mut explanation) =
                if urgency >= 5 && response_needed && estimated_time > 10 {
                    (
                        Priority::Critical,
                        0.90,
                        vec![
                            format!("Very high urgency ({urgency}/5)"),
                            format!("Response required, about {estimated_time} minutes of work"),
                            format!("Purpose: {purpose}"),
                        ],
                    )
                } else if urgency >= 4
                    || (response_needed
                        && purpose_matches(&purpose, &["action_request", "question"]))
                {
                    let mut explanation = vec![
                        format!("High urgency ({urgency}/5)"),
                        format!("Purpose: {purpose}"),
                    ];
                    if response_needed {
                        explanation.push("Response needed".to_string());
                    }
                    (Priority::High, 0.85, explanation)
                } else if urgency >= 3
                    || purpose_matches(&purpose, &["action_request", "question", "meeting_invite"])
                    || response_needed
                {
                    let mut explanation = vec![
                        format!("Moderate urgency ({urgency}/5)"),
                        format!("Purpose: {purpose}"),
                    ];
                    if response_needed {
                        explanation.push("May need response".to_string());
                    }
                    (Priority::Medium, 0.80, explanation)
                } else {
                    (
                        Priority::Low,
                        0.75,
                        vec![
                            format!("Low urgency ({urgency}/5)"),
                            format!("Informational purpose: {purpose}"),
                            "No immediate action required".to_string(),
                        ],
                    )
                };

            if !keyword_hits.high.is_empty() && priority != Priority::Critical {
                priority = Priority::High;
                confidence = (confidence + 0.05_f32).min(0.95);
                explanation.push("Elevated due to high-priority keyword rules".to_string());
            } else if !keyword_hits.low.is_empty()
                && priority != Priority::Critical
                && priority != Priority::High
            {
                priority = Priority::Low;
                confidence = (confidence - 0.05_f32).max(0.60);
                explanation.push("Reduced due to low-priority keyword rules".to_string());
            }

            return self.finish(priority, confidence, "llm_with_rules", explanation);
        }

        // (d) Rules only.
        if !keyword_hits.high.is_empty() {
            return self.finish(
                Priority::High,
                0.60,
                "rules_only",
                vec!["Based on high-priority keyword rules only".to_string()],
            );
        }
        if !keyword_hits.low.is_empty() {
            return self.finish(
                Priority::Low,
                0.60,
                "rules_only",
                vec!["Based on low-priority keyword rules only".to_string()],
            );
        }

        self.finish(
            Priority::Medium,
            0.50,
            "default_fallback",
            vec!["No clear signals detected, defaulting to medium priority".to_string()],
        )
    }

    fn finish(
        &mut self,
        priority: Priority,
        confidence: f32,
        decision_method: &str,
        explanation: Vec<String>,
    ) -> ClassificationResult {
        ClassificationResult {
            priority,
            confidence: confidence.clamp(0.0, 1.0),
            decision_method: decision_method.to_string(),
            explanation,
            decision_factors: std::mem::take(&mut self.decision_factors),
            chain: std::mem::take(&mut self.steps),
        }
    }
}

/// Purpose labels vary across prompt generations ("action_required",
/// "action request"); compare on a normalized token.
pub fn purpose_matches(purpose: &str, candidates: &[&str]) -> bool {
    let normalized = purpose.trim().to_lowercase().replace([' ', '-'], "_");
    let normalized = match normalized.as_str() {
        "action_required" => "action_request".to_string(),
        other => other.to_string(),
    };
    candidates.contains(&normalized.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_feedback() -> FeedbackMap {
        FeedbackMap::new()
    }

    fn analysis(
        urgency: i32,
        purpose: &str,
        response_needed: bool,
        estimated_time: i32,
    ) -> EmailAnalysis {
        EmailAnalysis {
            urgency_score: urgency,
            purpose: purpose.to_string(),
            response_needed,
            estimated_time,
        }
    }

    #[test]
    fn test_feedback_overrides_everything() {
        let mut feedback = FeedbackMap::new();
        feedback.insert("boss@acme.com".to_string(), Priority::High);

        let result = ReasoningEngine::new(&feedback, &[], None).classify(
            "\"Acme Boss\" <boss@acme.com>",
            "hello",
            "body",
            None,
        );

        assert_eq!(result.priority, Priority::High);
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.decision_method, "feedback_history");
        // Short-circuit: only the feedback step is recorded.
        assert_eq!(result.chain.len(), 1);
        assert_eq!(result.chain[0].step_type, StepKind::FeedbackCheck);
    }

    #[test]
    fn test_feedback_miss_is_recorded_as_step() {
        let result = ReasoningEngine::new(&no_feedback(), &[], None).classify(
            "x <y@z.com>",
            "hello",
            "body",
            None,
        );

        assert_eq!(result.chain[0].step_type, StepKind::FeedbackCheck);
        assert_eq!(result.chain[0].weight, 0.0);
    }

    #[test]
    fn test_user_important_sender_is_critical() {
        let important = vec!["@bigco.com".to_string()];
        let result = ReasoningEngine::new(&no_feedback(), &important, None).classify(
            "x <y@bigco.com>",
            "hello",
            "body",
            Some(&analysis(2, "information", false, 3)),
        );

        assert_eq!(result.priority, Priority::Critical);
        assert!((result.confidence - 0.95).abs() < 1e-6);
        assert_eq!(result.decision_method, "critical_sender_rule");
        assert_eq!(result.decision_factors.get("critical_sender"), Some(&0.9));
    }

    #[test]
    fn test_domain_rule_requires_domain_equality() {
        let important = vec!["@bigco.com".to_string()];
        let result = ReasoningEngine::new(&no_feedback(), &important, None).classify(
            "x <y@notbigco.com>",
            "hello",
            "body",
            None,
        );

        assert_ne!(result.decision_method, "critical_sender_rule");
    }

    #[test]
    fn test_llm_tier_critical() {
        let result = ReasoningEngine::new(&no_feedback(), &[], None).classify(
            "a <a@b.com>",
            "deadline",
            "body",
            Some(&analysis(5, "action_required", true, 20)),
        );

        assert_eq!(result.priority, Priority::Critical);
        assert!((result.confidence - 0.90).abs() < 1e-6);
        assert_eq!(result.decision_method, "llm_with_rules");
    }

    #[test]
    fn test_llm_tier_high_on_action_request_with_response() {
        let result = ReasoningEngine::new(&no_feedback(), &[], None).classify(
            "a <a@b.com>",
            "question",
            "body",
            Some(&analysis(2, "question", true, 5)),
        );

        assert_eq!(result.priority, Priority::High);
        assert!((result.confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_llm_tier_medium_on_response_needed() {
        let result = ReasoningEngine::new(&no_feedback(), &[], None).classify(
            "a <a@b.com>",
            "fyi",
            "body",
            Some(&analysis(1, "personal", true, 2)),
        );

        assert_eq!(result.priority, Priority::Medium);
        assert!((result.confidence - 0.80).abs() < 1e-6);
    }

    #[test]
    fn test_llm_tier_low() {
        let result = ReasoningEngine::new(&no_feedback(), &[], None).classify(
            "a <a@b.com>",
            "spring collection",
            "body",
            Some(&analysis(1, "promotion", false, 1)),
        );

        assert_eq!(result.priority, Priority::Low);
        assert!((result.confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_high_keyword_bumps_low_tier() {
        // Configured high keyword in the subject lifts an otherwise-low email.
        let result = ReasoningEngine::new(&no_feedback(), &[], None).classify(
            "a <a@b.com>",
            "urgent: certificate expiring",
            "body",
            Some(&analysis(2, "information", false, 3)),
        );

        assert_eq!(result.priority, Priority::High);
        assert!((result.confidence - 0.80).abs() < 1e-6);
        assert!(result
            .explanation
            .iter()
            .any(|e| e.contains("high-priority keyword")));
    }

    #[test]
    fn test_low_keyword_downgrades_and_floors_confidence() {
        let result = ReasoningEngine::new(&no_feedback(), &[], None).classify(
            "newsletter <noreply@list.com>",
            "weekly digest",
            "body",
            Some(&analysis(1, "promotion", false, 1)),
        );

        assert_eq!(result.priority, Priority::Low);
        assert!(result.confidence >= 0.60);
        assert!((result.confidence - 0.70).abs() < 1e-6);
    }

    #[test]
    fn test_no_analysis_defaults_to_medium() {
        let result = ReasoningEngine::new(&no_feedback(), &[], None).classify(
            "a <a@b.com>",
            "hello",
            "body",
            None,
        );

        assert_eq!(result.priority, Priority::Medium);
        assert!((result.confidence - 0.50).abs() < 1e-6);
        assert_eq!(result.decision_method, "default_fallback");
    }

    #[test]
    fn test_ml_absent_records_unavailable_step() {
        let result = ReasoningEngine::new(&no_feedback(), &[], None).classify(
            "a <a@b.com>",
            "hello",
            "body",
            None,
        );

        let ml_step = result
            .chain
            .iter()
            .find(|s| s.step_type == StepKind::MlPrediction)
            .unwrap();
        assert_eq!(ml_step.description, "ML model not available");
    }

    #[test]
    fn test_confidence_always_in_unit_range() {
        for a in [
            Some(analysis(5, "action_required", true, 30)),
            Some(analysis(1, "promotion", false, 1)),
            None,
        ] {
            let result = ReasoningEngine::new(&no_feedback(), &[], None).classify(
                "a <a@b.com>",
                "subject",
                "body",
                a.as_ref(),
            );
            assert!((0.0..=1.0).contains(&result.confidence));
        }
    }

    #[test]
    fn test_autonomy_gate_thresholds() {
        let thresholds = ConfidenceThresholds::default();
        let result = ReasoningEngine::new(&no_feedback(), &[], None).classify(
            "a <a@b.com>",
            "deadline",
            "body",
            Some(&analysis(5, "action_required", true, 20)),
        );

        // 0.90: enough for label/priority/suggestion, not for archive.
        assert!(!result.authorizes(AutonomyAction::Archive, &thresholds));
        assert!(result.authorizes(AutonomyAction::Label, &thresholds));
        assert!(result.authorizes(AutonomyAction::PriorityAdjust, &thresholds));
        assert!(result.authorizes(AutonomyAction::Suggestion, &thresholds));
    }

    #[test]
    fn test_record_roundtrip() {
        let result = ReasoningEngine::new(&no_feedback(), &[], None).classify(
            "a <a@b.com>",
            "subject",
            "body",
            Some(&analysis(3, "information", false, 5)),
        );

        let record = result.to_record();
        let restored: ClassificationResult = serde_json::from_value(record).unwrap();
        assert_eq!(restored.priority, result.priority);
        assert_eq!(restored.chain.len(), result.chain.len());
    }

    #[test]
    fn test_purpose_matches_normalizes_variants() {
        assert!(purpose_matches("Action Request", &["action_request"]));
        assert!(purpose_matches("action_required", &["action_request"]));
        assert!(purpose_matches("meeting invite", &["meeting_invite"]));
        assert!(!purpose_matches("promotion", &["action_request"]));
    }
}
