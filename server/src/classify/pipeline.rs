use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::{
    features::EmailFeatures, FitConfig, LabelEncoder, LogisticRegression, OneHotEncoder,
    TfidfVectorizer,
};

const TFIDF_MAX_FEATURES: usize = 1000;
const ONEHOT_MIN_FREQUENCY: f64 = 0.01;

/// One assembled training example, built from a feedback row joined with its
/// message.
#[derive(Debug, Clone)]
pub struct TrainingRow {
    pub features: EmailFeatures,
    pub corrected_priority: String,
}

/// Column layout: [tfidf terms][purpose one-hot][domain one-hot][urgency].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturePipeline {
    pub tfidf: TfidfVectorizer,
    pub purpose_encoder: OneHotEncoder,
    pub domain_encoder: OneHotEncoder,
}

impl FeaturePipeline {
    pub fn fit(rows: &[TrainingRow]) -> Self {
        let texts: Vec<String> = rows
            .iter()
            .map(|r| r.features.text_features.clone())
            .collect();
        let purposes: Vec<String> = rows.iter().map(|r| r.features.llm_purpose.clone()).collect();
        let domains: Vec<String> = rows
            .iter()
            .map(|r| r.features.sender_domain.clone())
            .collect();

        Self {
            tfidf: TfidfVectorizer::fit(&texts, TFIDF_MAX_FEATURES),
            purpose_encoder: OneHotEncoder::fit(&purposes, ONEHOT_MIN_FREQUENCY),
            domain_encoder: OneHotEncoder::fit(&domains, ONEHOT_MIN_FREQUENCY),
        }
    }

    pub fn n_features(&self) -> usize {
        self.tfidf.n_features() + self.purpose_encoder.width() + self.domain_encoder.width() + 1
    }

    pub fn transform(&self, features: &EmailFeatures) -> Vec<(usize, f64)> {
        let mut row = self.tfidf.transform(&features.text_features);

        let purpose_base = self.tfidf.n_features();
        if let Some(index) = self.purpose_encoder.transform(&features.llm_purpose) {
            row.push((purpose_base + index, 1.0));
        }

        let domain_base = purpose_base + self.purpose_encoder.width();
        if let Some(index) = self.domain_encoder.transform(&features.sender_domain) {
            row.push((domain_base + index, 1.0));
        }

        // Urgency scaled into the same range as the normalized text block.
        let urgency_index = domain_base + self.domain_encoder.width();
        row.push((urgency_index, features.llm_urgency / 5.0));

        row
    }
}

/// The serialized artifact pair: the feature pipeline plus classifier in one
/// blob, the label encoder in the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedPipeline {
    pub pipeline: FeaturePipeline,
    pub classifier: LogisticRegression,
}

#[derive(Debug, Clone)]
pub struct PriorityModel {
    pub trained: TrainedPipeline,
    pub label_encoder: LabelEncoder,
}

impl PriorityModel {
    /// Fits the full pipeline. CPU-bound; run it on a blocking thread.
    pub fn train(rows: &[TrainingRow]) -> anyhow::Result<PriorityModel> {
        anyhow::ensure!(!rows.is_empty(), "Training data is empty");

        let labels: Vec<String> = rows.iter().map(|r| r.corrected_priority.clone()).collect();
        let label_encoder = LabelEncoder::fit(&labels);
        anyhow::ensure!(
            label_encoder.n_classes() >= 2,
            "Training data must contain at least two priority classes"
        );

        let pipeline = FeaturePipeline::fit(rows);

        let x: Vec<Vec<(usize, f64)>> = rows
            .iter()
            .map(|r| pipeline.transform(&r.features))
            .collect();
        let y: Vec<usize> = rows
            .iter()
            .map(|r| {
                label_encoder
                    .transform(&r.corrected_priority)
                    .context("Label missing from encoder")
            })
            .collect::<anyhow::Result<_>>()?;

        let classifier = LogisticRegression::fit(
            &x,
            &y,
            label_encoder.n_classes(),
            pipeline.n_features(),
            FitConfig::default(),
        );

        Ok(PriorityModel {
            trained: TrainedPipeline {
                pipeline,
                classifier,
            },
            label_encoder,
        })
    }

    /// Predicted priority label with the model's own confidence (normalized
    /// one-vs-rest probability).
    pub fn predict(&self, features: &EmailFeatures) -> Option<(String, f32)> {
        let row = self.trained.pipeline.transform(features);
        let (class, probability) = self.trained.classifier.predict(&row);
        let label = self.label_encoder.inverse_transform(class)?;
        Some((label.to_string(), probability as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(text: &str, purpose: &str, domain: &str, urgency: i32, label: &str) -> TrainingRow {
        TrainingRow {
            features: EmailFeatures {
                text_features: text.to_string(),
                llm_purpose: purpose.to_string(),
                sender_domain: domain.to_string(),
                llm_urgency: urgency as f64,
            },
            corrected_priority: label.to_string(),
        }
    }

    fn sample_rows() -> Vec<TrainingRow> {
        vec![
            row("server down production outage", "alert", "acme.com", 5, "CRITICAL"),
            row("outage incident server crashed", "alert", "acme.com", 5, "CRITICAL"),
            row("production incident needs attention", "action_required", "acme.com", 4, "CRITICAL"),
            row("weekly newsletter deals discounts", "promotion", "shop.com", 1, "LOW"),
            row("sale discount newsletter offers", "promotion", "shop.com", 1, "LOW"),
            row("newsletter weekly digest deals", "promotion", "news.org", 1, "LOW"),
        ]
    }

    #[test]
    fn test_train_and_predict_separable_data() {
        let model = PriorityModel::train(&sample_rows()).unwrap();

        let (label, confidence) = model
            .predict(&EmailFeatures {
                text_features: "urgent production server outage".to_string(),
                llm_purpose: "alert".to_string(),
                sender_domain: "acme.com".to_string(),
                llm_urgency: 5.0,
            })
            .unwrap();
        assert_eq!(label, "CRITICAL");
        assert!(confidence > 0.5);

        let (label, _) = model
            .predict(&EmailFeatures {
                text_features: "newsletter discount deals".to_string(),
                llm_purpose: "promotion".to_string(),
                sender_domain: "shop.com".to_string(),
                llm_urgency: 1.0,
            })
            .unwrap();
        assert_eq!(label, "LOW");
    }

    #[test]
    fn test_single_class_data_is_rejected() {
        let rows = vec![
            row("one", "alert", "a.com", 3, "HIGH"),
            row("two", "alert", "a.com", 3, "HIGH"),
        ];
        assert!(PriorityModel::train(&rows).is_err());
    }

    #[test]
    fn test_artifact_serde_roundtrip() {
        let model = PriorityModel::train(&sample_rows()).unwrap();

        let pipeline_json = serde_json::to_vec(&model.trained).unwrap();
        let encoder_json = serde_json::to_vec(&model.label_encoder).unwrap();

        let mut trained: TrainedPipeline = serde_json::from_slice(&pipeline_json).unwrap();
        trained.pipeline.purpose_encoder.rebuild_index();
        trained.pipeline.domain_encoder.rebuild_index();
        let label_encoder: LabelEncoder = serde_json::from_slice(&encoder_json).unwrap();

        let restored = PriorityModel {
            trained,
            label_encoder,
        };

        let features = EmailFeatures {
            text_features: "server outage".to_string(),
            llm_purpose: "alert".to_string(),
            sender_domain: "acme.com".to_string(),
            llm_urgency: 5.0,
        };
        assert_eq!(
            model.predict(&features).unwrap().0,
            restored.predict(&features).unwrap().0
        );
    }
}
