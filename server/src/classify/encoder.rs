use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const INFREQUENT_CATEGORY: &str = "__infrequent__";

/// One-hot encoder with rare-category folding: categories seen in fewer than
/// `min_frequency` of the training rows collapse into one bucket. Unknown
/// categories at transform time encode to all zeros.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    pub categories: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    pub has_infrequent: bool,
}

impl OneHotEncoder {
    pub fn fit(values: &[String], min_frequency: f64) -> Self {
        let n = values.len().max(1) as f64;
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for value in values {
            *counts.entry(value.as_str()).or_insert(0) += 1;
        }

        let mut frequent: Vec<String> = counts
            .iter()
            .filter(|(_, &count)| count as f64 / n >= min_frequency)
            .map(|(value, _)| value.to_string())
            .collect();
        frequent.sort();

        let has_infrequent = frequent.len() < counts.len();
        let mut categories = frequent;
        if has_infrequent {
            categories.push(INFREQUENT_CATEGORY.to_string());
        }

        let mut encoder = Self {
            categories,
            index: HashMap::new(),
            has_infrequent,
        };
        encoder.rebuild_index();
        encoder
    }

    /// The serde skip above drops the derived index; callers deserializing an
    /// artifact must rebuild it before use.
    pub fn rebuild_index(&mut self) {
        self.index = self
            .categories
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
    }

    pub fn width(&self) -> usize {
        self.categories.len()
    }

    pub fn transform(&self, value: &str) -> Option<usize> {
        if let Some(&index) = self.index.get(value) {
            return Some(index);
        }
        if self.has_infrequent {
            return self.index.get(INFREQUENT_CATEGORY).copied();
        }
        None
    }
}

/// Maps class labels to dense indices and back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelEncoder {
    pub classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit(labels: &[String]) -> Self {
        let mut classes: Vec<String> = labels.to_vec();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn transform(&self, label: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == label)
    }

    pub fn inverse_transform(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(|s| s.as_str())
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rare_categories_fold() {
        // "x.org" appears once in 10 rows; below a 20% floor it folds.
        let mut data = values(&["acme.com"; 5]);
        data.extend(values(&["big.co"; 4]));
        data.push("x.org".to_string());

        let encoder = OneHotEncoder::fit(&data, 0.2);
        assert!(encoder.has_infrequent);
        assert_eq!(
            encoder.transform("x.org"),
            encoder.transform("never-seen.net")
        );
        assert_ne!(encoder.transform("acme.com"), encoder.transform("x.org"));
    }

    #[test]
    fn test_unknown_without_infrequent_bucket_is_none() {
        let encoder = OneHotEncoder::fit(&values(&["a", "a", "b", "b"]), 0.1);
        assert!(!encoder.has_infrequent);
        assert_eq!(encoder.transform("c"), None);
    }

    #[test]
    fn test_label_encoder_roundtrip() {
        let encoder = LabelEncoder::fit(&values(&["HIGH", "LOW", "HIGH", "MEDIUM"]));
        assert_eq!(encoder.n_classes(), 3);

        let index = encoder.transform("MEDIUM").unwrap();
        assert_eq!(encoder.inverse_transform(index), Some("MEDIUM"));
        assert_eq!(encoder.transform("CRITICAL"), None);
    }
}
