use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static RE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9']+").unwrap());

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "also", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him",
    "his", "how", "i", "if", "in", "into", "is", "it", "its", "just", "me", "more", "most",
    "my", "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other", "our",
    "ours", "out", "over", "own", "s", "same", "she", "should", "so", "some", "such", "t",
    "than", "that", "the", "their", "theirs", "them", "then", "there", "these", "they", "this",
    "those", "through", "to", "too", "under", "until", "up", "very", "was", "we", "were",
    "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with", "you",
    "your", "yours",
];

/// TF-IDF vectorizer over 1–2 grams with a document-frequency-capped
/// vocabulary, smooth idf, and l2-normalized rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    pub vocabulary: HashMap<String, usize>,
    pub idf: Vec<f64>,
    pub max_features: usize,
}

fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let tokens: Vec<String> = RE_TOKEN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .filter(|t| !ENGLISH_STOP_WORDS.contains(&t.as_str()))
        .collect();

    let mut grams = tokens.clone();
    for pair in tokens.windows(2) {
        grams.push(format!("{} {}", pair[0], pair[1]));
    }
    grams
}

impl TfidfVectorizer {
    pub fn fit(documents: &[String], max_features: usize) -> Self {
        let n_docs = documents.len();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in documents {
            let mut seen = std::collections::HashSet::new();
            for gram in tokenize(doc) {
                if seen.insert(gram.clone()) {
                    *doc_freq.entry(gram).or_insert(0) += 1;
                }
            }
        }

        // Highest document frequency first; lexicographic tie-break keeps the
        // vocabulary deterministic across fits.
        let mut terms: Vec<(String, usize)> = doc_freq.into_iter().collect();
        terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        terms.truncate(max_features);

        let mut vocabulary = HashMap::new();
        let mut idf = Vec::with_capacity(terms.len());
        for (index, (term, df)) in terms.into_iter().enumerate() {
            vocabulary.insert(term, index);
            idf.push((((1 + n_docs) as f64) / ((1 + df) as f64)).ln() + 1.0);
        }

        Self {
            vocabulary,
            idf,
            max_features,
        }
    }

    pub fn n_features(&self) -> usize {
        self.vocabulary.len()
    }

    /// Sparse (index, weight) representation of one document.
    pub fn transform(&self, document: &str) -> Vec<(usize, f64)> {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for gram in tokenize(document) {
            if let Some(&index) = self.vocabulary.get(&gram) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let mut row: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(index, tf)| (index, tf * self.idf[index]))
            .collect();

        let norm = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, w) in row.iter_mut() {
                *w /= norm;
            }
        }
        row.sort_by_key(|(index, _)| *index);
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fit_builds_bigrams_and_skips_stopwords() {
        let vectorizer = TfidfVectorizer::fit(
            &docs(&["urgent server outage", "the server outage continues"]),
            100,
        );

        assert!(vectorizer.vocabulary.contains_key("server"));
        assert!(vectorizer.vocabulary.contains_key("server outage"));
        assert!(!vectorizer.vocabulary.contains_key("the"));
    }

    #[test]
    fn test_vocabulary_cap_keeps_most_frequent() {
        let corpus = docs(&[
            "invoice payment due",
            "invoice payment received",
            "invoice overdue",
            "picnic saturday",
        ]);
        let vectorizer = TfidfVectorizer::fit(&corpus, 2);

        assert_eq!(vectorizer.n_features(), 2);
        assert!(vectorizer.vocabulary.contains_key("invoice"));
    }

    #[test]
    fn test_transform_is_l2_normalized() {
        let vectorizer = TfidfVectorizer::fit(&docs(&["alpha beta", "alpha gamma"]), 10);
        let row = vectorizer.transform("alpha beta beta");

        let norm: f64 = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_terms_produce_empty_row() {
        let vectorizer = TfidfVectorizer::fit(&docs(&["alpha beta"]), 10);
        assert!(vectorizer.transform("zeta eta").is_empty());
    }
}
