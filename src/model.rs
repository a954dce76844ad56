//! Inference contracts for the feature vectorizer and the classifier.
//!
//! The pipeline only relies on these traits. Concrete, artifact-backed
//! implementations live in `artifacts`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Binary sentiment label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Label {
    #[serde(rename = "Positivo")]
    Positive,
    #[serde(rename = "Negativo")]
    Negative,
}

impl Label {
    /// Maps a class name as stored in a model artifact to a label.
    pub fn from_class_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "positivo" | "positive" | "pos" | "1" => Some(Label::Positive),
            "negativo" | "negative" | "neg" | "0" => Some(Label::Negative),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Positive => "Positivo",
            Label::Negative => "Negativo",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sparse feature weights over a fixed vocabulary.
///
/// Entries are kept sorted by feature index, ascending, with no zero weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(usize, f64)>,
}

impl SparseVector {
    pub fn from_entries(mut entries: Vec<(usize, f64)>) -> Self {
        entries.retain(|(_, weight)| *weight != 0.0);
        entries.sort_by_key(|(index, _)| *index);
        Self { entries }
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dot product with a dense weight row.
    pub fn dot(&self, dense: &[f64]) -> f64 {
        self.entries
            .iter()
            .map(|(index, weight)| weight * dense.get(*index).copied().unwrap_or(0.0))
            .sum()
    }
}

/// Per-class probabilities. `positive + negative == 1` within float tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProbabilities {
    pub positive: f64,
    pub negative: f64,
}

impl ClassProbabilities {
    /// Builds the pair from the positive-class probability.
    pub fn from_positive(positive: f64) -> Self {
        let positive = positive.clamp(0.0, 1.0);
        Self {
            positive,
            negative: 1.0 - positive,
        }
    }

    pub fn of(&self, label: Label) -> f64 {
        match label {
            Label::Positive => self.positive,
            Label::Negative => self.negative,
        }
    }
}

/// Per-feature weights a classifier can offer for explanations.
///
/// Resolved once when the models are installed, never rechecked per call.
#[derive(Debug, Clone, PartialEq)]
pub enum Coefficients {
    /// Positive-class minus negative-class log-likelihood per feature (Naive Bayes).
    LogProbDiff(Vec<f64>),
    /// Signed linear weights per feature (logistic regression and friends).
    Linear(Vec<f64>),
    /// The classifier exposes no per-feature weights.
    Unavailable,
}

impl Coefficients {
    pub fn weights(&self) -> Option<&[f64]> {
        match self {
            Coefficients::LogProbDiff(w) | Coefficients::Linear(w) => Some(w),
            Coefficients::Unavailable => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Coefficients::LogProbDiff(_) => "log_prob_diff",
            Coefficients::Linear(_) => "linear",
            Coefficients::Unavailable => "unavailable",
        }
    }
}

/// Turns cleaned text into a sparse feature vector.
pub trait FeatureVectorizer: Send + Sync {
    fn transform(&self, text: &str) -> SparseVector;

    /// Vocabulary tokens, index-aligned with vector positions.
    fn feature_names(&self) -> &[String];
}

/// Binary classifier over sparse feature vectors.
///
/// Implementations must be pure functions of their input so a single loaded
/// instance can serve concurrent predictions without locking.
pub trait Classifier: Send + Sync {
    /// The classifier's own label at its internal (default) threshold.
    fn predict(&self, features: &SparseVector) -> Label;

    fn predict_proba(&self, features: &SparseVector) -> ClassProbabilities;

    /// Short model family name for reporting, e.g. `"MultinomialNB"`.
    fn kind(&self) -> &str;

    /// Class names in the classifier's own order.
    fn classes(&self) -> Vec<String> {
        vec![Label::Negative.to_string(), Label::Positive.to_string()]
    }

    /// Number of input features the classifier was trained on.
    fn n_features(&self) -> Option<usize> {
        None
    }

    fn log_prob_diff(&self) -> Option<Vec<f64>> {
        None
    }

    fn linear_coefficients(&self) -> Option<Vec<f64>> {
        None
    }

    /// Prefers log-probability differences over linear weights.
    fn coefficients(&self) -> Coefficients {
        if let Some(diff) = self.log_prob_diff() {
            Coefficients::LogProbDiff(diff)
        } else if let Some(coef) = self.linear_coefficients() {
            Coefficients::Linear(coef)
        } else {
            Coefficients::Unavailable
        }
    }
}
