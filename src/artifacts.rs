//! JSON-backed model artifacts: a TF-IDF vectorizer and two linear-family
//! classifiers (Multinomial Naive Bayes, Logistic Regression).
//!
//! The artifacts are plain exports of fitted scikit-learn estimators, so
//! inference here reproduces `transform`, `predict` and `predict_proba` of
//! the originals.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::engine::Models;
use crate::error::{Result, SentimentError};
use crate::model::{ClassProbabilities, Classifier, FeatureVectorizer, Label, SparseVector};

// scikit-learn's default token_pattern: words of two or more characters
static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("token pattern is valid"));

// ============================================================================
// Vectorizer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L1,
    L2,
}

#[derive(Debug, Deserialize)]
struct VectorizerArtifact {
    vocabulary: Vec<String>,
    #[serde(default)]
    idf: Option<Vec<f64>>,
    #[serde(default = "default_ngram_range")]
    ngram_range: (usize, usize),
    #[serde(default)]
    sublinear_tf: bool,
    #[serde(default = "default_norm")]
    norm: Option<Norm>,
    #[serde(default = "default_lowercase")]
    lowercase: bool,
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_norm() -> Option<Norm> {
    Some(Norm::L2)
}

fn default_lowercase() -> bool {
    true
}

/// TF-IDF bag-of-words vectorizer over a fixed vocabulary.
#[derive(Debug)]
pub struct TfidfVectorizer {
    names: Vec<String>,
    index: HashMap<String, usize>,
    idf: Option<Vec<f64>>,
    ngram_range: (usize, usize),
    sublinear_tf: bool,
    norm: Option<Norm>,
    lowercase: bool,
}

impl TfidfVectorizer {
    fn from_artifact(artifact: VectorizerArtifact) -> Result<Self> {
        let (min_n, max_n) = artifact.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(SentimentError::ModelLoad(format!(
                "Invalid ngram_range ({}, {})",
                min_n, max_n
            )));
        }

        if let Some(idf) = &artifact.idf {
            if idf.len() != artifact.vocabulary.len() {
                return Err(SentimentError::ModelLoad(format!(
                    "idf has {} entries but vocabulary has {}",
                    idf.len(),
                    artifact.vocabulary.len()
                )));
            }
        }

        let mut index = HashMap::with_capacity(artifact.vocabulary.len());
        for (i, token) in artifact.vocabulary.iter().enumerate() {
            if index.insert(token.clone(), i).is_some() {
                return Err(SentimentError::ModelLoad(format!(
                    "Duplicate vocabulary token: {}",
                    token
                )));
            }
        }

        Ok(Self {
            names: artifact.vocabulary,
            index,
            idf: artifact.idf,
            ngram_range: artifact.ngram_range,
            sublinear_tf: artifact.sublinear_tf,
            norm: artifact.norm,
            lowercase: artifact.lowercase,
        })
    }

    fn terms(&self, text: &str) -> Vec<String> {
        let text = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        let tokens: Vec<&str> = TOKEN_PATTERN.find_iter(&text).map(|m| m.as_str()).collect();

        let (min_n, max_n) = self.ngram_range;
        let mut terms = Vec::new();
        for n in min_n..=max_n {
            if n > tokens.len() {
                break;
            }
            terms.extend(tokens.windows(n).map(|window| window.join(" ")));
        }
        terms
    }
}

impl FeatureVectorizer for TfidfVectorizer {
    fn transform(&self, text: &str) -> SparseVector {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for term in self.terms(text) {
            if let Some(&i) = self.index.get(&term) {
                *counts.entry(i).or_insert(0.0) += 1.0;
            }
        }

        let mut entries: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(i, tf)| {
                let tf = if self.sublinear_tf { 1.0 + tf.ln() } else { tf };
                let idf = self.idf.as_ref().map_or(1.0, |idf| idf[i]);
                (i, tf * idf)
            })
            .collect();

        let scale = match self.norm {
            Some(Norm::L2) => entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt(),
            Some(Norm::L1) => entries.iter().map(|(_, w)| w.abs()).sum::<f64>(),
            None => 1.0,
        };
        if scale > 0.0 {
            for (_, w) in entries.iter_mut() {
                *w /= scale;
            }
        }

        SparseVector::from_entries(entries)
    }

    fn feature_names(&self) -> &[String] {
        &self.names
    }
}

// ============================================================================
// Classifiers
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ClassifierArtifact {
    MultinomialNb {
        classes: Vec<String>,
        class_log_prior: Vec<f64>,
        feature_log_prob: Vec<Vec<f64>>,
    },
    LogisticRegression {
        classes: Vec<String>,
        coef: Vec<f64>,
        #[serde(default)]
        intercept: f64,
    },
}

/// Resolves the two class names to labels, requiring one of each.
fn resolve_classes(classes: &[String]) -> Result<[Label; 2]> {
    if classes.len() != 2 {
        return Err(SentimentError::ModelLoad(format!(
            "Expected exactly 2 classes, found {}",
            classes.len()
        )));
    }

    let mut labels = [Label::Negative; 2];
    for (slot, name) in labels.iter_mut().zip(classes) {
        *slot = Label::from_class_name(name).ok_or_else(|| {
            SentimentError::ModelLoad(format!("Unknown class label: {}", name))
        })?;
    }

    if labels[0] == labels[1] {
        return Err(SentimentError::ModelLoad(
            "Classes must contain one positive and one negative label".to_string(),
        ));
    }
    Ok(labels)
}

/// Multinomial Naive Bayes over TF-IDF weights.
#[derive(Debug)]
pub struct NaiveBayesClassifier {
    classes: Vec<String>,
    labels: [Label; 2],
    class_log_prior: Vec<f64>,
    feature_log_prob: Vec<Vec<f64>>,
}

impl NaiveBayesClassifier {
    fn new(
        classes: Vec<String>,
        class_log_prior: Vec<f64>,
        feature_log_prob: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let labels = resolve_classes(&classes)?;
        if class_log_prior.len() != 2 || feature_log_prob.len() != 2 {
            return Err(SentimentError::ModelLoad(
                "Naive Bayes priors and log probabilities need one row per class".to_string(),
            ));
        }
        if feature_log_prob[0].len() != feature_log_prob[1].len() {
            return Err(SentimentError::ModelLoad(
                "Naive Bayes log probability rows differ in length".to_string(),
            ));
        }
        Ok(Self {
            classes,
            labels,
            class_log_prior,
            feature_log_prob,
        })
    }

    fn joint_log_likelihood(&self, features: &SparseVector) -> [f64; 2] {
        [
            self.class_log_prior[0] + features.dot(&self.feature_log_prob[0]),
            self.class_log_prior[1] + features.dot(&self.feature_log_prob[1]),
        ]
    }

    fn row_of(&self, label: Label) -> usize {
        if self.labels[0] == label {
            0
        } else {
            1
        }
    }
}

impl Classifier for NaiveBayesClassifier {
    fn predict(&self, features: &SparseVector) -> Label {
        let jll = self.joint_log_likelihood(features);
        // argmax, first class wins ties
        if jll[1] > jll[0] {
            self.labels[1]
        } else {
            self.labels[0]
        }
    }

    fn predict_proba(&self, features: &SparseVector) -> ClassProbabilities {
        let jll = self.joint_log_likelihood(features);
        let pos = self.row_of(Label::Positive);
        let neg = self.row_of(Label::Negative);
        ClassProbabilities::from_positive(1.0 / (1.0 + (jll[neg] - jll[pos]).exp()))
    }

    fn kind(&self) -> &str {
        "MultinomialNB"
    }

    fn classes(&self) -> Vec<String> {
        self.classes.clone()
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.feature_log_prob[0].len())
    }

    fn log_prob_diff(&self) -> Option<Vec<f64>> {
        let pos = &self.feature_log_prob[self.row_of(Label::Positive)];
        let neg = &self.feature_log_prob[self.row_of(Label::Negative)];
        Some(pos.iter().zip(neg).map(|(p, n)| p - n).collect())
    }
}

/// Binary logistic regression. `coef` points towards `classes[1]`.
#[derive(Debug)]
pub struct LogisticRegressionClassifier {
    classes: Vec<String>,
    labels: [Label; 2],
    coef: Vec<f64>,
    intercept: f64,
}

impl LogisticRegressionClassifier {
    fn new(classes: Vec<String>, coef: Vec<f64>, intercept: f64) -> Result<Self> {
        let labels = resolve_classes(&classes)?;
        Ok(Self {
            classes,
            labels,
            coef,
            intercept,
        })
    }

    fn decision(&self, features: &SparseVector) -> f64 {
        features.dot(&self.coef) + self.intercept
    }
}

impl Classifier for LogisticRegressionClassifier {
    fn predict(&self, features: &SparseVector) -> Label {
        if self.decision(features) > 0.0 {
            self.labels[1]
        } else {
            self.labels[0]
        }
    }

    fn predict_proba(&self, features: &SparseVector) -> ClassProbabilities {
        let p_second = 1.0 / (1.0 + (-self.decision(features)).exp());
        let positive = if self.labels[1] == Label::Positive {
            p_second
        } else {
            1.0 - p_second
        };
        ClassProbabilities::from_positive(positive)
    }

    fn kind(&self) -> &str {
        "LogisticRegression"
    }

    fn classes(&self) -> Vec<String> {
        self.classes.clone()
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.coef.len())
    }

    fn linear_coefficients(&self) -> Option<Vec<f64>> {
        // oriented so that a positive weight pushes towards the positive class
        if self.labels[1] == Label::Positive {
            Some(self.coef.clone())
        } else {
            Some(self.coef.iter().map(|c| -c).collect())
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

pub fn parse_vectorizer(json: &str) -> Result<TfidfVectorizer> {
    let artifact: VectorizerArtifact = serde_json::from_str(json)?;
    TfidfVectorizer::from_artifact(artifact)
}

pub fn parse_classifier(json: &str) -> Result<Box<dyn Classifier>> {
    let artifact: ClassifierArtifact = serde_json::from_str(json)?;
    let classifier: Box<dyn Classifier> = match artifact {
        ClassifierArtifact::MultinomialNb {
            classes,
            class_log_prior,
            feature_log_prob,
        } => Box::new(NaiveBayesClassifier::new(
            classes,
            class_log_prior,
            feature_log_prob,
        )?),
        ClassifierArtifact::LogisticRegression {
            classes,
            coef,
            intercept,
        } => Box::new(LogisticRegressionClassifier::new(classes, coef, intercept)?),
    };
    Ok(classifier)
}

fn read_artifact(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        SentimentError::ModelLoad(format!("Cannot read {}: {}", path.display(), e))
    })
}

/// Loads both artifacts and checks that they agree on the feature space.
pub fn load_models(model_path: &Path, vectorizer_path: &Path) -> Result<Models> {
    let classifier = parse_classifier(&read_artifact(model_path)?)?;
    tracing::info!("Classifier loaded from {}", model_path.display());

    let vectorizer = parse_vectorizer(&read_artifact(vectorizer_path)?)?;
    tracing::info!("Vectorizer loaded from {}", vectorizer_path.display());

    let vocabulary_size = vectorizer.feature_names().len();
    if let Some(n_features) = classifier.n_features() {
        if n_features != vocabulary_size {
            return Err(SentimentError::ModelLoad(format!(
                "Classifier expects {} features but vectorizer vocabulary has {}",
                n_features, vocabulary_size
            )));
        }
    }

    Ok(Models::new(Arc::from(classifier), Arc::new(vectorizer))
        .with_paths(model_path.to_path_buf(), vectorizer_path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coefficients;

    const VECTORIZER: &str = r#"{
        "vocabulary": ["excelente", "hotel", "malo", "muy"],
        "idf": [2.0, 1.0, 2.0, 1.0],
        "ngram_range": [1, 1],
        "norm": "l2"
    }"#;

    const NAIVE_BAYES: &str = r#"{
        "kind": "multinomial_nb",
        "classes": ["Negativo", "Positivo"],
        "class_log_prior": [-0.6931471805599453, -0.6931471805599453],
        "feature_log_prob": [
            [-3.0, -1.5, -0.5, -1.5],
            [-0.5, -1.5, -3.0, -1.5]
        ]
    }"#;

    #[test]
    fn test_tfidf_transform_l2_normalized() {
        let vectorizer = parse_vectorizer(VECTORIZER).unwrap();
        let v = vectorizer.transform("hotel excelente excelente desconocido");
        // counts: excelente=2 (idf 2) -> 4, hotel=1 (idf 1) -> 1; norm sqrt(17)
        let norm = 17f64.sqrt();
        assert_eq!(v.entries().len(), 2);
        assert_eq!(v.entries()[0].0, 0);
        assert!((v.entries()[0].1 - 4.0 / norm).abs() < 1e-12);
        assert_eq!(v.entries()[1].0, 1);
        assert!((v.entries()[1].1 - 1.0 / norm).abs() < 1e-12);
    }

    #[test]
    fn test_tfidf_ignores_single_character_tokens() {
        let vectorizer = parse_vectorizer(r#"{"vocabulary": ["a", "muy"], "norm": null}"#).unwrap();
        let v = vectorizer.transform("a muy a");
        assert_eq!(v.entries(), &[(1, 1.0)]);
    }

    #[test]
    fn test_tfidf_bigrams_and_sublinear() {
        let vectorizer = parse_vectorizer(
            r#"{"vocabulary": ["muy", "muy malo"], "ngram_range": [1, 2], "sublinear_tf": true, "norm": null}"#,
        )
        .unwrap();
        let v = vectorizer.transform("muy malo muy");
        assert_eq!(v.entries()[0], (0, 1.0 + 2f64.ln()));
        assert_eq!(v.entries()[1], (1, 1.0));
    }

    #[test]
    fn test_tfidf_empty_text() {
        let vectorizer = parse_vectorizer(VECTORIZER).unwrap();
        assert!(vectorizer.transform("").is_empty());
    }

    #[test]
    fn test_vectorizer_rejects_mismatched_idf() {
        let err = parse_vectorizer(r#"{"vocabulary": ["a"], "idf": [1.0, 2.0]}"#).unwrap_err();
        assert!(matches!(err, SentimentError::ModelLoad(_)));
    }

    #[test]
    fn test_naive_bayes_prediction() {
        let vectorizer = parse_vectorizer(VECTORIZER).unwrap();
        let classifier = parse_classifier(NAIVE_BAYES).unwrap();

        let positive = vectorizer.transform("hotel excelente");
        assert_eq!(classifier.predict(&positive), Label::Positive);
        let p = classifier.predict_proba(&positive);
        assert!(p.positive > 0.5);
        assert!((p.positive + p.negative - 1.0).abs() < 1e-12);

        let negative = vectorizer.transform("muy malo");
        assert_eq!(classifier.predict(&negative), Label::Negative);
        assert!(classifier.predict_proba(&negative).negative > 0.5);
    }

    #[test]
    fn test_naive_bayes_tie_goes_to_first_class() {
        let classifier = parse_classifier(NAIVE_BAYES).unwrap();
        let empty = SparseVector::default();
        assert_eq!(classifier.predict(&empty), Label::Negative);
        assert!((classifier.predict_proba(&empty).positive - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_naive_bayes_log_prob_diff() {
        let classifier = parse_classifier(NAIVE_BAYES).unwrap();
        assert_eq!(
            classifier.coefficients(),
            Coefficients::LogProbDiff(vec![2.5, 0.0, -2.5, 0.0])
        );
        assert_eq!(classifier.kind(), "MultinomialNB");
        assert_eq!(classifier.n_features(), Some(4));
    }

    #[test]
    fn test_logistic_regression_orientation() {
        let classifier = parse_classifier(
            r#"{"kind": "logistic_regression", "classes": ["Positivo", "Negativo"], "coef": [1.0, -2.0], "intercept": 0.0}"#,
        )
        .unwrap();
        // coef points towards "Negativo" here, so feature 0 pushes negative
        let x = SparseVector::from_entries(vec![(0, 1.0)]);
        assert_eq!(classifier.predict(&x), Label::Negative);
        assert!(classifier.predict_proba(&x).negative > 0.5);
        assert_eq!(classifier.coefficients(), Coefficients::Linear(vec![-1.0, 2.0]));
    }

    #[test]
    fn test_logistic_regression_zero_decision_is_first_class() {
        let classifier = parse_classifier(
            r#"{"kind": "logistic_regression", "classes": ["Negativo", "Positivo"], "coef": [1.0]}"#,
        )
        .unwrap();
        let empty = SparseVector::default();
        assert_eq!(classifier.predict(&empty), Label::Negative);
        assert!((classifier.predict_proba(&empty).positive - 0.5).abs() < 1e-12);
    }

    fn classifier_error(json: &str) -> SentimentError {
        match parse_classifier(json) {
            Ok(classifier) => panic!("{} classifier was accepted", classifier.kind()),
            Err(err) => err,
        }
    }

    #[test]
    fn test_classifier_rejects_unknown_classes() {
        let err = classifier_error(
            r#"{"kind": "logistic_regression", "classes": ["Neutral", "Positivo"], "coef": [1.0]}"#,
        );
        assert!(err.to_string().contains("Unknown class label"));

        let err = classifier_error(
            r#"{"kind": "logistic_regression", "classes": ["Positivo", "positive"], "coef": [1.0]}"#,
        );
        assert!(matches!(err, SentimentError::ModelLoad(_)));
    }

    #[test]
    fn test_unknown_kind_is_json_error() {
        let err = classifier_error(r#"{"kind": "random_forest", "classes": []}"#);
        assert!(matches!(err, SentimentError::Json(_)));
    }

    #[test]
    fn test_load_models_missing_file() {
        let err = load_models(
            Path::new("/nonexistent/classifier.json"),
            Path::new("/nonexistent/vectorizer.json"),
        )
        .unwrap_err();
        assert!(matches!(err, SentimentError::ModelLoad(_)));
    }

    #[test]
    fn test_load_shipped_demo_models() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let models = load_models(
            &root.join("models/classifier.json"),
            &root.join("models/vectorizer.json"),
        )
        .unwrap();
        assert_eq!(models.classifier().kind(), "MultinomialNB");
        assert!(format!("{:?}", models).contains("MultinomialNB"));
        assert!(models.coefficients().weights().is_some());
    }
}
