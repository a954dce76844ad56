//! Single-text prediction pipeline.
//!
//! validate → (translate) → normalize → vectorize → classify → threshold
//! decision → confidence band.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::error::{Result, SentimentError};
use crate::model::{ClassProbabilities, Classifier, Coefficients, FeatureVectorizer, Label, SparseVector};
use crate::normalizer;
use crate::threshold::{check_threshold, ThresholdStore, DEFAULT_THRESHOLD};
use crate::translation::{TranslationGateway, TranslationStatus, AUTO_LANGUAGE, TARGET_LANGUAGE};

/// Loaded classifier + vectorizer pair, read-only after installation.
pub struct Models {
    classifier: Arc<dyn Classifier>,
    vectorizer: Arc<dyn FeatureVectorizer>,
    coefficients: Coefficients,
    model_path: Option<PathBuf>,
    vectorizer_path: Option<PathBuf>,
}

impl Models {
    /// Resolves the classifier's explanation capability once, up front.
    pub fn new(classifier: Arc<dyn Classifier>, vectorizer: Arc<dyn FeatureVectorizer>) -> Self {
        let coefficients = classifier.coefficients();
        Self {
            classifier,
            vectorizer,
            coefficients,
            model_path: None,
            vectorizer_path: None,
        }
    }

    pub fn with_paths(mut self, model_path: PathBuf, vectorizer_path: PathBuf) -> Self {
        self.model_path = Some(model_path);
        self.vectorizer_path = Some(vectorizer_path);
        self
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn vectorizer(&self) -> &dyn FeatureVectorizer {
        self.vectorizer.as_ref()
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coefficients
    }
}

impl std::fmt::Debug for Models {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Models")
            .field("classifier", &self.classifier.kind())
            .field("features", &self.vectorizer.feature_names().len())
            .field("coefficients", &self.coefficients.kind())
            .field("model_path", &self.model_path)
            .field("vectorizer_path", &self.vectorizer_path)
            .finish()
    }
}

/// Qualitative confidence derived from the selected probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ConfidenceBand {
    #[serde(rename = "Muy Alta")]
    VeryHigh,
    #[serde(rename = "Alta")]
    High,
    #[serde(rename = "Media")]
    Medium,
    #[serde(rename = "Baja")]
    Low,
}

impl ConfidenceBand {
    /// Lower bounds are inclusive: exactly 0.90 is `VeryHigh`.
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.90 {
            ConfidenceBand::VeryHigh
        } else if probability >= 0.75 {
            ConfidenceBand::High
        } else if probability >= 0.60 {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBand::VeryHigh => "Muy Alta",
            ConfidenceBand::High => "Alta",
            ConfidenceBand::Medium => "Media",
            ConfidenceBand::Low => "Baja",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub label: Label,
    /// Probability of the chosen label, rounded to 4 decimals.
    pub probability: f64,
    pub confidence_band: ConfidenceBand,
    pub original_text: String,
    /// Set only when translation was requested.
    pub detected_language: Option<String>,
    pub translation: Option<TranslationStatus>,
}

#[derive(Debug, Clone)]
pub struct PredictOptions {
    pub translate: bool,
    pub source_language: String,
    /// Threshold for this call only; the shared store is read when `None`.
    pub threshold: Option<f64>,
    /// Deadline for the translation step; the engine default applies when `None`.
    pub translation_timeout: Option<Duration>,
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self {
            translate: false,
            source_language: AUTO_LANGUAGE.to_string(),
            threshold: None,
            translation_timeout: None,
        }
    }
}

impl PredictOptions {
    /// Translate unless the caller says the text is already in the target language.
    pub fn for_language(language: &str) -> Self {
        let language = language.trim().to_lowercase();
        Self {
            translate: language != TARGET_LANGUAGE,
            source_language: language,
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: Option<f64>) -> Self {
        self.threshold = threshold;
        self
    }
}

/// Prediction plus the intermediate state explanations are built from.
pub(crate) struct Analysis {
    pub result: PredictionResult,
    pub features: SparseVector,
}

/// Report of what is loaded and how it is configured.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModelInfo {
    pub model_type: String,
    pub classes: Vec<String>,
    pub num_features: usize,
    pub threshold: f64,
    pub explanation_coefficients: String,
    pub model_path: Option<String>,
    pub vectorizer_path: Option<String>,
}

/// Applies the decision rule.
///
/// At exactly the midpoint the classifier's native label is used unmodified;
/// anywhere else the label is `Positive` iff `P(Positive) >= threshold`.
pub fn decide_label(native: Label, probabilities: &ClassProbabilities, threshold: f64) -> Label {
    if threshold == DEFAULT_THRESHOLD {
        native
    } else if probabilities.positive >= threshold {
        Label::Positive
    } else {
        Label::Negative
    }
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

pub struct SentimentEngine {
    models: OnceCell<Models>,
    gateway: TranslationGateway,
    threshold: Arc<ThresholdStore>,
    translation_timeout: Option<Duration>,
}

impl SentimentEngine {
    pub fn new(gateway: TranslationGateway, threshold: Arc<ThresholdStore>) -> Self {
        Self {
            models: OnceCell::new(),
            gateway,
            threshold,
            translation_timeout: None,
        }
    }

    pub fn with_translation_timeout(mut self, timeout: Duration) -> Self {
        self.translation_timeout = Some(timeout);
        self
    }

    /// Makes the engine ready to serve. Models can be installed only once.
    pub fn install(&self, models: Models) -> Result<()> {
        self.models
            .set(models)
            .map_err(|_| SentimentError::ModelLoad("Models are already installed".to_string()))
    }

    pub fn is_ready(&self) -> bool {
        self.models.get().is_some()
    }

    pub fn models(&self) -> Result<&Models> {
        self.models.get().ok_or(SentimentError::UninitializedEngine)
    }

    pub fn threshold_store(&self) -> &Arc<ThresholdStore> {
        &self.threshold
    }

    pub async fn predict(&self, text: &str, options: &PredictOptions) -> Result<PredictionResult> {
        let threshold = self.resolve_threshold(options)?;
        Ok(self.analyze(text, options, threshold).await?.result)
    }

    /// The per-call override if given, otherwise the store's current value.
    pub(crate) fn resolve_threshold(&self, options: &PredictOptions) -> Result<f64> {
        match options.threshold {
            Some(value) => check_threshold(value),
            None => Ok(self.threshold.get()),
        }
    }

    /// Runs the pipeline with an already-resolved threshold.
    pub(crate) async fn analyze(
        &self,
        text: &str,
        options: &PredictOptions,
        threshold: f64,
    ) -> Result<Analysis> {
        let models = self.models()?;
        normalizer::validate(text)?;

        let source = options.source_language.trim().to_lowercase();
        let (analyzed_text, detected_language, translation) = if !options.translate {
            (text.to_string(), None, None)
        } else if source == TARGET_LANGUAGE {
            (text.to_string(), Some(TARGET_LANGUAGE.to_string()), Some(TranslationStatus::NotNeeded))
        } else {
            let deadline = options.translation_timeout.or(self.translation_timeout);
            let outcome = self
                .gateway
                .translate_within(text, &source, TARGET_LANGUAGE, deadline)
                .await;
            if !outcome.succeeded() {
                tracing::warn!(
                    "Analyzing untranslated text: {}",
                    outcome.error.as_deref().unwrap_or("translation failed")
                );
            }
            (
                outcome.translated_text,
                Some(outcome.detected_language),
                Some(outcome.status),
            )
        };

        let cleaned = normalizer::normalize(&analyzed_text);
        let features = models.vectorizer().transform(&cleaned);
        if features.is_empty() {
            tracing::debug!("No vocabulary term in text, deciding on class priors");
        }
        let native = models.classifier().predict(&features);
        let probabilities = models.classifier().predict_proba(&features);

        let label = decide_label(native, &probabilities, threshold);
        let probability = probabilities.of(label);
        let confidence_band = ConfidenceBand::from_probability(probability);

        tracing::info!(
            "Prediction: {} ({:.4}, {})",
            label,
            probability,
            confidence_band.as_str()
        );

        Ok(Analysis {
            result: PredictionResult {
                label,
                probability: round4(probability),
                confidence_band,
                original_text: text.to_string(),
                detected_language,
                translation,
            },
            features,
        })
    }

    pub fn info(&self) -> Result<ModelInfo> {
        let models = self.models()?;
        Ok(ModelInfo {
            model_type: models.classifier().kind().to_string(),
            classes: models.classifier().classes(),
            num_features: models.vectorizer().feature_names().len(),
            threshold: self.threshold.get(),
            explanation_coefficients: models.coefficients().kind().to_string(),
            model_path: models.model_path.as_ref().map(|p| p.display().to_string()),
            vectorizer_path: models.vectorizer_path.as_ref().map(|p| p.display().to_string()),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::model::fakes::{FakeVectorizer, FixedClassifier};
    use crate::translation::{DisabledTranslator, TranslationService};

    pub const VOCABULARY: &[&str] = &["excelente", "hotel", "horrible", "sucio", "servicio"];

    pub fn engine_with(
        classifier: FixedClassifier,
        service: Arc<dyn TranslationService>,
    ) -> SentimentEngine {
        let engine = SentimentEngine::new(
            TranslationGateway::new(service),
            Arc::new(ThresholdStore::default()),
        );
        engine
            .install(Models::new(
                Arc::new(classifier),
                Arc::new(FakeVectorizer::new(VOCABULARY)),
            ))
            .unwrap();
        engine
    }

    pub fn fixed_engine(native: Label, positive: f64) -> SentimentEngine {
        engine_with(
            FixedClassifier::new(native, positive),
            Arc::new(DisabledTranslator),
        )
    }
}
