//! Per-token explanations of a prediction.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::engine::{round4, PredictOptions, PredictionResult, SentimentEngine};
use crate::error::{Result, SentimentError};
use crate::model::{Coefficients, Label, SparseVector};

pub const MAX_TOP_N: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct TokenContribution {
    pub token: String,
    /// `|coefficient * feature weight|`, rounded to 4 decimals.
    pub contribution_score: f64,
    /// Sign of the coefficient; zero counts as negative.
    pub polarity: Label,
}

#[derive(Debug, Clone)]
pub struct ExplanationResult {
    pub prediction: PredictionResult,
    /// Descending by score, ties in vocabulary order.
    pub contributions: Vec<TokenContribution>,
    pub top_tokens: Vec<String>,
    /// Which coefficients produced the ranking (`unavailable` means an empty ranking).
    pub coefficient_source: String,
}

impl ExplanationResult {
    pub fn tokens_with(&self, polarity: Label) -> Vec<&TokenContribution> {
        self.contributions
            .iter()
            .filter(|c| c.polarity == polarity)
            .collect()
    }
}

pub fn check_top_n(top_n: usize) -> Result<usize> {
    if (1..=MAX_TOP_N).contains(&top_n) {
        Ok(top_n)
    } else {
        Err(SentimentError::validation(format!(
            "top_n must be between 1 and {}, got {}",
            MAX_TOP_N, top_n
        )))
    }
}

/// Scores every present feature and keeps the `top_n` strongest.
pub fn rank_contributions(
    features: &SparseVector,
    coefficients: &Coefficients,
    feature_names: &[String],
    top_n: usize,
) -> Vec<TokenContribution> {
    let weights = match coefficients.weights() {
        Some(weights) => weights,
        None => return Vec::new(),
    };

    // entries come index-ascending; the stable sort below keeps that order for ties
    let mut ranked: Vec<TokenContribution> = features
        .entries()
        .iter()
        .filter_map(|&(index, weight)| {
            let coefficient = *weights.get(index)?;
            let token = feature_names.get(index)?;
            Some(TokenContribution {
                token: token.clone(),
                contribution_score: round4((coefficient * weight).abs()),
                polarity: if coefficient > 0.0 {
                    Label::Positive
                } else {
                    Label::Negative
                },
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.contribution_score
            .partial_cmp(&a.contribution_score)
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(top_n);
    ranked
}

pub struct ExplanationEngine {
    engine: Arc<SentimentEngine>,
}

impl ExplanationEngine {
    pub fn new(engine: Arc<SentimentEngine>) -> Self {
        Self { engine }
    }

    /// Predicts, then ranks the tokens of the exact text that was classified.
    pub async fn explain(
        &self,
        text: &str,
        top_n: usize,
        options: &PredictOptions,
    ) -> Result<ExplanationResult> {
        let top_n = check_top_n(top_n)?;
        let threshold = self.engine.resolve_threshold(options)?;
        let analysis = self.engine.analyze(text, options, threshold).await?;
        let models = self.engine.models()?;

        let contributions = rank_contributions(
            &analysis.features,
            models.coefficients(),
            models.vectorizer().feature_names(),
            top_n,
        );
        if matches!(models.coefficients(), Coefficients::Unavailable) {
            tracing::debug!("Classifier exposes no coefficients, explanation is empty");
        }

        let top_tokens = contributions.iter().map(|c| c.token.clone()).collect();
        Ok(ExplanationResult {
            prediction: analysis.result,
            contributions,
            top_tokens,
            coefficient_source: models.coefficients().kind().to_string(),
        })
    }
}
