//! Batch prediction with per-item failure isolation.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use utoipa::ToSchema;

use crate::engine::{PredictOptions, PredictionResult, SentimentEngine};
use crate::error::{Result, SentimentError};
use crate::model::Label;

pub const MAX_BATCH_SIZE: usize = 1000;
/// Echoed text is cut to this many characters.
pub const PREVIEW_CHARS: usize = 200;
const PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BatchItemFailure {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Number of input texts, including the ones that failed.
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub positives: usize,
    pub negatives: usize,
    /// Over successful items only; `0` when nothing succeeded.
    pub percentage_positive: f64,
    /// One entry per input, in input order.
    pub items: Vec<std::result::Result<PredictionResult, BatchItemFailure>>,
    pub elapsed: Duration,
    /// Threshold every item in this batch was decided with.
    pub threshold: f64,
}

impl BatchResult {
    pub fn predictions(&self) -> impl Iterator<Item = &PredictionResult> {
        self.items.iter().filter_map(|item| item.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatchItemFailure> {
        self.items.iter().filter_map(|item| item.as_ref().err())
    }
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

pub fn check_batch_size(size: usize) -> Result<()> {
    if size == 0 {
        return Err(SentimentError::EmptyBatch);
    }
    if size > MAX_BATCH_SIZE {
        return Err(SentimentError::BatchTooLarge {
            size,
            max: MAX_BATCH_SIZE,
        });
    }
    Ok(())
}

pub struct BatchOrchestrator {
    engine: Arc<SentimentEngine>,
}

impl BatchOrchestrator {
    pub fn new(engine: Arc<SentimentEngine>) -> Self {
        Self { engine }
    }

    pub async fn run_batch(&self, texts: &[String], options: &PredictOptions) -> Result<BatchResult> {
        check_batch_size(texts.len())?;
        self.engine.models()?;
        let threshold = self.engine.resolve_threshold(options)?;

        let total = texts.len();
        tracing::info!("Processing batch of {} texts", total);
        let started = Instant::now();

        let mut items = Vec::with_capacity(total);
        for (index, text) in texts.iter().enumerate() {
            let outcome = if text.trim().is_empty() {
                tracing::warn!("Batch item {} is empty, skipping", index);
                Err(BatchItemFailure {
                    index,
                    reason: "Empty text".to_string(),
                })
            } else {
                match self.engine.analyze(text, options, threshold).await {
                    Ok(analysis) => {
                        let mut result = analysis.result;
                        result.original_text = preview(&result.original_text);
                        Ok(result)
                    }
                    Err(e) => {
                        tracing::warn!("Batch item {} failed: {}", index, e);
                        Err(BatchItemFailure {
                            index,
                            reason: e.to_string(),
                        })
                    }
                }
            };
            items.push(outcome);

            if (index + 1) % PROGRESS_EVERY == 0 {
                tracing::info!("Batch progress: {}/{}", index + 1, total);
            }
        }

        let mut positives = 0;
        let mut negatives = 0;
        for item in &items {
            match item {
                Ok(result) if result.label == Label::Positive => positives += 1,
                Ok(_) => negatives += 1,
                Err(_) => {}
            }
        }
        let succeeded = positives + negatives;
        let failed = total - succeeded;
        let percentage_positive = if succeeded > 0 {
            (positives as f64 / succeeded as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        let elapsed = started.elapsed();

        tracing::info!(
            "Batch done: {} total, {} positive, {} negative, {} failed in {:.2}s",
            total,
            positives,
            negatives,
            failed,
            elapsed.as_secs_f64()
        );

        Ok(BatchResult {
            total,
            succeeded,
            failed,
            positives,
            negatives,
            percentage_positive,
            items,
            elapsed,
            threshold,
        })
    }
}
