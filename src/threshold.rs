//! Process-wide decision threshold.
//!
//! One store is created at startup and shared (behind an `Arc`) by the
//! engine and the HTTP layer. Writes are last-writer-wins. Readers that need a
//! consistent value across several predictions take a single `get()` and
//! pass that snapshot along.

use std::sync::RwLock;

use crate::error::{Result, SentimentError};

/// The midpoint. At exactly this value the classifier's native label is trusted.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Rejects values outside `[0, 1]` (NaN included).
pub fn check_threshold(value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(SentimentError::validation(format!(
            "Threshold must be between 0 and 1, got {}",
            value
        )))
    }
}

#[derive(Debug)]
pub struct ThresholdStore {
    value: RwLock<f64>,
}

impl ThresholdStore {
    pub fn new(initial: f64) -> Result<Self> {
        Ok(Self {
            value: RwLock::new(check_threshold(initial)?),
        })
    }

    pub fn get(&self) -> f64 {
        match self.value.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Overwrites the threshold and returns the previous value.
    pub fn set(&self, value: f64) -> Result<f64> {
        let value = check_threshold(value)?;
        let mut guard = match self.value.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = std::mem::replace(&mut *guard, value);
        tracing::info!("Threshold updated: {} -> {}", previous, value);
        Ok(previous)
    }
}

impl Default for ThresholdStore {
    fn default() -> Self {
        Self {
            value: RwLock::new(DEFAULT_THRESHOLD),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_default_is_midpoint() {
        assert_eq!(ThresholdStore::default().get(), DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_set_returns_previous() {
        let store = ThresholdStore::default();
        assert_eq!(store.set(0.3).unwrap(), 0.5);
        assert_eq!(store.set(0.8).unwrap(), 0.3);
        assert_eq!(store.get(), 0.8);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let store = ThresholdStore::default();
        assert!(store.set(0.0).is_ok());
        assert!(store.set(1.0).is_ok());
    }

    #[test]
    fn test_out_of_range_rejected_and_value_kept() {
        let store = ThresholdStore::default();
        store.set(0.7).unwrap();
        assert!(matches!(store.set(1.01), Err(SentimentError::Validation(_))));
        assert!(matches!(store.set(-0.1), Err(SentimentError::Validation(_))));
        assert!(matches!(store.set(f64::NAN), Err(SentimentError::Validation(_))));
        assert_eq!(store.get(), 0.7);
    }

    #[test]
    fn test_new_validates_initial_value() {
        assert!(ThresholdStore::new(2.0).is_err());
        assert_eq!(ThresholdStore::new(0.25).unwrap().get(), 0.25);
    }

    #[test]
    fn test_concurrent_writers_leave_one_written_value() {
        let store = Arc::new(ThresholdStore::default());
        let handles: Vec<_> = [0.1, 0.2, 0.3, 0.4]
            .into_iter()
            .map(|value| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.set(value).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!([0.1, 0.2, 0.3, 0.4].contains(&store.get()));
    }
}
