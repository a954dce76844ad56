//! Environment-driven service configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SentimentError};
use crate::threshold::{check_threshold, DEFAULT_THRESHOLD};
use crate::translation::DEFAULT_MAX_ATTEMPTS;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub model_path: PathBuf,
    pub vectorizer_path: PathBuf,
    pub threshold: f64,
    /// LibreTranslate-compatible endpoint; translation is disabled when unset.
    pub translator_url: Option<String>,
    pub translator_api_key: Option<String>,
    pub translation_max_attempts: u32,
    pub translation_retry_delay: Duration,
    pub translation_timeout: Duration,
    /// Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            model_path: PathBuf::from("models/classifier.json"),
            vectorizer_path: PathBuf::from("models/vectorizer.json"),
            threshold: DEFAULT_THRESHOLD,
            translator_url: None,
            translator_api_key: None,
            translation_max_attempts: DEFAULT_MAX_ATTEMPTS,
            translation_retry_delay: Duration::ZERO,
            translation_timeout: Duration::from_millis(10_000),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key/value source, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(addr) = var("SENTIMENT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(path) = var("SENTIMENT_MODEL_PATH") {
            config.model_path = PathBuf::from(path);
        }
        if let Some(path) = var("SENTIMENT_VECTORIZER_PATH") {
            config.vectorizer_path = PathBuf::from(path);
        }
        if let Some(value) = var("SENTIMENT_THRESHOLD") {
            config.threshold = parse("SENTIMENT_THRESHOLD", &value)?;
        }

        config.translator_url = var("TRANSLATOR_URL");
        config.translator_api_key = var("TRANSLATOR_API_KEY");

        if let Some(value) = var("TRANSLATION_MAX_ATTEMPTS") {
            config.translation_max_attempts = parse("TRANSLATION_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = var("TRANSLATION_RETRY_DELAY_MS") {
            config.translation_retry_delay =
                Duration::from_millis(parse("TRANSLATION_RETRY_DELAY_MS", &value)?);
        }
        if let Some(value) = var("TRANSLATION_TIMEOUT_MS") {
            config.translation_timeout =
                Duration::from_millis(parse("TRANSLATION_TIMEOUT_MS", &value)?);
        }

        if let Some(origins) = var("CORS_ALLOWED_ORIGINS") {
            config.cors_allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        check_threshold(self.threshold)
            .map_err(|e| SentimentError::Config(format!("SENTIMENT_THRESHOLD: {}", e)))?;

        if self.translation_max_attempts == 0 {
            return Err(SentimentError::Config(
                "TRANSLATION_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        if self.translation_timeout.is_zero() {
            return Err(SentimentError::Config(
                "TRANSLATION_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        if let Some(url) = &self.translator_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(SentimentError::Config(format!(
                    "TRANSLATOR_URL must be an http(s) URL, got {}",
                    url
                )));
            }
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr.parse().map_err(|_| {
            SentimentError::Config(format!("Invalid SENTIMENT_BIND_ADDR: {}", self.bind_addr))
        })
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| SentimentError::Config(format!("Invalid value for {}: {}", key, value)))
}
