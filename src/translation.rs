//! Best-effort translation into the classifier's language.
//!
//! The gateway never fails: when detection, translation or the deadline
//! gives out, it hands back the original text marked as a fallback so the
//! pipeline can keep going on the untranslated input.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::error::{Result, SentimentError};

/// Source-language sentinel asking for detection.
pub const AUTO_LANGUAGE: &str = "auto";
/// Language the classifier was trained on.
pub const TARGET_LANGUAGE: &str = "es";
/// Reported when translation gave up.
pub const UNKNOWN_LANGUAGE: &str = "unknown";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// External language detection + translation service.
#[async_trait]
pub trait TranslationService: Send + Sync {
    async fn detect_language(&self, text: &str) -> Result<String>;

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;
}

// ============================================================================
// HTTP client (LibreTranslate-compatible API)
// ============================================================================

#[derive(Debug, Deserialize)]
struct DetectResponse {
    language: String,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Talks to a LibreTranslate-compatible service (`POST /detect`, `POST /translate`).
pub struct HttpTranslator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTranslator {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        mut payload: serde_json::Value,
    ) -> Result<T> {
        if let Some(key) = &self.api_key {
            payload["api_key"] = serde_json::Value::String(key.clone());
        }

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SentimentError::Translation(format!(
                "{} returned {}",
                path,
                response.status()
            )));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl TranslationService for HttpTranslator {
    async fn detect_language(&self, text: &str) -> Result<String> {
        let detections: Vec<DetectResponse> = self
            .post("/detect", serde_json::json!({ "q": text }))
            .await?;
        detections
            .into_iter()
            .next()
            .map(|d| d.language)
            .ok_or_else(|| SentimentError::Translation("No language detected".to_string()))
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let response: TranslateResponse = self
            .post(
                "/translate",
                serde_json::json!({
                    "q": text,
                    "source": source,
                    "target": target,
                    "format": "text"
                }),
            )
            .await?;
        Ok(response.translated_text)
    }
}

/// Stand-in used when no translation service is configured. Every call fails,
/// so the gateway degrades to the original text.
pub struct DisabledTranslator;

#[async_trait]
impl TranslationService for DisabledTranslator {
    async fn detect_language(&self, _text: &str) -> Result<String> {
        Err(SentimentError::Translation(
            "No translation service configured".to_string(),
        ))
    }

    async fn translate(&self, _text: &str, _source: &str, _target: &str) -> Result<String> {
        Err(SentimentError::Translation(
            "No translation service configured".to_string(),
        ))
    }
}

// ============================================================================
// Gateway
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    /// Text already in the target language; no translation call made.
    NotNeeded,
    Translated,
    /// Translation gave up; the original text is passed through.
    Fallback,
}

/// Result of one gateway call. Immutable once returned.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationOutcome {
    pub translated_text: String,
    pub detected_language: String,
    pub status: TranslationStatus,
    pub error: Option<String>,
}

impl TranslationOutcome {
    fn unchanged(text: &str, language: &str) -> Self {
        Self {
            translated_text: text.to_string(),
            detected_language: language.to_string(),
            status: TranslationStatus::NotNeeded,
            error: None,
        }
    }

    fn fallback(text: &str, error: String) -> Self {
        Self {
            translated_text: text.to_string(),
            detected_language: UNKNOWN_LANGUAGE.to_string(),
            status: TranslationStatus::Fallback,
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status != TranslationStatus::Fallback
    }
}

pub struct TranslationGateway {
    service: Arc<dyn TranslationService>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl TranslationGateway {
    pub fn new(service: Arc<dyn TranslationService>) -> Self {
        Self {
            service,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Translates `text` into `target`, detecting the source when it is `"auto"`.
    pub async fn translate(&self, text: &str, source: &str, target: &str) -> TranslationOutcome {
        let source = source.trim().to_lowercase();

        let detected = if source == AUTO_LANGUAGE {
            match self.service.detect_language(text).await {
                Ok(language) => language.trim().to_lowercase(),
                Err(e) => {
                    tracing::warn!(
                        "Language detection failed, assuming '{}': {}",
                        target,
                        e
                    );
                    target.to_string()
                }
            }
        } else {
            source
        };

        if detected == target {
            return TranslationOutcome::unchanged(text, target);
        }

        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            match self.service.translate(text, &detected, target).await {
                Ok(translated) => {
                    tracing::info!("Translation succeeded: {} -> {}", detected, target);
                    return TranslationOutcome {
                        translated_text: translated,
                        detected_language: detected,
                        status: TranslationStatus::Translated,
                        error: None,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        "Translation attempt {}/{} failed: {}",
                        attempt,
                        self.max_attempts,
                        e
                    );
                    last_error = e.to_string();
                    if attempt < self.max_attempts && !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        tracing::error!(
            "Translation failed after {} attempts, analyzing original text",
            self.max_attempts
        );
        TranslationOutcome::fallback(text, last_error)
    }

    /// Like [`translate`](Self::translate), bounded by an optional deadline.
    /// An expired deadline degrades the same way exhausted retries do.
    pub async fn translate_within(
        &self,
        text: &str,
        source: &str,
        target: &str,
        deadline: Option<Duration>,
    ) -> TranslationOutcome {
        let Some(deadline) = deadline else {
            return self.translate(text, source, target).await;
        };

        match tokio::time::timeout(deadline, self.translate(text, source, target)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(
                    "Translation timed out after {} ms, analyzing original text",
                    deadline.as_millis()
                );
                TranslationOutcome::fallback(
                    text,
                    format!("Translation timed out after {} ms", deadline.as_millis()),
                )
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::ScriptedTranslator;
    use super::*;

    fn gateway(service: &Arc<ScriptedTranslator>) -> TranslationGateway {
        let service: Arc<dyn TranslationService> = service.clone();
        TranslationGateway::new(service)
    }

    #[tokio::test]
    async fn test_same_language_skips_network() {
        let service = Arc::new(ScriptedTranslator::new(Some("en"), 0));
        let outcome = gateway(&service).translate("hola", "es", "es").await;

        assert_eq!(outcome.status, TranslationStatus::NotNeeded);
        assert_eq!(outcome.translated_text, "hola");
        assert_eq!(outcome.detected_language, "es");
        assert!(outcome.succeeded());
        assert_eq!(service.translate_calls(), 0);
        assert_eq!(service.detect_calls(), 0);
    }

    #[tokio::test]
    async fn test_auto_detects_then_translates() {
        let service = Arc::new(ScriptedTranslator::new(Some("EN"), 0));
        let outcome = gateway(&service)
            .translate("This hotel is amazing", AUTO_LANGUAGE, TARGET_LANGUAGE)
            .await;

        assert_eq!(outcome.status, TranslationStatus::Translated);
        assert_eq!(outcome.detected_language, "en");
        assert_eq!(outcome.translated_text, "[en->es] This hotel is amazing");
        assert_eq!(service.detect_calls(), 1);
    }

    #[tokio::test]
    async fn test_auto_detecting_target_skips_translation() {
        let service = Arc::new(ScriptedTranslator::new(Some("es"), 0));
        let outcome = gateway(&service).translate("hola", "auto", "es").await;
        assert_eq!(outcome.status, TranslationStatus::NotNeeded);
        assert_eq!(service.translate_calls(), 0);
    }

    #[tokio::test]
    async fn test_detector_failure_assumes_target() {
        let service = Arc::new(ScriptedTranslator::new(None, 0));
        let outcome = gateway(&service).translate("texto", "auto", "es").await;

        assert_eq!(outcome.status, TranslationStatus::NotNeeded);
        assert_eq!(outcome.detected_language, "es");
        assert_eq!(outcome.translated_text, "texto");
        assert_eq!(service.translate_calls(), 0);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let service = Arc::new(ScriptedTranslator::new(None, 2));
        let outcome = gateway(&service).translate("great", "en", "es").await;

        assert_eq!(outcome.status, TranslationStatus::Translated);
        assert_eq!(service.translate_calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fall_back_to_original() {
        let service = Arc::new(ScriptedTranslator::always_failing());
        let outcome = gateway(&service).translate("great", "en", "es").await;

        assert_eq!(outcome.status, TranslationStatus::Fallback);
        assert!(!outcome.succeeded());
        assert_eq!(outcome.translated_text, "great");
        assert_eq!(outcome.detected_language, UNKNOWN_LANGUAGE);
        assert_eq!(outcome.error.as_deref(), Some("Translation error: attempt 3 refused"));
        assert_eq!(service.translate_calls(), DEFAULT_MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_custom_attempt_bound() {
        let service = Arc::new(ScriptedTranslator::always_failing());
        let outcome = gateway(&service)
            .with_max_attempts(5)
            .with_retry_delay(Duration::from_millis(1))
            .translate("great", "en", "es")
            .await;
        assert_eq!(outcome.status, TranslationStatus::Fallback);
        assert_eq!(service.translate_calls(), 5);
    }

    #[tokio::test]
    async fn test_deadline_degrades_to_fallback() {
        let service = Arc::new(
            ScriptedTranslator::new(Some("en"), 0).with_delay(Duration::from_millis(200)),
        );
        let outcome = gateway(&service)
            .translate_within("slow", "en", "es", Some(Duration::from_millis(10)))
            .await;

        assert_eq!(outcome.status, TranslationStatus::Fallback);
        assert_eq!(outcome.translated_text, "slow");
        assert_eq!(outcome.detected_language, UNKNOWN_LANGUAGE);
        assert!(outcome.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_disabled_translator_degrades() {
        let gateway = TranslationGateway::new(Arc::new(DisabledTranslator));
        let outcome = gateway.translate("good morning", "en", "es").await;
        assert_eq!(outcome.status, TranslationStatus::Fallback);
        assert_eq!(outcome.translated_text, "good morning");
    }

    #[test]
    fn test_http_translator_trims_base_url() {
        let translator =
            HttpTranslator::new("http://localhost:5000/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(translator.base_url, "http://localhost:5000");
    }

    #[test]
    fn test_libretranslate_response_shapes() {
        let detections: Vec<DetectResponse> =
            serde_json::from_str(r#"[{"confidence": 92.0, "language": "en"}]"#).unwrap();
        assert_eq!(detections[0].language, "en");

        let translated: TranslateResponse =
            serde_json::from_str(r#"{"translatedText": "hola mundo"}"#).unwrap();
        assert_eq!(translated.translated_text, "hola mundo");

        assert!(serde_json::from_str::<TranslateResponse>(r#"{"translated_text": "x"}"#).is_err());
    }

    /// Local LibreTranslate stand-in. `/translate` echoes the request fields back.
    async fn serve_libretranslate() -> String {
        use axum::{routing::post, Json, Router};
        use serde_json::{json, Value};

        fn field(body: &Value, key: &str) -> String {
            body[key].as_str().unwrap_or("-").to_string()
        }

        let app = Router::new()
            .route(
                "/detect",
                post(|Json(body): Json<Value>| async move {
                    let language = if body["q"].is_string() { "en" } else { "??" };
                    Json(json!([{ "confidence": 90.0, "language": language }]))
                }),
            )
            .route(
                "/translate",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({
                        "translatedText": format!(
                            "{}|{}|{}|{}|{}",
                            field(&body, "q"),
                            field(&body, "source"),
                            field(&body, "target"),
                            field(&body, "format"),
                            field(&body, "api_key")
                        )
                    }))
                }),
            )
            .route("/silent/detect", post(|| async { Json(json!([])) }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_translator_against_local_server() {
        let base_url = serve_libretranslate().await;

        let translator = HttpTranslator::new(&base_url, None, Duration::from_secs(5)).unwrap();
        assert_eq!(translator.detect_language("This hotel is amazing").await.unwrap(), "en");
        assert_eq!(
            translator.translate("great hotel", "en", "es").await.unwrap(),
            "great hotel|en|es|text|-"
        );

        let keyed =
            HttpTranslator::new(&base_url, Some("secret".to_string()), Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            keyed.translate("hi", "en", "es").await.unwrap(),
            "hi|en|es|text|secret"
        );
    }

    #[tokio::test]
    async fn test_http_translator_error_responses() {
        let base_url = serve_libretranslate().await;

        // unrouted paths answer 404
        let broken =
            HttpTranslator::new(&format!("{}/broken", base_url), None, Duration::from_secs(5))
                .unwrap();
        let err = broken.translate("hi", "en", "es").await.unwrap_err();
        assert!(matches!(err, SentimentError::Translation(_)));
        assert!(err.to_string().contains("404"));

        let silent =
            HttpTranslator::new(&format!("{}/silent", base_url), None, Duration::from_secs(5))
                .unwrap();
        let err = silent.detect_language("hi").await.unwrap_err();
        assert!(err.to_string().contains("No language detected"));
    }
}
