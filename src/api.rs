//! HTTP adapter over the prediction pipeline.
//!
//! Wire field names keep the Spanish JSON contract existing clients use
//! (`prevision`, `probabilidad`, `confianza`, ...).

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::batch::{BatchItemFailure, BatchOrchestrator};
use crate::engine::{ConfidenceBand, ModelInfo, PredictOptions, PredictionResult, SentimentEngine};
use crate::error::SentimentError;
use crate::explain::{ExplanationEngine, ExplanationResult};
use crate::model::Label;
use crate::translation::{TranslationStatus, AUTO_LANGUAGE};

const SERVICE_NAME: &str = "Sentiment Analysis API";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const EXPLAIN_DEFAULT_TOP_N: usize = 10;

pub struct AppState {
    pub engine: Arc<SentimentEngine>,
    pub explainer: ExplanationEngine,
    pub batch: BatchOrchestrator,
}

impl AppState {
    pub fn new(engine: Arc<SentimentEngine>) -> Self {
        Self {
            explainer: ExplanationEngine::new(Arc::clone(&engine)),
            batch: BatchOrchestrator::new(Arc::clone(&engine)),
            engine,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

pub type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn error_response(err: SentimentError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, name) = match &err {
        SentimentError::Validation(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
        SentimentError::EmptyBatch => (StatusCode::BAD_REQUEST, "EmptyBatchError"),
        SentimentError::BatchTooLarge { .. } => (StatusCode::BAD_REQUEST, "BatchTooLargeError"),
        SentimentError::UninitializedEngine => {
            (StatusCode::SERVICE_UNAVAILABLE, "UninitializedEngineError")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
    };

    if err.is_client_error() {
        tracing::warn!("Rejected request: {}", err);
    } else {
        tracing::error!("Request failed: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: name.to_string(),
            detail: err.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }),
    )
}

// ============================================================================
// Requests / responses
// ============================================================================

fn default_language() -> String {
    AUTO_LANGUAGE.to_string()
}

fn default_top_n() -> usize {
    EXPLAIN_DEFAULT_TOP_N
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SentimentRequest {
    #[schema(example = "Este hotel es excelente, me encantó todo")]
    pub text: String,
    /// `auto` to detect, or a language code (`es`, `en`, `pt`, ...).
    #[serde(default = "default_language")]
    pub idioma: String,
    /// Applies to this request only.
    pub threshold: Option<f64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExplainRequest {
    pub text: String,
    #[serde(default = "default_language")]
    pub idioma: String,
    pub threshold: Option<f64>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchRequest {
    pub textos: Vec<String>,
    #[serde(default = "default_language")]
    pub idioma: String,
    pub threshold: Option<f64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ThresholdRequest {
    pub threshold: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SentimentResponse {
    pub prevision: Label,
    pub probabilidad: f64,
    pub confianza: ConfidenceBand,
    pub texto: String,
    pub idioma_detectado: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traduccion: Option<TranslationStatus>,
}

impl From<PredictionResult> for SentimentResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            prevision: result.label,
            probabilidad: result.probability,
            confianza: result.confidence_band,
            texto: result.original_text,
            idioma_detectado: result.detected_language,
            traduccion: result.translation,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PalabraImportante {
    pub palabra: String,
    pub peso: f64,
    pub sentimiento: Label,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PalabrasInfluyentes {
    pub positivas: Vec<PalabraImportante>,
    pub negativas: Vec<PalabraImportante>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExplainResponse {
    pub prevision: Label,
    pub sentimiento: Label,
    pub probabilidad: f64,
    pub confianza: ConfidenceBand,
    pub texto: String,
    pub idioma_detectado: Option<String>,
    /// Ranked strongest first.
    pub palabras_importantes: Vec<PalabraImportante>,
    pub palabras_influyentes: PalabrasInfluyentes,
    pub top_palabras: Vec<String>,
    pub coeficientes: String,
}

fn palabra(token: &str, score: f64, polarity: Label) -> PalabraImportante {
    PalabraImportante {
        palabra: token.to_string(),
        peso: score,
        sentimiento: polarity,
    }
}

impl From<ExplanationResult> for ExplainResponse {
    fn from(result: ExplanationResult) -> Self {
        let split = |polarity: Label| -> Vec<PalabraImportante> {
            result
                .tokens_with(polarity)
                .into_iter()
                .map(|c| palabra(&c.token, c.contribution_score, c.polarity))
                .collect()
        };
        let palabras_influyentes = PalabrasInfluyentes {
            positivas: split(Label::Positive),
            negativas: split(Label::Negative),
        };
        let palabras_importantes = result
            .contributions
            .iter()
            .map(|c| palabra(&c.token, c.contribution_score, c.polarity))
            .collect();

        let prediction = result.prediction;
        Self {
            prevision: prediction.label,
            sentimiento: prediction.label,
            probabilidad: prediction.probability,
            confianza: prediction.confidence_band,
            texto: prediction.original_text,
            idioma_detectado: prediction.detected_language,
            palabras_importantes,
            palabras_influyentes,
            top_palabras: result.top_tokens,
            coeficientes: result.coefficient_source,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchResponse {
    pub total: usize,
    pub exitosos: usize,
    pub positivos: usize,
    pub negativos: usize,
    pub porcentaje_positivos: f64,
    pub resultados: Vec<SentimentResponse>,
    pub tiempo_procesamiento_segundos: f64,
    /// Number of failed items.
    pub errores: usize,
    pub detalle_errores: Vec<BatchItemFailure>,
    pub threshold: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub modelo_cargado: bool,
    pub modelo_info: Option<ModelInfo>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub modelo_tipo: String,
    pub clases: Vec<String>,
    pub num_features: usize,
    pub threshold_actual: f64,
    pub coeficientes: String,
    pub funcionalidades: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThresholdResponse {
    pub threshold_anterior: f64,
    pub threshold_nuevo: f64,
    pub mensaje: String,
}

// ============================================================================
// Handlers
// ============================================================================

#[utoipa::path(get, path = "/", tag = "root", responses((status = 200, description = "Service index")))]
pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": SERVICE_NAME,
        "version": VERSION,
        "status": "running",
        "endpoints": {
            "docs": "/docs",
            "health": "/health",
            "sentiment": "/sentiment (POST)",
            "sentiment_explain": "/sentiment/explain (POST)",
            "batch": "/sentiment/batch (POST)",
            "stats": "/stats (GET)",
            "threshold": "/threshold (POST)",
            "examples": "/examples (GET)"
        }
    }))
}

#[utoipa::path(get, path = "/health", tag = "health", responses((status = 200, body = HealthResponse)))]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let ready = state.engine.is_ready();
    Json(HealthResponse {
        status: if ready { "healthy" } else { "unhealthy" }.to_string(),
        service: SERVICE_NAME.to_string(),
        version: VERSION.to_string(),
        modelo_cargado: ready,
        modelo_info: state.engine.info().ok(),
    })
}

#[utoipa::path(
    post,
    path = "/sentiment",
    tag = "sentiment",
    request_body = SentimentRequest,
    responses(
        (status = 200, body = SentimentResponse),
        (status = 400, body = ErrorResponse),
        (status = 503, body = ErrorResponse)
    )
)]
pub async fn analyze_sentiment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SentimentRequest>,
) -> ApiResult<SentimentResponse> {
    let options = PredictOptions::for_language(&payload.idioma).with_threshold(payload.threshold);
    let result = state
        .engine
        .predict(payload.text.trim(), &options)
        .await
        .map_err(error_response)?;
    Ok(Json(result.into()))
}

#[utoipa::path(
    post,
    path = "/sentiment/explain",
    tag = "sentiment",
    request_body = ExplainRequest,
    responses(
        (status = 200, body = ExplainResponse),
        (status = 400, body = ErrorResponse),
        (status = 503, body = ErrorResponse)
    )
)]
pub async fn explain_sentiment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExplainRequest>,
) -> ApiResult<ExplainResponse> {
    let options = PredictOptions::for_language(&payload.idioma).with_threshold(payload.threshold);
    let result = state
        .explainer
        .explain(payload.text.trim(), payload.top_n, &options)
        .await
        .map_err(error_response)?;
    tracing::info!("Explanation built with {} tokens", result.contributions.len());
    Ok(Json(result.into()))
}

#[utoipa::path(
    post,
    path = "/sentiment/batch",
    tag = "sentiment",
    request_body = BatchRequest,
    responses(
        (status = 200, body = BatchResponse),
        (status = 400, body = ErrorResponse),
        (status = 503, body = ErrorResponse)
    )
)]
pub async fn analyze_batch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BatchRequest>,
) -> ApiResult<BatchResponse> {
    let options = PredictOptions::for_language(&payload.idioma).with_threshold(payload.threshold);
    let result = state
        .batch
        .run_batch(&payload.textos, &options)
        .await
        .map_err(error_response)?;

    let detalle_errores = result.failures().cloned().collect();
    let resultados = result
        .predictions()
        .cloned()
        .map(SentimentResponse::from)
        .collect();
    Ok(Json(BatchResponse {
        total: result.total,
        exitosos: result.succeeded,
        positivos: result.positives,
        negativos: result.negatives,
        porcentaje_positivos: result.percentage_positive,
        resultados,
        tiempo_procesamiento_segundos: (result.elapsed.as_secs_f64() * 100.0).round() / 100.0,
        errores: result.failed,
        detalle_errores,
        threshold: result.threshold,
    }))
}

#[utoipa::path(
    get,
    path = "/stats",
    tag = "model",
    responses((status = 200, body = StatsResponse), (status = 503, body = ErrorResponse))
)]
pub async fn model_stats(State(state): State<Arc<AppState>>) -> ApiResult<StatsResponse> {
    let info = state.engine.info().map_err(error_response)?;
    Ok(Json(StatsResponse {
        modelo_tipo: info.model_type,
        clases: info.classes,
        num_features: info.num_features,
        threshold_actual: info.threshold,
        coeficientes: info.explanation_coefficients,
        funcionalidades: vec![
            "Análisis de sentimiento".to_string(),
            "Traducción automática".to_string(),
            "Explicabilidad".to_string(),
            "Procesamiento batch".to_string(),
            "Threshold configurable".to_string(),
        ],
    }))
}

#[utoipa::path(
    post,
    path = "/threshold",
    tag = "config",
    request_body = ThresholdRequest,
    responses((status = 200, body = ThresholdResponse), (status = 400, body = ErrorResponse))
)]
pub async fn configure_threshold(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ThresholdRequest>,
) -> ApiResult<ThresholdResponse> {
    let previous = state
        .engine
        .threshold_store()
        .set(payload.threshold)
        .map_err(error_response)?;
    Ok(Json(ThresholdResponse {
        threshold_anterior: previous,
        threshold_nuevo: payload.threshold,
        mensaje: format!("Threshold actualizado de {} a {}", previous, payload.threshold),
    }))
}

#[utoipa::path(get, path = "/examples", tag = "root", responses((status = 200, description = "Request examples")))]
pub async fn examples() -> Json<serde_json::Value> {
    Json(json!({
        "sentiment_simple": {
            "endpoint": "POST /sentiment",
            "example": { "text": "Este hotel es excelente, me encantó todo", "idioma": "es", "threshold": 0.5 }
        },
        "sentiment_multilingue": {
            "endpoint": "POST /sentiment",
            "example": { "text": "This hotel is amazing, I loved everything", "idioma": "en" }
        },
        "sentiment_explain": {
            "endpoint": "POST /sentiment/explain",
            "example": { "text": "Servicio horrible, comida pésima, hotel sucio", "idioma": "es", "top_n": 5 }
        },
        "sentiment_batch": {
            "endpoint": "POST /sentiment/batch",
            "example": {
                "textos": [
                    "Me encanta este producto",
                    "Muy mala experiencia",
                    "Excelente servicio"
                ],
                "idioma": "es"
            }
        },
        "threshold_config": {
            "endpoint": "POST /threshold",
            "example": { "threshold": 0.3 }
        }
    }))
}
