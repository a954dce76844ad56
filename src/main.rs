mod api;
mod artifacts;
mod batch;
mod config;
mod engine;
mod error;
mod explain;
mod model;
mod normalizer;
mod threshold;
mod translation;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use dotenv::dotenv;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::engine::SentimentEngine;
use crate::threshold::ThresholdStore;
use crate::translation::{DisabledTranslator, HttpTranslator, TranslationGateway, TranslationService};

#[derive(OpenApi)]
#[openapi(
    paths(
        api::root,
        api::health,
        api::analyze_sentiment,
        api::explain_sentiment,
        api::analyze_batch,
        api::model_stats,
        api::configure_threshold,
        api::examples
    ),
    components(
        schemas(
            api::SentimentRequest,
            api::SentimentResponse,
            api::ExplainRequest,
            api::ExplainResponse,
            api::PalabraImportante,
            api::PalabrasInfluyentes,
            api::BatchRequest,
            api::BatchResponse,
            api::HealthResponse,
            api::StatsResponse,
            api::ThresholdRequest,
            api::ThresholdResponse,
            api::ErrorResponse,
            crate::batch::BatchItemFailure,
            crate::engine::ConfidenceBand,
            crate::engine::ModelInfo,
            crate::model::Label,
            crate::translation::TranslationStatus
        )
    ),
    tags(
        (name = "sentiment", description = "Sentiment Analysis API"),
        (name = "model", description = "Loaded model information"),
        (name = "config", description = "Decision threshold configuration"),
        (name = "health", description = "Service health"),
        (name = "root", description = "Index and request examples")
    )
)]
struct ApiDoc;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

fn translation_service(config: &Config) -> anyhow::Result<Arc<dyn TranslationService>> {
    match &config.translator_url {
        Some(url) => {
            tracing::info!("Translation service: {}", url);
            Ok(Arc::new(HttpTranslator::new(
                url,
                config.translator_api_key.clone(),
                config.translation_timeout,
            )?))
        }
        None => {
            tracing::warn!("TRANSLATOR_URL not set, non-Spanish text is analyzed untranslated");
            Ok(Arc::new(DisabledTranslator))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;

    let gateway = TranslationGateway::new(translation_service(&config)?)
        .with_max_attempts(config.translation_max_attempts)
        .with_retry_delay(config.translation_retry_delay);
    let threshold = Arc::new(ThresholdStore::new(config.threshold)?);
    let engine = Arc::new(
        SentimentEngine::new(gateway, threshold).with_translation_timeout(config.translation_timeout),
    );

    // Serve even without models: /health reports it and predictions answer 503.
    match artifacts::load_models(&config.model_path, &config.vectorizer_path) {
        Ok(models) => {
            engine.install(models)?;
            tracing::info!("Models loaded, threshold {}", config.threshold);
        }
        Err(e) => tracing::error!("Failed to load models: {}", e),
    }

    let state = Arc::new(api::AppState::new(engine));

    let app = Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(api::root))
        .route("/health", get(api::health))
        .route("/sentiment", post(api::analyze_sentiment))
        .route("/sentiment/explain", post(api::explain_sentiment))
        .route("/sentiment/batch", post(api::analyze_batch))
        .route("/stats", get(api::model_stats))
        .route("/threshold", post(api::configure_threshold))
        .route("/examples", get(api::examples))
        .layer(cors_layer(&config.cors_allowed_origins))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.socket_addr()?).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
