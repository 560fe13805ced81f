//! REST front-end for the confidential verifier.
//!
//! Thin layer: every endpoint delegates straight to the
//! `TeeVerifier` facade. Verification always answers 200 with a
//! `VerificationResult`; only transport-level problems map to error codes.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use confidential_verifier::{AttestationReport, Provider, TeeVerifier, VerificationResult};

#[derive(Clone)]
struct AppState {
    verifier: Arc<TeeVerifier>,
}

#[derive(Debug, Deserialize)]
struct ProviderQuery {
    provider: String,
}

#[derive(Debug, Deserialize)]
struct ModelQuery {
    provider: String,
    model_id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verifier_server=debug,confidential_verifier=info,tower_http=debug".into()),
        )
        .init();

    dotenv::dotenv().ok();

    let verifier = Arc::new(TeeVerifier::new()?);
    info!("Verifier initialized");

    let state = AppState { verifier };

    let app = Router::new()
        .route("/providers", get(list_providers))
        .route("/models", get(list_models))
        .route("/fetch-report", get(fetch_report))
        .route("/verify", post(verify_report))
        .route("/verify-model", get(verify_model))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    info!("Listening on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn list_providers(State(state): State<AppState>) -> Json<Vec<&'static str>> {
    Json(state.verifier.list_providers())
}

async fn list_models(
    State(state): State<AppState>,
    Query(query): Query<ProviderQuery>,
) -> Result<Json<Vec<String>>, (StatusCode, String)> {
    let provider = parse_provider(&query.provider)?;
    state
        .verifier
        .list_models(provider)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::warn!("Failed to list models for {}: {}", query.provider, e);
            (StatusCode::BAD_GATEWAY, e.to_string())
        })
}

async fn fetch_report(
    State(state): State<AppState>,
    Query(query): Query<ModelQuery>,
) -> Result<Json<AttestationReport>, (StatusCode, String)> {
    let provider = parse_provider(&query.provider)?;
    state
        .verifier
        .fetch_report(provider, &query.model_id)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::warn!(
                "Failed to fetch report for {}/{}: {}",
                query.provider,
                query.model_id,
                e
            );
            (StatusCode::BAD_GATEWAY, e.to_string())
        })
}

async fn verify_report(
    State(state): State<AppState>,
    Json(report): Json<AttestationReport>,
) -> Json<VerificationResult> {
    Json(state.verifier.verify(&report).await)
}

async fn verify_model(
    State(state): State<AppState>,
    Query(query): Query<ModelQuery>,
) -> Result<Json<VerificationResult>, (StatusCode, String)> {
    let provider = parse_provider(&query.provider)?;
    state
        .verifier
        .verify_model(provider, &query.model_id)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::warn!(
                "Failed to verify {}/{}: {}",
                query.provider,
                query.model_id,
                e
            );
            (StatusCode::BAD_GATEWAY, e.to_string())
        })
}

/// Providers must be one of the known names; `generic` is an internal
/// fallback, not an addressable provider.
fn parse_provider(name: &str) -> Result<Provider, (StatusCode, String)> {
    match Provider::parse(name) {
        Provider::Generic => Err((
            StatusCode::BAD_REQUEST,
            format!("Unknown provider: {}", name),
        )),
        provider => Ok(provider),
    }
}
