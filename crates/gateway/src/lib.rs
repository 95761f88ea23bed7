//! HTTP gateway for DeepSearch.
//!
//! Exposes the streaming chat endpoint, the conversation read API and a
//! health check. Everything under `/api` requires a bearer token that the
//! configured [`IdentityResolver`] maps to a user.
//!
//! Built on Axum; chat responses are Server-Sent Events.

pub mod api;
pub mod frame;
pub mod orchestrator;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use deepsearch_agent::{AgentLoop, DEFAULT_SYSTEM_PROMPT};
use deepsearch_config::AppConfig;
use deepsearch_core::identity::{Credentials, IdentityResolver, StaticTokenResolver};
use deepsearch_core::store::ConversationStore;
use deepsearch_providers::OpenAiCompatProvider;
use deepsearch_store::SqliteStore;
use deepsearch_tools::SerperSearch;

pub use orchestrator::{ChatOrchestrator, ChatRequest};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: ChatOrchestrator,
    pub store: Arc<dyn ConversationStore>,
    pub identity: Arc<dyn IdentityResolver>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the router with all gateway routes.
///
/// Layers applied:
/// - Bearer identity resolution on all /api routes
/// - CORS limited to GET/POST with no cross-origin allowance
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let api = api::api_router(state.clone())
        .layer(middleware::from_fn_with_state(state, auth_middleware));

    let cors = CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Construct the production state from configuration.
///
/// Opens (and migrates) the database, and wires the OpenAI-compatible
/// provider and Serper search into one agent loop.
pub async fn build_state(config: &AppConfig) -> Result<SharedState, Box<dyn std::error::Error>> {
    let provider = Arc::new(OpenAiCompatProvider::from_config(&config.provider)?);
    let search = Arc::new(SerperSearch::from_config(&config.search)?);
    let tools = Arc::new(deepsearch_tools::default_registry(
        search,
        config.search.result_count,
    ));

    let mut agent = AgentLoop::new(provider, tools, &config.provider.model)
        .with_temperature(config.provider.temperature)
        .with_step_limit(config.agent.step_limit)
        .with_system_prompt(
            config
                .agent
                .system_prompt
                .as_deref()
                .unwrap_or(DEFAULT_SYSTEM_PROMPT),
        );
    if let Some(max) = config.provider.max_tokens {
        agent = agent.with_max_tokens(max);
    }

    let store: Arc<dyn ConversationStore> = Arc::new(SqliteStore::new(&config.database.url).await?);
    let orchestrator = ChatOrchestrator::new(agent, store.clone())
        .with_request_timeout(Duration::from_secs(config.agent.request_timeout_secs));
    let identity = Arc::new(StaticTokenResolver::new(config.auth.tokens.clone()));

    if config.auth.tokens.is_empty() {
        warn!("No auth tokens configured; every /api request will be rejected");
    }

    Ok(Arc::new(GatewayState {
        orchestrator,
        store,
        identity,
    }))
}

/// Start the gateway HTTP server and serve until Ctrl-C.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = build_state(&config).await?;
    let app = build_router(state);

    info!(addr = %addr, model = %config.provider.model, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Authentication middleware for the /api routes.
///
/// Resolves `Authorization: Bearer <token>` to a [`UserId`] and stores it
/// in the request extensions. Anything unresolved gets a plain 401.
///
/// [`UserId`]: deepsearch_core::identity::UserId
async fn auth_middleware(
    State(state): State<SharedState>,
    mut req: axum::extract::Request,
    next: Next,
) -> Response {
    let bearer_token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());

    match state.identity.resolve(&Credentials { bearer_token }).await {
        Ok(user_id) => {
            req.extensions_mut().insert(user_id);
            next.run(req).await
        }
        Err(e) => {
            warn!(path = %req.uri().path(), "Unauthorized request");
            (StatusCode::UNAUTHORIZED, e.to_string()).into_response()
        }
    }
}
