use axum::{
    routing::{get, post},
    Router,
};
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

mod bg_task;
mod config;
mod db;
mod handlers;
mod middleware;
mod models;
mod services;
mod store;
mod utils;

use config::{AppConfig, AuthSettings};
use services::engine::ReconciliationEngine;
use services::registry::HttpRegistryClient;

// Application State
pub struct AppState {
    pub engine: Arc<ReconciliationEngine>,
    pub auth: AuthSettings,
    pub cycle_deadline: Duration,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::whitelist::submit_whitelist,
        handlers::whitelist::list_whitelist,
        handlers::whitelist::list_pending,
        handlers::whitelist::sync_status,
        handlers::whitelist::sync_whitelist,
        handlers::whitelist::withdraw_pending,
    ),
    components(schemas(
        models::whitelist::WhitelistRequest,
        models::whitelist::CycleReport,
        models::whitelist::RetrySummary,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme("jwt", SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    let store = store::open(&config.store).await?;
    let registry = HttpRegistryClient::new(config.registry_url.clone(), config.registry_timeout)?;
    let engine = Arc::new(ReconciliationEngine::new(store, Arc::new(registry)));

    let state = Arc::new(AppState {
        engine: engine.clone(),
        auth: config.auth.clone(),
        cycle_deadline: config.cycle_deadline,
    });

    // Spawn background task FIRST so a backlog from downtime drains right away
    tokio::spawn(crate::bg_task::start_background_task(
        engine,
        config.sync_interval,
        config.cycle_deadline,
    ));

    let app = build_router(state);

    tracing::info!("listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let operator_routes = Router::new()
        .route("/api/whitelist/sync", post(handlers::whitelist::sync_whitelist))
        .route("/api/whitelist/withdraw", post(handlers::whitelist::withdraw_pending))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/", get(root))
        .route(
            "/api/whitelist",
            get(handlers::whitelist::list_whitelist).post(handlers::whitelist::submit_whitelist),
        )
        .route("/api/whitelist/pending", get(handlers::whitelist::list_pending))
        .route("/api/whitelist/status", get(handlers::whitelist::sync_status))
        .merge(operator_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> &'static str {
    "Whitelist Sync API"
}
