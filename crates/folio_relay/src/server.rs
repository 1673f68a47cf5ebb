//! Server setup and routing.

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::auth::require_secret;
use crate::error::Error;
use crate::relay::{handle_chat, CHAT_ROUTE};
use crate::state::AppState;

pub const SERVICE_NAME: &str = "folio-relay";

async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

/// CORS for `origins`: `*` or a comma separated list of exact origins.
fn cors_layer(origins: &str) -> Result<CorsLayer, Error> {
    let allow_origin = if origins.trim() == "*" {
        AllowOrigin::any()
    } else {
        let origins = origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(|origin| {
                HeaderValue::from_str(origin).map_err(|_| Error::InvalidOrigin(origin.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

/// Create the API router. Only the chat route sits behind the shared secret.
pub fn create_router(state: AppState) -> Result<Router, Error> {
    let cors = cors_layer(&state.config.allowed_origin)?;

    let chat = Router::new()
        .route(CHAT_ROUTE, post(handle_chat))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_secret));

    Ok(Router::new()
        .merge(chat)
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("shutting down");
}

/// Run the HTTP server until ctrl-c.
pub async fn run_server(state: AppState) -> Result<(), Error> {
    let app = create_router(state.clone())?;
    let listener =
        tokio::net::TcpListener::bind((state.config.host.as_str(), state.config.port)).await?;

    log::info!("listening on {}", listener.local_addr()?);
    log::info!("upstream: {} ({})", state.config.api_base_url, state.config.model);
    if state.config.secret.is_none() {
        log::warn!("API_SECRET_KEY is not set, the chat endpoint is open");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
