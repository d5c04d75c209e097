//! HTTP server carrying the XML-RPC endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use xapisim_core::{spawn_expiry_sweep, XenApi};

use crate::config::Config;
use crate::xmlrpc::{decode_call, encode_fault, encode_response, INTERNAL_ERROR, PARSE_ERROR};

/// Shared state for the HTTP handlers.
pub struct AppState {
    pub api: Arc<XenApi>,
}

/// Build the router: `POST /` for XML-RPC and `GET /health`.
pub fn build_router(api: Arc<XenApi>) -> Router {
    let state = Arc::new(AppState { api });

    Router::new()
        .route("/", post(handle_xmlrpc))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the server until Ctrl+C.
pub async fn run(config: Config) -> Result<()> {
    let api = Arc::new(
        XenApi::new(&config.simulator).context("Failed to build the simulated service")?,
    );

    let sweep = spawn_expiry_sweep(api.clone(), config.simulator.sweep_interval());

    let addr: SocketAddr = config
        .server
        .listen_address
        .parse()
        .with_context(|| format!("Invalid listen address: {}", config.server.listen_address))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(address = %addr, "XML-RPC endpoint listening");

    let result = axum::serve(listener, build_router(api))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweep.abort();
    result.context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    info!("Received Ctrl+C, shutting down");
}

fn xml_response(payload: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], payload).into_response()
}

async fn handle_xmlrpc(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let text = match std::str::from_utf8(&body) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Rejected XML-RPC request that is not UTF-8");
            return xml_response(encode_fault(PARSE_ERROR, &format!("Request is not UTF-8: {}", e)));
        }
    };

    let call = match decode_call(text) {
        Ok(call) => call,
        Err(e) => {
            warn!(error = %e, "Rejected malformed XML-RPC request");
            return xml_response(encode_fault(PARSE_ERROR, &e.to_string()));
        }
    };

    debug!(method = %call.method_name, params = call.params.len(), "XML-RPC call");
    let envelope = state.api.dispatch(&call.method_name, &call.params);
    match encode_response(&envelope.into_struct()) {
        Ok(payload) => xml_response(payload),
        Err(e) => {
            warn!(method = %call.method_name, error = %e, "Failed to encode XML-RPC response");
            xml_response(encode_fault(INTERNAL_ERROR, &e.to_string()))
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let sessions = state
        .api
        .class("session")
        .and_then(|class| class.read().ok().map(|store| store.len()))
        .unwrap_or_default();

    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "this_host": state.api.this_host(),
        "sessions": sessions,
    }))
}
