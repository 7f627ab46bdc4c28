//! Gatehook Server
//!
//! HTTP front for the plugin gateway. Every request except `/health` passes
//! through the plugin gate before reaching the upstream handler.
//! This is a library crate; the server is started via `start_server()`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::State,
    middleware,
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use gatehook_core::{EmptyPolicy, Gateway, GatewayConfig};

pub mod auth;

/// Configuration for starting the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    /// Port to listen on (default: 8080).
    pub port: u16,
    pub gateway: GatewayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            gateway: GatewayConfig::default(),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

/// Build the gateway, load every plugin and run their `init` hooks.
///
/// In strict mode a missing manifest or a plugin that fails to load aborts
/// start-up; otherwise the gateway starts with whatever loaded.
pub async fn prepare_gateway(config: &GatewayConfig) -> anyhow::Result<Arc<Gateway>> {
    let gateway = Arc::new(Gateway::from_config(config));

    let ready = gateway.load().await;
    if config.strict {
        ready.ensure_healthy()?;
    }

    let report = gateway.dispatch_init().await;
    if !report.matched() {
        let mode = match config.on_empty {
            EmptyPolicy::Allow => "allowed",
            EmptyPolicy::Deny => "denied",
        };
        tracing::warn!(
            "No plugins target '{}'; all requests will be {}",
            gateway.target(),
            mode
        );
    } else if !report.failures.is_empty() {
        tracing::warn!(
            "{} of {} plugins failed to initialize",
            report.failures.len(),
            report.plugins
        );
    }

    Ok(gateway)
}

/// Build the Axum router with the plugin gate in front of the upstream.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(upstream))
        .route("/*path", any(upstream))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::plugin_gate,
        ))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(
        listener,
        build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Start the gateway server and block until shutdown.
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::new(config.host, config.port);
    let gateway = prepare_gateway(&config.gateway).await?;

    tracing::info!(
        "Gatehook listening on http://{} for target '{}'",
        addr,
        gateway.target()
    );

    let listener = TcpListener::bind(addr).await?;
    serve(listener, AppState { gateway }).await
}

/// Stand-in for the protected service.
async fn upstream() -> &'static str {
    "Welcome in\n"
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let plugins = state
        .gateway
        .registry()
        .get()
        .map(|ready| ready.entries_for(state.gateway.target()).len())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        target: state.gateway.target().to_string(),
        plugins,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    target: String,
    plugins: usize,
}
