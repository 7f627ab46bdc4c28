//! Plugin authorization middleware.
//!
//! Every gated request is snapshotted into a [`RequestView`] and run through
//! the gateway's plugins. Denied requests get a 401 with a short body; the
//! deny reason is only logged.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use gatehook_core::{Decision, RequestView};

use crate::AppState;

/// Body returned to denied clients
pub const DENIED_BODY: &str = "Not allowed\n";

/// Snapshot the parts of a request plugins may inspect.
pub fn request_view(request: &Request, remote_addr: Option<SocketAddr>) -> RequestView {
    let uri = request.uri();
    let mut view = RequestView::new(request.method().as_str(), uri.path());

    if let Some(query) = uri.query() {
        view = view.with_query(query);
    }

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.host());
    if let Some(host) = host {
        view = view.with_host(host);
    }

    // Non-UTF-8 header values are not visible to plugins
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            view.add_header(name.as_str(), value);
        }
    }

    if let Some(addr) = remote_addr {
        view = view.with_remote_addr(addr);
    }

    view
}

/// Middleware that admits a request only if every plugin allows it.
pub async fn plugin_gate(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let view = request_view(&request, connect_info.map(|ConnectInfo(addr)| addr));

    match state.gateway.authorize(&view).await {
        Decision::Allow => next.run(request).await,
        Decision::Deny(reason) => {
            tracing::info!(
                method = %view.method,
                path = %view.path,
                remote = view.remote_addr.as_deref().unwrap_or("-"),
                reason = %reason,
                "Request denied"
            );
            (StatusCode::UNAUTHORIZED, DENIED_BODY).into_response()
        }
    }
}
