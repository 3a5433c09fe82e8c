//! The `GET /trigger` route.
//!
//! Every trigger ends in exactly one log event carrying the request context and
//! the status returned to the caller.

use axum::{
    extract::{ConnectInfo, OriginalUri, State},
    http::{header, HeaderMap, Method, StatusCode, Version},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;

use crate::generator::{Generator, Outcome, KEY};

pub const ALREADY_EXISTS_BODY: &str = "bingoNumberOfTheDay already exists";
pub const FAILURE_BODY: &str = "Oops something wrong happened...";

pub fn router(generator: Arc<Generator>) -> Router {
    Router::new()
        .route("/trigger", get(trigger))
        .layer(TraceLayer::new_for_http())
        .with_state(generator)
}

/// What gets logged about the caller.
#[derive(Debug)]
struct RequestContext {
    hostname: String,
    method: String,
    proto: String,
    remote_ip: String,
    path: String,
    user_agent: String,
}

impl RequestContext {
    fn new(
        method: &Method,
        version: Version,
        uri: &axum::http::Uri,
        headers: &HeaderMap,
        remote: Option<SocketAddr>,
    ) -> Self {
        let header_value = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        let mut hostname = header_value(header::HOST);
        if hostname.is_empty() {
            hostname = uri.host().unwrap_or_default().to_string();
        }
        RequestContext {
            hostname,
            method: method.to_string(),
            proto: format!("{:?}", version),
            remote_ip: remote.map(|a| a.to_string()).unwrap_or_default(),
            path: uri
                .path_and_query()
                .map(|p| p.to_string())
                .unwrap_or_else(|| uri.path().to_string()),
            user_agent: header_value(header::USER_AGENT),
        }
    }
}

macro_rules! outcome_event {
    ($level:expr, $ctx:expr, $status:expr, $($arg:tt)+) => {
        tracing::event!(
            $level,
            hostname = %$ctx.hostname,
            method = %$ctx.method,
            proto = %$ctx.proto,
            remote_ip = %$ctx.remote_ip,
            path = %$ctx.path,
            user_agent = %$ctx.user_agent,
            status = $status.as_u16(),
            $($arg)+
        )
    };
}

async fn trigger(
    State(generator): State<Arc<Generator>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    OriginalUri(uri): OriginalUri,
    method: Method,
    version: Version,
    headers: HeaderMap,
) -> Response {
    let ctx = RequestContext::new(
        &method,
        version,
        &uri,
        &headers,
        connect_info.map(|ConnectInfo(addr)| addr),
    );

    match generator.trigger().await {
        Ok(Outcome::Generated(value)) => {
            let status = StatusCode::OK;
            outcome_event!(
                tracing::Level::INFO,
                ctx,
                status,
                "New {} successfully generated: {}",
                KEY,
                value
            );
            (status, value.to_string()).into_response()
        }
        Ok(Outcome::AlreadyExists) => {
            // Shares 500 with real failures; only the log tells them apart.
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            outcome_event!(tracing::Level::INFO, ctx, status, "{} already generated", KEY);
            (status, ALREADY_EXISTS_BODY).into_response()
        }
        Err(e) => {
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            outcome_event!(tracing::Level::ERROR, ctx, status, "{}", e);
            (status, FAILURE_BODY).into_response()
        }
    }
}
