// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP binding for the machine operations.
//!
//! | Route | Effect |
//! |-------|--------|
//! | `GET /health` | liveness and version |
//! | `GET /machine/{action}` | parameters from the query string |
//! | `POST /machine/{action}` | parameters from a form body |
//!
//! Identity failures answer `401`/`403` without an envelope; every other
//! outcome, including an undecodable query string or form body, is a `200`
//! carrying the JSON envelope.

use axum::{
    extract::{
        rejection::{FormRejection, QueryRejection},
        ConnectInfo, FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::application::envelope::version_marker;
use crate::application::params::ParamError;
use crate::application::RequestLifecycle;
use crate::domain::action::Action;
use crate::domain::identity::AccessError;
use crate::domain::request::{InboundRequest, RequestParams};

pub const SESSION_HEADER: &str = "x-session";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

pub struct AppState {
    pub lifecycle: Arc<RequestLifecycle>,
}

pub fn app(lifecycle: Arc<RequestLifecycle>) -> Router {
    let state = Arc::new(AppState { lifecycle });

    Router::new()
        .route("/health", get(health))
        .route("/machine/{action}", get(machine_query).post(machine_form))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Transport metadata every machine request carries.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub peer: IpAddr,
    pub credential: Option<String>,
    pub session: Option<String>,
    pub forwarded_for: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for RequestMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Without connect info (e.g. in-process tests) the peer is loopback.
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        Ok(Self {
            peer,
            credential: bearer_token(&parts.headers),
            session: header_value(&parts.headers, SESSION_HEADER),
            forwarded_for: header_value(&parts.headers, FORWARDED_FOR_HEADER),
        })
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = header_value(headers, axum::http::header::AUTHORIZATION.as_str())?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": version_marker() }))
}

async fn machine_query(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
    meta: RequestMeta,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Response {
    let params = query
        .map(|Query(params)| params.into())
        .map_err(|rejection| rejection.body_text());
    handle_machine(&state, &action, meta, params).await
}

async fn machine_form(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
    meta: RequestMeta,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Response {
    let params = form
        .map(|Form(params)| params.into())
        .map_err(|rejection| rejection.body_text());
    handle_machine(&state, &action, meta, params).await
}

async fn handle_machine(
    state: &AppState,
    action: &str,
    meta: RequestMeta,
    params: Result<RequestParams, String>,
) -> Response {
    let action: Action = match action.parse() {
        Ok(action) => action,
        Err(e) => {
            return (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response()
        }
    };

    let (params, undecodable) = match params {
        Ok(params) => (params, None),
        Err(reason) => (RequestParams::new(), Some(reason)),
    };

    let request = InboundRequest {
        action,
        params,
        credential: meta.credential,
        session: meta.session,
        peer: meta.peer,
        forwarded_for: meta.forwarded_for,
    };

    let outcome = match undecodable {
        None => state.lifecycle.handle(request).await,
        Some(reason) => {
            let error = ParamError::Invalid {
                name: "parameters",
                reason,
            };
            state.lifecycle.reject(request, error).await
        }
    };

    match outcome {
        Ok(response) => Json(response).into_response(),
        Err(AccessError::Unauthenticated(message)) => {
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
        }
        Err(AccessError::Unauthorized(message)) => {
            (StatusCode::FORBIDDEN, Json(json!({ "error": message }))).into_response()
        }
    }
}
