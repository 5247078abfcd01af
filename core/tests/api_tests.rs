// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP route tests against the full stack with JWT identity.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use machine_api_core::application::RequestLifecycle;
use machine_api_core::domain::service_config::{ServiceConfig, TokenSeed};
use machine_api_core::infrastructure::identity::AdminClaims;
use machine_api_core::infrastructure::repositories::{InMemoryMachineStore, InMemoryTokenDirectory};
use machine_api_core::infrastructure::{JwtIdentityResolver, RulePolicyEngine, TracingAuditSink};
use machine_api_core::presentation::api::app;

const SECRET: &str = "api-test-secret";

fn router(require_session: bool) -> Router {
    let mut config = ServiceConfig::default();
    config.spec.tokens = vec![TokenSeed {
        serial: "SSHK0001".to_string(),
        token_type: "sshkey".to_string(),
        realms: vec![],
    }];

    let tokens = Arc::new(InMemoryTokenDirectory::from_seeds(&config.spec.tokens));
    let store = InMemoryMachineStore::new().with_token_directory(tokens.clone());
    let identity = JwtIdentityResolver::new(SECRET, None, require_session).unwrap();

    let lifecycle = RequestLifecycle::new(
        Arc::new(config),
        Arc::new(identity),
        Arc::new(RulePolicyEngine::new()),
        Arc::new(store),
        tokens,
        Arc::new(TracingAuditSink::new()),
    );
    app(Arc::new(lifecycle))
}

fn token(sid: Option<&str>) -> String {
    let claims = AdminClaims {
        sub: "admin".to_string(),
        realm: None,
        sid: sid.map(str::to_string),
        exp: chrono::Utc::now().timestamp() + 3600,
        iss: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(bearer) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", bearer));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = router(false).oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_unknown_action_is_not_found() {
    let response = router(false)
        .oneshot(get("/machine/reboot", Some(&token(None))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_credential_is_unauthorized() {
    let response = router(false).oneshot(get("/machine/show", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router(false)
        .oneshot(get("/machine/show", Some("not-a-jwt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_mismatch_is_forbidden() {
    let app = router(true);
    let bearer = token(Some("s-1"));

    let request = Request::builder()
        .method("GET")
        .uri("/machine/show")
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
        .header("X-Session", "s-2")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(get("/machine/show?session=s-1", Some(&bearer)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_form_create_then_query_show() {
    let app = router(false);
    let bearer = token(None);

    let create = Request::builder()
        .method("POST")
        .uri("/machine/create")
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("name=host1&ip=127.0.0.1&desc=laptop"))
        .unwrap();
    let response = app.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["result"]["status"], true);
    assert_eq!(body["result"]["value"], true);

    let response = app
        .clone()
        .oneshot(get("/machine/show?name=host1", Some(&bearer)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["result"]["value"][0]["desc"], "laptop");

    // Peer defaults to loopback, which matches host1's address.
    let add = Request::builder()
        .method("POST")
        .uri("/machine/addtoken")
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("name=host1&serial=SSHK0001&application=ssh"))
        .unwrap();
    assert_eq!(app.clone().oneshot(add).await.unwrap().status(), StatusCode::OK);

    let response = app
        .oneshot(get("/machine/gettokenapps?application=ssh", Some(&bearer)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["result"]["value"][0]["serial"], "SSHK0001");
}

#[tokio::test]
async fn test_failure_envelope_shape() {
    let response = router(false)
        .oneshot(get("/machine/delete", Some(&token(None))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["result"]["status"], false);
    assert_eq!(body["result"]["error"]["code"], 905);
    assert!(body["result"].get("value").is_none());
    assert!(body["version"].as_str().unwrap().starts_with("machine-api"));
}

fn post_without_form(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "text/plain");
    if let Some(bearer) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", bearer));
    }
    builder.body(Body::from("name=host1")).unwrap()
}

#[tokio::test]
async fn test_undecodable_form_gets_envelope() {
    let response = router(false)
        .oneshot(post_without_form("/machine/create", Some(&token(None))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["result"]["status"], false);
    assert_eq!(body["result"]["error"]["code"], 905);
    assert!(body["result"]["error"]["message"]
        .as_str()
        .unwrap()
        .contains("parameters"));
}

#[tokio::test]
async fn test_undecodable_form_still_requires_credential() {
    let response = router(false)
        .oneshot(post_without_form("/machine/create", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
