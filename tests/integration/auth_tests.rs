//! Authentication integration tests.
//!
//! Tests verify:
//! - Valid bearer tokens are accepted
//! - Missing, malformed, expired and foreign tokens are rejected with 401
//! - Authentication runs before the body is looked at

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{Duration as ChronoDuration, Utc};
use tower::ServiceExt;

use bgremove_api::{JwtAlgorithm, TokenAuth};

use super::test_utils::{
    assert_envelope, body_json, create_test_png, multipart_body, multipart_content_type,
    png_upload_request, router_for, test_pipeline, token_for, IdentityEngine, Part, REMOVE_PATH,
    TEST_SECRET,
};

/// Send an upload with a raw `Authorization` header value.
fn request_with_authorization(value: &str) -> Request<Body> {
    let png = create_test_png(10, 10);
    Request::builder()
        .method("POST")
        .uri(REMOVE_PATH)
        .header(header::CONTENT_TYPE, multipart_content_type())
        .header(header::AUTHORIZATION, value)
        .body(Body::from(multipart_body(&[Part::file(
            "cat.png",
            "image/png",
            &png,
        )])))
        .unwrap()
}

// =============================================================================
// Accepted Tokens
// =============================================================================

#[tokio::test]
async fn test_valid_token_succeeds() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));
    let token = token_for("u1");

    let response = router
        .oneshot(png_upload_request(Some(&token), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_scheme_is_case_insensitive() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));
    let token = token_for("u1");

    let response = router
        .oneshot(request_with_authorization(&format!("bearer {}", token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Rejected Tokens
// =============================================================================

#[tokio::test]
async fn test_missing_token_rejected_before_engine() {
    let engine = Arc::new(IdentityEngine::default());
    let router = router_for(test_pipeline(engine.clone()));

    let response = router
        .oneshot(png_upload_request(None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    let json = body_json(response).await;
    assert_envelope(&json, "AUTHENTICATION_ERROR", 401);
    assert_eq!(json["error"], "Missing authentication credentials");
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn test_malformed_header_rejected() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));

    for value in ["Basic dXNlcjpwYXNz", "Bearer", "Bearer ", "token-without-scheme"] {
        let response = router
            .clone()
            .oneshot(request_with_authorization(value))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", value);
        let json = body_json(response).await;
        assert_envelope(&json, "AUTHENTICATION_ERROR", 401);
    }
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));
    let issued = TokenAuth::new(TEST_SECRET)
        .issue_at("u1", Utc::now() - ChronoDuration::minutes(31))
        .unwrap();

    let response = router
        .oneshot(png_upload_request(Some(&issued.token), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_envelope(&json, "AUTHENTICATION_ERROR", 401);
    assert_eq!(json["error"], "Token has expired");
}

#[tokio::test]
async fn test_foreign_secret_rejected() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));
    let issued = TokenAuth::new("some-other-secret").issue("u1").unwrap();

    let response = router
        .oneshot(png_upload_request(Some(&issued.token), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Invalid token");
}

#[tokio::test]
async fn test_wrong_algorithm_rejected() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));
    let issued = TokenAuth::new(TEST_SECRET)
        .with_algorithm(JwtAlgorithm::Hs512)
        .issue("u1")
        .unwrap();

    let response = router
        .oneshot(png_upload_request(Some(&issued.token), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_garbage_token_rejected() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));

    let response = router
        .oneshot(request_with_authorization("Bearer not.a.jwt"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Invalid token");
}

#[tokio::test]
async fn test_auth_checked_before_body() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));

    // Not multipart at all; the missing token must still win
    let request = Request::builder()
        .method("POST")
        .uri(REMOVE_PATH)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_envelope(&json, "AUTHENTICATION_ERROR", 401);
}
