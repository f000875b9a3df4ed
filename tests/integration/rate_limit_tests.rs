//! Rate limiting integration tests.
//!
//! Tests verify:
//! - Requests past the quota get 429 with Retry-After
//! - Quotas are tracked per identity
//! - Rejected requests do not consume quota
//! - Unknown output formats are refused before quota is charged
//! - Concurrent requests never over-admit

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, StatusCode};
use tower::ServiceExt;

use bgremove_api::RateWindowTracker;

use super::test_utils::{
    assert_envelope, body_json, multipart_body, png_upload_request, remove_request, router_for,
    test_pipeline, token_for, IdentityEngine, Part,
};

// =============================================================================
// Quota Enforcement
// =============================================================================

#[tokio::test]
async fn test_third_request_is_rejected() {
    let engine = Arc::new(IdentityEngine::default());
    let pipeline = test_pipeline(engine.clone()).with_rate_limit(2, Duration::from_secs(60));
    let router = router_for(pipeline);
    let token = token_for("u1");

    for _ in 0..2 {
        let response = router
            .clone()
            .oneshot(png_upload_request(Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router
        .oneshot(png_upload_request(Some(&token), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    let json = body_json(response).await;
    assert_envelope(&json, "RATE_LIMIT_EXCEEDED", 429);
    assert_eq!(json["error"], "Rate limit exceeded. Please try again later.");
    assert_eq!(engine.calls(), 2);
}

#[tokio::test]
async fn test_quota_is_per_identity() {
    let pipeline = test_pipeline(Arc::new(IdentityEngine::default()))
        .with_rate_limit(1, Duration::from_secs(60));
    let router = router_for(pipeline);

    let first = router
        .clone()
        .oneshot(png_upload_request(Some(&token_for("u1")), None))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = router
        .clone()
        .oneshot(png_upload_request(Some(&token_for("u1")), None))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = router
        .oneshot(png_upload_request(Some(&token_for("u2")), None))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rejected_requests_do_not_count() {
    let limiter = Arc::new(RateWindowTracker::new(2, Duration::from_secs(60)));
    let pipeline =
        test_pipeline(Arc::new(IdentityEngine::default())).with_limiter(limiter.clone());
    let router = router_for(pipeline);
    let token = token_for("u1");

    for _ in 0..5 {
        let _ = router
            .clone()
            .oneshot(png_upload_request(Some(&token), None))
            .await
            .unwrap();
    }

    assert_eq!(limiter.recorded("u1").await, 2);
}

#[tokio::test]
async fn test_unauthenticated_requests_do_not_count() {
    let limiter = Arc::new(RateWindowTracker::new(2, Duration::from_secs(60)));
    let pipeline =
        test_pipeline(Arc::new(IdentityEngine::default())).with_limiter(limiter.clone());
    let router = router_for(pipeline);

    let response = router
        .oneshot(png_upload_request(None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(limiter.recorded("u1").await, 0);
}

#[tokio::test]
async fn test_invalid_output_format_is_not_charged() {
    let limiter = Arc::new(RateWindowTracker::new(2, Duration::from_secs(60)));
    let pipeline =
        test_pipeline(Arc::new(IdentityEngine::default())).with_limiter(limiter.clone());
    let router = router_for(pipeline);
    let token = token_for("u1");

    let response = router
        .oneshot(png_upload_request(Some(&token), Some("output_format=gif")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(limiter.recorded("u1").await, 0);
}

#[tokio::test]
async fn test_invalid_upload_still_consumes_quota() {
    let limiter = Arc::new(RateWindowTracker::new(2, Duration::from_secs(60)));
    let pipeline =
        test_pipeline(Arc::new(IdentityEngine::default())).with_limiter(limiter.clone());
    let router = router_for(pipeline);
    let token = token_for("u1");

    let body = multipart_body(&[Part::file("notes.txt", "image/png", b"hello")]);
    let response = router
        .oneshot(remove_request(Some(&token), None, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(limiter.recorded("u1").await, 1);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_never_over_admit() {
    let pipeline = test_pipeline(Arc::new(IdentityEngine::default()))
        .with_rate_limit(3, Duration::from_secs(60));
    let router = router_for(pipeline);
    let token = token_for("u1");

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let router = router.clone();
            let token = token.clone();
            tokio::spawn(async move {
                router
                    .oneshot(png_upload_request(Some(&token), None))
                    .await
                    .unwrap()
                    .status()
            })
        })
        .collect();

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::OK => admitted += 1,
            StatusCode::TOO_MANY_REQUESTS => rejected += 1,
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!(admitted, 3);
    assert_eq!(rejected, 7);
}
