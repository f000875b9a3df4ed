//! HTTP API integration tests.
//!
//! Tests verify:
//! - Successful removal returns the image with the documented headers
//! - PNG and WebP keep transparency, JPEG is composited onto white
//! - Inference failures surface as PROCESSING_ERROR
//! - Health, metrics and token endpoints respond correctly

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use image::{GenericImageView, ImageFormat};
use tower::ServiceExt;

use bgremove_api::{BorderMatteEngine, TokenAuth};

use super::test_utils::{
    assert_envelope, body_bytes, body_json, create_subject_on_white, create_test_jpeg,
    create_test_webp, decode_image, multipart_body, png_upload_request, remove_request,
    router_for, test_pipeline, token_for, FailingEngine, IdentityEngine, Part, SlowEngine,
    WrongSizeEngine, TEST_SECRET,
};

// =============================================================================
// Successful Removal
// =============================================================================

#[tokio::test]
async fn test_png_success_headers() {
    let engine = Arc::new(IdentityEngine::default());
    let router = router_for(test_pipeline(engine.clone()));
    let token = token_for("u1");

    let response = router
        .oneshot(png_upload_request(Some(&token), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(headers["X-Original-Size"], "10x10");
    assert!(headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("filename=\"processed_cat.png\""));

    let processing_time: f64 = headers["X-Processing-Time"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(processing_time >= 0.0);

    let body = body_bytes(response).await;
    let declared: usize = headers["X-File-Size"].to_str().unwrap().parse().unwrap();
    assert_eq!(declared, body.len());
    assert_eq!(engine.calls(), 1);

    let decoded = decode_image(&body, ImageFormat::Png).to_rgba8();
    assert_eq!(decoded.dimensions(), (10, 10));
    assert_eq!(decoded.get_pixel(0, 0).0[3], 0);
    assert_eq!(decoded.get_pixel(9, 9).0[3], 255);
}

#[tokio::test]
async fn test_jpeg_output_is_opaque() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));
    let token = token_for("u1");

    let response = router
        .oneshot(png_upload_request(Some(&token), Some("output_format=jpeg")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("processed_cat.jpeg"));

    let body = body_bytes(response).await;
    let decoded = decode_image(&body, ImageFormat::Jpeg);
    assert_eq!(decoded.dimensions(), (10, 10));
    assert!(!decoded.color().has_alpha());

    // Transparent pixels land on white
    let pixel = decoded.to_rgb8().get_pixel(0, 0).0;
    assert!(pixel.iter().all(|&c| c > 200), "pixel {:?}", pixel);
}

#[tokio::test]
async fn test_webp_output_keeps_alpha() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));
    let token = token_for("u1");

    let response = router
        .oneshot(png_upload_request(Some(&token), Some("output_format=webp")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/webp");

    let body = body_bytes(response).await;
    let decoded = decode_image(&body, ImageFormat::WebP).to_rgba8();
    assert_eq!(decoded.dimensions(), (10, 10));
    assert_eq!(decoded.get_pixel(0, 0).0[3], 0);
}

#[tokio::test]
async fn test_jpeg_and_webp_uploads_accepted() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));
    let token = token_for("u1");

    let jpeg = create_test_jpeg(16, 12);
    let response = router
        .clone()
        .oneshot(remove_request(
            Some(&token),
            None,
            multipart_body(&[Part::file("photo.JPG", "image/jpeg", &jpeg)]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["X-Original-Size"], "16x12");

    let webp = create_test_webp(8, 8);
    let response = router
        .oneshot(remove_request(
            Some(&token),
            None,
            multipart_body(&[Part::file("sticker.webp", "image/webp", &webp)]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["X-Original-Size"], "8x8");
}

#[tokio::test]
async fn test_extra_form_fields_are_ignored() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));
    let token = token_for("u1");

    let jpeg = create_test_jpeg(4, 4);
    let body = multipart_body(&[
        Part::text("note", "hello"),
        Part::file("a.jpeg", "image/jpeg", &jpeg),
    ]);

    let response = router
        .oneshot(remove_request(Some(&token), None, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_border_matte_engine_end_to_end() {
    let router = router_for(test_pipeline(Arc::new(BorderMatteEngine::default())));
    let token = token_for("u1");

    let png = create_subject_on_white(40);
    let response = router
        .oneshot(remove_request(
            Some(&token),
            None,
            multipart_body(&[Part::file("product.png", "image/png", &png)]),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_bytes(response).await;
    let decoded = decode_image(&body, ImageFormat::Png).to_rgba8();

    assert_eq!(decoded.get_pixel(0, 0).0[3], 0, "background should be cleared");
    assert_eq!(decoded.get_pixel(20, 20).0[3], 255, "subject should stay opaque");
}

// =============================================================================
// Inference Failures
// =============================================================================

#[tokio::test]
async fn test_engine_failure_is_processing_error() {
    let router = router_for(test_pipeline(Arc::new(FailingEngine)));
    let token = token_for("u1");

    let response = router
        .oneshot(png_upload_request(Some(&token), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_envelope(&json, "PROCESSING_ERROR", 500);
    assert!(json["error"].as_str().unwrap().contains("model crashed"));
}

#[tokio::test]
async fn test_engine_timeout_is_processing_error() {
    let pipeline =
        test_pipeline(Arc::new(SlowEngine)).with_inference_timeout(Duration::from_millis(50));
    let router = router_for(pipeline);
    let token = token_for("u1");

    let response = router
        .oneshot(png_upload_request(Some(&token), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_envelope(&json, "PROCESSING_ERROR", 500);
    assert!(json["error"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_wrong_size_output_is_processing_error() {
    let router = router_for(test_pipeline(Arc::new(WrongSizeEngine)));
    let token = token_for("u1");

    let response = router
        .oneshot(png_upload_request(Some(&token), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_envelope(&json, "PROCESSING_ERROR", 500);
}

// =============================================================================
// Health, Metrics and Token Endpoints
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["engine"], "identity");
    assert!(json["version"].is_string());
}

fn metrics_request(token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/metrics");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_metrics_endpoint_reports_limits() {
    let pipeline = test_pipeline(Arc::new(IdentityEngine::default()))
        .with_rate_limit(7, Duration::from_secs(90));
    let router = router_for(pipeline);

    let response = router
        .oneshot(metrics_request(Some(&token_for("u1"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["engine"], "identity");
    assert!(json["started_at"].is_string());
    assert!(json["uptime_seconds"].is_u64());
    assert_eq!(json["rate_limit"]["max_requests"], 7);
    assert_eq!(json["rate_limit"]["window_seconds"], 90);
    assert!(json["upload_limits"]["max_file_size"].as_u64().unwrap() > 0);
    assert!(json["upload_limits"]["allowed_extensions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|ext| ext == ".png"));
}

#[tokio::test]
async fn test_metrics_endpoint_requires_token() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));

    let response = router.oneshot(metrics_request(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    let json = body_json(response).await;
    assert_eq!(json["error_code"], "AUTHENTICATION_ERROR");
    assert_eq!(json["details"]["path"], "/metrics");
    assert_eq!(json["details"]["method"], "GET");
}

#[tokio::test]
async fn test_token_endpoint_issues_verifiable_token() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));

    let request = Request::builder()
        .method("POST")
        .uri("/auth/token?user_id=alice%40example.com")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["token_type"], "bearer");
    assert_eq!(json["expires_in"], 30 * 60);

    let token = json["access_token"].as_str().unwrap();
    let claims = TokenAuth::new(TEST_SECRET).verify(token).unwrap();
    assert_eq!(claims.sub, "alice@example.com");
}

#[tokio::test]
async fn test_token_endpoint_requires_user_id() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));

    for uri in ["/auth/token", "/auth/token?user_id=", "/auth/token?user_id=%20"] {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let json = body_json(response).await;
        assert_eq!(json["error_code"], "VALIDATION_ERROR");
        assert_eq!(json["details"]["path"], "/auth/token");
        assert!(json["error"].as_str().unwrap().contains("user_id"));
    }
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let router = router_for(test_pipeline(Arc::new(IdentityEngine::default())));

    let request = Request::builder()
        .uri("/api/nope")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
