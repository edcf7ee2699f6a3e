//! HTTP-level integration tests for the ghiblify orchestrator.
//!
//! Every provider endpoint is served by a local `wiremock` server, so these
//! tests run offline. Call counts are verified with `.expect(n)` when the
//! server is dropped.
//!
//! Run with:
//!   cargo test --test orchestrator -- --nocapture

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ghiblify::{
    transform, ErrorKind, GeneratedImage, Provider, TransformConfig, TransformError,
    TransformationRequest, TransformationResult,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::json;
use std::io::Cursor;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STABILITY_PATH: &str = "/v1/generation/stable-diffusion-xl-1024-v1-0/image-to-image";

// ── Test helpers ─────────────────────────────────────────────────────────────

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 140, 200])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn photo() -> Vec<u8> {
    encode(400, 600, ImageFormat::Jpeg)
}

fn stability_config(server: &MockServer) -> TransformConfig {
    TransformConfig::builder()
        .stability_base_url(server.uri())
        .api_timeout_secs(5)
        .build()
        .unwrap()
}

/// Leonardo config with a short polling schedule: 100ms ticks, 1s budget.
fn leonardo_config(server: &MockServer) -> TransformConfig {
    TransformConfig::builder()
        .leonardo_base_url(server.uri())
        .api_timeout_secs(5)
        .poll_interval_ms(100)
        .poll_budget_secs(1)
        .build()
        .unwrap()
}

fn leonardo_status(status: &str, url: Option<String>) -> serde_json::Value {
    let images = url.map(|u| vec![json!({ "url": u, "id": "img-1" })]).unwrap_or_default();
    json!({ "generations_by_pk": { "status": status, "generated_images": images } })
}

async fn mount_leonardo_submit(server: &MockServer, generation_id: &str) {
    Mock::given(method("POST"))
        .and(path("/generations"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "sdGenerationJob": { "generationId": generation_id } })),
        )
        .expect(1)
        .mount(server)
        .await;
}

// ── Stability (synchronous) ──────────────────────────────────────────────────

#[tokio::test]
async fn stability_success_returns_inline_artifact() {
    let server = MockServer::start().await;
    let generated = encode(8, 8, ImageFormat::Png);

    Mock::given(method("POST"))
        .and(path(STABILITY_PATH))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "artifacts": [{
                "base64": STANDARD.encode(&generated),
                "finishReason": "SUCCESS",
                "seed": 1234
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = TransformationRequest::new(photo(), Provider::Stability, "sk-test");
    let output = tokio_test::assert_ok!(transform(request, &stability_config(&server)).await.into_result());

    assert_eq!(output.provider, Provider::Stability);
    assert_eq!(output.session_id, None);
    assert_eq!(output.stats.polls, 0);
    assert_eq!(
        output.image,
        GeneratedImage::Inline {
            bytes: generated,
            mime: "image/png".into()
        }
    );
    assert!(output.image.data_url().starts_with("data:image/png;base64,"));

    // The multipart body carries a binary JPEG, so search it as bytes.
    let requests = server.received_requests().await.unwrap();
    let body = &requests[0].body;
    for needle in [
        &b"name=\"init_image\"; filename=\"init_image.jpg\""[..],
        b"Hayao Miyazaki",
        b"IMAGE_STRENGTH",
    ] {
        assert!(contains(body, needle), "missing {:?}", String::from_utf8_lossy(needle));
    }
}

#[tokio::test]
async fn empty_credential_never_reaches_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let request = TransformationRequest::new(photo(), Provider::Stability, "");
    let result = transform(request, &stability_config(&server)).await;

    let err = result.error().expect("validation failure");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.to_string(), "credential required");
}

#[tokio::test]
async fn undecodable_image_never_reaches_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let request = TransformationRequest::new(b"%PDF-1.7 not a photo".to_vec(), Provider::Stability, "sk-test");
    let result = transform(request, &stability_config(&server)).await;

    assert_eq!(result.kind(), Some(ErrorKind::Decode));
}

#[tokio::test]
async fn stability_http_error_keeps_upstream_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STABILITY_PATH))
        .respond_with(
            ResponseTemplate::new(402).set_body_json(json!({ "message": "insufficient credits" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = TransformationRequest::new(photo(), Provider::Stability, "sk-test");
    let result = transform(request, &stability_config(&server)).await;

    match result {
        TransformationResult::Failure(TransformError::Provider {
            provider,
            status,
            message,
        }) => {
            assert_eq!(provider, Provider::Stability);
            assert_eq!(status, 402);
            assert_eq!(message, "insufficient credits");
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn content_filtered_artifact_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STABILITY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "artifacts": [{ "base64": "", "finishReason": "CONTENT_FILTERED" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = TransformationRequest::new(photo(), Provider::Stability, "sk-test");
    let result = transform(request, &stability_config(&server)).await;

    assert_eq!(result.kind(), Some(ErrorKind::Provider));
    assert!(matches!(
        result.error(),
        Some(TransformError::GenerationFailed { .. })
    ));
}

#[tokio::test]
async fn unreachable_provider_is_network_error() {
    // Nothing listens on the discard port.
    let config = TransformConfig::builder()
        .stability_base_url("http://127.0.0.1:9")
        .api_timeout_secs(5)
        .build()
        .unwrap();

    let request = TransformationRequest::new(photo(), Provider::Stability, "sk-test");
    let result = transform(request, &config).await;

    assert_eq!(result.kind(), Some(ErrorKind::Network));
}

#[tokio::test]
async fn concurrent_transformations_are_independent() {
    let server = MockServer::start().await;
    let generated = encode(4, 4, ImageFormat::Png);
    Mock::given(method("POST"))
        .and(path(STABILITY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "artifacts": [{ "base64": STANDARD.encode(&generated), "finishReason": "SUCCESS" }]
        })))
        .expect(3)
        .mount(&server)
        .await;

    let config = stability_config(&server);
    let ok = |key: &str| transform(TransformationRequest::new(photo(), Provider::Stability, key), &config);
    let (a, b, c) = tokio::join!(ok("sk-one"), ok("sk-two"), ok("sk-three"));
    let bad = transform(TransformationRequest::new(photo(), Provider::Stability, "nope"), &config).await;

    assert!(a.is_success() && b.is_success() && c.is_success());
    assert_eq!(bad.kind(), Some(ErrorKind::Validation));
}

// ── Leonardo (queued + polling) ──────────────────────────────────────────────

#[tokio::test]
async fn leonardo_job_completes_after_pending_checks() {
    let server = MockServer::start().await;
    let generated = encode(16, 16, ImageFormat::Jpeg);
    let cdn_url = format!("{}/cdn/out.jpg", server.uri());

    Mock::given(method("POST"))
        .and(path("/generations"))
        .and(header("authorization", "Bearer leo-key"))
        .and(body_string_contains("\"modelId\":\"6bef9f1b-29cb-40c7-b9df-32b51c1f67d3\""))
        .and(body_string_contains("\"imageData\""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "sdGenerationJob": { "generationId": "gen-7" } })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/generations/gen-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(leonardo_status("PENDING", None)))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/generations/gen-7"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(leonardo_status("COMPLETE", Some(cdn_url.clone()))),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/out.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(generated.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let config = leonardo_config(&server);
    let request = TransformationRequest::new(photo(), Provider::Leonardo, "leo-key");
    let output = tokio_test::assert_ok!(transform(request, &config).await.into_result());

    assert_eq!(output.session_id.as_deref(), Some("gen-7"));
    assert_eq!(output.stats.polls, 3);
    assert_eq!(output.image, GeneratedImage::Remote { url: cdn_url });
    assert_eq!(output.image.extension(), "jpg");

    let (bytes, mime) = output.image.fetch(&config).await.unwrap();
    assert_eq!(bytes, generated);
    assert_eq!(mime, "image/jpeg");
}

#[tokio::test]
async fn leonardo_job_that_stays_pending_times_out() {
    let server = MockServer::start().await;
    mount_leonardo_submit(&server, "gen-slow").await;
    Mock::given(method("GET"))
        .and(path("/generations/gen-slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(leonardo_status("PENDING", None)))
        .mount(&server)
        .await;

    let request = TransformationRequest::new(photo(), Provider::Leonardo, "leo-key");
    let result = transform(request, &leonardo_config(&server)).await;

    match result.error() {
        Some(TransformError::Timeout { session_id, polls, .. }) => {
            assert_eq!(session_id, "gen-slow");
            assert!(*polls >= 1 && *polls <= 10, "polls = {polls}");
        }
        other => panic!("expected timeout, got {other:?}"),
    }

    // No status check outlives the call.
    let seen = server.received_requests().await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), seen);
}

#[tokio::test]
async fn leonardo_failed_job_stops_polling() {
    let server = MockServer::start().await;
    mount_leonardo_submit(&server, "gen-bad").await;
    Mock::given(method("GET"))
        .and(path("/generations/gen-bad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(leonardo_status("FAILED", None)))
        .expect(1)
        .mount(&server)
        .await;

    let request = TransformationRequest::new(photo(), Provider::Leonardo, "leo-key");
    let result = transform(request, &leonardo_config(&server)).await;

    assert_eq!(result.kind(), Some(ErrorKind::Provider));
    tokio::time::sleep(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn leonardo_submit_rejection_skips_polling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generations"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid API key" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let request = TransformationRequest::new(photo(), Provider::Leonardo, "leo-key");
    let result = transform(request, &leonardo_config(&server)).await;

    assert_eq!(result.error().and_then(|e| e.status()), Some(401));
    assert_eq!(
        result.error().map(|e| e.to_string()),
        Some("Leonardo AI returned HTTP 401: Invalid API key".to_string())
    );
}
