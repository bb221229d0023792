//! Router behaviour that never reaches the database.

#![allow(clippy::unwrap_used)]

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use storekeep_integration_tests::{SHOP, sign_session_token, session_claims, test_app, webhook_signature};
use tower::ServiceExt;

/// Outbound Shopify calls would fail fast here; none of these tests make one.
const NO_SHOPIFY: &str = "http://127.0.0.1:1";

async fn send(request: Request<Body>) -> Response {
    test_app(NO_SHOPIFY).oneshot(request).await.unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn webhook(topic: &str, shop: Option<&str>, body: &'static str, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Shopify-Topic", topic);
    if let Some(shop) = shop {
        builder = builder.header("X-Shopify-Shop-Domain", shop);
    }
    if let Some(signature) = signature {
        builder = builder.header("X-Shopify-Hmac-Sha256", signature);
    }
    builder.body(Body::from(body)).unwrap()
}

// =============================================================================
// Health and headers
// =============================================================================

#[tokio::test]
async fn test_health() {
    let response = send(Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn test_security_headers_default_frame_ancestors() {
    let response = send(Request::get("/health").body(Body::empty()).unwrap()).await;
    let headers = response.headers();
    assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
    assert_eq!(
        headers.get(header::CONTENT_SECURITY_POLICY).unwrap(),
        "frame-ancestors https://*.myshopify.com https://admin.shopify.com;"
    );
    assert!(headers.get(header::X_FRAME_OPTIONS).is_none());
}

#[tokio::test]
async fn test_security_headers_narrow_to_shop() {
    let uri = format!("/health?shop={SHOP}");
    let response = send(Request::get(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(
        response.headers().get(header::CONTENT_SECURITY_POLICY).unwrap(),
        "frame-ancestors https://cool-shop.myshopify.com https://admin.shopify.com;"
    );
}

// =============================================================================
// Webhooks
// =============================================================================

const UNINSTALL_BODY: &str = r#"{"id":1,"name":"Cool Shop"}"#;

#[tokio::test]
async fn test_webhook_without_signature_is_rejected() {
    let response = send(webhook("app/uninstalled", Some(SHOP), UNINSTALL_BODY, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_with_tampered_body_is_rejected() {
    let signature = webhook_signature(br#"{"id":1,"name":"Other"}"#);
    let response = send(webhook("app/uninstalled", Some(SHOP), UNINSTALL_BODY, Some(signature))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_requires_shop_header() {
    let signature = webhook_signature(UNINSTALL_BODY.as_bytes());
    let response = send(webhook("app/uninstalled", None, UNINSTALL_BODY, Some(signature))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_unknown_topic_is_acknowledged() {
    let body = r#"{"id":99}"#;
    let signature = webhook_signature(body.as_bytes());
    let response = send(webhook("orders/create", Some(SHOP), body, Some(signature))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_customer_data_request_is_acknowledged() {
    let body = r#"{"shop_domain":"cool-shop.myshopify.com","customer":{"id":1}}"#;
    let signature = webhook_signature(body.as_bytes());
    let response = send(webhook("customers/data_request", Some(SHOP), body, Some(signature))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Embedded session
// =============================================================================

#[tokio::test]
async fn test_htmx_request_without_token_asks_for_retry() {
    let request = Request::get("/billing")
        .header("HX-Request", "true")
        .body(Body::empty())
        .unwrap();
    let response = send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response
            .headers()
            .get("X-Shopify-Retry-Invalid-Session-Request")
            .unwrap(),
        "1"
    );
}

#[tokio::test]
async fn test_forged_bearer_token_is_rejected() {
    let now = chrono::Utc::now().timestamp();
    let token = sign_session_token(&session_claims(now), "not-the-app-secret");
    let request = Request::get("/discounts")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_document_load_without_shop() {
    let response = send(Request::get("/jobs").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("Shopify admin"));
}

#[tokio::test]
async fn test_document_load_with_bad_token_bounces() {
    let uri = format!("/metafields?shop={SHOP}&id_token=garbage&host=abc");
    let response = send(Request::get(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.starts_with("/auth/session-token?shop=cool-shop.myshopify.com"));
    assert!(!location.contains("garbage"));
}
