//! Session token verification and token exchange against a mock Shopify.

#![allow(clippy::unwrap_used)]

use secrecy::ExposeSecret;
use serde_json::json;
use storekeep_admin::shopify::{AdminShopifyError, ShopifyApp};
use storekeep_integration_tests::{
    API_KEY, API_SECRET, SHOP, session_claims, shop, shopify_config, sign_session_token,
};
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[test]
fn test_session_token_round_trip() {
    let app = ShopifyApp::new(&shopify_config());
    let token = sign_session_token(&session_claims(now()), API_SECRET);

    let claims = app.verify_session_token(&token).unwrap();
    assert_eq!(claims.shop().unwrap().as_str(), SHOP);
    assert_eq!(claims.user_id(), Some(42));
}

#[test]
fn test_session_token_wrong_secret() {
    let app = ShopifyApp::new(&shopify_config());
    let token = sign_session_token(&session_claims(now()), "someone-elses-secret");
    assert!(matches!(
        app.verify_session_token(&token),
        Err(AdminShopifyError::InvalidSessionToken(_))
    ));
}

#[test]
fn test_session_token_expired() {
    let app = ShopifyApp::new(&shopify_config());
    let token = sign_session_token(&session_claims(now() - 3600), API_SECRET);
    assert!(app.verify_session_token(&token).is_err());
}

#[test]
fn test_session_token_issuer_must_match_dest() {
    let app = ShopifyApp::new(&shopify_config());
    let mut claims = session_claims(now());
    claims.iss = "https://other-shop.myshopify.com/admin".to_string();
    let token = sign_session_token(&claims, API_SECRET);
    assert!(app.verify_session_token(&token).is_err());
}

#[test]
fn test_session_token_wrong_audience() {
    let app = ShopifyApp::new(&shopify_config());
    let mut claims = session_claims(now());
    claims.aud = "another-app".to_string();
    let token = sign_session_token(&claims, API_SECRET);
    assert!(app.verify_session_token(&token).is_err());
}

#[tokio::test]
async fn test_exchange_session_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/admin/oauth/access_token"))
        .and(body_partial_json(json!({
            "client_id": API_KEY,
            "grant_type": "urn:ietf:params:oauth:grant-type:token-exchange",
            "requested_token_type": "urn:shopify:params:oauth:token-type:offline-access-token",
            "subject_token": "session-token-value"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "shpat_offline",
            "scope": "write_discounts, write_products"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = ShopifyApp::with_origin(&shopify_config(), server.uri());
    let token = app
        .exchange_session_token(&shop(), "session-token-value")
        .await
        .unwrap();

    assert_eq!(token.access_token.expose_secret(), "shpat_offline");
    assert_eq!(token.scopes, vec!["write_discounts", "write_products"]);
}

#[tokio::test]
async fn test_exchange_session_token_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/admin/oauth/access_token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_subject_token"))
        .mount(&server)
        .await;

    let app = ShopifyApp::with_origin(&shopify_config(), server.uri());
    let err = app
        .exchange_session_token(&shop(), "stale")
        .await
        .unwrap_err();
    match err {
        AdminShopifyError::OAuth(message) => assert!(message.contains("invalid_subject_token")),
        other => panic!("expected OAuth error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_exchange_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/admin/oauth/access_token"))
        .and(body_string_contains("code=auth-code-123"))
        .and(body_string_contains(format!("client_id={API_KEY}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "shpat_from_code",
            "scope": "write_discounts"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = ShopifyApp::with_origin(&shopify_config(), server.uri());
    let token = app.exchange_code(&shop(), "auth-code-123").await.unwrap();
    assert_eq!(token.access_token.expose_secret(), "shpat_from_code");
    assert_eq!(token.scopes, vec!["write_discounts"]);
}

#[test]
fn test_authorization_url_targets_shop() {
    let app = ShopifyApp::new(&shopify_config());
    let url = app.authorization_url(&shop(), "https://app.example.com/auth/callback", "nonce");
    assert!(url.starts_with(&format!("https://{SHOP}/admin/oauth/authorize?")));
    assert!(url.contains(&format!("client_id={API_KEY}")));
    assert!(url.contains("scope=write_discounts%2Cwrite_products"));
    assert!(url.contains("state=nonce"));
}

#[test]
fn test_config_debug_redacts_secrets() {
    let config = storekeep_integration_tests::test_config();
    let debug = format!("{config:?}");
    assert!(!debug.contains(API_SECRET));
    assert!(!debug.contains("storekeep:storekeep@"));
    assert!(!debug.contains("session-secret-for-integration-tests"));
    assert!(debug.contains(API_KEY));
}
