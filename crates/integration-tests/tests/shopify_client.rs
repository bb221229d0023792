//! Admin GraphQL client against a mock Shopify.

#![allow(clippy::unwrap_used)]

use secrecy::SecretString;
use serde_json::json;
use storekeep_admin::shopify::{AdminClient, AdminShopifyError, MetafieldWrite, ShopifyApp};
use storekeep_core::{BillingInterval, Money, PurchaseStatus, SubscriptionStatus};
use storekeep_integration_tests::{API_VERSION, shop, shopify_config};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "shpat_integration";

fn graphql_path() -> String {
    format!("/admin/api/{API_VERSION}/graphql.json")
}

fn client(server: &MockServer) -> AdminClient {
    ShopifyApp::with_origin(&shopify_config(), server.uri())
        .client(&shop(), SecretString::from(TOKEN))
}

fn operation(name: &str) -> serde_json::Value {
    json!({ "operationName": name })
}

#[tokio::test]
async fn test_get_shop_sends_token_and_maps_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(graphql_path()))
        .and(header("X-Shopify-Access-Token", TOKEN))
        .and(body_partial_json(operation("GetShop")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "shop": {
                    "name": "Cool Shop",
                    "email": "  ",
                    "currencyCode": "CAD",
                    "myshopifyDomain": "cool-shop.myshopify.com",
                    "plan": { "displayName": "Developer Preview", "partnerDevelopment": true }
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let info = client(&server).get_shop().await.unwrap();
    assert_eq!(info.name, "Cool Shop");
    assert_eq!(info.email, None);
    assert_eq!(info.currency_code, "CAD");
    assert_eq!(info.plan_name.as_deref(), Some("Developer Preview"));
    assert!(info.partner_development);
}

#[tokio::test]
async fn test_rate_limit_reads_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2.0"))
        .mount(&server)
        .await;

    let err = client(&server).get_shop().await.unwrap_err();
    assert!(matches!(err, AdminShopifyError::RateLimited(2)), "{err:?}");
}

#[tokio::test]
async fn test_throttled_graphql_error_is_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "message": "Throttled" }]
        })))
        .mount(&server)
        .await;

    let err = client(&server).get_shop().await.unwrap_err();
    assert!(matches!(err, AdminShopifyError::RateLimited(1)), "{err:?}");
}

#[tokio::test]
async fn test_unauthorized_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client(&server).get_shop().await.unwrap_err();
    assert!(matches!(err, AdminShopifyError::Unauthorized(_)), "{err:?}");
    assert!(err.user_messages().is_empty());
}

#[tokio::test]
async fn test_graphql_errors_are_collected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [
                { "message": "Field 'bogus' doesn't exist", "locations": [{ "line": 2, "column": 3 }] }
            ]
        })))
        .mount(&server)
        .await;

    let err = client(&server).get_shop().await.unwrap_err();
    match err {
        AdminShopifyError::GraphQL(errors) => {
            assert_eq!(errors.len(), 1);
            assert!(errors.first().unwrap().message.contains("bogus"));
        }
        other => panic!("expected GraphQL error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_set_metafields_batches_writes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(operation("MetafieldsSet")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "metafieldsSet": {
                    "metafields": [{
                        "id": "gid://shopify/Metafield/1",
                        "namespace": "specs",
                        "key": "weight_grams",
                        "type": "number_integer",
                        "value": "250",
                        "updatedAt": "2026-10-01T12:00:00Z"
                    }],
                    "userErrors": []
                }
            }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let writes: Vec<MetafieldWrite> = (0..30)
        .map(|i| MetafieldWrite {
            namespace: "specs".to_string(),
            key: format!("field_{i}"),
            field_type: "number_integer".to_string(),
            value: i.to_string(),
        })
        .collect();

    let saved = client(&server)
        .set_metafields("gid://shopify/Product/7", &writes)
        .await
        .unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved.first().unwrap().value, "250");
}

#[tokio::test]
async fn test_set_metafields_user_errors_become_banners() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "metafieldsSet": {
                    "metafields": [],
                    "userErrors": [{
                        "field": ["metafields", "0", "value"],
                        "message": "Value must be an integer.",
                        "code": "INVALID_VALUE"
                    }]
                }
            }
        })))
        .mount(&server)
        .await;

    let writes = [MetafieldWrite {
        namespace: "specs".to_string(),
        key: "weight_grams".to_string(),
        field_type: "number_integer".to_string(),
        value: "heavy".to_string(),
    }];

    let err = client(&server)
        .set_metafields("gid://shopify/Product/7", &writes)
        .await
        .unwrap_err();
    let messages = err.user_messages();
    assert_eq!(messages.len(), 1);
    assert!(messages.first().unwrap().contains("Value must be an integer."));
}

#[tokio::test]
async fn test_delete_nothing_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let deleted = client(&server)
        .delete_metafields("gid://shopify/Product/7", &[])
        .await
        .unwrap();
    assert_eq!(deleted, 0);
}

#[tokio::test]
async fn test_usage_record_over_cap_is_user_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "operationName": "AppUsageRecordCreate",
            "variables": { "idempotencyKey": "usage-1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "appUsageRecordCreate": {
                    "appUsageRecord": null,
                    "userErrors": [{
                        "field": ["price"],
                        "message": "Total price exceeds balance remaining"
                    }]
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .create_usage_record(
            "gid://shopify/AppSubscriptionLineItem/9",
            Money::parse("75.00", "USD").unwrap(),
            "Image processing",
            "usage-1",
        )
        .await
        .unwrap_err();
    assert!(
        err.user_messages()
            .iter()
            .any(|m| m.contains("exceeds balance remaining"))
    );
}

#[tokio::test]
async fn test_usage_record_created() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "appUsageRecordCreate": {
                    "appUsageRecord": {
                        "id": "gid://shopify/AppUsageRecord/5",
                        "description": "Image processing",
                        "createdAt": "2026-10-02T08:30:00Z",
                        "price": { "amount": "1.50", "currencyCode": "USD" }
                    },
                    "userErrors": []
                }
            }
        })))
        .mount(&server)
        .await;

    let record = client(&server)
        .create_usage_record(
            "gid://shopify/AppSubscriptionLineItem/9",
            Money::parse("1.50", "USD").unwrap(),
            "Image processing",
            "usage-2",
        )
        .await
        .unwrap();
    assert_eq!(record.id, "gid://shopify/AppUsageRecord/5");
    assert_eq!(record.price, Money::parse("1.50", "USD").unwrap());
    assert!(record.created_at.is_some());
}

#[tokio::test]
async fn test_installation_billing_splits_line_items() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(operation("CurrentInstallationBilling")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "currentAppInstallation": {
                    "activeSubscriptions": [{
                        "id": "gid://shopify/AppSubscription/3",
                        "name": "Growth",
                        "status": "ACTIVE",
                        "test": true,
                        "trialDays": 7,
                        "currentPeriodEnd": "2026-11-01T00:00:00Z",
                        "createdAt": "2026-10-02T00:00:00Z",
                        "lineItems": [
                            {
                                "id": "gid://shopify/AppSubscriptionLineItem/8",
                                "plan": { "pricingDetails": {
                                    "__typename": "AppRecurringPricing",
                                    "interval": "EVERY_30_DAYS",
                                    "price": { "amount": "29.00", "currencyCode": "USD" }
                                } }
                            },
                            {
                                "id": "gid://shopify/AppSubscriptionLineItem/9",
                                "plan": { "pricingDetails": {
                                    "__typename": "AppUsagePricing",
                                    "terms": "Image processing",
                                    "cappedAmount": { "amount": "100.00", "currencyCode": "USD" },
                                    "balanceUsed": { "amount": "12.50", "currencyCode": "USD" }
                                } }
                            }
                        ]
                    }],
                    "oneTimePurchases": {
                        "nodes": [{
                            "id": "gid://shopify/AppPurchaseOneTime/4",
                            "name": "Setup",
                            "status": "DECLINED",
                            "test": true,
                            "createdAt": "2026-10-03T00:00:00Z",
                            "price": { "amount": "49.00", "currencyCode": "USD" }
                        }]
                    }
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let billing = client(&server).installation_billing().await.unwrap();

    let subscription = billing.subscriptions.first().unwrap();
    assert_eq!(subscription.status, SubscriptionStatus::Active);
    assert_eq!(subscription.interval, Some(BillingInterval::Every30Days));
    assert_eq!(subscription.recurring_price, Some(Money::parse("29.00", "USD").unwrap()));
    assert_eq!(
        subscription.usage_line_item_id.as_deref(),
        Some("gid://shopify/AppSubscriptionLineItem/9")
    );
    assert_eq!(subscription.balance_used, Some(Money::parse("12.50", "USD").unwrap()));

    let purchase = billing.purchases.first().unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Declined);
    assert_eq!(purchase.price, Some(Money::parse("49.00", "USD").unwrap()));
}
