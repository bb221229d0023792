//! App billing operations: subscriptions, usage records and one-time purchases.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use storekeep_core::{BillingInterval, Money, PurchaseStatus, SubscriptionStatus};
use tracing::instrument;

use super::{
    AdminClient, AdminShopifyError, check_user_errors, missing,
    queries::IdVariables,
    queries::billing::{
        AppPurchaseOneTimeCreate, AppPurchaseOneTimeCreateVariables, AppSubscriptionCancel,
        AppSubscriptionCancelVariables, AppSubscriptionCreate, AppSubscriptionCreateVariables,
        AppUsageRecordCreate, AppUsageRecordCreateVariables, CurrentInstallationBilling,
        DiscountInput, DiscountValueInput, GetPurchase, GetSubscription, LineItemInput,
        MoneyInput, PlanInput, PurchaseNode, RecurringPricingInput, SubscriptionNode,
        UsagePricingInput,
    },
    queries::NoVariables,
};
use crate::shopify::types::{
    AppPurchase, AppSubscription, CreatedPurchase, CreatedSubscription, InstallationBilling,
    SubscriptionDiscountValue, SubscriptionRequest, UsageRecord,
};

fn money_input(money: Money) -> MoneyInput {
    MoneyInput {
        amount: money.amount,
        currency_code: money.currency_code.as_str().to_string(),
    }
}

fn parse_interval(value: &str) -> Option<BillingInterval> {
    match value {
        "EVERY_30_DAYS" => Some(BillingInterval::Every30Days),
        "ANNUAL" => Some(BillingInterval::Annual),
        _ => None,
    }
}

/// Convert the `SubscriptionFields` selection into the domain type.
fn convert_subscription(node: SubscriptionNode) -> Result<AppSubscription, AdminShopifyError> {
    let mut subscription = AppSubscription {
        id: node.id,
        name: node.name,
        status: SubscriptionStatus::from_graphql(&node.status),
        test: node.test,
        trial_days: node.trial_days,
        current_period_end: node.current_period_end,
        created_at: node.created_at,
        recurring_price: None,
        interval: None,
        usage_line_item_id: None,
        capped_amount: None,
        balance_used: None,
    };

    for item in node.line_items {
        let details = item.plan.pricing_details;
        match details.typename.as_str() {
            "AppRecurringPricing" => {
                subscription.recurring_price =
                    details.price.map(|p| p.to_money()).transpose()?;
                subscription.interval = details.interval.as_deref().and_then(parse_interval);
            }
            "AppUsagePricing" => {
                subscription.usage_line_item_id = Some(item.id);
                subscription.capped_amount =
                    details.capped_amount.map(|p| p.to_money()).transpose()?;
                subscription.balance_used =
                    details.balance_used.map(|p| p.to_money()).transpose()?;
            }
            _ => {}
        }
    }

    Ok(subscription)
}

fn convert_purchase(node: PurchaseNode) -> Result<AppPurchase, AdminShopifyError> {
    Ok(AppPurchase {
        id: node.id,
        name: node.name,
        status: PurchaseStatus::from_graphql(&node.status),
        test: node.test,
        price: node.price.map(|p| p.to_money()).transpose()?,
        created_at: node.created_at,
    })
}

/// Build the line items for a subscription request.
fn line_items(request: &SubscriptionRequest) -> Vec<LineItemInput> {
    let discount = request.discount.map(|d| DiscountInput {
        duration_limit_in_intervals: d.duration_intervals,
        value: match d.value {
            SubscriptionDiscountValue::Percentage(pct) => DiscountValueInput {
                percentage: (pct / Decimal::ONE_HUNDRED).to_f64(),
                amount: None,
            },
            SubscriptionDiscountValue::Amount(amount) => DiscountValueInput {
                percentage: None,
                amount: Some(amount),
            },
        },
    });

    let mut items = vec![LineItemInput {
        plan: PlanInput {
            app_recurring_pricing_details: Some(RecurringPricingInput {
                price: money_input(request.price),
                interval: request.interval.graphql_value(),
                discount,
            }),
            app_usage_pricing_details: None,
        },
    }];

    if let Some(usage) = &request.usage {
        items.push(LineItemInput {
            plan: PlanInput {
                app_recurring_pricing_details: None,
                app_usage_pricing_details: Some(UsagePricingInput {
                    terms: usage.terms.clone(),
                    capped_amount: money_input(usage.capped_amount),
                }),
            },
        });
    }

    items
}

impl AdminClient {
    /// Create a recurring subscription and return the merchant confirmation URL.
    ///
    /// # Errors
    ///
    /// Returns `UserErrors` if Shopify rejects the request, or an error if the
    /// API request fails.
    #[instrument(skip(self, request), fields(plan = %request.name, test = request.test))]
    pub async fn create_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<CreatedSubscription, AdminShopifyError> {
        let variables = AppSubscriptionCreateVariables {
            name: request.name.clone(),
            line_items: line_items(request),
            return_url: request.return_url.clone(),
            test: request.test,
            trial_days: request.trial_days,
        };

        let payload = self
            .execute::<AppSubscriptionCreate>(variables)
            .await?
            .app_subscription_create
            .ok_or_else(|| missing("No payload returned from appSubscriptionCreate"))?;
        check_user_errors(payload.user_errors)?;

        match (payload.app_subscription, payload.confirmation_url) {
            (Some(node), Some(confirmation_url)) => Ok(CreatedSubscription {
                subscription: convert_subscription(node)?,
                confirmation_url,
            }),
            _ => Err(missing("No subscription returned from create")),
        }
    }

    /// Cancel a subscription, returning its new status.
    ///
    /// # Errors
    ///
    /// Returns `UserErrors` if the subscription cannot be cancelled.
    #[instrument(skip(self))]
    pub async fn cancel_subscription(
        &self,
        id: &str,
        prorate: bool,
    ) -> Result<SubscriptionStatus, AdminShopifyError> {
        let variables = AppSubscriptionCancelVariables {
            id: id.to_string(),
            prorate,
        };

        let payload = self
            .execute::<AppSubscriptionCancel>(variables)
            .await?
            .app_subscription_cancel
            .ok_or_else(|| missing("No payload returned from appSubscriptionCancel"))?;
        check_user_errors(payload.user_errors)?;

        payload
            .app_subscription
            .map(|s| SubscriptionStatus::from_graphql(&s.status))
            .ok_or_else(|| missing("No subscription returned from cancel"))
    }

    /// Look up one subscription by GID.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_subscription(
        &self,
        id: &str,
    ) -> Result<Option<AppSubscription>, AdminShopifyError> {
        let response = self
            .execute::<GetSubscription>(IdVariables { id: id.to_string() })
            .await?;

        response
            .node
            .filter(|node| !node.id.is_empty())
            .map(convert_subscription)
            .transpose()
    }

    /// Active subscriptions and recent one-time purchases of this installation.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(shop = %self.shop()))]
    pub async fn installation_billing(&self) -> Result<InstallationBilling, AdminShopifyError> {
        let installation = self
            .execute::<CurrentInstallationBilling>(NoVariables {})
            .await?
            .current_app_installation;

        Ok(InstallationBilling {
            subscriptions: installation
                .active_subscriptions
                .into_iter()
                .map(convert_subscription)
                .collect::<Result<_, _>>()?,
            purchases: installation
                .one_time_purchases
                .nodes
                .into_iter()
                .map(convert_purchase)
                .collect::<Result<_, _>>()?,
        })
    }

    /// Record a usage charge against a subscription's usage line item.
    ///
    /// `idempotency_key` makes retries safe: Shopify returns the original
    /// record for a repeated key instead of charging twice.
    ///
    /// # Errors
    ///
    /// Returns `UserErrors` when the charge would exceed the capped amount or
    /// is otherwise rejected.
    #[instrument(skip(self, description), fields(amount = %price))]
    pub async fn create_usage_record(
        &self,
        line_item_id: &str,
        price: Money,
        description: &str,
        idempotency_key: &str,
    ) -> Result<UsageRecord, AdminShopifyError> {
        let variables = AppUsageRecordCreateVariables {
            subscription_line_item_id: line_item_id.to_string(),
            price: money_input(price),
            description: description.to_string(),
            idempotency_key: idempotency_key.to_string(),
        };

        let payload = self
            .execute::<AppUsageRecordCreate>(variables)
            .await?
            .app_usage_record_create
            .ok_or_else(|| missing("No payload returned from appUsageRecordCreate"))?;
        check_user_errors(payload.user_errors)?;

        let record = payload
            .app_usage_record
            .ok_or_else(|| missing("No usage record returned from create"))?;
        Ok(UsageRecord {
            id: record.id,
            description: record.description,
            price: record.price.to_money()?,
            created_at: record.created_at,
        })
    }

    /// Create a one-time purchase and return the merchant confirmation URL.
    ///
    /// # Errors
    ///
    /// Returns `UserErrors` if Shopify rejects the purchase.
    #[instrument(skip(self, return_url), fields(amount = %price))]
    pub async fn create_one_time_purchase(
        &self,
        name: &str,
        price: Money,
        return_url: &str,
        test: bool,
    ) -> Result<CreatedPurchase, AdminShopifyError> {
        let variables = AppPurchaseOneTimeCreateVariables {
            name: name.to_string(),
            price: money_input(price),
            return_url: return_url.to_string(),
            test,
        };

        let payload = self
            .execute::<AppPurchaseOneTimeCreate>(variables)
            .await?
            .app_purchase_one_time_create
            .ok_or_else(|| missing("No payload returned from appPurchaseOneTimeCreate"))?;
        check_user_errors(payload.user_errors)?;

        match (payload.app_purchase_one_time, payload.confirmation_url) {
            (Some(node), Some(confirmation_url)) => Ok(CreatedPurchase {
                purchase: convert_purchase(node)?,
                confirmation_url,
            }),
            _ => Err(missing("No purchase returned from create")),
        }
    }

    /// Look up one one-time purchase by GID.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_purchase(&self, id: &str) -> Result<Option<AppPurchase>, AdminShopifyError> {
        let response = self
            .execute::<GetPurchase>(IdVariables { id: id.to_string() })
            .await?;

        response
            .node
            .filter(|node| !node.id.is_empty())
            .map(convert_purchase)
            .transpose()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use storekeep_core::CurrencyCode;

    use super::*;
    use crate::shopify::types::{SubscriptionDiscount, UsagePricing};

    fn request() -> SubscriptionRequest {
        SubscriptionRequest {
            name: "Growth".to_string(),
            return_url: "https://app.example.com/billing/confirm".to_string(),
            test: true,
            trial_days: 7,
            price: Money::new(Decimal::new(2900, 2), CurrencyCode::USD),
            interval: BillingInterval::Every30Days,
            discount: Some(SubscriptionDiscount {
                value: SubscriptionDiscountValue::Percentage(Decimal::from(25)),
                duration_intervals: Some(3),
            }),
            usage: Some(UsagePricing {
                capped_amount: Money::new(Decimal::from(100), CurrencyCode::USD),
                terms: "$0.10 per report".to_string(),
            }),
        }
    }

    #[test]
    fn test_line_items_shape() {
        let json = serde_json::to_value(line_items(&request())).unwrap();
        let recurring = &json[0]["plan"]["appRecurringPricingDetails"];
        assert_eq!(recurring["interval"], "EVERY_30_DAYS");
        assert_eq!(recurring["price"]["amount"], "29.00");
        assert_eq!(recurring["discount"]["durationLimitInIntervals"], 3);
        assert_eq!(recurring["discount"]["value"]["percentage"], 0.25);
        assert!(recurring["discount"]["value"].get("amount").is_none());

        let usage = &json[1]["plan"]["appUsagePricingDetails"];
        assert_eq!(usage["cappedAmount"]["amount"], "100");
        assert_eq!(usage["terms"], "$0.10 per report");
    }

    #[test]
    fn test_line_items_without_usage_or_discount() {
        let mut req = request();
        req.usage = None;
        req.discount = None;
        let json = serde_json::to_value(line_items(&req)).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert!(json[0]["plan"]["appRecurringPricingDetails"].get("discount").is_none());
    }

    #[test]
    fn test_convert_subscription_reads_both_line_items() {
        let node: SubscriptionNode = serde_json::from_value(serde_json::json!({
            "id": "gid://shopify/AppSubscription/1",
            "name": "Growth",
            "status": "ACTIVE",
            "test": true,
            "trialDays": 7,
            "currentPeriodEnd": "2026-11-01T00:00:00Z",
            "createdAt": "2026-10-01T00:00:00Z",
            "lineItems": [
                {
                    "id": "gid://shopify/AppSubscriptionLineItem/10",
                    "plan": { "pricingDetails": {
                        "__typename": "AppRecurringPricing",
                        "interval": "EVERY_30_DAYS",
                        "price": { "amount": "29.0", "currencyCode": "USD" }
                    }}
                },
                {
                    "id": "gid://shopify/AppSubscriptionLineItem/11",
                    "plan": { "pricingDetails": {
                        "__typename": "AppUsagePricing",
                        "terms": "per report",
                        "cappedAmount": { "amount": "100.0", "currencyCode": "USD" },
                        "balanceUsed": { "amount": "12.5", "currencyCode": "USD" }
                    }}
                }
            ]
        }))
        .unwrap();

        let sub = convert_subscription(node).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.interval, Some(BillingInterval::Every30Days));
        assert_eq!(sub.recurring_price.unwrap().amount, Decimal::new(290, 1));
        assert_eq!(
            sub.usage_line_item_id.as_deref(),
            Some("gid://shopify/AppSubscriptionLineItem/11")
        );
        assert_eq!(sub.balance_used.unwrap().amount, Decimal::new(125, 1));
    }

    #[test]
    fn test_node_of_other_type_decodes_empty() {
        let node: SubscriptionNode = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(node.id.is_empty());
    }
}
