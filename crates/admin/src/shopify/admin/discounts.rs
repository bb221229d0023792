//! Discount code management operations for the Admin API.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::instrument;

use super::{
    AdminClient, AdminShopifyError, check_user_errors, missing,
    queries::IdVariables,
    queries::discounts::{
        AllSelection, CodeDiscountNode, CustomerGetsInput, CustomerGetsValueInput,
        DiscountAmountInput, DiscountCodeActivate, DiscountCodeBasicCreate,
        DiscountCodeBasicCreateVariables, DiscountCodeBasicInput, DiscountCodeBasicUpdate,
        DiscountCodeBasicUpdateVariables, DiscountCodeDeactivate, DiscountCodeDelete,
        DiscountNodePayload, GetDiscountCode, GetDiscountCodes, GetDiscountCodesVariables,
    },
};
use crate::shopify::types::{
    DiscountCode, DiscountCodeConnection, DiscountInput, DiscountStatus, DiscountValue,
    DiscountValueInput,
};

const SUPPORTED_TYPES: [&str; 3] = [
    "DiscountCodeBasic",
    "DiscountCodeBxgy",
    "DiscountCodeFreeShipping",
];

fn convert_status(status: Option<&str>) -> DiscountStatus {
    match status {
        Some("EXPIRED") => DiscountStatus::Expired,
        Some("SCHEDULED") => DiscountStatus::Scheduled,
        _ => DiscountStatus::Active,
    }
}

/// Convert a code discount node; app and automatic discounts yield `None`.
fn convert_discount(node: CodeDiscountNode) -> Result<Option<DiscountCode>, AdminShopifyError> {
    let cd = node.code_discount;
    if !SUPPORTED_TYPES.contains(&cd.typename.as_str()) {
        return Ok(None);
    }

    let value = match cd.customer_gets.map(|g| g.value) {
        Some(v) if v.typename == "DiscountPercentage" => v
            .percentage
            .map(|percentage| DiscountValue::Percentage { percentage }),
        Some(v) if v.typename == "DiscountAmount" => v
            .amount
            .map(|m| m.to_money())
            .transpose()?
            .map(|amount| DiscountValue::FixedAmount { amount }),
        _ => None,
    };

    let code = cd
        .codes
        .and_then(|c| c.nodes.into_iter().next())
        .map(|c| c.code)
        .unwrap_or_default();

    Ok(Some(DiscountCode {
        id: node.id,
        title: cd.title,
        code,
        status: convert_status(cd.status.as_deref()),
        kind: cd.typename,
        value,
        starts_at: cd.starts_at,
        ends_at: cd.ends_at,
        usage_limit: cd.usage_limit,
        usage_count: cd.async_usage_count,
    }))
}

/// Build the `DiscountCodeBasicInput` for an order-wide code for all customers.
fn basic_input(input: &DiscountInput) -> DiscountCodeBasicInput {
    let value = match input.value {
        DiscountValueInput::Percentage(pct) => CustomerGetsValueInput {
            percentage: (pct / Decimal::ONE_HUNDRED).to_f64(),
            discount_amount: None,
        },
        DiscountValueInput::FixedAmount(amount) => CustomerGetsValueInput {
            percentage: None,
            discount_amount: Some(DiscountAmountInput {
                amount,
                applies_on_each_item: false,
            }),
        },
    };

    DiscountCodeBasicInput {
        title: input.title.clone(),
        code: input.code.clone(),
        starts_at: input.starts_at,
        ends_at: input.ends_at,
        usage_limit: input.usage_limit,
        applies_once_per_customer: input.once_per_customer,
        customer_selection: AllSelection { all: true },
        customer_gets: CustomerGetsInput {
            value,
            items: AllSelection { all: true },
        },
    }
}

fn node_id(payload: Option<DiscountNodePayload>, op: &str) -> Result<String, AdminShopifyError> {
    let payload = payload.ok_or_else(|| missing(&format!("No payload returned from {op}")))?;
    check_user_errors(payload.user_errors)?;
    payload
        .code_discount_node
        .map(|n| n.id)
        .ok_or_else(|| missing(&format!("No discount returned from {op}")))
}

impl AdminClient {
    /// Get a page of code discounts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_discounts(
        &self,
        first: i64,
        after: Option<String>,
        query: Option<String>,
    ) -> Result<DiscountCodeConnection, AdminShopifyError> {
        let variables = GetDiscountCodesVariables {
            first,
            after,
            query,
        };

        let response = self.execute::<GetDiscountCodes>(variables).await?;
        let connection = response.code_discount_nodes;

        let mut discount_codes = Vec::with_capacity(connection.nodes.len());
        for node in connection.nodes {
            if let Some(code) = convert_discount(node)? {
                discount_codes.push(code);
            }
        }

        Ok(DiscountCodeConnection {
            discount_codes,
            page_info: connection.page_info,
        })
    }

    /// Get a single code discount.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(discount_id = %id))]
    pub async fn get_discount(&self, id: &str) -> Result<Option<DiscountCode>, AdminShopifyError> {
        let response = self
            .execute::<GetDiscountCode>(IdVariables { id: id.to_string() })
            .await?;

        match response.code_discount_node {
            Some(node) => convert_discount(node),
            None => Ok(None),
        }
    }

    /// Create a basic discount code (percentage or fixed amount off the order).
    ///
    /// # Errors
    ///
    /// Returns `UserErrors` (e.g. a duplicate code) or an API error.
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_discount(&self, input: &DiscountInput) -> Result<String, AdminShopifyError> {
        let variables = DiscountCodeBasicCreateVariables {
            basic_code_discount: basic_input(input),
        };

        let response = self.execute::<DiscountCodeBasicCreate>(variables).await?;
        node_id(response.discount_code_basic_create, "discountCodeBasicCreate")
    }

    /// Replace the editable fields of a basic discount code.
    ///
    /// # Errors
    ///
    /// Returns `UserErrors` or an API error.
    #[instrument(skip(self, input), fields(discount_id = %id))]
    pub async fn update_discount(
        &self,
        id: &str,
        input: &DiscountInput,
    ) -> Result<String, AdminShopifyError> {
        let variables = DiscountCodeBasicUpdateVariables {
            id: id.to_string(),
            basic_code_discount: basic_input(input),
        };

        let response = self.execute::<DiscountCodeBasicUpdate>(variables).await?;
        node_id(response.discount_code_basic_update, "discountCodeBasicUpdate")
    }

    /// Activate a discount code.
    ///
    /// # Errors
    ///
    /// Returns `UserErrors` or an API error.
    #[instrument(skip(self))]
    pub async fn activate_discount(&self, id: &str) -> Result<(), AdminShopifyError> {
        let response = self
            .execute::<DiscountCodeActivate>(IdVariables { id: id.to_string() })
            .await?;
        node_id(response.discount_code_activate, "discountCodeActivate").map(|_| ())
    }

    /// Deactivate a discount code.
    ///
    /// # Errors
    ///
    /// Returns `UserErrors` or an API error.
    #[instrument(skip(self))]
    pub async fn deactivate_discount(&self, id: &str) -> Result<(), AdminShopifyError> {
        let response = self
            .execute::<DiscountCodeDeactivate>(IdVariables { id: id.to_string() })
            .await?;
        node_id(response.discount_code_deactivate, "discountCodeDeactivate").map(|_| ())
    }

    /// Permanently delete a discount code.
    ///
    /// # Errors
    ///
    /// Returns `UserErrors` or an API error.
    #[instrument(skip(self))]
    pub async fn delete_discount(&self, id: &str) -> Result<(), AdminShopifyError> {
        let payload = self
            .execute::<DiscountCodeDelete>(IdVariables { id: id.to_string() })
            .await?
            .discount_code_delete
            .ok_or_else(|| missing("No payload returned from discountCodeDelete"))?;
        check_user_errors(payload.user_errors)?;

        if payload.deleted_code_discount_id.is_some() {
            Ok(())
        } else {
            Err(AdminShopifyError::NotFound(id.to_string()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn node(json: serde_json::Value) -> CodeDiscountNode {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_convert_basic_percentage() {
        let code = convert_discount(node(serde_json::json!({
            "id": "gid://shopify/DiscountCodeNode/1",
            "codeDiscount": {
                "__typename": "DiscountCodeBasic",
                "title": "Spring",
                "status": "SCHEDULED",
                "startsAt": "2026-03-01T00:00:00Z",
                "endsAt": null,
                "usageLimit": 100,
                "asyncUsageCount": 4,
                "codes": { "nodes": [{ "code": "SPRING20" }] },
                "customerGets": { "value": { "__typename": "DiscountPercentage", "percentage": 0.2 } }
            }
        })))
        .unwrap()
        .unwrap();

        assert_eq!(code.code, "SPRING20");
        assert_eq!(code.status, DiscountStatus::Scheduled);
        assert_eq!(code.value, Some(DiscountValue::Percentage { percentage: 0.2 }));
        assert_eq!(code.usage_count, 4);
        assert!(code.is_basic());
    }

    #[test]
    fn test_convert_free_shipping_has_no_value() {
        let code = convert_discount(node(serde_json::json!({
            "id": "gid://shopify/DiscountCodeNode/2",
            "codeDiscount": {
                "__typename": "DiscountCodeFreeShipping",
                "title": "Ship free",
                "status": "ACTIVE",
                "asyncUsageCount": 0,
                "codes": { "nodes": [{ "code": "SHIPFREE" }] }
            }
        })))
        .unwrap()
        .unwrap();
        assert!(code.value.is_none());
        assert!(!code.is_basic());
    }

    #[test]
    fn test_convert_skips_app_discounts() {
        let converted = convert_discount(node(serde_json::json!({
            "id": "gid://shopify/DiscountCodeNode/3",
            "codeDiscount": { "__typename": "DiscountCodeApp" }
        })))
        .unwrap();
        assert!(converted.is_none());
    }

    #[test]
    fn test_basic_input_shape() {
        let input = DiscountInput {
            title: "Ten off".to_string(),
            code: "TENOFF".to_string(),
            value: DiscountValueInput::FixedAmount(Decimal::from(10)),
            starts_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            ends_at: None,
            usage_limit: Some(50),
            once_per_customer: true,
        };
        let json = serde_json::to_value(basic_input(&input)).unwrap();
        assert_eq!(json["customerSelection"]["all"], true);
        assert_eq!(json["appliesOncePerCustomer"], true);
        assert_eq!(json["customerGets"]["value"]["discountAmount"]["amount"], "10");
        assert_eq!(
            json["customerGets"]["value"]["discountAmount"]["appliesOnEachItem"],
            false
        );
        assert!(json["customerGets"]["value"].get("percentage").is_none());

        let pct = DiscountInput {
            value: DiscountValueInput::Percentage(Decimal::from(15)),
            ..input
        };
        let json = serde_json::to_value(basic_input(&pct)).unwrap();
        assert_eq!(json["customerGets"]["value"]["percentage"], 0.15);
    }
}
