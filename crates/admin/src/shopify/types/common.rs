//! Common types shared across Admin API domains.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use storekeep_core::{Money, MoneyError};

/// `MoneyV2` as returned by the Admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyV2 {
    /// Decimal amount (sent as a string).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: String,
}

impl MoneyV2 {
    /// Convert into a core [`Money`].
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::UnsupportedCurrency` for currencies the app doesn't bill in.
    pub fn to_money(&self) -> Result<Money, MoneyError> {
        Ok(Money::new(self.amount, self.currency_code.parse()?))
    }
}

impl From<Money> for MoneyV2 {
    fn from(money: Money) -> Self {
        Self {
            amount: money.amount,
            currency_code: money.currency_code.as_str().to_string(),
        }
    }
}

/// Pagination info for connections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Whether there are more items after this page.
    pub has_next_page: bool,
    /// Cursor of the last item in this page.
    pub end_cursor: Option<String>,
}

/// A `userErrors` entry of a mutation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserError {
    /// Path to the offending input field.
    #[serde(default)]
    pub field: Option<Vec<String>>,
    /// Human-readable message.
    pub message: String,
    /// Machine-readable code, when the mutation provides one.
    #[serde(default)]
    pub code: Option<String>,
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field.as_deref() {
            Some(path) if !path.is_empty() => write!(f, "{}: {}", path.join("."), self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// Build a `gid://shopify/<kind>/<id>` from a numeric ID, passing GIDs through.
#[must_use]
pub fn to_gid(kind: &str, id: &str) -> String {
    if id.starts_with("gid://") {
        id.to_string()
    } else {
        format!("gid://shopify/{kind}/{id}")
    }
}

/// The trailing numeric part of a GID, for URLs.
#[must_use]
pub fn gid_tail(gid: &str) -> &str {
    gid.rsplit('/').next().unwrap_or(gid)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use storekeep_core::CurrencyCode;

    use super::*;

    #[test]
    fn test_money_v2_deserializes_string_amounts() {
        let m: MoneyV2 =
            serde_json::from_str(r#"{"amount":"19.99","currencyCode":"CAD"}"#).unwrap();
        let money = m.to_money().unwrap();
        assert_eq!(money.amount, Decimal::new(1999, 2));
        assert_eq!(money.currency_code, CurrencyCode::CAD);
    }

    #[test]
    fn test_gid_helpers() {
        assert_eq!(
            to_gid("DiscountCodeNode", "42"),
            "gid://shopify/DiscountCodeNode/42"
        );
        assert_eq!(
            to_gid("Product", "gid://shopify/Product/7"),
            "gid://shopify/Product/7"
        );
        assert_eq!(gid_tail("gid://shopify/Product/7"), "7");
        assert_eq!(gid_tail("7"), "7");
    }
}
