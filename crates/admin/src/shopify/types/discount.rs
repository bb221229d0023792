//! Discount code types.

use core::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use storekeep_core::Money;

use super::common::PageInfo;

/// Discount status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountStatus {
    Active,
    Expired,
    Scheduled,
}

impl fmt::Display for DiscountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Expired => write!(f, "Expired"),
            Self::Scheduled => write!(f, "Scheduled"),
        }
    }
}

/// What a basic discount takes off.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscountValue {
    /// Fraction between 0 and 1, as the API reports it.
    Percentage { percentage: f64 },
    FixedAmount { amount: Money },
}

/// A discount code as listed in the admin.
#[derive(Debug, Clone)]
pub struct DiscountCode {
    /// `gid://shopify/DiscountCodeNode/<n>`
    pub id: String,
    pub title: String,
    pub code: String,
    pub status: DiscountStatus,
    /// Discount class for display (`Amount off`, `Buy X get Y`, `Free shipping`).
    pub kind: String,
    /// Only present for basic (amount off) discounts.
    pub value: Option<DiscountValue>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    pub usage_count: i64,
}

impl DiscountCode {
    /// Whether the form editor supports this discount.
    #[must_use]
    pub const fn is_basic(&self) -> bool {
        self.value.is_some()
    }
}

/// A page of discount codes.
#[derive(Debug, Clone, Default)]
pub struct DiscountCodeConnection {
    pub discount_codes: Vec<DiscountCode>,
    pub page_info: PageInfo,
}

/// Value of a discount being created or edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountValueInput {
    /// Percentage off, 0-100.
    Percentage(Decimal),
    /// Fixed amount off each order in the shop currency.
    FixedAmount(Decimal),
}

/// Input for creating or updating a basic discount code.
#[derive(Debug, Clone)]
pub struct DiscountInput {
    pub title: String,
    pub code: String,
    pub value: DiscountValueInput,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    pub once_per_customer: bool,
}
