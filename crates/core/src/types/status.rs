//! Status enums for various entities.
//!
//! Each enum maps to a `PostgreSQL` enum in the `app` schema (with the
//! `postgres` feature) and to a lowercase `snake_case` string everywhere else.

use serde::{Deserialize, Serialize};

/// Error returned when a status string does not match any variant.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseStatusError {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Implements `as_str`, `Display` and `FromStr` from one variant/string table.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The canonical string form.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = ParseStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    _ => Err(ParseStatusError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

/// Lifecycle of a recurring app subscription.
///
/// Mirrors the billing API's `AppSubscriptionStatus`, plus the local-only
/// `Pending` state between creation and merchant approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "app.subscription_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Pending,
    Active,
    Declined,
    Expired,
    Frozen,
    Cancelled,
}

string_enum!(SubscriptionStatus, "subscription status", {
    Pending => "pending",
    Active => "active",
    Declined => "declined",
    Expired => "expired",
    Frozen => "frozen",
    Cancelled => "cancelled",
});

impl SubscriptionStatus {
    /// Map the GraphQL `AppSubscriptionStatus` value.
    ///
    /// `ACCEPTED` is the transitional state right after approval and is
    /// treated as active.
    #[must_use]
    pub fn from_graphql(value: &str) -> Self {
        match value {
            "ACTIVE" | "ACCEPTED" => Self::Active,
            "DECLINED" => Self::Declined,
            "EXPIRED" => Self::Expired,
            "FROZEN" => Self::Frozen,
            "CANCELLED" => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    /// Whether the subscription grants access to paid features.
    #[must_use]
    pub const fn is_billable(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Declined | Self::Expired | Self::Cancelled)
    }
}

/// Lifecycle of a one-time app purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "app.purchase_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    #[default]
    Pending,
    Active,
    Declined,
    Expired,
}

string_enum!(PurchaseStatus, "purchase status", {
    Pending => "pending",
    Active => "active",
    Declined => "declined",
    Expired => "expired",
});

impl PurchaseStatus {
    /// Map the GraphQL `AppPurchaseStatus` value.
    #[must_use]
    pub fn from_graphql(value: &str) -> Self {
        match value {
            "ACTIVE" | "ACCEPTED" => Self::Active,
            "DECLINED" => Self::Declined,
            "EXPIRED" => Self::Expired,
            _ => Self::Pending,
        }
    }
}

/// Billing interval of a recurring plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "app.billing_interval", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    #[default]
    Every30Days,
    Annual,
}

string_enum!(BillingInterval, "billing interval", {
    Every30Days => "every_30_days",
    Annual => "annual",
});

impl BillingInterval {
    /// The GraphQL `AppPricingInterval` value.
    #[must_use]
    pub const fn graphql_value(self) -> &'static str {
        match self {
            Self::Every30Days => "EVERY_30_DAYS",
            Self::Annual => "ANNUAL",
        }
    }

    /// Human label for plan cards.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Every30Days => "month",
            Self::Annual => "year",
        }
    }
}

/// Kind of promo code discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "app.coupon_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum CouponKind {
    /// `value` is a percentage (0-100).
    Percentage,
    /// `value` is an amount in the billing currency.
    FixedAmount,
}

string_enum!(CouponKind, "coupon kind", {
    Percentage => "percentage",
    FixedAmount => "fixed_amount",
});

/// State of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "app.job_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for `run_at`.
    #[default]
    Queued,
    /// Claimed by a worker.
    Running,
    Completed,
    /// Last attempt failed; will be retried.
    Failed,
    /// Out of attempts.
    Dead,
}

string_enum!(JobStatus, "job status", {
    Queued => "queued",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
    Dead => "dead",
});

/// Which handler processes a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "app.job_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Email,
    Image,
    Report,
}

string_enum!(JobKind, "job kind", {
    Email => "email",
    Image => "image",
    Report => "report",
});

/// Chat message role for the merchant assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "app.chat_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

string_enum!(ChatRole, "chat role", {
    User => "user",
    Assistant => "assistant",
});

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_status_from_graphql() {
        assert_eq!(SubscriptionStatus::from_graphql("ACTIVE"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::from_graphql("ACCEPTED"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::from_graphql("FROZEN"), SubscriptionStatus::Frozen);
        assert_eq!(SubscriptionStatus::from_graphql("PENDING"), SubscriptionStatus::Pending);
        assert_eq!(SubscriptionStatus::from_graphql("???"), SubscriptionStatus::Pending);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SubscriptionStatus::Cancelled.is_terminal());
        assert!(SubscriptionStatus::Declined.is_terminal());
        assert!(!SubscriptionStatus::Frozen.is_terminal());
        assert!(!SubscriptionStatus::Active.is_terminal());
    }

    #[test]
    fn test_string_round_trip() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), *status);
        }
        for interval in BillingInterval::ALL {
            assert_eq!(interval.to_string().parse::<BillingInterval>().unwrap(), *interval);
        }
    }

    #[test]
    fn test_parse_error_names_the_enum() {
        let err = "weekly".parse::<BillingInterval>().unwrap_err();
        assert_eq!(err.to_string(), "invalid billing interval: weekly");
    }

    #[test]
    fn test_serde_matches_as_str() {
        let json = serde_json::to_string(&BillingInterval::Every30Days).unwrap();
        assert_eq!(json, "\"every_30_days\"");
        let json = serde_json::to_string(&CouponKind::FixedAmount).unwrap();
        assert_eq!(json, "\"fixed_amount\"");
    }
}
