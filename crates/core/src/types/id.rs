//! Typed `SERIAL` primary keys.
//!
//! Every table keys on an `i32`; wrapping each in its own type keeps a
//! `PlanId` from being passed where a `ShopId` is expected.

/// Declare an `i32` ID newtype.
///
/// The type is `Copy`, serializes as a bare number, displays as the number,
/// and (with the `postgres` feature) binds and decodes as `INTEGER`.
///
/// ```rust
/// # use storekeep_core::define_id;
/// define_id!(WidgetId);
///
/// let id = WidgetId::new(7);
/// assert_eq!(id.as_i32(), 7);
/// assert_eq!(id.to_string(), "7");
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[cfg_attr(feature = "postgres", derive(::sqlx::Type), sqlx(transparent))]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn as_i32(self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(ShopId);
define_id!(UserId);
define_id!(PlanId);
define_id!(SubscriptionId);
define_id!(OneTimePurchaseId);
define_id!(UsageChargeId);
define_id!(CouponId);
define_id!(CategoryId);
define_id!(SectionId);
define_id!(JobId);
define_id!(ChatSessionId);
define_id!(ChatMessageId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip() {
        let id = ShopId::new(42);
        assert_eq!(id.as_i32(), 42);
        assert_eq!(i32::from(id), 42);
        assert_eq!(ShopId::from(42), id);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(PlanId::new(7).to_string(), "7");
        assert_eq!(format!("{:>3}", JobId::new(7)), "  7");
    }

    #[test]
    fn test_id_serde_transparent() {
        let json = serde_json::to_string(&JobId::new(3)).expect("serialize");
        assert_eq!(json, "3");
        let parsed: JobId = serde_json::from_str("3").expect("deserialize");
        assert_eq!(parsed, JobId::new(3));
    }
}
