//! Installed shops and their staff users.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use storekeep_core::{CurrencyCode, Email, ShopDomain, ShopId, UserId};

/// A shop that installed the app.
///
/// `access_token` is the offline token used by background jobs; it is cleared
/// on uninstall together with setting `uninstalled_at`.
#[derive(Debug, Clone)]
pub struct Shop {
    pub id: ShopId,
    pub domain: ShopDomain,
    pub name: Option<String>,
    pub email: Option<Email>,
    pub currency_code: CurrencyCode,
    pub access_token: Option<SecretString>,
    pub scopes: Vec<String>,
    pub installed_at: DateTime<Utc>,
    pub uninstalled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shop {
    /// Whether the shop currently has the app installed with a usable token.
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        self.uninstalled_at.is_none() && self.access_token.is_some()
    }

    /// Name for page headers, falling back to the store handle.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.domain.handle())
    }

    /// Whether every scope in `required` was granted.
    #[must_use]
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| {
            self.scopes.iter().any(|granted| {
                granted == scope
                    // write_x implies read_x
                    || (scope.starts_with("read_")
                        && granted.strip_prefix("write_") == scope.strip_prefix("read_"))
            })
        })
    }
}

/// A staff member seen through a session token.
#[derive(Debug, Clone)]
pub struct ShopUser {
    pub id: UserId,
    pub shop_id: ShopId,
    pub shopify_user_id: i64,
    pub email: Option<String>,
    pub name: Option<String>,
    pub locale: Option<String>,
    pub account_owner: bool,
    pub last_seen_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn shop(scopes: &[&str]) -> Shop {
        Shop {
            id: ShopId::new(1),
            domain: ShopDomain::parse("demo.myshopify.com").unwrap(),
            name: None,
            email: None,
            currency_code: CurrencyCode::USD,
            access_token: Some(SecretString::from("shpat_token")),
            scopes: scopes.iter().map(ToString::to_string).collect(),
            installed_at: Utc::now(),
            uninstalled_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_display_name_falls_back_to_handle() {
        assert_eq!(shop(&[]).display_name(), "demo");
    }

    #[test]
    fn test_write_scope_implies_read() {
        let s = shop(&["write_products", "read_discounts"]);
        assert!(s.has_scopes(&["read_products".to_string()]));
        assert!(s.has_scopes(&["write_products".to_string(), "read_discounts".to_string()]));
        assert!(!s.has_scopes(&["write_discounts".to_string()]));
    }

    #[test]
    fn test_uninstalled_shop_is_not_installed() {
        let mut s = shop(&[]);
        assert!(s.is_installed());
        s.uninstalled_at = Some(Utc::now());
        assert!(!s.is_installed());
    }
}
