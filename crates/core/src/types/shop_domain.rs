//! Shop domain type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`ShopDomain`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShopDomainError {
    /// The input string is empty.
    #[error("shop domain cannot be empty")]
    Empty,
    /// The input is not a `*.myshopify.com` domain.
    #[error("shop domain must end with .myshopify.com")]
    WrongSuffix,
    /// The store handle contains characters outside `[a-z0-9-]`.
    #[error("shop handle may only contain lowercase letters, digits and hyphens")]
    InvalidHandle,
}

/// A validated `*.myshopify.com` shop domain.
///
/// Input is normalised to lowercase with any scheme, path and trailing dot
/// removed. Admin URLs of the form `admin.shopify.com/store/<handle>` are
/// accepted and mapped to `<handle>.myshopify.com`.
///
/// ## Examples
///
/// ```
/// use storekeep_core::ShopDomain;
///
/// let shop = ShopDomain::parse("https://My-Store.myshopify.com/admin").unwrap();
/// assert_eq!(shop.as_str(), "my-store.myshopify.com");
/// assert_eq!(shop.handle(), "my-store");
///
/// let shop = ShopDomain::parse("admin.shopify.com/store/other-store").unwrap();
/// assert_eq!(shop.as_str(), "other-store.myshopify.com");
///
/// assert!(ShopDomain::parse("evil.com").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct ShopDomain(String);

impl ShopDomain {
    /// Suffix every shop domain carries.
    pub const SUFFIX: &'static str = ".myshopify.com";

    /// Parse and normalise a shop domain.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, is not a myshopify domain, or
    /// the handle contains invalid characters.
    pub fn parse(input: &str) -> Result<Self, ShopDomainError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ShopDomainError::Empty);
        }

        let lower = trimmed.to_ascii_lowercase();
        let without_scheme = lower
            .strip_prefix("https://")
            .or_else(|| lower.strip_prefix("http://"))
            .unwrap_or(&lower);

        if let Some(rest) = without_scheme.strip_prefix("admin.shopify.com/store/") {
            let handle = rest.split('/').next().unwrap_or_default();
            validate_handle(handle)?;
            return Ok(Self(format!("{handle}{}", Self::SUFFIX)));
        }

        let host = without_scheme
            .split('/')
            .next()
            .unwrap_or_default()
            .trim_end_matches('.');

        let handle = host
            .strip_suffix(Self::SUFFIX)
            .ok_or(ShopDomainError::WrongSuffix)?;
        validate_handle(handle)?;

        Ok(Self(host.to_string()))
    }

    /// Returns the domain as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the store handle (the part before `.myshopify.com`).
    #[must_use]
    pub fn handle(&self) -> &str {
        self.0.strip_suffix(Self::SUFFIX).unwrap_or(&self.0)
    }

    /// Returns the `https://` origin of the shop.
    #[must_use]
    pub fn origin(&self) -> String {
        format!("https://{}", self.0)
    }

    /// Returns the embedded admin URL of the app for this shop.
    #[must_use]
    pub fn admin_app_url(&self, api_key: &str) -> String {
        format!(
            "https://admin.shopify.com/store/{}/apps/{api_key}",
            self.handle()
        )
    }
}

fn validate_handle(handle: &str) -> Result<(), ShopDomainError> {
    if handle.is_empty() {
        return Err(ShopDomainError::Empty);
    }
    let valid = handle
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !handle.starts_with('-');
    if valid {
        Ok(())
    } else {
        Err(ShopDomainError::InvalidHandle)
    }
}

impl fmt::Display for ShopDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ShopDomain {
    type Err = ShopDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ShopDomain {
    type Error = ShopDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShopDomain> for String {
    fn from(value: ShopDomain) -> Self {
        value.0
    }
}

impl AsRef<str> for ShopDomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for ShopDomain {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ShopDomain {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        // Database values are assumed valid
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for ShopDomain {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_domain() {
        let shop = ShopDomain::parse("cool-shop.myshopify.com").unwrap();
        assert_eq!(shop.as_str(), "cool-shop.myshopify.com");
        assert_eq!(shop.handle(), "cool-shop");
    }

    #[test]
    fn test_parse_normalises_case_scheme_and_path() {
        let shop = ShopDomain::parse("  HTTPS://Cool-Shop.MyShopify.com/admin/apps ").unwrap();
        assert_eq!(shop.as_str(), "cool-shop.myshopify.com");
    }

    #[test]
    fn test_parse_trailing_dot() {
        let shop = ShopDomain::parse("cool-shop.myshopify.com.").unwrap();
        assert_eq!(shop.as_str(), "cool-shop.myshopify.com");
    }

    #[test]
    fn test_parse_admin_url() {
        let shop = ShopDomain::parse("https://admin.shopify.com/store/cool-shop/apps/x").unwrap();
        assert_eq!(shop.as_str(), "cool-shop.myshopify.com");
    }

    #[test]
    fn test_parse_rejects_other_hosts() {
        assert_eq!(
            ShopDomain::parse("cool-shop.example.com"),
            Err(ShopDomainError::WrongSuffix)
        );
        assert_eq!(
            ShopDomain::parse("myshopify.com.evil.com"),
            Err(ShopDomainError::WrongSuffix)
        );
    }

    #[test]
    fn test_parse_rejects_bad_handles() {
        assert_eq!(ShopDomain::parse(""), Err(ShopDomainError::Empty));
        assert_eq!(
            ShopDomain::parse(".myshopify.com"),
            Err(ShopDomainError::Empty)
        );
        assert_eq!(
            ShopDomain::parse("bad_shop.myshopify.com"),
            Err(ShopDomainError::InvalidHandle)
        );
        assert_eq!(
            ShopDomain::parse("a.b.myshopify.com"),
            Err(ShopDomainError::InvalidHandle)
        );
    }

    #[test]
    fn test_admin_app_url() {
        let shop = ShopDomain::parse("cool-shop.myshopify.com").unwrap();
        assert_eq!(
            shop.admin_app_url("abc123"),
            "https://admin.shopify.com/store/cool-shop/apps/abc123"
        );
    }

    #[test]
    fn test_serde_validates() {
        let parsed: ShopDomain = serde_json::from_str("\"Cool-Shop.myshopify.com\"").unwrap();
        assert_eq!(parsed.as_str(), "cool-shop.myshopify.com");
        assert!(serde_json::from_str::<ShopDomain>("\"evil.com\"").is_err());
    }
}
