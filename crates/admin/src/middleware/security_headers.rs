//! Security headers for an app embedded in the Shopify admin.
//!
//! The admin frames every page, so `X-Frame-Options` can't be used.
//! `frame-ancestors` is narrowed to the requesting shop when the `shop`
//! query parameter names one.

use axum::{
    extract::Request,
    http::{
        HeaderValue,
        header::{CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS},
    },
    middleware::Next,
    response::Response,
};
use storekeep_core::ShopDomain;

const ADMIN_ORIGIN: &str = "https://admin.shopify.com";

/// `frame-ancestors` for the shop named in a query string.
#[must_use]
pub fn frame_ancestors(query: Option<&str>) -> String {
    let shop = query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == "shop")
            .and_then(|(_, v)| ShopDomain::parse(&v).ok())
    });

    match shop {
        Some(shop) => format!("frame-ancestors {} {ADMIN_ORIGIN};", shop.origin()),
        None => format!("frame-ancestors https://*.myshopify.com {ADMIN_ORIGIN};"),
    }
}

/// Add security headers to all responses.
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let csp = frame_ancestors(request.uri().query());
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    match HeaderValue::from_str(&csp) {
        Ok(value) => {
            headers.insert(CONTENT_SECURITY_POLICY, value);
        }
        Err(e) => tracing::warn!(error = %e, "Invalid frame-ancestors header"),
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_ancestors_for_known_shop() {
        assert_eq!(
            frame_ancestors(Some("shop=cool-shop.myshopify.com&host=abc")),
            "frame-ancestors https://cool-shop.myshopify.com https://admin.shopify.com;"
        );
    }

    #[test]
    fn test_frame_ancestors_fallback() {
        let expected = "frame-ancestors https://*.myshopify.com https://admin.shopify.com;";
        assert_eq!(frame_ancestors(None), expected);
        assert_eq!(frame_ancestors(Some("shop=evil.example.com")), expected);
    }
}
