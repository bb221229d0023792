//! App credentials: OAuth install, session tokens, token exchange and HMACs.

use std::sync::Arc;

use base64::Engine;
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use storekeep_core::ShopDomain;
use tracing::instrument;

use super::{AdminClient, AdminShopifyError};
use crate::config::ShopifyConfig;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ID_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:id_token";
const OFFLINE_TOKEN_TYPE: &str = "urn:shopify:params:oauth:token-type:offline-access-token";

/// Clock skew tolerated on `exp` and `nbf`, in seconds.
const SESSION_TOKEN_LEEWAY: u64 = 5;

/// Offline access token granted to the app for one shop.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// Token for `X-Shopify-Access-Token`.
    pub access_token: SecretString,
    /// Granted scopes.
    pub scopes: Vec<String>,
}

/// Claims of an App Bridge session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// `https://<shop>/admin`
    pub iss: String,
    /// `https://<shop>`
    pub dest: String,
    /// The app's API key.
    pub aud: String,
    /// Staff user ID, absent for some non-user contexts.
    #[serde(default)]
    pub sub: Option<String>,
    pub exp: i64,
    pub nbf: i64,
    pub iat: i64,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default)]
    pub sid: Option<String>,
}

impl SessionClaims {
    /// The shop the token was issued for.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSessionToken` if `dest` is not a shop domain.
    pub fn shop(&self) -> Result<ShopDomain, AdminShopifyError> {
        ShopDomain::parse(&self.dest)
            .map_err(|e| AdminShopifyError::InvalidSessionToken(format!("dest: {e}")))
    }

    /// Numeric staff user ID from `sub`.
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        self.sub.as_deref().and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    #[serde(default)]
    scope: String,
}

impl From<AccessTokenResponse> for AccessToken {
    fn from(response: AccessTokenResponse) -> Self {
        Self {
            access_token: SecretString::from(response.access_token),
            scopes: split_scopes(&response.scope),
        }
    }
}

fn split_scopes(scope: &str) -> Vec<String> {
    scope
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// The Shopify app: its credentials plus a shared HTTP client.
#[derive(Clone)]
pub struct ShopifyApp {
    inner: Arc<ShopifyAppInner>,
}

struct ShopifyAppInner {
    http: reqwest::Client,
    api_key: String,
    api_secret: SecretString,
    api_version: String,
    scopes: Vec<String>,
    /// Replaces `https://<shop>` for every outbound call; set by tests.
    origin_override: Option<String>,
}

impl std::fmt::Debug for ShopifyApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyApp")
            .field("api_key", &self.inner.api_key)
            .field("api_version", &self.inner.api_version)
            .field("scopes", &self.inner.scopes)
            .finish_non_exhaustive()
    }
}

impl ShopifyApp {
    /// Create the app from configuration.
    #[must_use]
    pub fn new(config: &ShopifyConfig) -> Self {
        Self::build(config, None)
    }

    /// Create an app whose outbound calls all go to `origin` instead of the shop.
    #[must_use]
    pub fn with_origin(config: &ShopifyConfig, origin: impl Into<String>) -> Self {
        Self::build(config, Some(origin.into()))
    }

    fn build(config: &ShopifyConfig, origin_override: Option<String>) -> Self {
        Self {
            inner: Arc::new(ShopifyAppInner {
                http: reqwest::Client::new(),
                api_key: config.api_key.clone(),
                api_secret: config.api_secret.clone(),
                api_version: config.api_version.clone(),
                scopes: config.scopes.clone(),
                origin_override,
            }),
        }
    }

    /// The app's client ID (also the App Bridge `apiKey`).
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.inner.api_key
    }

    /// Scopes requested at install.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.inner.scopes
    }

    fn origin(&self, shop: &ShopDomain) -> String {
        self.inner
            .origin_override
            .clone()
            .unwrap_or_else(|| shop.origin())
    }

    /// An Admin API client for `shop`.
    #[must_use]
    pub fn client(&self, shop: &ShopDomain, token: SecretString) -> AdminClient {
        let endpoint = format!(
            "{}/admin/api/{}/graphql.json",
            self.origin(shop),
            self.inner.api_version
        );
        AdminClient::with_endpoint(self.inner.http.clone(), shop.clone(), token, endpoint)
    }

    // =========================================================================
    // OAuth install
    // =========================================================================

    /// The OAuth authorize URL to redirect the merchant to.
    #[must_use]
    pub fn authorization_url(&self, shop: &ShopDomain, redirect_uri: &str, state: &str) -> String {
        let scope = self.inner.scopes.join(",");
        format!(
            "{}/admin/oauth/authorize?client_id={}&scope={}&redirect_uri={}&state={}",
            shop.origin(),
            urlencoding::encode(&self.inner.api_key),
            urlencoding::encode(&scope),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state)
        )
    }

    /// Exchange an authorization code for an offline access token.
    ///
    /// # Errors
    ///
    /// Returns `AdminShopifyError::OAuth` if Shopify rejects the code.
    #[instrument(skip(self, code), fields(shop = %shop))]
    pub async fn exchange_code(
        &self,
        shop: &ShopDomain,
        code: &str,
    ) -> Result<AccessToken, AdminShopifyError> {
        let url = format!("{}/admin/oauth/access_token", self.origin(shop));

        let params = [
            ("client_id", self.inner.api_key.as_str()),
            ("client_secret", self.inner.api_secret.expose_secret()),
            ("code", code),
        ];

        let response = self.inner.http.post(&url).form(&params).send().await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AdminShopifyError::OAuth(format!(
                "Token exchange failed: {text}"
            )));
        }

        let token: AccessTokenResponse = response.json().await?;
        Ok(token.into())
    }

    /// Verify the `hmac` parameter of an OAuth redirect or app launch.
    ///
    /// The message is every other parameter except `signature`, as `k=v`
    /// sorted by key and joined with `&`.
    #[must_use]
    pub fn verify_query_hmac(&self, params: &[(String, String)]) -> bool {
        let Some(signature) = params
            .iter()
            .find(|(k, _)| k == "hmac")
            .and_then(|(_, v)| hex::decode(v).ok())
        else {
            return false;
        };

        let message = query_hmac_message(params);
        let Ok(mut mac) = HmacSha256::new_from_slice(self.inner.api_secret.expose_secret().as_bytes())
        else {
            return false;
        };
        mac.update(message.as_bytes());
        mac.verify_slice(&signature).is_ok()
    }

    // =========================================================================
    // Embedded auth
    // =========================================================================

    /// Verify an App Bridge session token.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSessionToken` when the signature, audience, lifetime or
    /// issuer is wrong.
    pub fn verify_session_token(&self, token: &str) -> Result<SessionClaims, AdminShopifyError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.inner.api_key.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "aud"]);
        validation.validate_nbf = true;
        validation.leeway = SESSION_TOKEN_LEEWAY;

        let key = DecodingKey::from_secret(self.inner.api_secret.expose_secret().as_bytes());
        let claims = jsonwebtoken::decode::<SessionClaims>(token, &key, &validation)
            .map_err(|e| AdminShopifyError::InvalidSessionToken(e.to_string()))?
            .claims;

        let shop = claims.shop()?;
        let issuer = ShopDomain::parse(&claims.iss)
            .map_err(|e| AdminShopifyError::InvalidSessionToken(format!("iss: {e}")))?;
        if issuer != shop {
            return Err(AdminShopifyError::InvalidSessionToken(
                "iss and dest name different shops".to_string(),
            ));
        }

        Ok(claims)
    }

    /// Exchange a verified session token for an offline access token.
    ///
    /// # Errors
    ///
    /// Returns `AdminShopifyError::OAuth` if Shopify rejects the exchange.
    #[instrument(skip(self, session_token), fields(shop = %shop))]
    pub async fn exchange_session_token(
        &self,
        shop: &ShopDomain,
        session_token: &str,
    ) -> Result<AccessToken, AdminShopifyError> {
        let url = format!("{}/admin/oauth/access_token", self.origin(shop));
        let body = serde_json::json!({
            "client_id": self.inner.api_key,
            "client_secret": self.inner.api_secret.expose_secret(),
            "grant_type": TOKEN_EXCHANGE_GRANT,
            "subject_token": session_token,
            "subject_token_type": ID_TOKEN_TYPE,
            "requested_token_type": OFFLINE_TOKEN_TYPE,
        });

        let response = self
            .inner
            .http
            .post(&url)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AdminShopifyError::OAuth(format!(
                "Session token exchange failed ({status}): {text}"
            )));
        }

        let token: AccessTokenResponse = response.json().await?;
        Ok(token.into())
    }

    // =========================================================================
    // Webhooks
    // =========================================================================

    /// Verify `X-Shopify-Hmac-Sha256` against the raw request body.
    #[must_use]
    pub fn verify_webhook_hmac(&self, body: &[u8], header: &str) -> bool {
        let Ok(signature) = base64::engine::general_purpose::STANDARD.decode(header.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.inner.api_secret.expose_secret().as_bytes())
        else {
            return false;
        };
        mac.update(body);
        mac.verify_slice(&signature).is_ok()
    }
}

fn query_hmac_message(params: &[(String, String)]) -> String {
    let mut pairs: Vec<&(String, String)> = params
        .iter()
        .filter(|(k, _)| k != "hmac" && k != "signature")
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header};

    use super::*;

    const SECRET: &str = "hush-this-is-a-test-secret";

    fn app() -> ShopifyApp {
        ShopifyApp::new(&ShopifyConfig {
            api_key: "app-key".to_string(),
            api_secret: SecretString::from(SECRET),
            api_version: "2025-10".to_string(),
            scopes: vec!["read_products".to_string(), "write_discounts".to_string()],
        })
    }

    fn claims(now: i64) -> SessionClaims {
        SessionClaims {
            iss: "https://cool-shop.myshopify.com/admin".to_string(),
            dest: "https://cool-shop.myshopify.com".to_string(),
            aud: "app-key".to_string(),
            sub: Some("42".to_string()),
            exp: now + 60,
            nbf: now - 1,
            iat: now - 1,
            jti: Some("jti".to_string()),
            sid: None,
        }
    }

    fn sign(claims: &SessionClaims, secret: &str) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn hex_hmac(message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_authorization_url() {
        let shop = ShopDomain::parse("cool-shop.myshopify.com").unwrap();
        let url = app().authorization_url(&shop, "https://app.example.com/auth/callback", "nonce");
        assert_eq!(
            url,
            "https://cool-shop.myshopify.com/admin/oauth/authorize?client_id=app-key\
             &scope=read_products%2Cwrite_discounts\
             &redirect_uri=https%3A%2F%2Fapp.example.com%2Fauth%2Fcallback&state=nonce"
        );
    }

    #[test]
    fn test_query_hmac_sorted_and_excluding_signature() {
        let params = vec![
            ("timestamp".to_string(), "1700000000".to_string()),
            ("shop".to_string(), "cool-shop.myshopify.com".to_string()),
            ("code".to_string(), "abc".to_string()),
            ("signature".to_string(), "ignored".to_string()),
        ];
        assert_eq!(
            query_hmac_message(&params),
            "code=abc&shop=cool-shop.myshopify.com&timestamp=1700000000"
        );

        let mut signed = params.clone();
        signed.push(("hmac".to_string(), hex_hmac(&query_hmac_message(&params))));
        assert!(app().verify_query_hmac(&signed));

        let mut tampered = signed.clone();
        tampered[2].1 = "xyz".to_string();
        assert!(!app().verify_query_hmac(&tampered));
        assert!(!app().verify_query_hmac(&params));
    }

    #[test]
    fn test_webhook_hmac() {
        let body = br#"{"id":1}"#;
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        let header = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        assert!(app().verify_webhook_hmac(body, &header));
        assert!(!app().verify_webhook_hmac(br#"{"id":2}"#, &header));
        assert!(!app().verify_webhook_hmac(body, "not base64!"));
    }

    #[test]
    fn test_session_token_round_trip() {
        let now = chrono::Utc::now().timestamp();
        let verified = app().verify_session_token(&sign(&claims(now), SECRET)).unwrap();
        assert_eq!(verified.shop().unwrap().as_str(), "cool-shop.myshopify.com");
        assert_eq!(verified.user_id(), Some(42));
    }

    #[test]
    fn test_session_token_rejections() {
        let now = chrono::Utc::now().timestamp();
        let app = app();

        assert!(app.verify_session_token(&sign(&claims(now), "other-secret")).is_err());

        let mut expired = claims(now);
        expired.exp = now - 30;
        assert!(app.verify_session_token(&sign(&expired, SECRET)).is_err());

        let mut wrong_aud = claims(now);
        wrong_aud.aud = "other-app".to_string();
        assert!(app.verify_session_token(&sign(&wrong_aud, SECRET)).is_err());

        let mut mismatched = claims(now);
        mismatched.iss = "https://evil-shop.myshopify.com/admin".to_string();
        assert!(app.verify_session_token(&sign(&mismatched, SECRET)).is_err());
    }

    #[test]
    fn test_session_token_leeway() {
        let now = chrono::Utc::now().timestamp();
        let mut early = claims(now);
        early.nbf = now + 2;
        assert!(app().verify_session_token(&sign(&early, SECRET)).is_ok());
    }

    #[test]
    fn test_split_scopes() {
        assert_eq!(
            split_scopes("read_products, write_discounts,"),
            vec!["read_products", "write_discounts"]
        );
        assert!(split_scopes("").is_empty());
    }
}
