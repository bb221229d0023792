//! Application state shared across handlers and queue workers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use storekeep_core::ShopDomain;

use crate::claude::{ClaudeClient, ClaudeError};
use crate::config::AppConfig;
use crate::db::{RepositoryError, ShopRepository};
use crate::models::Shop;
use crate::queue::{Queue, QueueConfig};
use crate::services::{EmailService, FileStore};
use crate::shopify::{AdminClient, ShopifyApp};

/// Installed shops are re-read at most this often per domain.
const SHOP_CACHE_TTL: Duration = Duration::from_secs(60);
const SHOP_CACHE_CAPACITY: u64 = 10_000;

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("SMTP configuration error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Claude configuration error: {0}")]
    Claude(#[from] ClaudeError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    pool: PgPool,
    shopify: ShopifyApp,
    queue: Queue,
    files: FileStore,
    email: Option<EmailService>,
    claude: Option<ClaudeClient>,
    shops: Cache<ShopDomain, Shop>,
}

impl AppState {
    /// Create the state from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP or Claude settings can't build a client.
    pub fn new(config: AppConfig, pool: PgPool) -> Result<Self, StateError> {
        let shopify = ShopifyApp::new(&config.shopify);
        Self::with_shopify(config, pool, shopify)
    }

    /// Create the state with an explicit `ShopifyApp` (tests point it at a mock).
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP or Claude settings can't build a client.
    pub fn with_shopify(
        config: AppConfig,
        pool: PgPool,
        shopify: ShopifyApp,
    ) -> Result<Self, StateError> {
        let email = config.email().map(EmailService::new).transpose()?;
        let claude = config.claude().map(ClaudeClient::new).transpose()?;
        let queue = Queue::new(pool.clone(), QueueConfig::from(&config.queue));
        let files = FileStore::new(&config.uploads);
        let shops = Cache::builder()
            .max_capacity(SHOP_CACHE_CAPACITY)
            .time_to_live(SHOP_CACHE_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                shopify,
                queue,
                files,
                email,
                claude,
                shops,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn shopify(&self) -> &ShopifyApp {
        &self.inner.shopify
    }

    #[must_use]
    pub fn queue(&self) -> &Queue {
        &self.inner.queue
    }

    #[must_use]
    pub fn files(&self) -> &FileStore {
        &self.inner.files
    }

    /// SMTP delivery, when configured.
    #[must_use]
    pub fn email(&self) -> Option<&EmailService> {
        self.inner.email.as_ref()
    }

    /// The assistant client, when `CLAUDE_API_KEY` is set.
    #[must_use]
    pub fn claude(&self) -> Option<&ClaudeClient> {
        self.inner.claude.as_ref()
    }

    /// An Admin API client for an installed shop.
    #[must_use]
    pub fn admin_client(&self, shop: &Shop) -> Option<AdminClient> {
        if !shop.is_installed() {
            return None;
        }
        let token = shop.access_token.clone()?;
        Some(self.inner.shopify.client(&shop.domain, token))
    }

    /// Load a shop by domain through the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the database lookup fails.
    pub async fn cached_shop(&self, domain: &ShopDomain) -> Result<Option<Shop>, RepositoryError> {
        if let Some(shop) = self.inner.shops.get(domain).await {
            return Ok(Some(shop));
        }
        let shop = ShopRepository::new(&self.inner.pool)
            .get_by_domain(domain)
            .await?;
        if let Some(shop) = &shop {
            self.inner.shops.insert(domain.clone(), shop.clone()).await;
        }
        Ok(shop)
    }

    /// Drop a shop from the cache after it changed.
    pub async fn invalidate_shop(&self, domain: &ShopDomain) {
        self.inner.shops.invalidate(domain).await;
    }
}
