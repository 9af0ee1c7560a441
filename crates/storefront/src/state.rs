//! Storefront state shared across a client process.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::api::{Gateway, GatewayEvent};
use crate::config::StorefrontConfig;
use crate::services::{CartAggregator, CatalogCache, OrderHistory, SessionManager};
use crate::store::SessionStore;

/// Every manager of one storefront client, wired to a single gateway and
/// session store.
///
/// This struct is cheaply cloneable via `Arc`. Ending the session (logout or
/// a 401 from any endpoint) also drops the cart.
#[derive(Clone)]
pub struct StorefrontState {
    inner: Arc<StorefrontStateInner>,
}

struct StorefrontStateInner {
    config: StorefrontConfig,
    gateway: Gateway,
    session: SessionManager,
    catalog: CatalogCache,
    cart: CartAggregator,
    orders: OrderHistory,
}

impl StorefrontState {
    /// Create the managers.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `store` - Where the session credential and profile are persisted
    #[must_use]
    pub fn new(config: StorefrontConfig, store: Arc<dyn SessionStore>) -> Self {
        let gateway = Gateway::new(&config, store);
        let session = SessionManager::new(gateway.clone());
        let catalog = CatalogCache::new(gateway.clone());
        let cart = CartAggregator::new(gateway.clone());
        let orders = OrderHistory::new(gateway.clone());

        session.add_listener(&cart.session_listener());

        Self {
            inner: Arc::new(StorefrontStateInner {
                config,
                gateway,
                session,
                catalog,
                cart,
                orders,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the transport gateway.
    #[must_use]
    pub fn gateway(&self) -> &Gateway {
        &self.inner.gateway
    }

    /// Get a reference to the session manager.
    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    /// Get a reference to the catalog cache.
    #[must_use]
    pub fn catalog(&self) -> &CatalogCache {
        &self.inner.catalog
    }

    /// Get a reference to the cart aggregator.
    #[must_use]
    pub fn cart(&self) -> &CartAggregator {
        &self.inner.cart
    }

    /// Get a reference to the order history.
    #[must_use]
    pub fn orders(&self) -> &OrderHistory {
        &self.inner.orders
    }

    /// Subscribe to navigation signals such as [`GatewayEvent::LoginRequired`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.gateway.subscribe()
    }

    /// Resolve a product image reference against the configured image base.
    #[must_use]
    pub fn image_url(&self, product: &shopkeep_core::Product) -> Option<String> {
        product.image_url(&self.inner.config.image_base_url)
    }
}
