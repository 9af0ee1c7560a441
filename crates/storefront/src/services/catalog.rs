//! Read-through product cache.
//!
//! Products are cached in `moka` without TTL or capacity bound: entries are
//! only replaced by a full catalog fetch or dropped by [`CatalogCache::clear`].
//! Listing order follows the server's order from the last full fetch, with
//! products loaded individually appended after it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use moka::future::Cache;
use shopkeep_core::{Product, ProductId};
use tracing::{debug, instrument};

use crate::api::Gateway;
use crate::error::Result;
use crate::services::Activity;

/// Cache of catalog products.
///
/// Cheaply cloneable; clones share the cache.
#[derive(Clone)]
pub struct CatalogCache {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    gateway: Gateway,
    entries: Cache<ProductId, Product>,
    order: Mutex<Vec<ProductId>>,
    activity: Activity,
}

impl CatalogCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                gateway,
                entries: Cache::builder().build(),
                order: Mutex::new(Vec::new()),
                activity: Activity::new(),
            }),
        }
    }

    fn order(&self) -> MutexGuard<'_, Vec<ProductId>> {
        self.inner
            .order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Remote Operations
    // =========================================================================

    /// Fetch the full catalog and replace the cache with it.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails; the cache is left as it
    /// was. The error message falls back to "Failed to load products".
    #[instrument(skip(self))]
    pub async fn fetch_all(&self) -> Result<Vec<Product>> {
        self.inner
            .activity
            .track("Failed to load products", async {
                let products = self.inner.gateway.get_products().await?;
                self.replace_all(&products).await;
                debug!(count = products.len(), "Catalog replaced");
                Ok(products)
            })
            .await
    }

    async fn replace_all(&self, products: &[Product]) {
        let mut seen = HashSet::with_capacity(products.len());
        let ids: Vec<ProductId> = products
            .iter()
            .map(|p| p.id)
            .filter(|id| seen.insert(*id))
            .collect();

        let previous = std::mem::replace(&mut *self.order(), ids);
        for id in previous.iter().filter(|id| !seen.contains(id)) {
            self.inner.entries.invalidate(id).await;
        }
        for product in products {
            self.inner.entries.insert(product.id, product.clone()).await;
        }
    }

    /// Get a product, fetching it only on a cache miss.
    ///
    /// A fetched product is inserted only if the id is still absent, so
    /// overlapping misses for the same id leave exactly one entry and every
    /// caller receives the cached value.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not cached and the API request
    /// fails; the cache is left unchanged. The error message falls back to
    /// "Failed to load product".
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: ProductId) -> Result<Product> {
        if let Some(product) = self.inner.entries.get(&id).await {
            debug!("Catalog cache hit");
            return Ok(product);
        }

        self.inner
            .activity
            .track("Failed to load product", async {
                let fetched = self.inner.gateway.get_product(id).await?;
                let entry = self.inner.entries.entry(id).or_insert(fetched).await;
                if entry.is_fresh() {
                    let mut order = self.order();
                    if !order.contains(&id) {
                        order.push(id);
                    }
                }
                Ok(entry.into_value())
            })
            .await
    }

    // =========================================================================
    // Local Queries
    // =========================================================================

    /// Cached products matching `query` in name or description, ignoring
    /// case. Never touches the network; an empty cache yields nothing.
    pub async fn search(&self, query: &str) -> Vec<Product> {
        let mut products = self.products().await;
        products.retain(|p| p.matches(query));
        products
    }

    /// Every cached product in listing order.
    pub async fn products(&self) -> Vec<Product> {
        let ids = self.order().clone();
        let mut products = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(product) = self.inner.entries.get(&id).await {
                products.push(product);
            }
        }
        products
    }

    /// Whether `id` is cached.
    #[must_use]
    pub fn contains(&self, id: ProductId) -> bool {
        self.inner.entries.contains_key(&id)
    }

    /// Number of cached products.
    #[must_use]
    pub fn count(&self) -> usize {
        self.order().len()
    }

    /// Drop every cached product.
    pub fn clear(&self) {
        self.order().clear();
        self.inner.entries.invalidate_all();
    }

    /// Whether an operation is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.activity.is_loading()
    }

    /// Latest error message.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.inner.activity.error()
    }
}
