//! Cart mirror.
//!
//! The server owns the cart. Every successful response replaces the local
//! copy wholesale; nothing is patched in place. Removing a line is followed
//! by a full re-fetch. The cart is dropped when the session ends.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rust_decimal::Decimal;
use shopkeep_core::{
    AddToCartRequest, Cart, CartItem, CartItemId, ProductId, UpdateCartItemRequest,
};
use tracing::{debug, info, instrument};

use crate::api::{Gateway, SessionListener};
use crate::error::{Result, add_breadcrumb};
use crate::services::Activity;

/// Client-side view of the signed-in user's cart.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct CartAggregator {
    inner: Arc<CartInner>,
}

struct CartInner {
    gateway: Gateway,
    cart: Mutex<Option<Cart>>,
    activity: Activity,
}

impl CartInner {
    fn cart(&self) -> MutexGuard<'_, Option<Cart>> {
        self.cart.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionListener for CartInner {
    fn on_session_ended(&self) {
        debug!("Session ended, dropping cart");
        *self.cart() = None;
        self.activity.clear_error();
    }
}

impl CartAggregator {
    /// Create an aggregator with no cart loaded.
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        Self {
            inner: Arc::new(CartInner {
                gateway,
                cart: Mutex::new(None),
                activity: Activity::new(),
            }),
        }
    }

    /// Listener that drops the cart when the session ends.
    #[must_use]
    pub fn session_listener(&self) -> Arc<dyn SessionListener> {
        self.inner.clone()
    }

    fn replace(&self, cart: &Cart) {
        *self.inner.cart() = Some(cart.clone());
    }

    // =========================================================================
    // Remote Operations
    // =========================================================================

    /// Load the cart from the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails. The error message falls
    /// back to "Failed to load cart".
    #[instrument(skip(self))]
    pub async fn fetch(&self) -> Result<Cart> {
        self.inner
            .activity
            .track("Failed to load cart", async {
                let cart = self.inner.gateway.get_cart().await?;
                self.replace(&cart);
                Ok(cart)
            })
            .await
    }

    /// Add `quantity` units of a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails. The error message falls
    /// back to "Failed to add product to cart".
    #[instrument(skip(self))]
    pub async fn add(&self, product_id: ProductId, quantity: u32) -> Result<Cart> {
        self.inner
            .activity
            .track("Failed to add product to cart", async {
                let request = AddToCartRequest {
                    product_id,
                    quantity,
                };
                let cart = self.inner.gateway.add_to_cart(&request).await?;
                self.replace(&cart);
                let product = product_id.to_string();
                add_breadcrumb(
                    "cart",
                    "Added product to cart",
                    Some(&[("product_id", product.as_str())]),
                );
                Ok(cart)
            })
            .await
    }

    /// Set the quantity of a cart line.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails. The error message falls
    /// back to "Failed to update cart item".
    #[instrument(skip(self))]
    pub async fn update_quantity(&self, item_id: CartItemId, quantity: u32) -> Result<Cart> {
        self.inner
            .activity
            .track("Failed to update cart item", async {
                let request = UpdateCartItemRequest { quantity };
                let cart = self
                    .inner
                    .gateway
                    .update_cart_item(item_id, &request)
                    .await?;
                self.replace(&cart);
                Ok(cart)
            })
            .await
    }

    /// Remove a cart line, then re-fetch the whole cart.
    ///
    /// # Errors
    ///
    /// Returns an error if either request fails. The error message falls
    /// back to "Failed to remove item from cart".
    #[instrument(skip(self))]
    pub async fn remove(&self, item_id: CartItemId) -> Result<Cart> {
        self.inner
            .activity
            .track("Failed to remove item from cart", async {
                self.inner.gateway.remove_cart_item(item_id).await?;
                let cart = self.inner.gateway.get_cart().await?;
                self.replace(&cart);
                let item = item_id.to_string();
                add_breadcrumb(
                    "cart",
                    "Removed item from cart",
                    Some(&[("item_id", item.as_str())]),
                );
                Ok(cart)
            })
            .await
    }

    /// Check out a cart line and return the server's payload untouched.
    ///
    /// Does not clear the cart; call [`CartAggregator::clear`] or
    /// [`CartAggregator::fetch`] afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails. The error message falls
    /// back to "Failed to checkout".
    #[instrument(skip(self))]
    pub async fn checkout(&self, cart_item_id: CartItemId) -> Result<serde_json::Value> {
        self.inner
            .activity
            .track("Failed to checkout", async {
                let receipt = self.inner.gateway.checkout(cart_item_id).await?;
                info!("Checkout completed");
                add_breadcrumb("cart", "Checked out", None);
                Ok(receipt)
            })
            .await
    }

    /// Forget the cart and the latest error. Never calls the API.
    pub fn clear(&self) {
        *self.inner.cart() = None;
        self.inner.activity.clear_error();
    }

    // =========================================================================
    // Derived State
    // =========================================================================

    /// The last cart received from the server.
    #[must_use]
    pub fn cart(&self) -> Option<Cart> {
        self.inner.cart().clone()
    }

    /// Lines of the current cart; empty when none is loaded.
    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.inner
            .cart()
            .as_ref()
            .map(|cart| cart.items.clone())
            .unwrap_or_default()
    }

    /// Number of lines.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.inner.cart().as_ref().map_or(0, Cart::item_count)
    }

    /// Whether the cart is absent or has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.cart().as_ref().is_none_or(Cart::is_empty)
    }

    /// Cart total: the server total when strictly positive, otherwise the
    /// sum of line totals. Zero when no cart is loaded.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.inner.cart().as_ref().map_or(Decimal::ZERO, Cart::total)
    }

    /// Sum of `price * quantity` over the lines, ignoring the server total.
    #[must_use]
    pub fn recalculated_total(&self) -> Decimal {
        self.inner
            .cart()
            .as_ref()
            .map_or(Decimal::ZERO, Cart::local_total)
    }

    /// Line total of `item`.
    #[must_use]
    pub fn item_subtotal(item: &CartItem) -> Decimal {
        item.line_total()
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::StorefrontConfig;
    use crate::store::MemorySessionStore;

    fn cart_for(server: &MockServer) -> CartAggregator {
        let store = Arc::new(MemorySessionStore::new());
        CartAggregator::new(Gateway::new(
            &StorefrontConfig::for_api_url(&server.uri()),
            store,
        ))
    }

    fn cart_json(quantity: u32, total: Option<f64>) -> Value {
        let mut cart = json!({
            "id": 10,
            "userId": 1,
            "items": [{
                "id": 30,
                "productId": 5,
                "quantity": quantity,
                "product": {"id": 5, "name": "Mug", "description": "", "price": 9.99, "stock": 10},
                "subtotal": 0
            }]
        });
        if let Some(total) = total {
            cart["total"] = json!(total);
        }
        cart
    }

    #[tokio::test]
    async fn test_add_replaces_cart_and_totals_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cart/add"))
            .and(body_json(json!({"productId": 5, "quantity": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(2, None)))
            .mount(&server)
            .await;

        let cart = cart_for(&server);
        cart.add(ProductId::new(5), 2).await.unwrap();

        assert_eq!(cart.total(), Decimal::new(1998, 2));
        assert_eq!(cart.recalculated_total(), Decimal::new(1998, 2));
        assert_eq!(cart.item_count(), 1);
        assert_eq!(
            CartAggregator::item_subtotal(&cart.items()[0]),
            Decimal::new(1998, 2)
        );
    }

    #[tokio::test]
    async fn test_positive_server_total_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cart"))
            .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(2, Some(19.98))))
            .mount(&server)
            .await;

        let cart = cart_for(&server);
        cart.fetch().await.unwrap();

        assert_eq!(cart.total(), Decimal::new(1998, 2));
        assert_eq!(cart.total(), cart.recalculated_total());
    }

    #[tokio::test]
    async fn test_zero_server_total_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cart"))
            .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(3, Some(0.0))))
            .mount(&server)
            .await;

        let cart = cart_for(&server);
        cart.fetch().await.unwrap();

        assert_eq!(cart.total(), Decimal::new(2997, 2));
    }

    #[tokio::test]
    async fn test_update_quantity_sends_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/cart/update/30"))
            .and(body_json(json!({"quantity": 4})))
            .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(4, None)))
            .expect(1)
            .mount(&server)
            .await;

        let cart = cart_for(&server);
        let updated = cart.update_quantity(CartItemId::new(30), 4).await.unwrap();

        assert_eq!(updated.items[0].quantity, 4);
        assert_eq!(cart.total(), Decimal::new(3996, 2));
    }

    #[tokio::test]
    async fn test_remove_refetches() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/cart/remove/30"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ignored": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cart"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": 10, "userId": 1, "items": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cart = cart_for(&server);
        cart.remove(CartItemId::new(30)).await.unwrap();

        assert!(cart.is_empty());
        assert_eq!(cart.total(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_cart() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cart"))
            .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(1, None)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/cart/add"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"message": "Insufficient stock"})),
            )
            .mount(&server)
            .await;

        let cart = cart_for(&server);
        cart.fetch().await.unwrap();
        assert!(cart.add(ProductId::new(5), 99).await.is_err());

        assert_eq!(cart.error().as_deref(), Some("Insufficient stock"));
        assert_eq!(cart.items()[0].quantity, 1);
    }

    #[tokio::test]
    async fn test_checkout_does_not_clear_cart() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cart"))
            .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(1, None)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/cart/checkout/30"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 77})))
            .mount(&server)
            .await;

        let cart = cart_for(&server);
        cart.fetch().await.unwrap();
        let receipt = cart.checkout(CartItemId::new(30)).await.unwrap();

        assert_eq!(receipt["id"], 77);
        assert_eq!(cart.item_count(), 1);

        cart.clear();
        assert!(cart.cart().is_none());
        assert_eq!(cart.total(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_last_completion_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cart"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(cart_json(1, None))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/cart/add"))
            .respond_with(ResponseTemplate::new(200).set_body_json(cart_json(5, None)))
            .mount(&server)
            .await;

        let cart = cart_for(&server);
        let (slow, fast) = tokio::join!(cart.fetch(), cart.add(ProductId::new(5), 4));
        slow.unwrap();
        fast.unwrap();

        // The fetch was issued first but landed last.
        assert_eq!(cart.items()[0].quantity, 1);
        assert!(!cart.is_loading());
    }

    #[tokio::test]
    async fn test_abandoned_fetch_is_not_loading() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cart"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(cart_json(1, None))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let cart = cart_for(&server);
        let abandoned = tokio::time::timeout(Duration::from_millis(50), cart.fetch()).await;

        assert!(abandoned.is_err());
        assert!(!cart.is_loading());
        assert!(cart.cart().is_none());
    }

    #[test]
    fn test_session_end_drops_cart() {
        let store = Arc::new(MemorySessionStore::new());
        let cart = CartAggregator::new(Gateway::new(
            &StorefrontConfig::for_api_url("http://localhost:1"),
            store,
        ));
        cart.replace(&serde_json::from_value(cart_json(1, None)).unwrap());
        cart.inner.activity.fail("stale");

        cart.session_listener().on_session_ended();

        assert!(cart.cart().is_none());
        assert_eq!(cart.error(), None);
    }
}
