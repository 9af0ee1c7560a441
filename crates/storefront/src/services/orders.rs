//! Order history.
//!
//! Holds the list returned by the last `GET /orders`, plus orders inserted
//! locally after a checkout. Locally inserted orders are tagged
//! [`Provenance::Unconfirmed`] until a fetch replaces the list; nothing
//! reconciles them automatically.
//!
//! Derived views (`sorted`, `active`, `cancelled`, `cancellable`) are
//! recomputed on every call. Cancellation eligibility depends on the clock
//! and is never stored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use shopkeep_core::{Order, OrderId, sort_newest_first};
use tracing::{debug, info, instrument};

use crate::api::Gateway;
use crate::error::{Result, add_breadcrumb};
use crate::services::Activity;

/// Where an order in the history came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Returned by the server.
    Server,
    /// Inserted locally and not yet seen in a server response.
    Unconfirmed,
}

/// An order together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedOrder {
    pub order: Order,
    pub provenance: Provenance,
}

impl TrackedOrder {
    const fn server(order: Order) -> Self {
        Self {
            order,
            provenance: Provenance::Server,
        }
    }
}

/// Order history of the signed-in user.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct OrderHistory {
    inner: Arc<OrdersInner>,
}

struct OrdersInner {
    gateway: Gateway,
    orders: Mutex<Vec<TrackedOrder>>,
    activity: Activity,
}

impl OrderHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        Self {
            inner: Arc::new(OrdersInner {
                gateway,
                orders: Mutex::new(Vec::new()),
                activity: Activity::new(),
            }),
        }
    }

    fn history(&self) -> MutexGuard<'_, Vec<TrackedOrder>> {
        self.inner
            .orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Remote Operations
    // =========================================================================

    /// Fetch all orders and replace the history with them.
    ///
    /// Drops any unconfirmed local insertions.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails. The error message falls
    /// back to "Failed to load orders".
    #[instrument(skip(self))]
    pub async fn fetch_all(&self) -> Result<Vec<Order>> {
        self.inner
            .activity
            .track("Failed to load orders", async {
                let orders = self.inner.gateway.get_orders().await?;
                *self.history() = orders.iter().cloned().map(TrackedOrder::server).collect();
                debug!(count = orders.len(), "Order history replaced");
                Ok(orders)
            })
            .await
    }

    /// Fetch a single order. The history is not touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails. The error message falls
    /// back to "Failed to load order".
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: OrderId) -> Result<Order> {
        self.inner
            .activity
            .track("Failed to load order", async {
                Ok(self.inner.gateway.get_order(id).await?)
            })
            .await
    }

    /// Ask the server to cancel an order.
    ///
    /// The first order with a matching id is replaced by the server's
    /// response. When no order matches, the history is left unchanged and
    /// the cancelled order is still returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails. The error message falls
    /// back to "Failed to cancel order".
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, id: OrderId) -> Result<Order> {
        self.inner
            .activity
            .track("Failed to cancel order", async {
                let cancelled = self.inner.gateway.cancel_order(id).await?;

                if let Some(tracked) = self
                    .history()
                    .iter_mut()
                    .find(|tracked| tracked.order.id == id)
                {
                    *tracked = TrackedOrder::server(cancelled.clone());
                } else {
                    debug!("Cancelled order is not in the local history");
                }

                let order_id = id.to_string();
                add_breadcrumb(
                    "orders",
                    "Cancelled order",
                    Some(&[("order_id", order_id.as_str())]),
                );
                info!(status = %cancelled.status, "Order cancelled");
                Ok(cancelled)
            })
            .await
    }

    // =========================================================================
    // Local Operations
    // =========================================================================

    /// Prepend an order placed elsewhere, tagged as unconfirmed.
    pub fn add_order(&self, order: Order) {
        debug!(order_id = %order.id, "Prepending unconfirmed order");
        self.history().insert(
            0,
            TrackedOrder {
                order,
                provenance: Provenance::Unconfirmed,
            },
        );
    }

    // =========================================================================
    // Derived Views
    // =========================================================================

    /// Orders in history order, with their provenance.
    #[must_use]
    pub fn entries(&self) -> Vec<TrackedOrder> {
        self.history().clone()
    }

    /// Orders in history order.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.history()
            .iter()
            .map(|tracked| tracked.order.clone())
            .collect()
    }

    /// Orders inserted locally and not yet confirmed by a fetch.
    #[must_use]
    pub fn unconfirmed(&self) -> Vec<Order> {
        self.history()
            .iter()
            .filter(|tracked| tracked.provenance == Provenance::Unconfirmed)
            .map(|tracked| tracked.order.clone())
            .collect()
    }

    /// Orders, newest first.
    #[must_use]
    pub fn sorted(&self) -> Vec<Order> {
        let mut orders = self.orders();
        sort_newest_first(&mut orders);
        orders
    }

    /// Newest-first orders that are not cancelled.
    #[must_use]
    pub fn active(&self) -> Vec<Order> {
        let mut orders = self.sorted();
        orders.retain(|order| !order.status.is_cancelled());
        orders
    }

    /// Newest-first cancelled orders.
    #[must_use]
    pub fn cancelled(&self) -> Vec<Order> {
        let mut orders = self.sorted();
        orders.retain(|order| order.status.is_cancelled());
        orders
    }

    /// Orders still inside the cancellation window, in history order.
    #[must_use]
    pub fn cancellable(&self) -> Vec<Order> {
        self.cancellable_at(Utc::now())
    }

    /// Orders inside the cancellation window at `now`, in history order.
    #[must_use]
    pub fn cancellable_at(&self, now: DateTime<Utc>) -> Vec<Order> {
        let mut orders = self.orders();
        orders.retain(|order| order.is_cancellable_at(now));
        orders
    }

    /// Whether `order` may still be cancelled.
    #[must_use]
    pub fn can_cancel(order: &Order) -> bool {
        order.is_cancellable()
    }

    /// Look up an order in the history.
    #[must_use]
    pub fn find(&self, id: OrderId) -> Option<Order> {
        self.history()
            .iter()
            .find(|tracked| tracked.order.id == id)
            .map(|tracked| tracked.order.clone())
    }

    /// Number of orders in the history.
    #[must_use]
    pub fn count(&self) -> usize {
        self.history().len()
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
    use chrono::Duration;
    use serde_json::{Value, json};
    use shopkeep_core::OrderStatus;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::StorefrontConfig;
    use crate::store::MemorySessionStore;

    fn history_for(server: &MockServer) -> OrderHistory {
        let store = Arc::new(MemorySessionStore::new());
        OrderHistory::new(Gateway::new(
            &StorefrontConfig::for_api_url(&server.uri()),
            store,
        ))
    }

    fn order_json(id: i64, status: &str, created_at: &str) -> Value {
        json!({
            "id": id,
            "user": {"id": 1, "username": "a"},
            "orderItems": [{
                "id": id * 10,
                "productName": "Mug",
                "price": 9.99,
                "quantity": 1,
                "subtotal": 9.99
            }],
            "totalAmount": 9.99,
            "status": status,
            "createdAt": created_at
        })
    }

    async fn mount_orders(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                order_json(1, "DELIVERED", "2026-01-01T10:00:00"),
                order_json(2, "CANCELLED", "2026-03-01T10:00:00Z"),
                order_json(3, "PENDING", "2026-02-01T10:00:00"),
            ])))
            .mount(server)
            .await;
    }

    fn ids(orders: &[Order]) -> Vec<i64> {
        orders.iter().map(|o| o.id.as_i64()).collect()
    }

    #[tokio::test]
    async fn test_derived_views() {
        let server = MockServer::start().await;
        mount_orders(&server).await;

        let history = history_for(&server);
        history.fetch_all().await.unwrap();

        assert_eq!(ids(&history.orders()), vec![1, 2, 3]);
        assert_eq!(ids(&history.sorted()), vec![2, 3, 1]);
        assert_eq!(ids(&history.active()), vec![3, 1]);
        assert_eq!(ids(&history.cancelled()), vec![2]);
        assert_eq!(history.count(), 3);
    }

    #[tokio::test]
    async fn test_cancellable_window() {
        let server = MockServer::start().await;
        mount_orders(&server).await;

        let history = history_for(&server);
        history.fetch_all().await.unwrap();

        let created = history.find(OrderId::new(3)).unwrap().created_at;
        let within = created + Duration::days(6);
        assert_eq!(ids(&history.cancellable_at(within)), vec![2, 3]);

        let outside = created + Duration::days(7) + Duration::seconds(1);
        assert_eq!(ids(&history.cancellable_at(outside)), vec![2]);
    }

    #[tokio::test]
    async fn test_cancel_replaces_first_match_in_place() {
        let server = MockServer::start().await;
        mount_orders(&server).await;
        Mock::given(method("PUT"))
            .and(path("/orders/3/cancel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(order_json(
                3,
                "CANCELLED",
                "2026-02-01T10:00:00",
            )))
            .mount(&server)
            .await;

        let history = history_for(&server);
        history.fetch_all().await.unwrap();
        let cancelled = history.cancel_order(OrderId::new(3)).await.unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(ids(&history.orders()), vec![1, 2, 3]);
        assert_eq!(
            history.find(OrderId::new(3)).unwrap().status,
            OrderStatus::Cancelled
        );
        assert_eq!(ids(&history.cancelled()), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_cancel_unknown_order_leaves_history() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/orders/9/cancel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(order_json(
                9,
                "CANCELLED",
                "2026-02-01T10:00:00",
            )))
            .mount(&server)
            .await;

        let history = history_for(&server);
        let cancelled = history.cancel_order(OrderId::new(9)).await.unwrap();

        assert_eq!(cancelled.id, OrderId::new(9));
        assert_eq!(history.count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_rejected_reports_message() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/orders/1/cancel"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"message": "Order already shipped"})),
            )
            .mount(&server)
            .await;

        let history = history_for(&server);
        assert!(history.cancel_order(OrderId::new(1)).await.is_err());
        assert_eq!(history.error().as_deref(), Some("Order already shipped"));
    }

    #[tokio::test]
    async fn test_add_order_is_unconfirmed_until_fetch() {
        let server = MockServer::start().await;
        mount_orders(&server).await;

        let history = history_for(&server);
        history.fetch_all().await.unwrap();

        let placed: Order =
            serde_json::from_value(order_json(4, "PENDING", "2026-04-01T10:00:00")).unwrap();
        history.add_order(placed);

        assert_eq!(ids(&history.orders()), vec![4, 1, 2, 3]);
        assert_eq!(ids(&history.unconfirmed()), vec![4]);
        assert_eq!(history.entries()[0].provenance, Provenance::Unconfirmed);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);

        history.fetch_all().await.unwrap();
        assert!(history.unconfirmed().is_empty());
        assert_eq!(history.count(), 3);
    }

    #[tokio::test]
    async fn test_get_by_id_does_not_touch_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(order_json(
                5,
                "SHIPPED",
                "2026-02-01T10:00:00",
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orders/6"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let history = history_for(&server);
        let order = history.get_by_id(OrderId::new(5)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(history.count(), 0);

        assert!(history.get_by_id(OrderId::new(6)).await.is_err());
        assert_eq!(history.error().as_deref(), Some("Failed to load order"));
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let history = history_for(&server);
        history.add_order(
            serde_json::from_value(order_json(4, "PENDING", "2026-04-01T10:00:00")).unwrap(),
        );

        assert!(history.fetch_all().await.is_err());
        assert_eq!(history.error().as_deref(), Some("Failed to load orders"));
        assert_eq!(history.count(), 1);
    }
}
