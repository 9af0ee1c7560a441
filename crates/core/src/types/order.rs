//! Order entities and the cancellation window.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{OrderId, OrderItemId, UserId};
use super::status::OrderStatus;

/// How long after creation an order may still be cancelled.
pub const CANCELLATION_WINDOW_DAYS: i64 = 7;

/// Buyer summary embedded in an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBuyer {
    pub id: UserId,
    pub username: String,
}

/// A line of a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub subtotal: Decimal,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Order ID.
    pub id: OrderId,
    /// Who placed the order.
    #[serde(rename = "user")]
    pub buyer: OrderBuyer,
    /// Purchased lines.
    #[serde(rename = "orderItems", default)]
    pub line_items: Vec<OrderItem>,
    /// Server-computed order total.
    pub total_amount: Decimal,
    /// Current status, as reported by the server.
    pub status: OrderStatus,
    /// Creation time.
    #[serde(with = "super::timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Whether the order may still be cancelled at `now`.
    ///
    /// True iff `created_at` is strictly after `now - 7 days`. The status is
    /// not consulted; the server decides whether the transition is legal.
    #[must_use]
    pub fn is_cancellable_at(&self, now: DateTime<Utc>) -> bool {
        self.created_at > now - Duration::days(CANCELLATION_WINDOW_DAYS)
    }

    /// Whether the order may still be cancelled right now.
    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        self.is_cancellable_at(Utc::now())
    }
}

/// Sort orders newest first by `created_at`.
///
/// Relative order of equal timestamps is unspecified.
pub fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_unstable_by(|a, b| b.created_at.cmp(&a.created_at));
}
