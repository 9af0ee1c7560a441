//! Cart entities and total derivation.
//!
//! The server may report a cart total. When it does and the value is strictly
//! positive it is authoritative; otherwise the total is summed locally from
//! `price * quantity` of each line. Both paths yield zero for an empty cart.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::catalog::Product;
use super::id::{CartId, CartItemId, ProductId, UserId};

/// A line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Cart line ID (used for update/remove/checkout).
    pub id: CartItemId,
    /// Product on this line.
    pub product_id: ProductId,
    /// Quantity, always positive.
    pub quantity: u32,
    /// Snapshot of the product at the time the cart was served.
    pub product: Product,
    /// Server-computed line subtotal.
    #[serde(default)]
    pub subtotal: Decimal,
}

impl CartItem {
    /// Line total derived locally: `product.price * quantity`, saturating
    /// at the bounds of `Decimal`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.product.price.saturating_mul(Decimal::from(self.quantity))
    }
}

/// The active cart of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    /// Cart ID.
    pub id: CartId,
    /// Owner of the cart.
    #[serde(rename = "userId")]
    pub owner_id: UserId,
    /// Cart lines, in server order.
    #[serde(default)]
    pub items: Vec<CartItem>,
    /// Total as reported by the server, if any.
    #[serde(rename = "total", default, skip_serializing_if = "Option::is_none")]
    pub server_total: Option<Decimal>,
}

impl Cart {
    /// Cart total.
    ///
    /// Uses the server total only when present and strictly positive,
    /// otherwise the local sum of line totals.
    #[must_use]
    pub fn total(&self) -> Decimal {
        match self.server_total {
            Some(total) if total > Decimal::ZERO => total,
            _ => self.local_total(),
        }
    }

    /// Sum of `price * quantity` across all lines, ignoring the server total.
    /// Saturates instead of overflowing.
    #[must_use]
    pub fn local_total(&self) -> Decimal {
        self.items
            .iter()
            .map(CartItem::line_total)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    /// Number of lines in the cart.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Body for `POST /cart/add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Body for `PUT /cart/update/{itemId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCartItemRequest {
    pub quantity: u32,
}
