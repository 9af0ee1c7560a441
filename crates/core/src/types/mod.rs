//! Core types for Shopkeep.
//!
//! This module provides the storefront entities and type-safe wrappers for
//! their identifiers.

pub mod cart;
pub mod catalog;
pub mod id;
pub mod order;
pub mod status;
pub mod timestamp;
pub mod user;

pub use cart::{AddToCartRequest, Cart, CartItem, UpdateCartItemRequest};
pub use catalog::{Product, resolve_image_url};
pub use id::*;
pub use order::{CANCELLATION_WINDOW_DAYS, Order, OrderBuyer, OrderItem, sort_newest_first};
pub use status::OrderStatus;
pub use timestamp::TimestampError;
pub use user::{AuthToken, Credentials, NewAccount, User};
