//! Shopkeep storefront client library.
//!
//! Client-side session, cache and derived-state layer for a storefront
//! backed by a remote commerce API:
//!
//! - [`api`] - HTTP gateway with bearer auth and global 401 eviction
//! - [`store`] - Pluggable persistence for the session credential and profile
//! - [`services`] - Session, catalog, cart and order-history managers
//! - [`state`] - All managers wired to one gateway

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod state;
pub mod store;

pub use config::StorefrontConfig;
pub use error::{ClientError, Result};
pub use state::StorefrontState;
