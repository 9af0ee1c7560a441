//! Shopkeep Core - Shared storefront types.
//!
//! This crate provides the entities mirrored from the remote commerce API and
//! the pure rules derived from them:
//! - cart totals (server total vs. locally summed line items)
//! - order cancellation window
//! - product image reference resolution
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no clocks except where a caller explicitly asks for "now".
//! Stateful managers live in `shopkeep-storefront`.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, statuses, and the catalog, cart, order, and user entities

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
