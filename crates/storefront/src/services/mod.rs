//! Client-side state managers.
//!
//! # Services
//!
//! - `session` - Credential and profile lifecycle (restore, login, logout)
//! - `catalog` - Read-through product cache with local search
//! - `cart` - Server-authoritative cart mirror and derived totals
//! - `orders` - Order history, cancellation eligibility and optimistic inserts
//!
//! Every manager is cheaply cloneable and exposes a loading flag and a single
//! latest-error message through [`Activity`]. Concurrent mutations on the
//! same manager are not sequenced: the last response to arrive wins.

mod activity;
pub mod cart;
pub mod catalog;
pub mod orders;
pub mod session;

pub use activity::Activity;
pub use cart::CartAggregator;
pub use catalog::CatalogCache;
pub use orders::{OrderHistory, Provenance, TrackedOrder};
pub use session::{Session, SessionManager, SessionState};
