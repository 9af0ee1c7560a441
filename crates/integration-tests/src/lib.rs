//! Integration tests for Shopkeep.
//!
//! Every test runs the full storefront client against a `wiremock` server
//! standing in for the commerce API. No external services are needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shopkeep-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `session_flow` - Login, restore, corruption recovery and logout
//! - `eviction` - Global session eviction on 401
//! - `shopping` - Catalog, cart and order history working together

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Value, json};
use shopkeep_storefront::StorefrontConfig;
use shopkeep_storefront::state::StorefrontState;
use shopkeep_storefront::store::SessionStore;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A mock commerce API plus the configuration pointing at it.
pub struct TestContext {
    pub server: MockServer,
    pub config: StorefrontConfig,
}

impl TestContext {
    /// Start a mock API.
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let config = StorefrontConfig::for_api_url(&server.uri());
        Self { server, config }
    }

    /// Storefront state backed by `store`, as a freshly started process
    /// would build it.
    #[must_use]
    pub fn state(&self, store: Arc<dyn SessionStore>) -> StorefrontState {
        StorefrontState::new(self.config.clone(), store)
    }

    /// Mount `POST /auth/login` issuing `token`, and `GET /auth/me`
    /// returning `user`.
    pub async fn mount_login(&self, token: &str, user: Value) {
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": token})))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user))
            .mount(&self.server)
            .await;
    }

    /// Number of requests the mock API has received.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }
}

/// A session file path inside a fresh temporary directory.
///
/// The directory, and any session written into it, is removed when the
/// returned `TempDir` is dropped.
///
/// # Panics
///
/// Panics if the temporary directory cannot be created.
#[must_use]
pub fn temp_session_file() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir for session file");
    let path = dir.path().join("session.json");
    (dir, path)
}

// ============================================================================
// Fixtures
// ============================================================================

/// A user profile as served by `GET /auth/me`.
#[must_use]
pub fn user_json(id: i64, username: &str) -> Value {
    json!({"id": id, "username": username})
}

/// A product priced at `price`.
#[must_use]
pub fn product_json(id: i64, name: &str, description: &str, price: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "description": description,
        "price": price,
        "stock": 10,
        "imageUrl": format!("product-{id}.jpg")
    })
}

/// A cart with one line of `quantity` units of `product`, and no server
/// total.
#[must_use]
pub fn cart_json(product: &Value, quantity: u32) -> Value {
    json!({
        "id": 10,
        "userId": 1,
        "items": [{
            "id": 30,
            "productId": product["id"],
            "quantity": quantity,
            "product": product,
            "subtotal": 0
        }]
    })
}

/// An order for user 1.
#[must_use]
pub fn order_json(id: i64, status: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "user": {"id": 1, "username": "a"},
        "orderItems": [{
            "id": id * 10,
            "productName": "Mug",
            "price": "9.99",
            "quantity": 2,
            "subtotal": "19.98"
        }],
        "totalAmount": "19.98",
        "status": status,
        "createdAt": created_at
    })
}
