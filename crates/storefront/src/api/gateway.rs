//! Transport gateway implementation.
//!
//! Uses `reqwest` for HTTP and reads the bearer credential from the injected
//! [`SessionStore`] on every request.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shopkeep_core::{
    AddToCartRequest, AuthToken, Cart, CartItemId, Credentials, NewAccount, Order, OrderId,
    Product, ProductId, UpdateCartItemRequest, User,
};
use tokio::sync::broadcast;
use tracing::{Span, debug, error, instrument, warn};
use uuid::Uuid;

use super::{ApiError, parse_error_message};
use crate::config::StorefrontConfig;
use crate::store::{SessionSlot, SessionStore};

/// Header carrying the per-request correlation ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

const EVENT_CAPACITY: usize = 16;
const LOG_BODY_LIMIT: usize = 500;

/// Side effects the gateway broadcasts to the navigation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEvent {
    /// The API rejected the credential and the session was evicted; the user
    /// should be sent to the login view.
    LoginRequired,
}

/// Receives a callback whenever the session ends, either through eviction by
/// the gateway or an explicit logout.
///
/// Listeners are held weakly, so registering does not keep the listener
/// alive.
pub trait SessionListener: Send + Sync {
    /// Called after the persisted session has been cleared.
    fn on_session_ended(&self);
}

/// Weakly held [`SessionListener`] registrations.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Weak<dyn SessionListener>>>,
}

impl ListenerSet {
    pub fn add(&self, listener: &Arc<dyn SessionListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(listener));
    }

    /// Notify every live listener, pruning dropped ones.
    pub fn notify(&self) {
        // Callbacks run outside the lock.
        let live: Vec<_> = {
            let mut listeners = self
                .listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            listener.on_session_ended();
        }
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// HTTP gateway to the commerce API.
///
/// Cheaply cloneable; all clones share the HTTP client, the session store,
/// the eviction listeners, and the event channel.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    client: reqwest::Client,
    base_url: String,
    store: Arc<dyn SessionStore>,
    listeners: ListenerSet,
    events: broadcast::Sender<GatewayEvent>,
}

impl Gateway {
    /// Create a gateway for the configured API.
    #[must_use]
    pub fn new(config: &StorefrontConfig, store: Arc<dyn SessionStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(GatewayInner {
                client: reqwest::Client::new(),
                base_url: config.api_url.trim_end_matches('/').to_string(),
                store,
                listeners: ListenerSet::default(),
                events,
            }),
        }
    }

    /// The session store shared with the session manager.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.inner.store
    }

    /// Subscribe to gateway side effects.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.events.subscribe()
    }

    /// Register a listener notified after every session eviction.
    pub fn add_session_listener(&self, listener: &Arc<dyn SessionListener>) {
        self.inner.listeners.add(listener);
    }

    /// Send a request and return the raw response body.
    ///
    /// Attaches the stored credential as a bearer token when present. A 401
    /// response evicts the session before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` for 401, `ApiError::Status` for any
    /// other non-success status, `ApiError::Http` if no response was received,
    /// and `ApiError::Store` if the credential cannot be read.
    #[instrument(
        skip_all,
        fields(method = %method, path = %path, request_id = tracing::field::Empty)
    )]
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String, ApiError> {
        let request_id = Uuid::new_v4();
        Span::current().record("request_id", tracing::field::display(request_id));

        let url = format!("{}{path}", self.inner.base_url);
        let mut request = self
            .inner
            .client
            .request(method, &url)
            .header(REQUEST_ID_HEADER, request_id.to_string());

        if let Some(credential) = self.credential()? {
            request = request.bearer_auth(credential.expose_secret());
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            self.evict_session();
            return Err(ApiError::Unauthorized {
                message: parse_error_message(&text),
            });
        }

        if !status.is_success() {
            let log_body = truncate(&text);
            if status.is_server_error() {
                error!(status = %status, body = %log_body, "Commerce API returned server error");
            } else {
                debug!(status = %status, body = %log_body, "Commerce API rejected request");
            }
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: parse_error_message(&text),
            });
        }

        Ok(text)
    }

    /// Send a request and decode a JSON response body.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ApiError> {
        let text = self.send(method, path, body).await?;
        serde_json::from_str(&text).map_err(|e| {
            error!(
                error = %e,
                path = %path,
                body = %truncate(&text),
                "Failed to parse commerce API response"
            );
            ApiError::Parse(e)
        })
    }

    async fn request_with<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)?;
        self.request(method, path, Some(body)).await
    }

    fn credential(&self) -> Result<Option<SecretString>, ApiError> {
        Ok(self
            .inner
            .store
            .get(SessionSlot::Credential)?
            .filter(|token| !token.is_empty())
            .map(SecretString::from))
    }

    /// Clear the persisted session, notify listeners, and request a login.
    ///
    /// Applies regardless of which operation received the 401.
    fn evict_session(&self) {
        warn!("Commerce API rejected the session credential, evicting session");

        if let Err(e) = self.inner.store.clear() {
            error!(error = %e, "Failed to clear persisted session during eviction");
        }

        self.inner.listeners.notify();

        // No subscribers is fine: nobody is rendering a view.
        let _ = self.inner.events.send(GatewayEvent::LoginRequired);
    }

    // =========================================================================
    // Auth Endpoints
    // =========================================================================

    /// Create an account. Does not establish a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn register(&self, account: &NewAccount) -> Result<User, ApiError> {
        self.request_with(Method::POST, "/auth/register", account)
            .await
    }

    /// Exchange credentials for a bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn login(&self, credentials: &Credentials) -> Result<AuthToken, ApiError> {
        self.request_with(Method::POST, "/auth/login", credentials)
            .await
    }

    /// Fetch the profile of the user owning the current credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.request(Method::GET, "/auth/me", None).await
    }

    // =========================================================================
    // Cart Endpoints
    // =========================================================================

    /// Get the current user's cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn get_cart(&self) -> Result<Cart, ApiError> {
        self.request(Method::GET, "/cart", None).await
    }

    /// Add a product to the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn add_to_cart(&self, request: &AddToCartRequest) -> Result<Cart, ApiError> {
        self.request_with(Method::POST, "/cart/add", request).await
    }

    /// Change the quantity of a cart line.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn update_cart_item(
        &self,
        item_id: CartItemId,
        request: &UpdateCartItemRequest,
    ) -> Result<Cart, ApiError> {
        self.request_with(Method::PUT, &format!("/cart/update/{item_id}"), request)
            .await
    }

    /// Remove a cart line. The response body is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn remove_cart_item(&self, item_id: CartItemId) -> Result<(), ApiError> {
        self.send(Method::DELETE, &format!("/cart/remove/{item_id}"), None)
            .await
            .map(|_| ())
    }

    /// Check out a cart line. The payload is passed through untyped.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or the body is not JSON.
    pub async fn checkout(&self, cart_item_id: CartItemId) -> Result<serde_json::Value, ApiError> {
        let text = self
            .send(Method::POST, &format!("/cart/checkout/{cart_item_id}"), None)
            .await?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    // =========================================================================
    // Order Endpoints
    // =========================================================================

    /// Get all orders of the current user.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn get_orders(&self) -> Result<Vec<Order>, ApiError> {
        self.request(Method::GET, "/orders", None).await
    }

    /// Get a single order.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn get_order(&self, id: OrderId) -> Result<Order, ApiError> {
        self.request(Method::GET, &format!("/orders/{id}"), None)
            .await
    }

    /// Request cancellation of an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn cancel_order(&self, id: OrderId) -> Result<Order, ApiError> {
        self.request(Method::PUT, &format!("/orders/{id}/cancel"), None)
            .await
    }

    // =========================================================================
    // Product Endpoints
    // =========================================================================

    /// Get the full catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn get_products(&self) -> Result<Vec<Product>, ApiError> {
        self.request(Method::GET, "/products", None).await
    }

    /// Get a single product.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    pub async fn get_product(&self, id: ProductId) -> Result<Product, ApiError> {
        self.request(Method::GET, &format!("/products/{id}"), None)
            .await
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(LOG_BODY_LIMIT).collect()
}
