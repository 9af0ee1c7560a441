//! Session lifecycle.
//!
//! Owns the authenticated identity: a bearer credential plus the profile of
//! the user it belongs to. Both are mirrored into the injected
//! [`SessionStore`] so a session survives restarts, and are cleared together
//! on logout, on a failed refresh, or when the gateway evicts the session.
//!
//! # States
//!
//! ```text
//! Anonymous --login--> Authenticating --ok--> Authenticated
//!     ^                     |                     |   ^
//!     +-------error---------+            refresh  |   | ok
//!     +<----logout / 401 / refresh error-- Refreshing-+
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use secrecy::{ExposeSecret, SecretString};
use shopkeep_core::{Credentials, NewAccount, User, UserId};
use tracing::{info, instrument, warn};

use crate::api::{Gateway, ListenerSet, SessionListener};
use crate::error::{Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::services::Activity;
use crate::store::{SessionSlot, SessionStore};

/// Observable phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No usable session.
    Anonymous,
    /// A login is exchanging credentials or fetching the profile.
    Authenticating,
    /// Credential and profile are both present.
    Authenticated,
    /// The profile is being re-fetched for an authenticated session.
    Refreshing,
}

/// Snapshot of an authenticated session.
///
/// The credential is opaque; it never expires client-side and is only
/// invalidated by the server answering 401.
#[derive(Debug, Clone)]
pub struct Session {
    /// Owner of the session.
    pub user_id: UserId,
    /// Display name of the owner.
    pub username: String,
    credential: SecretString,
}

impl Session {
    /// The bearer credential.
    #[must_use]
    pub const fn credential(&self) -> &SecretString {
        &self.credential
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Authenticating,
    Refreshing,
}

struct SessionData {
    credential: Option<SecretString>,
    user: Option<User>,
    phase: Phase,
}

impl SessionData {
    const fn empty() -> Self {
        Self {
            credential: None,
            user: None,
            phase: Phase::Idle,
        }
    }

    fn is_authenticated(&self) -> bool {
        self.credential
            .as_ref()
            .is_some_and(|credential| !credential.expose_secret().is_empty())
            && self.user.is_some()
    }
}

/// Returns the session to `Phase::Idle` when dropped.
struct PhaseGuard<'a> {
    data: &'a Mutex<SessionData>,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .phase = Phase::Idle;
    }
}

// =============================================================================
// SessionManager
// =============================================================================

/// Manages the authenticated session.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    gateway: Gateway,
    data: Mutex<SessionData>,
    activity: Activity,
    listeners: ListenerSet,
}

impl SessionInner {
    fn data(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self) -> &Arc<dyn SessionStore> {
        self.gateway.store()
    }

    /// Enter `phase` until the returned guard is dropped.
    fn enter(&self, phase: Phase) -> PhaseGuard<'_> {
        self.data().phase = phase;
        PhaseGuard { data: &self.data }
    }

    /// Drop the in-memory session and tell downstream listeners.
    fn end_session(&self) {
        *self.data() = SessionData::empty();
        clear_sentry_user();
        self.listeners.notify();
    }
}

impl SessionListener for SessionInner {
    fn on_session_ended(&self) {
        info!("Session evicted by the commerce API");
        self.end_session();
    }
}

impl SessionManager {
    /// Create a manager bound to `gateway` and its session store.
    ///
    /// The manager registers itself for gateway evictions.
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        let inner = Arc::new(SessionInner {
            gateway,
            data: Mutex::new(SessionData::empty()),
            activity: Activity::new(),
            listeners: ListenerSet::default(),
        });

        let listener: Arc<dyn SessionListener> = inner.clone();
        inner.gateway.add_session_listener(&listener);

        Self { inner }
    }

    /// Register a listener notified whenever the session ends.
    pub fn add_listener(&self, listener: &Arc<dyn SessionListener>) {
        self.inner.listeners.add(listener);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current phase of the session.
    #[must_use]
    pub fn state(&self) -> SessionState {
        let data = self.inner.data();
        match data.phase {
            Phase::Authenticating => SessionState::Authenticating,
            Phase::Refreshing if data.is_authenticated() => SessionState::Refreshing,
            Phase::Idle | Phase::Refreshing if data.is_authenticated() => {
                SessionState::Authenticated
            }
            Phase::Idle | Phase::Refreshing => SessionState::Anonymous,
        }
    }

    /// True only when both the credential and the profile are present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.data().is_authenticated()
    }

    /// Profile of the signed-in user.
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.inner.data().user.clone()
    }

    /// Snapshot of the session when authenticated.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        let data = self.inner.data();
        match (&data.credential, &data.user) {
            (Some(credential), Some(user)) => Some(Session {
                user_id: user.id,
                username: user.username.clone(),
                credential: credential.clone(),
            }),
            _ => None,
        }
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

    /// Forget the latest error.
    pub fn clear_error(&self) {
        self.inner.activity.clear_error();
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Rebuild the session from persisted state. Performs no network call.
    ///
    /// Returns `true` when both the credential and the profile were present
    /// and the profile decoded. An undecodable profile or unreadable storage
    /// clears both persisted values and leaves the session anonymous.
    #[instrument(skip(self))]
    pub fn restore(&self) -> bool {
        let store = self.inner.store();
        let loaded = store
            .get(SessionSlot::Credential)
            .and_then(|credential| Ok((credential, store.get(SessionSlot::Profile)?)));

        let (credential, profile) = match loaded {
            Ok((Some(credential), Some(profile))) if !credential.is_empty() => {
                (credential, profile)
            }
            Ok(_) => return false,
            Err(e) => {
                warn!(error = %e, "Persisted session is unreadable, clearing it");
                self.discard_persisted();
                return false;
            }
        };

        let user: User = match serde_json::from_str(&profile) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Persisted profile is corrupt, clearing session");
                self.discard_persisted();
                return false;
            }
        };

        set_sentry_user(&user.id, &user.username);
        info!(user_id = %user.id, "Session restored");

        *self.inner.data() = SessionData {
            credential: Some(SecretString::from(credential)),
            user: Some(user),
            phase: Phase::Idle,
        };
        true
    }

    /// Create an account, then log in with the same credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if registration or the follow-up login fails. The
    /// error message falls back to "Registration failed".
    #[instrument(skip(self, account), fields(username = %account.username))]
    pub async fn register(&self, account: &NewAccount) -> Result<User> {
        self.inner
            .activity
            .track("Registration failed", async {
                let created = self.inner.gateway.register(account).await?;
                info!(user_id = %created.id, "Account created");
                add_breadcrumb("auth", "Registered account", None);

                self.authenticate(&account.credentials()).await
            })
            .await
    }

    /// Exchange credentials for a session.
    ///
    /// Two steps: the credential is persisted as soon as it is issued, then
    /// the profile is fetched and persisted. If the profile fetch fails the
    /// credential stays stored but the session is not authenticated.
    ///
    /// # Errors
    ///
    /// Returns an error if either step fails. The error message falls back
    /// to "Login failed".
    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &Credentials) -> Result<User> {
        self.inner
            .activity
            .track("Login failed", self.authenticate(credentials))
            .await
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<User> {
        let phase = self.inner.enter(Phase::Authenticating);
        let result = self.exchange_credentials(credentials).await;
        drop(phase);

        if let Ok(user) = &result {
            set_sentry_user(&user.id, &user.username);
            add_breadcrumb("auth", "Logged in", None);
            info!(user_id = %user.id, "Logged in");
        }
        result
    }

    async fn exchange_credentials(&self, credentials: &Credentials) -> Result<User> {
        let token = self.inner.gateway.login(credentials).await?;
        let issued = Some(token.token.as_str()).filter(|token| !token.is_empty());
        if issued.is_none() {
            warn!("Commerce API issued an empty credential");
        }

        // A new credential never pairs with a previous user's profile.
        {
            let mut data = self.inner.data();
            data.credential = issued.map(SecretString::from);
            data.user = None;
        }
        let store = self.inner.store();
        match issued {
            Some(token) => store.set(SessionSlot::Credential, token)?,
            None => store.remove(SessionSlot::Credential)?,
        }
        store.remove(SessionSlot::Profile)?;

        let user = self.inner.gateway.current_user().await?;
        self.persist_profile(&user)?;
        Ok(user)
    }

    /// Re-fetch the profile of the signed-in user.
    ///
    /// Does nothing and returns `Ok(None)` when not authenticated. Any
    /// failure logs the session out before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile cannot be fetched or persisted. The
    /// error message falls back to "Failed to fetch user".
    #[instrument(skip(self))]
    pub async fn fetch_current_user(&self) -> Result<Option<User>> {
        if !self.is_authenticated() {
            return Ok(None);
        }

        let phase = self.inner.enter(Phase::Refreshing);
        let result = self
            .inner
            .activity
            .track("Failed to fetch user", async {
                let user = self.inner.gateway.current_user().await?;
                self.persist_profile(&user)?;
                Ok(user)
            })
            .await;
        drop(phase);

        match result {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!(error = %e, "Profile refresh failed, logging out");
                self.end_local_session();
                Err(e)
            }
        }
    }

    /// End the session locally. Never calls the API and cannot fail.
    #[instrument(skip(self))]
    pub fn logout(&self) {
        self.end_local_session();
        self.inner.activity.clear_error();
        add_breadcrumb("auth", "Logged out", None);
        info!("Logged out");
    }

    fn end_local_session(&self) {
        self.discard_persisted();
        self.inner.end_session();
    }

    fn persist_profile(&self, user: &User) -> Result<()> {
        let profile = serde_json::to_string(user)?;
        self.inner.data().user = Some(user.clone());
        self.inner.store().set(SessionSlot::Profile, &profile)?;
        Ok(())
    }

    fn discard_persisted(&self) {
        if let Err(e) = self.inner.store().clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::StorefrontConfig;
    use crate::store::MemorySessionStore;

    fn manager_for(server: &MockServer) -> (SessionManager, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        let gateway = Gateway::new(&StorefrontConfig::for_api_url(&server.uri()), store.clone());
        (SessionManager::new(gateway), store)
    }

    fn credentials() -> Credentials {
        Credentials::new("a", "secret")
    }

    async fn mount_login(server: &MockServer, token: &str) {
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": token})))
            .mount(server)
            .await;
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl SessionListener for Counter {
        fn on_session_ended(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_login_persists_credential_and_profile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({"username": "a", "password": "secret"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t1"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .and(header("authorization", "Bearer t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "username": "a"})))
            .mount(&server)
            .await;

        let (manager, store) = manager_for(&server);
        let user = manager.login(&credentials()).await.unwrap();

        assert_eq!(user.id, UserId::new(1));
        assert!(manager.is_authenticated());
        assert_eq!(manager.state(), SessionState::Authenticated);
        assert_eq!(manager.error(), None);
        assert_eq!(
            store.get(SessionSlot::Credential).unwrap().as_deref(),
            Some("t1")
        );
        let profile: User =
            serde_json::from_str(&store.get(SessionSlot::Profile).unwrap().unwrap()).unwrap();
        assert_eq!(profile, user);
        assert_eq!(manager.session().unwrap().username, "a");
    }

    #[tokio::test]
    async fn test_login_rejected_uses_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"message": "Invalid credentials"})),
            )
            .mount(&server)
            .await;

        let (manager, store) = manager_for(&server);
        assert!(manager.login(&credentials()).await.is_err());

        assert_eq!(manager.error().as_deref(), Some("Invalid credentials"));
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(!manager.is_loading());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_profile_failure_keeps_credential_but_not_authenticated() {
        let server = MockServer::start().await;
        mount_login(&server, "t1").await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (manager, store) = manager_for(&server);
        assert!(manager.login(&credentials()).await.is_err());

        assert_eq!(manager.error().as_deref(), Some("Login failed"));
        assert!(!manager.is_authenticated());
        assert_eq!(
            store.get(SessionSlot::Credential).unwrap().as_deref(),
            Some("t1")
        );
        assert!(store.get(SessionSlot::Profile).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 4, "username": "a"})))
            .expect(1)
            .mount(&server)
            .await;
        mount_login(&server, "t4").await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 4, "username": "a"})))
            .mount(&server)
            .await;

        let (manager, _store) = manager_for(&server);
        let user = manager
            .register(&NewAccount::new("a", "secret"))
            .await
            .unwrap();

        assert_eq!(user.id, UserId::new(4));
        assert!(manager.is_authenticated());
    }

    #[tokio::test]
    async fn test_register_conflict_reports_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/register"))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(json!({"message": "Username taken"})),
            )
            .mount(&server)
            .await;

        let (manager, _store) = manager_for(&server);
        let err = manager
            .register(&NewAccount::new("a", "secret"))
            .await
            .unwrap_err();

        assert_eq!(err.server_message(), Some("Username taken"));
        assert_eq!(manager.error().as_deref(), Some("Username taken"));
        assert!(!manager.is_authenticated());
    }

    #[test]
    fn test_restore_round_trip() {
        let store = Arc::new(MemorySessionStore::new());
        store.set(SessionSlot::Credential, "t1").unwrap();
        store
            .set(SessionSlot::Profile, r#"{"id":1,"username":"a"}"#)
            .unwrap();
        let gateway = Gateway::new(&StorefrontConfig::for_api_url("http://localhost:1"), store);

        let manager = SessionManager::new(gateway);
        assert!(manager.restore());
        assert!(manager.is_authenticated());
        assert_eq!(manager.current_user().unwrap().username, "a");
    }

    #[test]
    fn test_restore_with_corrupt_profile_clears_both_slots() {
        let store = Arc::new(MemorySessionStore::new());
        store.set(SessionSlot::Credential, "t1").unwrap();
        store.set(SessionSlot::Profile, "{not json").unwrap();
        let gateway = Gateway::new(
            &StorefrontConfig::for_api_url("http://localhost:1"),
            store.clone(),
        );

        let manager = SessionManager::new(gateway);
        assert!(!manager.restore());
        assert!(!manager.is_authenticated());
        assert!(store.is_empty());
    }

    #[test]
    fn test_restore_with_missing_profile_stays_anonymous() {
        let store = Arc::new(MemorySessionStore::new());
        store.set(SessionSlot::Credential, "t1").unwrap();
        let gateway = Gateway::new(
            &StorefrontConfig::for_api_url("http://localhost:1"),
            store.clone(),
        );

        let manager = SessionManager::new(gateway);
        assert!(!manager.restore());
        assert_eq!(manager.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_logout_clears_everything_and_notifies() {
        let server = MockServer::start().await;
        mount_login(&server, "t1").await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "username": "a"})))
            .mount(&server)
            .await;

        let (manager, store) = manager_for(&server);
        let counter = Arc::new(Counter::default());
        let listener: Arc<dyn SessionListener> = counter.clone();
        manager.add_listener(&listener);

        manager.login(&credentials()).await.unwrap();
        manager.logout();

        assert!(!manager.is_authenticated());
        assert!(manager.session().is_none());
        assert!(store.is_empty());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        let requests_before = server.received_requests().await.unwrap().len();
        manager.logout();
        assert_eq!(server.received_requests().await.unwrap().len(), requests_before);
    }

    #[tokio::test]
    async fn test_failed_refresh_forces_logout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (manager, store) = manager_for(&server);
        store.set(SessionSlot::Credential, "t1").unwrap();
        store
            .set(SessionSlot::Profile, r#"{"id":1,"username":"a"}"#)
            .unwrap();
        assert!(manager.restore());

        assert!(manager.fetch_current_user().await.is_err());
        assert!(!manager.is_authenticated());
        assert!(store.is_empty());
        assert_eq!(manager.error().as_deref(), Some("Failed to fetch user"));
    }

    #[tokio::test]
    async fn test_refresh_when_anonymous_is_a_no_op() {
        let server = MockServer::start().await;
        let (manager, _store) = manager_for(&server);

        assert!(manager.fetch_current_user().await.unwrap().is_none());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_eviction_ends_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let store = Arc::new(MemorySessionStore::new());
        store.set(SessionSlot::Credential, "t1").unwrap();
        store
            .set(SessionSlot::Profile, r#"{"id":1,"username":"a"}"#)
            .unwrap();
        let gateway = Gateway::new(&StorefrontConfig::for_api_url(&server.uri()), store.clone());
        let manager = SessionManager::new(gateway.clone());
        assert!(manager.restore());

        assert!(gateway.get_orders().await.unwrap_err().is_unauthorized());
        assert!(!manager.is_authenticated());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_empty_credential_is_not_a_session() {
        let server = MockServer::start().await;
        mount_login(&server, "").await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "username": "a"})))
            .mount(&server)
            .await;

        let (manager, store) = manager_for(&server);
        manager.login(&credentials()).await.unwrap();

        assert!(!manager.is_authenticated());
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(manager.session().is_none());
        assert!(store.get(SessionSlot::Credential).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_abandoned_login_returns_to_anonymous() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"token": "t1"}))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let (manager, _store) = manager_for(&server);
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), manager.login(&credentials())).await;

        assert!(abandoned.is_err());
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(!manager.is_loading());
    }

    #[tokio::test]
    async fn test_abandoned_refresh_keeps_session_authenticated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": 1, "username": "a"}))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let (manager, store) = manager_for(&server);
        store.set(SessionSlot::Credential, "t1").unwrap();
        store
            .set(SessionSlot::Profile, r#"{"id":1,"username":"a"}"#)
            .unwrap();
        assert!(manager.restore());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), manager.fetch_current_user()).await;

        assert!(abandoned.is_err());
        assert_eq!(manager.state(), SessionState::Authenticated);
        assert!(!manager.is_loading());
    }
}
