//! Session store: the single source of truth for "is a shopper signed in".
//!
//! Every login, logout and invalidation bumps the session generation.
//! Wishlist and cart mutations record the generation when they start and
//! compare it when their request completes; a mismatch means the identity
//! changed underneath them and their result is discarded.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use secrecy::SecretString;
use tracing::{info, instrument, warn};

use suraj_jewels_core::{Credentials, Session, UserId};

use crate::api::CommerceApi;
use crate::error::{self, StoreError};
use crate::observer::{Observers, Subscription};

/// Session lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A shopper signed in.
    LoggedIn(UserId),
    /// The shopper signed out.
    LoggedOut,
    /// The server rejected the token, or it expired locally.
    Expired,
}

/// Identity, token and generation captured for one authenticated request.
#[derive(Debug, Clone)]
pub struct Authorization {
    pub user_id: UserId,
    pub token: SecretString,
    pub generation: u64,
}

#[derive(Default)]
struct SessionSlot {
    current: Option<Session>,
    generation: u64,
}

/// Holds the authenticated identity.
///
/// Cheaply cloneable; clones share the same session.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

struct SessionStoreInner {
    api: Arc<dyn CommerceApi>,
    slot: RwLock<SessionSlot>,
    observers: Observers<SessionEvent>,
}

impl SessionStore {
    /// Create an anonymous session store.
    #[must_use]
    pub fn new(api: Arc<dyn CommerceApi>) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                api,
                slot: RwLock::new(SessionSlot::default()),
                observers: Observers::new(),
            }),
        }
    }

    /// The current session, if any. Never waits on the network.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.read(|slot| slot.current.clone())
    }

    /// Whether a shopper is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read(|slot| slot.current.is_some())
    }

    /// Counter identifying the current session lifetime.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.read(|slot| slot.generation)
    }

    /// Sign in.
    ///
    /// On success the session is replaced and `LoggedIn` is emitted. On
    /// failure nothing changes and the request is not retried.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AuthenticationFailed` if the server refuses the
    /// credentials, `StoreError::NetworkFailure` if it cannot be reached.
    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    pub async fn login(&self, credentials: &Credentials) -> error::Result<Session> {
        let response = self
            .inner
            .api
            .login(credentials)
            .await
            .map_err(StoreError::from_login)?;

        let session = Session::from(response);
        let user_id = session.user_id.clone();
        let previous = self.write(|slot| {
            slot.generation += 1;
            slot.current.replace(session.clone())
        });
        if previous.is_some() {
            info!("Replacing an existing session");
        }

        info!(user_id = %user_id, "Signed in");
        error::set_sentry_user(&user_id);
        error::add_breadcrumb("auth", "Signed in", None);
        self.inner.observers.notify(&SessionEvent::LoggedIn(user_id));
        Ok(session)
    }

    /// Sign out.
    ///
    /// Local state is cleared first; the remote `POST /auth/logout` is best
    /// effort and its failure is only logged.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let Some(session) = self.end_session() else {
            return;
        };

        info!(user_id = %session.user_id, "Signed out");
        error::clear_sentry_user();
        error::add_breadcrumb("auth", "Signed out", None);
        self.inner.observers.notify(&SessionEvent::LoggedOut);

        if let Err(e) = self.inner.api.logout(session.auth_token()).await {
            warn!(error = %e, "Remote logout failed; token left to expire");
        }
    }

    /// Downgrade to anonymous after the server rejected the token.
    ///
    /// Only invalidates if the session of `generation` is still current, so
    /// a late 401 from an old session cannot sign out a newer one.
    pub fn invalidate(&self, generation: u64) {
        let ended = self.write(|slot| {
            if slot.generation != generation || slot.current.is_none() {
                return None;
            }
            slot.generation += 1;
            slot.current.take()
        });

        if let Some(session) = ended {
            warn!(user_id = %session.user_id, "Session rejected, continuing as anonymous");
            error::clear_sentry_user();
            self.inner.observers.notify(&SessionEvent::Expired);
        }
    }

    /// Token and generation for an authenticated request.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AuthenticationRequired` when anonymous, or when
    /// the session's expiry has passed (the session is invalidated first).
    pub fn authorize(&self) -> error::Result<Authorization> {
        let (session, generation) = self.read(|slot| (slot.current.clone(), slot.generation));
        let session = session.ok_or(StoreError::AuthenticationRequired)?;

        if session.is_expired(Utc::now()) {
            self.invalidate(generation);
            return Err(StoreError::AuthenticationRequired);
        }

        Ok(Authorization {
            token: session.auth_token().clone(),
            user_id: session.user_id,
            generation,
        })
    }

    /// Observe session lifecycle events.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(
        &self,
        callback: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.observers.subscribe(callback)
    }

    pub(crate) fn api(&self) -> &Arc<dyn CommerceApi> {
        &self.inner.api
    }

    fn end_session(&self) -> Option<Session> {
        self.write(|slot| {
            let session = slot.current.take()?;
            slot.generation += 1;
            Some(session)
        })
    }

    fn read<T>(&self, f: impl FnOnce(&SessionSlot) -> T) -> T {
        f(&self.inner.slot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write<T>(&self, f: impl FnOnce(&mut SessionSlot) -> T) -> T {
        f(&mut self.inner.slot.write().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use chrono::Duration;

    use super::*;
    use crate::testing::{ApiOp, FakeCommerceApi, Failure};

    fn credentials(password: &str) -> Credentials {
        Credentials::parse("asha@suraj.in", password).unwrap()
    }

    fn store() -> (SessionStore, FakeCommerceApi) {
        let api = FakeCommerceApi::new();
        api.with_user("asha@suraj.in", "secret", "Asha");
        (SessionStore::new(Arc::new(api.clone())), api)
    }

    fn record(store: &SessionStore) -> (Arc<Mutex<Vec<SessionEvent>>>, Subscription) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let sub = store.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        (events, sub)
    }

    #[tokio::test]
    async fn test_login_sets_session_and_bumps_generation() {
        let (store, _api) = store();
        let (events, _sub) = record(&store);
        assert!(!store.is_authenticated());
        let before = store.generation();

        let session = store.login(&credentials("secret")).await.unwrap();
        assert_eq!(session.display_name, "Asha");
        assert!(store.is_authenticated());
        assert_eq!(store.generation(), before + 1);
        assert_eq!(
            *events.lock().unwrap(),
            [SessionEvent::LoggedIn(session.user_id)]
        );
    }

    #[tokio::test]
    async fn test_failed_login_changes_nothing() {
        let (store, api) = store();
        let err = store.login(&credentials("wrong")).await.unwrap_err();
        assert!(
            matches!(err, StoreError::AuthenticationFailed(ref m) if m == "Invalid email or password")
        );
        assert!(!store.is_authenticated());
        assert_eq!(store.generation(), 0);
        assert_eq!(api.count(ApiOp::Login), 1);
    }

    #[tokio::test]
    async fn test_network_failure_on_login() {
        let (store, api) = store();
        api.fail_next(ApiOp::Login, Failure::Network);
        let err = store.login(&credentials("secret")).await.unwrap_err();
        assert!(matches!(err, StoreError::NetworkFailure(_)));
        assert_eq!(api.count(ApiOp::Login), 1);
    }

    #[tokio::test]
    async fn test_logout_clears_even_if_remote_fails() {
        let (store, api) = store();
        store.login(&credentials("secret")).await.unwrap();
        let (events, _sub) = record(&store);
        api.fail_next(ApiOp::Logout, Failure::Network);

        store.logout().await;
        assert!(store.current_session().is_none());
        assert_eq!(*events.lock().unwrap(), [SessionEvent::LoggedOut]);
    }

    #[tokio::test]
    async fn test_stale_invalidate_is_ignored() {
        let (store, _api) = store();
        store.login(&credentials("secret")).await.unwrap();
        let stale = store.generation();
        store.logout().await;
        store.login(&credentials("secret")).await.unwrap();

        store.invalidate(stale);
        assert!(store.is_authenticated());

        let (events, _sub) = record(&store);
        store.invalidate(store.generation());
        assert!(!store.is_authenticated());
        assert_eq!(*events.lock().unwrap(), [SessionEvent::Expired]);
    }

    #[tokio::test]
    async fn test_authorize_rejects_expired_session() {
        let (store, api) = store();
        assert!(matches!(
            store.authorize(),
            Err(StoreError::AuthenticationRequired)
        ));

        api.set_token_expiry(Some(Utc::now() - Duration::minutes(1)));
        store.login(&credentials("secret")).await.unwrap();
        assert!(matches!(
            store.authorize(),
            Err(StoreError::AuthenticationRequired)
        ));
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_authorize_carries_generation() {
        let (store, _api) = store();
        store.login(&credentials("secret")).await.unwrap();
        let auth = store.authorize().unwrap();
        assert_eq!(auth.generation, store.generation());
    }
}
