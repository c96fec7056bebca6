//! Wishlist cache: the set of products the signed-in shopper favorited.
//!
//! Membership shown to the UI is the confirmed set with every pending flip
//! applied on top. Each `add`/`remove` that changes membership records one
//! flip delta and queues a remote write for that product. When the write
//! reaches the front of the product's queue, the request is derived from the
//! confirmed state at that moment, so a failed earlier flip never corrupts a
//! later one: a failure drops only its own flip.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info, instrument, warn};

use suraj_jewels_core::ProductId;

use crate::api::ApiError;
use crate::error::{self, MutationOutcome, StoreError};
use crate::observer::{Observers, Subscription};
use crate::queue::{KeyedQueue, Turn, spawn_write};
use crate::session::{Authorization, SessionEvent, SessionStore};

/// Wishlist change notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WishlistChange {
    /// Shown membership of one product changed (optimistically, on commit,
    /// or on rollback).
    Updated {
        product_id: ProductId,
        wishlisted: bool,
    },
    /// The remote wishlist replaced the local one.
    Reloaded,
    /// The wishlist was emptied because the session ended.
    Cleared,
}

#[derive(Default)]
struct WishlistState {
    confirmed: HashSet<ProductId>,
    /// Outstanding flip deltas per product, oldest first.
    pending: HashMap<ProductId, Vec<u64>>,
    next_delta: u64,
    queue: Option<KeyedQueue<ProductId>>,
}

impl WishlistState {
    fn contains(&self, product_id: &ProductId) -> bool {
        let flips = self.pending.get(product_id).map_or(0, Vec::len);
        self.confirmed.contains(product_id) ^ (flips % 2 == 1)
    }

    fn queue(&mut self) -> &mut KeyedQueue<ProductId> {
        self.queue.get_or_insert_with(KeyedQueue::new)
    }

    fn push_flip(&mut self, product_id: &ProductId) -> u64 {
        let id = self.next_delta;
        self.next_delta += 1;
        self.pending.entry(product_id.clone()).or_default().push(id);
        id
    }

    /// Remove a flip; returns false if it was already gone (e.g. cleared).
    fn drop_flip(&mut self, product_id: &ProductId, delta: u64) -> bool {
        let Some(flips) = self.pending.get_mut(product_id) else {
            return false;
        };
        let before = flips.len();
        flips.retain(|id| *id != delta);
        let removed = flips.len() != before;
        if flips.is_empty() {
            self.pending.remove(product_id);
        }
        removed
    }
}

/// A mutation that has been applied locally and awaits its remote write.
struct PendingFlip {
    product_id: ProductId,
    delta: u64,
    auth: Authorization,
    turn: Turn,
}

/// Shared wishlist for the current session.
///
/// Cheaply cloneable; clones share the same set.
#[derive(Clone)]
pub struct WishlistCache {
    inner: Arc<WishlistInner>,
}

struct WishlistInner {
    session: SessionStore,
    state: Mutex<WishlistState>,
    observers: Observers<WishlistChange>,
    session_events: Mutex<Option<Subscription>>,
}

impl WishlistCache {
    /// Create an empty wishlist bound to `session`.
    ///
    /// The wishlist clears itself whenever the session ends.
    #[must_use]
    pub fn new(session: SessionStore) -> Self {
        let cache = Self {
            inner: Arc::new(WishlistInner {
                session,
                state: Mutex::new(WishlistState::default()),
                observers: Observers::new(),
                session_events: Mutex::new(None),
            }),
        };

        let weak: Weak<WishlistInner> = Arc::downgrade(&cache.inner);
        let subscription = cache.inner.session.subscribe(move |event| {
            if matches!(event, SessionEvent::LoggedOut | SessionEvent::Expired)
                && let Some(inner) = weak.upgrade()
            {
                Self { inner }.clear();
            }
        });
        *cache
            .inner
            .session_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(subscription);

        cache
    }

    /// Whether the product is shown as wishlisted. O(1), never waits.
    #[must_use]
    pub fn is_wishlisted(&self, product_id: &ProductId) -> bool {
        self.state().contains(product_id)
    }

    /// Every product currently shown as wishlisted, sorted by id.
    #[must_use]
    pub fn items(&self) -> Vec<ProductId> {
        let state = self.state();
        let mut items: Vec<ProductId> = state
            .confirmed
            .iter()
            .chain(state.pending.keys())
            .filter(|id| state.contains(id))
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        items.sort();
        items
    }

    /// Number of products shown as wishlisted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items().len()
    }

    /// Whether nothing is wishlisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a product.
    ///
    /// The insertion is visible as soon as this is called; the returned
    /// future performs the remote write and rolls the insertion back if it
    /// fails. Adding a product that is already shown as wishlisted returns
    /// `Unchanged` without a request.
    ///
    /// # Errors
    ///
    /// `AuthenticationRequired` when anonymous (or the token was rejected),
    /// `NetworkFailure` when the write failed and was rolled back.
    pub fn add(
        &self,
        product_id: &ProductId,
    ) -> impl Future<Output = error::Result<MutationOutcome>> + Send + 'static {
        self.set(product_id, true)
    }

    /// Remove a product. Symmetric to [`add`](Self::add).
    ///
    /// # Errors
    ///
    /// Same as [`add`](Self::add).
    pub fn remove(
        &self,
        product_id: &ProductId,
    ) -> impl Future<Output = error::Result<MutationOutcome>> + Send + 'static {
        self.set(product_id, false)
    }

    /// Add or remove depending on the shown membership.
    ///
    /// # Errors
    ///
    /// Same as [`add`](Self::add).
    pub fn toggle(
        &self,
        product_id: &ProductId,
    ) -> impl Future<Output = error::Result<MutationOutcome>> + Send + 'static {
        let wanted = !self.is_wishlisted(product_id);
        self.set(product_id, wanted)
    }

    /// Replace the local set with the server's wishlist.
    ///
    /// Pending flips stay on top of the reloaded set.
    ///
    /// # Errors
    ///
    /// `AuthenticationRequired` when anonymous or the token was rejected,
    /// `NetworkFailure` otherwise.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> error::Result<MutationOutcome> {
        let auth = self.inner.session.authorize()?;
        let items = match self.inner.session.api().fetch_wishlist(&auth.token).await {
            Ok(items) => items,
            Err(e) => return Err(self.fail(&auth, e)),
        };

        if self.inner.session.generation() != auth.generation {
            debug!("Session changed during wishlist reload, discarding");
            return Ok(MutationOutcome::Discarded);
        }

        let count = items.len();
        self.state().confirmed = items.into_iter().collect();
        info!(count, "Wishlist reloaded");
        self.inner.observers.notify(&WishlistChange::Reloaded);
        Ok(MutationOutcome::Applied)
    }

    /// Drop every entry and pending flip.
    pub fn clear(&self) {
        {
            let mut state = self.state();
            state.confirmed.clear();
            state.pending.clear();
        }
        self.inner.observers.notify(&WishlistChange::Cleared);
    }

    /// Observe wishlist changes.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(
        &self,
        callback: impl Fn(&WishlistChange) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.observers.subscribe(callback)
    }

    /// Add (`wanted`) or remove a product.
    pub(crate) fn set(
        &self,
        product_id: &ProductId,
        wanted: bool,
    ) -> impl Future<Output = error::Result<MutationOutcome>> + Send + 'static {
        // Applied synchronously so call order is the order of optimistic
        // transitions, even before the returned future is polled.
        let prepared = self.prepare(product_id, wanted);
        let cache = self.clone();
        spawn_write(prepared.map(|flip| flip.map(|flip| async move { cache.dispatch(flip).await })))
    }

    fn prepare(&self, product_id: &ProductId, wanted: bool) -> error::Result<Option<PendingFlip>> {
        let auth = self.inner.session.authorize()?;

        let flip = {
            let mut state = self.state();
            if state.contains(product_id) == wanted {
                return Ok(None);
            }
            let delta = state.push_flip(product_id);
            let turn = state.queue().enqueue(product_id);
            PendingFlip {
                product_id: product_id.clone(),
                delta,
                auth,
                turn,
            }
        };

        let action = if wanted {
            "Added to wishlist"
        } else {
            "Removed from wishlist"
        };
        error::add_breadcrumb("wishlist", action, Some(&[("product_id", product_id.as_str())]));
        self.inner.observers.notify(&WishlistChange::Updated {
            product_id: product_id.clone(),
            wishlisted: wanted,
        });
        Ok(Some(flip))
    }

    async fn dispatch(&self, mut flip: PendingFlip) -> error::Result<MutationOutcome> {
        flip.turn.ready().await;

        let session = &self.inner.session;
        if session.generation() != flip.auth.generation {
            self.settle(&flip, None);
            return Ok(MutationOutcome::Discarded);
        }

        // Every earlier flip for this product has settled, so the confirmed
        // state is exactly what this flip inverts.
        let insert = !self.state().confirmed.contains(&flip.product_id);
        let api = session.api();
        let result = if insert {
            api.add_to_wishlist(&flip.auth.token, &flip.product_id).await
        } else {
            api.remove_from_wishlist(&flip.auth.token, &flip.product_id)
                .await
        };

        if session.generation() != flip.auth.generation {
            debug!(product_id = %flip.product_id, "Session changed mid-request, discarding result");
            self.settle(&flip, None);
            return Ok(MutationOutcome::Discarded);
        }

        match result {
            Ok(()) => {
                self.settle(&flip, Some(insert));
                Ok(MutationOutcome::Applied)
            }
            Err(e) => {
                warn!(product_id = %flip.product_id, error = %e, "Wishlist write failed, rolling back");
                self.settle(&flip, None);
                Err(self.fail(&flip.auth, e))
            }
        }
    }

    /// Retire a flip: commit it (`Some(member)`) or drop it (`None`).
    fn settle(&self, flip: &PendingFlip, commit: Option<bool>) {
        let (changed, shown) = {
            let mut state = self.state();
            let before = state.contains(&flip.product_id);
            let removed = state.drop_flip(&flip.product_id, flip.delta);
            if removed && let Some(member) = commit {
                if member {
                    state.confirmed.insert(flip.product_id.clone());
                } else {
                    state.confirmed.remove(&flip.product_id);
                }
            }
            state.queue().release(&flip.product_id, &flip.turn);
            let after = state.contains(&flip.product_id);
            (before != after, after)
        };

        if changed {
            self.inner.observers.notify(&WishlistChange::Updated {
                product_id: flip.product_id.clone(),
                wishlisted: shown,
            });
        }
    }

    fn fail(&self, auth: &Authorization, err: ApiError) -> StoreError {
        if err.is_unauthorized() {
            self.inner.session.invalidate(auth.generation);
            StoreError::AuthenticationRequired
        } else {
            StoreError::NetworkFailure(err)
        }
    }

    fn state(&self) -> MutexGuard<'_, WishlistState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use suraj_jewels_core::Credentials;

    use super::*;
    use crate::testing::{ApiOp, FakeCommerceApi, Failure};

    const EMAIL: &str = "asha@suraj.in";

    async fn signed_in() -> (WishlistCache, FakeCommerceApi, SessionStore) {
        let api = FakeCommerceApi::new();
        api.with_user(EMAIL, "secret", "Asha");
        let session = SessionStore::new(Arc::new(api.clone()));
        let wishlist = WishlistCache::new(session.clone());
        session
            .login(&Credentials::parse(EMAIL, "secret").unwrap())
            .await
            .unwrap();
        (wishlist, api, session)
    }

    fn pid(id: &str) -> ProductId {
        ProductId::new(id)
    }

    #[test]
    fn test_flips_compose_over_confirmed() {
        let mut state = WishlistState::default();
        let p = pid("P1");
        assert!(!state.contains(&p));

        let first = state.push_flip(&p);
        assert!(state.contains(&p));
        let second = state.push_flip(&p);
        assert!(!state.contains(&p));

        // Dropping the first flip leaves only the second applied.
        assert!(state.drop_flip(&p, first));
        assert!(state.contains(&p));
        assert!(state.drop_flip(&p, second));
        assert!(!state.contains(&p));
        assert!(state.pending.is_empty());
    }

    #[test]
    fn test_drop_unknown_flip() {
        let mut state = WishlistState::default();
        assert!(!state.drop_flip(&pid("P1"), 7));
    }

    #[test]
    fn test_confirmed_membership() {
        let mut state = WishlistState::default();
        state.confirmed.insert(pid("P1"));
        assert!(state.contains(&pid("P1")));
        state.push_flip(&pid("P1"));
        assert!(!state.contains(&pid("P1")));
    }

    #[tokio::test]
    async fn test_anonymous_mutation_requires_auth() {
        let session = SessionStore::new(Arc::new(FakeCommerceApi::new()));
        let wishlist = WishlistCache::new(session);
        let err = wishlist.add(&pid("P1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AuthenticationRequired));
        assert!(!wishlist.is_wishlisted(&pid("P1")));
    }

    #[tokio::test]
    async fn test_add_is_visible_before_it_completes() {
        let (wishlist, api, _session) = signed_in().await;
        let pending = wishlist.add(&pid("P1"));
        assert!(wishlist.is_wishlisted(&pid("P1")));

        assert_eq!(pending.await.unwrap(), MutationOutcome::Applied);
        assert_eq!(api.wishlist_of(EMAIL), [pid("P1")]);
    }

    #[tokio::test]
    async fn test_redundant_add_sends_nothing() {
        let (wishlist, api, _session) = signed_in().await;
        wishlist.add(&pid("P1")).await.unwrap();
        assert_eq!(
            wishlist.add(&pid("P1")).await.unwrap(),
            MutationOutcome::Unchanged
        );
        assert_eq!(
            wishlist.remove(&pid("P2")).await.unwrap(),
            MutationOutcome::Unchanged
        );
        assert_eq!(api.count(ApiOp::AddToWishlist), 1);
        assert_eq!(api.count(ApiOp::RemoveFromWishlist), 0);
    }

    #[tokio::test]
    async fn test_failed_remove_restores_membership() {
        let (wishlist, api, _session) = signed_in().await;
        wishlist.add(&pid("P1")).await.unwrap();
        api.fail_next(ApiOp::RemoveFromWishlist, Failure::Network);

        let err = wishlist.remove(&pid("P1")).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(wishlist.is_wishlisted(&pid("P1")));
    }

    #[tokio::test]
    async fn test_reload_replaces_items() {
        let (wishlist, api, _session) = signed_in().await;
        api.seed_wishlist(EMAIL, &pid("P3"));
        api.seed_wishlist(EMAIL, &pid("P2"));

        wishlist.reload().await.unwrap();
        assert_eq!(wishlist.items(), [pid("P2"), pid("P3")]);
        assert_eq!(wishlist.len(), 2);
    }

    #[tokio::test]
    async fn test_logout_clears() {
        let (wishlist, _api, session) = signed_in().await;
        wishlist.add(&pid("P1")).await.unwrap();

        let cleared = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&cleared);
        let _sub = wishlist.subscribe(move |change| {
            if *change == WishlistChange::Cleared {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        session.logout().await;
        assert!(wishlist.is_empty());
        assert_eq!(cleared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_write_signs_out() {
        let (wishlist, api, session) = signed_in().await;
        api.expire_tokens();

        let err = wishlist.toggle(&pid("P1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AuthenticationRequired));
        assert!(!session.is_authenticated());
        assert!(!wishlist.is_wishlisted(&pid("P1")));
    }
}
