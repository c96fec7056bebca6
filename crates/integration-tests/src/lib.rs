//! Integration tests for the Suraj Jewels storefront state layer.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p suraj-jewels-integration-tests
//! ```
//!
//! No backend is needed: every test runs the stores against
//! [`FakeCommerceApi`] and an in-memory device cart.
//!
//! # Test Categories
//!
//! - `wishlist_sync` - Optimistic wishlist writes and session changes
//! - `cart_sync` - Cart totals, persistence and merge on sign-in
//! - `session_lifecycle` - Sign-in, sign-out and rejected tokens
//! - `header_navigation` - Header state driven by page signals
//! - `product_surface` - Product card notifications

use std::sync::{Arc, Mutex, PoisonError};

use rust_decimal::Decimal;
use tokio::sync::mpsc;

use suraj_jewels_core::{CartSnapshot, Notification, Price, ProductId};
use suraj_jewels_storefront::cart::MemoryCartStore;
use suraj_jewels_storefront::navigation::Router;
use suraj_jewels_storefront::testing::FakeCommerceApi;
use suraj_jewels_storefront::{Storefront, StorefrontConfig};

/// Account registered by [`TestContext::new`].
pub const EMAIL: &str = "asha@suraj.in";
pub const PASSWORD: &str = "secret";
pub const NAME: &str = "Asha";

/// Router that remembers where it was sent.
#[derive(Debug, Default)]
pub struct RecordingRouter {
    paths: Mutex<Vec<String>>,
}

impl RecordingRouter {
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Router for RecordingRouter {
    fn navigate(&self, path: &str) {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_string());
    }
}

/// A storefront wired to a fake backend, an in-memory device cart and a
/// notification channel.
pub struct TestContext {
    pub storefront: Storefront,
    pub api: FakeCommerceApi,
    pub cart_store: Arc<MemoryCartStore>,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
}

impl TestContext {
    /// Anonymous storefront with one registered account ([`EMAIL`]).
    ///
    /// # Panics
    ///
    /// Never in practice; the API URL is a constant.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(MemoryCartStore::new())
    }

    /// Like [`new`](Self::new), on a device that already saved `snapshot`.
    /// The cart is not restored until the test asks for it.
    #[must_use]
    pub fn with_device_cart(snapshot: CartSnapshot) -> Self {
        Self::with_store(MemoryCartStore::with_snapshot(snapshot))
    }

    #[allow(clippy::unwrap_used)]
    fn with_store(store: MemoryCartStore) -> Self {
        let api = FakeCommerceApi::new();
        api.with_user(EMAIL, PASSWORD, NAME);
        let cart_store = Arc::new(store);
        let (tx, notifications) = mpsc::unbounded_channel();

        let storefront = Storefront::from_parts(
            StorefrontConfig::with_api_url("http://localhost:5000/api").unwrap(),
            Arc::new(api.clone()),
            Arc::clone(&cart_store) as _,
            Arc::new(tx),
        );

        Self {
            storefront,
            api,
            cart_store,
            notifications,
        }
    }

    /// Sign in as [`EMAIL`].
    ///
    /// # Panics
    ///
    /// If the sign-in fails.
    #[allow(clippy::unwrap_used)]
    pub async fn sign_in(&self) {
        self.storefront.login(EMAIL, PASSWORD).await.unwrap();
    }

    /// Notifications delivered so far.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        let mut seen = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            seen.push(notification);
        }
        seen
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use]
pub fn pid(id: &str) -> ProductId {
    ProductId::new(id)
}

/// Price in rupees.
///
/// # Panics
///
/// For a negative amount.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn inr(rupees: i64) -> Price {
    Price::inr(Decimal::new(rupees, 0)).unwrap()
}

/// Let spawned tasks run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
