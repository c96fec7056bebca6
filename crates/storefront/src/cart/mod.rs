//! Cart aggregator: ordered cart lines shared by every surface.
//!
//! # Sync targets
//!
//! - Signed in: each delta becomes `POST`, `PUT` or `DELETE /cart/:productId`
//!   once it reaches the front of its product's queue; confirmed state is
//!   then written through to the device store (best effort).
//! - Anonymous: the confirmed cart is saved to the device store, and a failed
//!   save rolls the delta back.
//!
//! # Sign-in
//!
//! [`CartAggregator::merge_on_login`] folds the device cart into the account
//! cart once per session generation. The device remembers what the account's
//! server cart held when they last synced ([`SyncedCart`]), so only what was
//! added while signed out is added to it. Cart writes wait while a merge
//! runs.
//!
//! # Session changes
//!
//! The cart belongs to the device, not the account. A delta whose session
//! ended before its write went out follows the current session instead; one
//! whose session ended mid-request has its result discarded and is kept on
//! the device.

mod ledger;
mod merge;
mod persist;

pub use persist::{CartStore, CartStoreError, FileCartStore, MemoryCartStore};

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use suraj_jewels_core::{
    CartLine, CartSnapshot, DeviceId, Price, ProductId, SyncedCart, UserId, cart,
};

use crate::api::{ApiError, CartLineBody};
use crate::error::{self, MutationOutcome, StoreError};
use crate::observer::{Observers, Subscription};
use crate::queue::{KeyedQueue, Turn, spawn_write};
use crate::session::{Authorization, SessionStore};

use ledger::{CartLedger, Plan, PricedAt};
use merge::Push;

/// Totals delivered to cart observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartSummary {
    pub total_count: u64,
    pub total_price: Price,
}

/// Result of folding the device cart into the account cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// `Unchanged` if this session was already merged, `Discarded` if the
    /// session changed while the remote cart was loading.
    pub outcome: MutationOutcome,
    /// Lines in the cart after merging.
    pub lines: usize,
    /// Lines written back to the server.
    pub pushed: Vec<ProductId>,
    /// Lines the server did not accept; they stay in the local cart.
    pub failed: Vec<ProductId>,
}

impl MergeReport {
    const fn skipped(outcome: MutationOutcome) -> Self {
        Self {
            outcome,
            lines: 0,
            pushed: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Whether every merged line reached the server.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

struct CartState {
    device_id: DeviceId,
    ledger: CartLedger,
    queue: KeyedQueue<ProductId>,
    merged_generation: Option<u64>,
    synced: Option<SyncedCart>,
}

impl CartState {
    /// Note the quantity `user_id`'s server cart now holds for a product.
    fn record_synced(&mut self, user_id: &UserId, product_id: &ProductId, quantity: u32) {
        if self
            .synced
            .as_ref()
            .is_none_or(|synced| synced.user_id != *user_id)
        {
            self.synced = Some(SyncedCart::new(user_id.clone()));
        }
        if let Some(synced) = &mut self.synced {
            synced.record(product_id, quantity);
        }
    }
}

/// A delta applied locally and waiting for its write.
struct PendingDelta {
    product_id: ProductId,
    delta: u64,
    generation: u64,
    auth: Option<Authorization>,
    turn: Turn,
}

/// Shared cart for the current device and session.
///
/// Cheaply cloneable; clones share the same cart.
#[derive(Clone)]
pub struct CartAggregator {
    inner: Arc<CartInner>,
}

struct CartInner {
    session: SessionStore,
    store: Arc<dyn CartStore>,
    state: Mutex<CartState>,
    /// Held while computing and saving a device snapshot so saves land in
    /// the order their snapshots were taken.
    persist: tokio::sync::Mutex<()>,
    /// Writes hold it shared while they dispatch; a merge holds it
    /// exclusively from fetching the account cart until its pushes are done.
    merge_gate: tokio::sync::RwLock<()>,
    observers: Observers<CartSummary>,
}

impl CartAggregator {
    /// Create an empty cart for a fresh device.
    #[must_use]
    pub fn new(session: SessionStore, store: Arc<dyn CartStore>) -> Self {
        Self {
            inner: Arc::new(CartInner {
                session,
                store,
                state: Mutex::new(CartState {
                    device_id: DeviceId::generate(),
                    ledger: CartLedger::new(),
                    queue: KeyedQueue::new(),
                    merged_generation: None,
                    synced: None,
                }),
                persist: tokio::sync::Mutex::new(()),
                merge_gate: tokio::sync::RwLock::new(()),
                observers: Observers::new(),
            }),
        }
    }

    /// Device this cart is saved for.
    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        self.state().device_id
    }

    /// Sum of quantities over the lines shown.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        cart::total_count(&self.lines())
    }

    /// Sum of `quantity × unit price` over the lines shown.
    #[must_use]
    pub fn total_price(&self) -> Price {
        cart::total_price(&self.lines())
    }

    /// Lines shown, in cart order.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.state().ledger.lines()
    }

    /// Quantity shown for one product.
    #[must_use]
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.state().ledger.quantity_of(product_id)
    }

    #[must_use]
    pub fn summary(&self) -> CartSummary {
        let lines = self.lines();
        CartSummary {
            total_count: cart::total_count(&lines),
            total_price: cart::total_price(&lines),
        }
    }

    /// Add `quantity` units, incrementing an existing line or appending one.
    ///
    /// The change is shown immediately; the returned future writes it and
    /// rolls it back on failure.
    ///
    /// # Errors
    ///
    /// `Validation` for a zero quantity, `NetworkFailure` or `Persistence`
    /// when the write failed, `AuthenticationRequired` when the server
    /// rejected the session.
    pub fn add_line(
        &self,
        product_id: &ProductId,
        unit_price: Price,
        quantity: u32,
    ) -> impl Future<Output = error::Result<MutationOutcome>> + Send + 'static {
        let prepared = if quantity == 0 {
            Err(StoreError::Validation("Quantity must be at least 1".to_string()))
        } else {
            let priced = PricedAt {
                price: unit_price,
                at: Utc::now(),
            };
            Ok(self.prepare(product_id, |_| Some((i64::from(quantity), Some(priced)))))
        };
        self.run(prepared)
    }

    /// Delete a product's line regardless of its quantity.
    ///
    /// # Errors
    ///
    /// Same as [`add_line`](Self::add_line).
    pub fn remove_line(
        &self,
        product_id: &ProductId,
    ) -> impl Future<Output = error::Result<MutationOutcome>> + Send + 'static {
        let prepared = Ok(self.prepare(product_id, |ledger| {
            let shown = ledger.quantity_of(product_id);
            (shown > 0).then(|| (-i64::from(shown), None))
        }));
        self.run(prepared)
    }

    /// Set a product's quantity; zero or less removes the line.
    ///
    /// # Errors
    ///
    /// `Validation` if the product has no line (there is no price to use),
    /// otherwise the same as [`add_line`](Self::add_line).
    pub fn set_quantity(
        &self,
        product_id: &ProductId,
        quantity: i64,
    ) -> impl Future<Output = error::Result<MutationOutcome>> + Send + 'static {
        let prepared = if quantity <= 0 {
            Ok(self.prepare(product_id, |ledger| {
                let shown = ledger.quantity_of(product_id);
                (shown > 0).then(|| (-i64::from(shown), None))
            }))
        } else if self.quantity_of(product_id) == 0 {
            Err(StoreError::Validation(format!(
                "No cart line for product {product_id}"
            )))
        } else {
            Ok(self.prepare(product_id, |ledger| {
                let change = quantity - i64::from(ledger.quantity_of(product_id));
                // Carry the shown price so the write has one even if the
                // delta that introduced it fails.
                (change != 0).then(|| (change, ledger.priced(product_id)))
            }))
        };
        self.run(prepared)
    }

    /// Load the device cart saved by an earlier run.
    ///
    /// # Errors
    ///
    /// `Persistence` if the saved cart cannot be read.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> error::Result<MutationOutcome> {
        let Some(snapshot) = self.inner.store.load().await? else {
            debug!("No saved cart on this device");
            return Ok(MutationOutcome::Unchanged);
        };

        let lines = snapshot.lines.len();
        {
            let mut state = self.state();
            state.device_id = snapshot.device_id;
            state.ledger.replace(snapshot.lines);
            state.synced = snapshot.synced;
        }
        info!(lines, device_id = %snapshot.device_id, "Cart restored");
        self.notify();
        Ok(MutationOutcome::Applied)
    }

    /// Fold this device's cart into the signed-in account's cart.
    ///
    /// Runs once per session generation. What the device added while signed
    /// out is added to the account's lines, taking the price of the more
    /// recent write; lines already synced with this account take the server's
    /// value. Lines that differ from the server are written back. A failed
    /// write-back leaves the line in the local cart and is listed in the
    /// report.
    ///
    /// # Errors
    ///
    /// `AuthenticationRequired` when anonymous or rejected, `NetworkFailure`
    /// if the remote cart cannot be loaded.
    #[instrument(skip(self))]
    pub async fn merge_on_login(&self) -> error::Result<MergeReport> {
        let _gate = self.inner.merge_gate.write().await;

        let auth = self.inner.session.authorize()?;
        {
            let mut state = self.state();
            if state.merged_generation == Some(auth.generation) {
                return Ok(MergeReport::skipped(MutationOutcome::Unchanged));
            }
            state.merged_generation = Some(auth.generation);
        }

        let api = self.inner.session.api();
        let remote = match api.fetch_cart(&auth.token).await {
            Ok(remote) => remote,
            Err(e) => {
                {
                    let mut state = self.state();
                    if state.merged_generation == Some(auth.generation) {
                        state.merged_generation = None;
                    }
                }
                return Err(self.fail(&auth, e));
            }
        };

        if self.inner.session.generation() != auth.generation {
            return Ok(MergeReport::skipped(MutationOutcome::Discarded));
        }

        let remote: Vec<CartLine> = remote
            .into_iter()
            .filter_map(|line| {
                let product_id = line.product_id.clone();
                line.into_cart_line()
                    .inspect_err(|e| warn!(product_id = %product_id, error = %e, "Skipping remote cart line"))
                    .ok()
            })
            .collect();

        let merged = {
            let mut state = self.state();
            let synced = state.synced.take();
            let merged = merge::merge(&state.ledger.confirmed_lines(), &remote, |product_id| {
                synced
                    .as_ref()
                    .map_or(0, |synced| synced.quantity_for(&auth.user_id, product_id))
            });
            state.ledger.replace(merged.lines.clone());

            let mut account = SyncedCart::new(auth.user_id.clone());
            for line in &remote {
                account.record(&line.product_id, line.quantity);
            }
            state.synced = Some(account);
            merged
        };
        self.notify();

        let mut report = MergeReport {
            outcome: MutationOutcome::Applied,
            lines: merged.lines.len(),
            pushed: Vec::new(),
            failed: Vec::new(),
        };

        for push in merged.pushes {
            let line = push.line();
            let product_id = line.product_id.clone();

            if self.inner.session.generation() != auth.generation {
                report.failed.push(product_id);
                continue;
            }

            let body = CartLineBody::new(product_id.clone(), line.quantity, line.unit_price);
            let result = match &push {
                Push::Create(_) => api.create_cart_line(&auth.token, &body).await,
                Push::Update(_) => api.update_cart_line(&auth.token, &body).await,
            };
            match result {
                Ok(()) => {
                    self.state()
                        .record_synced(&auth.user_id, &product_id, line.quantity);
                    report.pushed.push(product_id);
                }
                Err(e) => {
                    warn!(product_id = %product_id, error = %e, "Merged cart line not saved remotely");
                    if e.is_unauthorized() {
                        self.inner.session.invalidate(auth.generation);
                    }
                    report.failed.push(product_id);
                }
            }
        }

        info!(
            lines = report.lines,
            pushed = report.pushed.len(),
            failed = report.failed.len(),
            "Cart merged"
        );
        error::add_breadcrumb("cart", "Merged device cart", None);
        self.write_through().await;
        Ok(report)
    }

    /// Save the confirmed cart to the device store.
    ///
    /// # Errors
    ///
    /// `Persistence` if the save fails.
    pub async fn flush(&self) -> error::Result<()> {
        let _guard = self.inner.persist.lock().await;
        let snapshot = self.snapshot(None);
        self.inner.store.save(&snapshot).await?;
        Ok(())
    }

    /// Observe cart totals.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(
        &self,
        callback: impl Fn(&CartSummary) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.observers.subscribe(callback)
    }

    /// Apply a delta now. `change` returns `None` when the shown state
    /// already matches the request.
    fn prepare(
        &self,
        product_id: &ProductId,
        change: impl FnOnce(&CartLedger) -> Option<(i64, Option<PricedAt>)>,
    ) -> Option<PendingDelta> {
        let (auth, generation) = self.current_auth();

        let pending = {
            let mut state = self.state();
            let (change, price) = change(&state.ledger)?;
            let delta = state.ledger.push(product_id, change, price);
            let turn = state.queue.enqueue(product_id);
            PendingDelta {
                product_id: product_id.clone(),
                delta,
                generation,
                auth,
                turn,
            }
        };

        debug!(product_id = %product_id, "Cart change applied locally");
        error::add_breadcrumb("cart", "Cart updated", Some(&[("product_id", product_id.as_str())]));
        self.notify();
        Some(pending)
    }

    fn run(
        &self,
        prepared: error::Result<Option<PendingDelta>>,
    ) -> impl Future<Output = error::Result<MutationOutcome>> + Send + 'static {
        let cart = self.clone();
        spawn_write(prepared.map(|pending| {
            pending.map(|pending| async move { cart.dispatch(pending).await })
        }))
    }

    async fn dispatch(&self, mut pending: PendingDelta) -> error::Result<MutationOutcome> {
        pending.turn.ready().await;
        let _gate = self.inner.merge_gate.read().await;

        let mut superseded = false;
        loop {
            if self.inner.session.generation() != pending.generation {
                debug!(product_id = %pending.product_id, "Session changed, following the current one");
                (pending.auth, pending.generation) = self.current_auth();
            }

            let plan = self.state().ledger.plan(&pending.product_id, pending.delta);
            let Some(plan) = plan else {
                self.settle(&pending, None, None);
                return Ok(MutationOutcome::Discarded);
            };

            let outcome = match pending.auth.clone() {
                Some(auth) => self.dispatch_remote(&pending, &plan, &auth).await?,
                None => Some(self.dispatch_local(&pending, &plan).await?),
            };
            match outcome {
                Some(_) if superseded => return Ok(MutationOutcome::Discarded),
                Some(outcome) => return Ok(outcome),
                None => superseded = true,
            }
        }
    }

    /// Send a delta to the account cart. `None` means the session changed
    /// while the request was out: its result is ignored and the delta is
    /// still pending.
    async fn dispatch_remote(
        &self,
        pending: &PendingDelta,
        plan: &Plan,
        auth: &Authorization,
    ) -> error::Result<Option<MutationOutcome>> {
        let api = self.inner.session.api();
        let result = if plan.is_noop() {
            Ok(())
        } else {
            match (&plan.line, plan.previous) {
                (None, _) => api.delete_cart_line(&auth.token, &plan.product_id).await,
                (Some(line), 0) => {
                    let body = CartLineBody::new(line.product_id.clone(), line.quantity, line.unit_price);
                    api.create_cart_line(&auth.token, &body).await
                }
                (Some(line), _) => {
                    let body = CartLineBody::new(line.product_id.clone(), line.quantity, line.unit_price);
                    api.update_cart_line(&auth.token, &body).await
                }
            }
        };

        if self.inner.session.generation() != pending.generation {
            debug!(product_id = %pending.product_id, "Session changed mid-request, discarding result");
            if result.is_ok() && !plan.is_noop() {
                // The account has the write even though this session no
                // longer shows it.
                self.state()
                    .record_synced(&auth.user_id, &plan.product_id, plan.quantity());
            }
            return Ok(None);
        }

        match result {
            Ok(()) => {
                let synced_with = (!plan.is_noop()).then_some(&auth.user_id);
                self.settle(pending, Some(plan), synced_with);
                self.write_through().await;
                Ok(Some(MutationOutcome::Applied))
            }
            Err(e) => {
                warn!(product_id = %pending.product_id, error = %e, "Cart write failed, rolling back");
                self.settle(pending, None, None);
                Err(self.fail(auth, e))
            }
        }
    }

    async fn dispatch_local(
        &self,
        pending: &PendingDelta,
        plan: &Plan,
    ) -> error::Result<MutationOutcome> {
        let _guard = self.inner.persist.lock().await;
        let snapshot = self.snapshot(Some(plan));

        match self.inner.store.save(&snapshot).await {
            Ok(()) => {
                self.settle(pending, Some(plan), None);
                Ok(MutationOutcome::Applied)
            }
            Err(e) => {
                warn!(product_id = %pending.product_id, error = %e, "Device cart not saved, rolling back");
                self.settle(pending, None, None);
                Err(StoreError::Persistence(e))
            }
        }
    }

    /// Retire a delta: commit it along `plan`, or drop it. `synced_with` is
    /// the account whose server cart now holds the committed line.
    fn settle(&self, pending: &PendingDelta, plan: Option<&Plan>, synced_with: Option<&UserId>) {
        {
            let mut state = self.state();
            match plan {
                Some(plan) => {
                    state.ledger.commit(plan, pending.delta);
                    if let Some(user_id) = synced_with {
                        state.record_synced(user_id, &plan.product_id, plan.quantity());
                    }
                }
                None => {
                    state.ledger.discard(&pending.product_id, pending.delta);
                }
            }
            state.queue.release(&pending.product_id, &pending.turn);
        }
        self.notify();
    }

    /// Best-effort save of the confirmed cart while signed in.
    async fn write_through(&self) {
        if let Err(e) = self.flush().await {
            warn!(error = %e, "Could not save cart on this device");
        }
    }

    fn snapshot(&self, plan: Option<&Plan>) -> CartSnapshot {
        let state = self.state();
        CartSnapshot {
            device_id: state.device_id,
            lines: plan.map_or_else(
                || state.ledger.confirmed_lines(),
                |plan| state.ledger.confirmed_lines_with(plan),
            ),
            synced: state.synced.clone(),
        }
    }

    /// Authorization for a new write and the generation it belongs to. An
    /// expired session is dropped here and the write stays on the device.
    fn current_auth(&self) -> (Option<Authorization>, u64) {
        let session = &self.inner.session;
        let auth = session.authorize().ok();
        let generation = auth
            .as_ref()
            .map_or_else(|| session.generation(), |auth| auth.generation);
        (auth, generation)
    }

    fn fail(&self, auth: &Authorization, err: ApiError) -> StoreError {
        if err.is_unauthorized() {
            self.inner.session.invalidate(auth.generation);
            StoreError::AuthenticationRequired
        } else {
            StoreError::NetworkFailure(err)
        }
    }

    fn notify(&self) {
        let summary = self.summary();
        self.inner.observers.notify(&summary);
    }

    fn state(&self) -> MutexGuard<'_, CartState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
