//! In-process [`CommerceApi`] for tests.
//!
//! `FakeCommerceApi` keeps accounts, tokens, wishlists and carts in memory,
//! records every call, and can be scripted to fail the next calls of a given
//! kind or to hold all requests at a gate until released.
//!
//! ```rust,ignore
//! let api = FakeCommerceApi::new();
//! api.with_user("asha@suraj.in", "secret", "Asha");
//! api.fail_next(ApiOp::AddToWishlist, Failure::Network);
//! let storefront = Storefront::from_parts(config, Arc::new(api.clone()), store, notifier);
//! ```

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;

use suraj_jewels_core::{Credentials, ProductId, UserId};

use crate::api::{ApiError, CartLineBody, CommerceApi, LoginResponse, RemoteCartLine};

/// Kinds of API call, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOp {
    Login,
    Logout,
    FetchWishlist,
    AddToWishlist,
    RemoveFromWishlist,
    FetchCart,
    CreateCartLine,
    UpdateCartLine,
    DeleteCartLine,
}

/// A recorded API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Login { email: String },
    Logout,
    FetchWishlist,
    AddToWishlist(ProductId),
    RemoveFromWishlist(ProductId),
    FetchCart,
    CreateCartLine(CartLineBody),
    UpdateCartLine(CartLineBody),
    DeleteCartLine(ProductId),
}

impl ApiCall {
    /// The kind of this call.
    #[must_use]
    pub const fn op(&self) -> ApiOp {
        match self {
            Self::Login { .. } => ApiOp::Login,
            Self::Logout => ApiOp::Logout,
            Self::FetchWishlist => ApiOp::FetchWishlist,
            Self::AddToWishlist(_) => ApiOp::AddToWishlist,
            Self::RemoveFromWishlist(_) => ApiOp::RemoveFromWishlist,
            Self::FetchCart => ApiOp::FetchCart,
            Self::CreateCartLine(_) => ApiOp::CreateCartLine,
            Self::UpdateCartLine(_) => ApiOp::UpdateCartLine,
            Self::DeleteCartLine(_) => ApiOp::DeleteCartLine,
        }
    }
}

/// A scripted failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The backend could not be reached.
    Network,
    /// The token was rejected (HTTP 401).
    Unauthorized,
    /// The server answered with an error status.
    Rejected { status: u16, message: String },
}

impl Failure {
    fn into_error(self) -> ApiError {
        match self {
            Self::Network => ApiError::Unavailable("injected network failure".to_string()),
            Self::Unauthorized => ApiError::Unauthorized("Not authorized, token failed".to_string()),
            Self::Rejected { status, message } => ApiError::Rejected { status, message },
        }
    }
}

struct Account {
    user_id: UserId,
    name: String,
    password: String,
    wishlist: BTreeSet<ProductId>,
    cart: IndexMap<ProductId, RemoteCartLine>,
}

#[derive(Default)]
struct FakeState {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, String>,
    next_token: u64,
    token_expiry: Option<DateTime<Utc>>,
    failures: HashMap<ApiOp, VecDeque<Failure>>,
    calls: Vec<ApiCall>,
}

struct FakeInner {
    state: Mutex<FakeState>,
    paused: watch::Sender<bool>,
    started: watch::Sender<usize>,
}

/// Scriptable in-memory Remote Commerce API.
///
/// Cheaply cloneable; clones share the same backend.
#[derive(Clone)]
pub struct FakeCommerceApi {
    inner: Arc<FakeInner>,
}

impl Default for FakeCommerceApi {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCommerceApi {
    /// An empty backend with no accounts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FakeInner {
                state: Mutex::new(FakeState::default()),
                paused: watch::Sender::new(false),
                started: watch::Sender::new(0),
            }),
        }
    }

    /// Register an account; returns its user id.
    pub fn with_user(&self, email: &str, password: &str, name: &str) -> UserId {
        let mut state = self.state();
        let user_id = UserId::new(format!("user-{}", state.accounts.len() + 1));
        state.accounts.insert(
            email.to_string(),
            Account {
                user_id: user_id.clone(),
                name: name.to_string(),
                password: password.to_string(),
                wishlist: BTreeSet::new(),
                cart: IndexMap::new(),
            },
        );
        user_id
    }

    /// Put a line in an account's remote cart.
    pub fn seed_cart(&self, email: &str, line: RemoteCartLine) {
        if let Some(account) = self.state().accounts.get_mut(email) {
            account.cart.insert(line.product_id.clone(), line);
        }
    }

    /// Put a product on an account's remote wishlist.
    pub fn seed_wishlist(&self, email: &str, product_id: &ProductId) {
        if let Some(account) = self.state().accounts.get_mut(email) {
            account.wishlist.insert(product_id.clone());
        }
    }

    /// Tokens issued from now on expire at `expiry`.
    pub fn set_token_expiry(&self, expiry: Option<DateTime<Utc>>) {
        self.state().token_expiry = expiry;
    }

    /// Remote wishlist of an account.
    #[must_use]
    pub fn wishlist_of(&self, email: &str) -> Vec<ProductId> {
        self.state()
            .accounts
            .get(email)
            .map(|account| account.wishlist.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remote cart of an account, in insertion order.
    #[must_use]
    pub fn cart_of(&self, email: &str) -> Vec<RemoteCartLine> {
        self.state()
            .accounts
            .get(email)
            .map(|account| account.cart.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Fail the next call of kind `op` with `failure`. Stacks.
    pub fn fail_next(&self, op: ApiOp, failure: Failure) {
        self.state().failures.entry(op).or_default().push_back(failure);
    }

    /// Revoke every issued token; later authenticated calls get 401.
    pub fn expire_tokens(&self) {
        self.state().tokens.clear();
    }

    /// Every call received so far, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.state().calls.clone()
    }

    /// Number of calls of kind `op` received so far.
    #[must_use]
    pub fn count(&self, op: ApiOp) -> usize {
        self.state().calls.iter().filter(|call| call.op() == op).count()
    }

    /// Hold every request at the gate until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.inner.paused.send_replace(true);
    }

    /// Release held requests.
    pub fn resume(&self) {
        self.inner.paused.send_replace(false);
    }

    /// Wait until at least `n` calls have arrived (held ones included).
    pub async fn wait_for_calls(&self, n: usize) {
        let mut started = self.inner.started.subscribe();
        let _ = started.wait_for(|count| *count >= n).await;
    }

    /// Record the call, wait at the gate, then apply any scripted failure.
    async fn enter(&self, call: ApiCall) -> Result<(), ApiError> {
        let op = call.op();
        let mut gate = self.inner.paused.subscribe();
        self.state().calls.push(call);
        self.inner.started.send_modify(|count| *count += 1);

        let _ = gate.wait_for(|paused| !*paused).await;

        let failure = self
            .state()
            .failures
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        failure.map_or(Ok(()), |failure| Err(failure.into_error()))
    }

    /// Resolve a token to the email of its account.
    fn owner(state: &FakeState, token: &SecretString) -> Result<String, ApiError> {
        state
            .tokens
            .get(token.expose_secret())
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Not authorized, token failed".to_string()))
    }

    fn with_account<T>(
        &self,
        token: &SecretString,
        f: impl FnOnce(&mut Account) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut state = self.state();
        let email = Self::owner(&state, token)?;
        let account = state
            .accounts
            .get_mut(&email)
            .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;
        f(account)
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn stored_line(line: &CartLineBody) -> RemoteCartLine {
    RemoteCartLine {
        product_id: line.product_id.clone(),
        quantity: line.quantity,
        unit_price: line.unit_price,
        currency: Some(line.currency),
        updated_at: Some(Utc::now()),
    }
}

#[async_trait]
impl CommerceApi for FakeCommerceApi {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError> {
        let email = credentials.email().as_str().to_string();
        self.enter(ApiCall::Login {
            email: email.clone(),
        })
        .await?;

        let mut state = self.state();
        let (user_id, name) = match state.accounts.get(&email) {
            Some(account) if account.password == credentials.expose_password() => {
                (account.user_id.clone(), account.name.clone())
            }
            _ => return Err(ApiError::Unauthorized("Invalid email or password".to_string())),
        };

        state.next_token += 1;
        let token = format!("token-{}", state.next_token);
        state.tokens.insert(token.clone(), email);
        Ok(LoginResponse {
            id: user_id,
            name,
            token,
            expires_at: state.token_expiry,
        })
    }

    async fn logout(&self, token: &SecretString) -> Result<(), ApiError> {
        self.enter(ApiCall::Logout).await?;
        self.state().tokens.remove(token.expose_secret());
        Ok(())
    }

    async fn fetch_wishlist(&self, token: &SecretString) -> Result<Vec<ProductId>, ApiError> {
        self.enter(ApiCall::FetchWishlist).await?;
        self.with_account(token, |account| Ok(account.wishlist.iter().cloned().collect()))
    }

    async fn add_to_wishlist(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> Result<(), ApiError> {
        self.enter(ApiCall::AddToWishlist(product_id.clone())).await?;
        self.with_account(token, |account| {
            account.wishlist.insert(product_id.clone());
            Ok(())
        })
    }

    async fn remove_from_wishlist(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> Result<(), ApiError> {
        self.enter(ApiCall::RemoveFromWishlist(product_id.clone()))
            .await?;
        self.with_account(token, |account| {
            account.wishlist.remove(product_id);
            Ok(())
        })
    }

    async fn fetch_cart(&self, token: &SecretString) -> Result<Vec<RemoteCartLine>, ApiError> {
        self.enter(ApiCall::FetchCart).await?;
        self.with_account(token, |account| Ok(account.cart.values().cloned().collect()))
    }

    async fn create_cart_line(
        &self,
        token: &SecretString,
        line: &CartLineBody,
    ) -> Result<(), ApiError> {
        self.enter(ApiCall::CreateCartLine(line.clone())).await?;
        self.with_account(token, |account| {
            account.cart.insert(line.product_id.clone(), stored_line(line));
            Ok(())
        })
    }

    async fn update_cart_line(
        &self,
        token: &SecretString,
        line: &CartLineBody,
    ) -> Result<(), ApiError> {
        self.enter(ApiCall::UpdateCartLine(line.clone())).await?;
        self.with_account(token, |account| match account.cart.get_mut(&line.product_id) {
            Some(stored) => {
                *stored = stored_line(line);
                Ok(())
            }
            None => Err(ApiError::Rejected {
                status: 404,
                message: "Cart item not found".to_string(),
            }),
        })
    }

    async fn delete_cart_line(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> Result<(), ApiError> {
        self.enter(ApiCall::DeleteCartLine(product_id.clone()))
            .await?;
        self.with_account(token, |account| {
            account.cart.shift_remove(product_id);
            Ok(())
        })
    }
}
