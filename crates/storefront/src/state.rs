//! Storefront context shared by every surface.

use std::sync::Arc;

use tracing::{info, warn};

use suraj_jewels_core::{Credentials, Notification, ProductId, Session};

use crate::api::{ApiError, CommerceApi, HttpCommerceApi};
use crate::cart::{CartAggregator, CartStore, FileCartStore};
use crate::config::StorefrontConfig;
use crate::error::{self, StoreError};
use crate::header::Header;
use crate::navigation::{HOME_ROUTE, NavigationMachine, Router, ViewportClass};
use crate::notify::NotificationSink;
use crate::session::SessionStore;
use crate::surface::ProductSurface;
use crate::wishlist::WishlistCache;

/// Message shown once the shopper is signed in.
pub const LOGIN_SUCCESS: &str = "Logged in successfully";

/// Error creating the storefront context.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("could not build API client: {0}")]
    Api(#[from] ApiError),
}

/// One instance of each store, shared by every surface.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: StorefrontConfig,
    session: SessionStore,
    wishlist: WishlistCache,
    cart: CartAggregator,
    notifier: Arc<dyn NotificationSink>,
}

impl Storefront {
    /// Build the context against the configured Remote Commerce API and
    /// restore the device cart.
    ///
    /// A device cart that cannot be read is logged and replaced by an empty
    /// one.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub async fn init(
        config: StorefrontConfig,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, InitError> {
        let api = Arc::new(HttpCommerceApi::new(&config)?);
        let cart_store = Arc::new(FileCartStore::new(&config.cart_path));
        let storefront = Self::from_parts(config, api, cart_store, notifier);

        if let Err(e) = storefront.cart().restore().await {
            warn!(error = %e, "Could not restore device cart, starting empty");
        }
        Ok(storefront)
    }

    /// Assemble the context from its collaborators.
    #[must_use]
    pub fn from_parts(
        config: StorefrontConfig,
        api: Arc<dyn CommerceApi>,
        cart_store: Arc<dyn CartStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let session = SessionStore::new(api);
        let wishlist = WishlistCache::new(session.clone());
        let cart = CartAggregator::new(session.clone(), cart_store);

        Self {
            inner: Arc::new(StorefrontInner {
                config,
                session,
                wishlist,
                cart,
                notifier,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    #[must_use]
    pub fn wishlist(&self) -> &WishlistCache {
        &self.inner.wishlist
    }

    #[must_use]
    pub fn cart(&self) -> &CartAggregator {
        &self.inner.cart
    }

    /// Validate the sign-in form and sign in.
    ///
    /// After the session is established the wishlist is reloaded and the
    /// device cart merged; failures there are logged and do not fail the
    /// sign-in. A success notification is sent once both have settled.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` if the form is invalid (nothing is sent),
    /// otherwise whatever [`SessionStore::login`] returns.
    pub async fn login(&self, email: &str, password: &str) -> error::Result<Session> {
        let credentials = Credentials::parse(email, password)?;
        let session = self.inner.session.login(&credentials).await?;

        let (wishlist, merge) = tokio::join!(
            self.inner.wishlist.reload(),
            self.inner.cart.merge_on_login()
        );
        if let Err(e) = wishlist {
            warn!(error = %e, "Wishlist not loaded after sign-in");
        }
        match merge {
            Ok(report) if !report.is_clean() => {
                warn!(failed = report.failed.len(), "Some merged cart lines were not saved remotely");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Cart not merged after sign-in"),
        }

        self.inner.notifier.notify(Notification::success(LOGIN_SUCCESS));
        Ok(session)
    }

    /// Submit the login page's form and leave for the home page on success.
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login); the router is left alone.
    pub async fn submit_login(
        &self,
        email: &str,
        password: &str,
        router: &dyn Router,
    ) -> error::Result<Session> {
        let session = self.login(email, password).await?;
        router.navigate(HOME_ROUTE);
        Ok(session)
    }

    /// Where the login page should send the shopper instead of showing the
    /// form: home while signed in.
    #[must_use]
    pub fn login_redirect(&self) -> Option<&'static str> {
        self.inner.session.is_authenticated().then_some(HOME_ROUTE)
    }

    /// Open the login page, leaving it at once if already signed in.
    /// Returns whether the shopper was sent away.
    pub fn visit_login(&self, router: &dyn Router) -> bool {
        let redirect = self.login_redirect();
        if let Some(route) = redirect {
            router.navigate(route);
        }
        redirect.is_some()
    }

    /// Sign out. The wishlist is cleared; the cart stays on this device.
    pub async fn logout(&self) {
        self.inner.session.logout().await;
    }

    /// Header bound to this context, starting on `route`.
    #[must_use]
    pub fn header(&self, route: &str, viewport: ViewportClass, router: Arc<dyn Router>) -> Header {
        let navigation =
            NavigationMachine::new(route, viewport, self.inner.config.scroll_threshold);
        Header::new(
            navigation,
            self.inner.session.clone(),
            self.inner.cart.clone(),
            router,
        )
    }

    /// Surface for one product card.
    #[must_use]
    pub fn product(&self, product_id: ProductId, title: impl Into<String>) -> ProductSurface {
        ProductSurface::new(
            product_id,
            title,
            self.inner.wishlist.clone(),
            self.inner.cart.clone(),
            Arc::clone(&self.inner.notifier),
        )
    }

    /// Save the confirmed cart before shutting down.
    ///
    /// # Errors
    ///
    /// `Persistence` if the device cart cannot be written.
    pub async fn teardown(&self) -> Result<(), StoreError> {
        self.inner.cart.flush().await?;
        info!("Storefront torn down");
        Ok(())
    }
}
