//! Header binding: feeds viewport, scroll and route signals into the
//! navigation state machine and exposes what the header shows.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cart::CartAggregator;
use crate::navigation::{NavigationMachine, NavigationState, Router, ViewportClass};
use crate::session::SessionStore;

/// Category slugs listed in the header and drawer, in display order.
pub const NAV_LINKS: [&str; 7] = [
    "rings",
    "chains",
    "kada",
    "bracelets",
    "earrings",
    "mangalsutras",
    "choker-necklace",
];

/// Route the header sends the shopper to after signing out.
pub const LOGIN_ROUTE: &str = "/login";

/// Account pages in the signed-in menu and drawer.
pub const ACCOUNT_LINKS: [&str; 2] = ["/profile", "/wishlist"];

/// A header category link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryLink {
    pub slug: &'static str,
    pub path: String,
}

impl CategoryLink {
    fn new(slug: &'static str) -> Self {
        Self {
            slug,
            path: format!("/category/{slug}"),
        }
    }
}

/// Everything the header renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderView {
    pub navigation: NavigationState,
    pub cart_count: u64,
    pub display_name: Option<String>,
    pub category_links: Vec<CategoryLink>,
    /// Empty while signed out.
    pub account_links: Vec<&'static str>,
}

/// The header bound to the shared stores.
pub struct Header {
    navigation: NavigationMachine,
    session: SessionStore,
    cart: CartAggregator,
    router: Arc<dyn Router>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl Header {
    pub(crate) fn new(
        navigation: NavigationMachine,
        session: SessionStore,
        cart: CartAggregator,
        router: Arc<dyn Router>,
    ) -> Self {
        Self {
            navigation,
            session,
            cart,
            router,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Start following the page's signals. The current value of each is
    /// applied right away.
    ///
    /// Must be called from within a tokio runtime. Attaching again replaces
    /// the previous listeners.
    pub fn attach(
        &self,
        scroll: watch::Receiver<f64>,
        viewport: watch::Receiver<ViewportClass>,
        route: watch::Receiver<String>,
    ) {
        self.teardown();

        let nav = self.navigation.clone();
        let viewport = forward(viewport, move |class| nav.on_viewport_change(*class));
        let nav = self.navigation.clone();
        let route = forward(route, move |route| nav.on_route_change(route));
        let nav = self.navigation.clone();
        let scroll = forward(scroll, move |offset| nav.on_scroll(*offset));

        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([viewport, route, scroll]);
    }

    /// Stop following the page's signals.
    pub fn teardown(&self) {
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if !listeners.is_empty() {
            debug!(count = listeners.len(), "Detaching header listeners");
        }
        for listener in listeners {
            listener.abort();
        }
    }

    #[must_use]
    pub const fn navigation(&self) -> &NavigationMachine {
        &self.navigation
    }

    #[must_use]
    pub fn view(&self) -> HeaderView {
        let display_name = self
            .session
            .current_session()
            .map(|session| session.display_name);
        let account_links = if display_name.is_some() {
            ACCOUNT_LINKS.to_vec()
        } else {
            Vec::new()
        };
        HeaderView {
            navigation: self.navigation.state(),
            cart_count: self.cart.total_count(),
            display_name,
            category_links: NAV_LINKS.into_iter().map(CategoryLink::new).collect(),
            account_links,
        }
    }

    /// Follow an account link from the menu or drawer.
    pub fn select_account_link(&self, path: &str) {
        self.navigation.select_link(path, self.router.as_ref());
    }

    /// Submit the search form.
    pub fn submit_search(&self, keyword: &str) -> String {
        self.navigation.submit_search(keyword, self.router.as_ref())
    }

    /// Follow a category link from the header or drawer.
    pub fn select_category(&self, slug: &str) {
        self.navigation
            .select_link(&format!("/category/{slug}"), self.router.as_ref());
    }

    /// Sign out, close the drawer and go to the login page.
    pub async fn logout(&self) {
        self.session.logout().await;
        self.navigation.close_drawer();
        self.router.navigate(LOGIN_ROUTE);
    }
}

impl Drop for Header {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Apply the current and every later value of `signal` until its sender
/// goes away.
fn forward<T>(mut signal: watch::Receiver<T>, apply: impl Fn(&T) + Send + 'static) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            let value = signal.borrow_and_update().clone();
            apply(&value);
            if signal.changed().await.is_err() {
                break;
            }
        }
    })
}
