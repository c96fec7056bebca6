//! Header navigation state machine.
//!
//! Scroll offset, viewport class and route changes all funnel into one
//! [`NavigationState`]. Transitions are synchronous and never touch the
//! network.
//!
//! On every route change in a compact viewport the mobile search bar is set
//! open on every page except home, overwriting whatever the shopper chose.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::observer::{Observers, Subscription};

/// Route of the home page.
pub const HOME_ROUTE: &str = "/";

/// Layout class of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewportClass {
    /// Phone-sized: drawer menu and collapsible search bar.
    Compact,
    /// Desktop: inline search, no drawer.
    Wide,
}

/// Where the shopper should be sent.
pub trait Router: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Header UI state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    pub scroll_shrunk: bool,
    pub drawer_open: bool,
    pub mobile_search_open: bool,
    pub viewport_class: ViewportClass,
    pub current_route: String,
}

impl NavigationState {
    /// State at mount.
    #[must_use]
    pub fn initial(route: &str, viewport_class: ViewportClass) -> Self {
        Self {
            scroll_shrunk: false,
            drawer_open: false,
            mobile_search_open: viewport_class == ViewportClass::Compact && route != HOME_ROUTE,
            viewport_class,
            current_route: route.to_string(),
        }
    }

    /// Whether the current route is the home page.
    #[must_use]
    pub fn is_home(&self) -> bool {
        self.current_route == HOME_ROUTE
    }

    /// Whether the mobile search button toggles (rather than only opens).
    #[must_use]
    pub fn search_toggle_enabled(&self) -> bool {
        self.viewport_class == ViewportClass::Compact && self.is_home()
    }
}

/// Shared handle to the header state.
///
/// Cheaply cloneable; clones drive the same state.
#[derive(Clone)]
pub struct NavigationMachine {
    inner: Arc<NavigationInner>,
}

struct NavigationInner {
    state: Mutex<NavigationState>,
    threshold: f64,
    observers: Observers<NavigationState>,
}

impl NavigationMachine {
    /// Start on `route` in the given viewport; the header shrinks once the
    /// page is scrolled past `threshold`.
    #[must_use]
    pub fn new(route: &str, viewport_class: ViewportClass, threshold: f64) -> Self {
        Self {
            inner: Arc::new(NavigationInner {
                state: Mutex::new(NavigationState::initial(route, viewport_class)),
                threshold,
                observers: Observers::new(),
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> NavigationState {
        self.lock().clone()
    }

    #[must_use]
    pub fn search_toggle_enabled(&self) -> bool {
        self.lock().search_toggle_enabled()
    }

    pub fn on_scroll(&self, offset: f64) {
        let threshold = self.inner.threshold;
        self.transition(|state| state.scroll_shrunk = offset > threshold);
    }

    pub fn on_route_change(&self, route: &str) {
        self.transition(|state| {
            route.clone_into(&mut state.current_route);
            if state.viewport_class == ViewportClass::Compact {
                state.mobile_search_open = route != HOME_ROUTE;
            }
        });
    }

    /// Switching to wide closes the drawer, whose trigger only exists in the
    /// compact layout. The search flag is left as it was.
    pub fn on_viewport_change(&self, viewport_class: ViewportClass) {
        self.transition(|state| {
            state.viewport_class = viewport_class;
            if viewport_class == ViewportClass::Wide {
                state.drawer_open = false;
            }
        });
    }

    /// The search button in the compact header.
    ///
    /// Flips the bar on the home page; elsewhere it only opens it.
    pub fn toggle_mobile_search(&self) {
        self.transition(|state| match state.viewport_class {
            ViewportClass::Wide => {}
            ViewportClass::Compact if state.is_home() => {
                state.mobile_search_open = !state.mobile_search_open;
            }
            ViewportClass::Compact => state.mobile_search_open = true,
        });
    }

    pub fn open_drawer(&self) {
        self.transition(|state| {
            if state.viewport_class == ViewportClass::Compact {
                state.drawer_open = true;
            }
        });
    }

    pub fn close_drawer(&self) {
        self.transition(|state| state.drawer_open = false);
    }

    /// Follow a drawer link: close the drawer and navigate in one step.
    pub fn select_link(&self, path: &str, router: &dyn Router) {
        self.close_drawer();
        router.navigate(path);
    }

    /// Submit the search form; returns the path navigated to. A blank
    /// keyword goes home; any other is used as typed.
    pub fn submit_search(&self, keyword: &str, router: &dyn Router) -> String {
        let path = if keyword.trim().is_empty() {
            HOME_ROUTE.to_string()
        } else {
            format!("/search/{keyword}")
        };
        router.navigate(&path);
        self.transition(|state| state.mobile_search_open = false);
        path
    }

    /// Observe state changes. Only transitions that changed something are
    /// reported.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(
        &self,
        callback: impl Fn(&NavigationState) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.observers.subscribe(callback)
    }

    fn transition(&self, apply: impl FnOnce(&mut NavigationState)) {
        let changed = {
            let mut state = self.lock();
            let before = state.clone();
            apply(&mut state);
            (*state != before).then(|| state.clone())
        };

        if let Some(state) = changed {
            debug!(
                route = %state.current_route,
                shrunk = state.scroll_shrunk,
                drawer = state.drawer_open,
                search = state.mobile_search_open,
                "Header state changed"
            );
            self.inner.observers.notify(&state);
        }
    }

    fn lock(&self) -> MutexGuard<'_, NavigationState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
