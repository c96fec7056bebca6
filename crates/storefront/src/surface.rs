//! Per-product view over the wishlist and cart, as used by a product card.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use suraj_jewels_core::{Notification, Price, ProductId};

use crate::cart::CartAggregator;
use crate::error::{self, MutationOutcome, StoreError};
use crate::notify::NotificationSink;
use crate::wishlist::WishlistCache;

/// Message shown when a wishlist write fails.
pub const WISHLIST_FAILURE: &str = "Could not update wishlist";

/// One product card's handle on the shared stores.
///
/// Tearing the surface down (explicitly or by dropping it) silences the
/// notifications of writes still in flight; the writes themselves finish.
pub struct ProductSurface {
    product_id: ProductId,
    title: String,
    wishlist: WishlistCache,
    cart: CartAggregator,
    notifier: Arc<dyn NotificationSink>,
    mounted: Arc<AtomicBool>,
}

impl ProductSurface {
    pub(crate) fn new(
        product_id: ProductId,
        title: impl Into<String>,
        wishlist: WishlistCache,
        cart: CartAggregator,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            product_id,
            title: title.into(),
            wishlist,
            cart,
            notifier,
            mounted: Arc::new(AtomicBool::new(true)),
        }
    }

    #[must_use]
    pub const fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_wishlisted(&self) -> bool {
        self.wishlist.is_wishlisted(&self.product_id)
    }

    /// Flip wishlist membership and report the result as a notification.
    ///
    /// Errors are turned into notifications and returned, never raised past
    /// the surface.
    pub fn toggle_wishlist(
        &self,
    ) -> impl Future<Output = error::Result<MutationOutcome>> + Send + 'static {
        let adding = !self.is_wishlisted();
        let write = self.wishlist.set(&self.product_id, adding);

        let title = self.title.clone();
        let notifier = Arc::clone(&self.notifier);
        let mounted = Arc::clone(&self.mounted);
        async move {
            let result = write.await;
            let notification = match &result {
                Ok(MutationOutcome::Applied) if adding => {
                    Some(Notification::success(format!("{title} added to wishlist")))
                }
                Ok(MutationOutcome::Applied) => {
                    Some(Notification::info(format!("{title} removed from wishlist")))
                }
                Ok(_) => None,
                Err(StoreError::AuthenticationRequired) => {
                    Some(Notification::info(StoreError::AuthenticationRequired.user_message()))
                }
                Err(_) => Some(Notification::error(WISHLIST_FAILURE)),
            };

            if let Some(notification) = notification {
                if mounted.load(Ordering::Acquire) {
                    notifier.notify(notification);
                } else {
                    debug!(message = %notification.message, "Surface gone, notification dropped");
                }
            }
            result
        }
    }

    /// Add units of this product to the cart.
    pub fn add_to_cart(
        &self,
        unit_price: Price,
        quantity: u32,
    ) -> impl Future<Output = error::Result<MutationOutcome>> + Send + 'static {
        self.cart.add_line(&self.product_id, unit_price, quantity)
    }

    /// Stop delivering notifications for this surface.
    pub fn teardown(&self) {
        self.mounted.store(false, Ordering::Release);
    }
}

impl Drop for ProductSurface {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for ProductSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductSurface")
            .field("product_id", &self.product_id)
            .field("title", &self.title)
            .field("mounted", &self.is_mounted())
            .finish_non_exhaustive()
    }
}
