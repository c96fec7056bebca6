//! Commands that need a signed-in account.
//!
//! Sessions are not kept between runs: every command signs in, does its
//! work and signs out again.

use suraj_jewels_core::ProductId;
use suraj_jewels_storefront::Storefront;

use super::CommandError;

/// Sign in; the wishlist is loaded and the device cart merged on the way.
pub async fn sign_in(
    storefront: &Storefront,
    email: &str,
    password: &str,
) -> Result<(), CommandError> {
    let session = storefront.login(email, password).await?;
    tracing::info!(name = %session.display_name, "Signed in");
    Ok(())
}

/// Sign in, merge the device cart, and sign out again.
pub async fn sync(storefront: &Storefront, email: &str, password: &str) -> Result<(), CommandError> {
    sign_in(storefront, email, password).await?;
    super::cart::show(storefront);
    storefront.logout().await;
    Ok(())
}

pub fn list_wishlist(storefront: &Storefront) {
    let items = storefront.wishlist().items();
    if items.is_empty() {
        tracing::info!("Wishlist is empty");
    }
    for product_id in items {
        tracing::info!(product_id = %product_id, "Wishlisted");
    }
}

/// Toggle a product through its product surface, so the outcome is
/// reported the same way a product card reports it.
pub async fn toggle_wishlist(
    storefront: &Storefront,
    product_id: &str,
    title: &str,
) -> Result<(), CommandError> {
    let surface = storefront.product(ProductId::new(product_id), title);
    surface.toggle_wishlist().await?;
    Ok(())
}
