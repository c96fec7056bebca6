//! Device cart commands.
//!
//! These work without signing in: changes are saved to the device cart file
//! (`STOREFRONT_CART_PATH`) and merged into the account cart by `sj-cli sync`.

use rust_decimal::Decimal;

use suraj_jewels_core::{Price, ProductId};
use suraj_jewels_storefront::{MutationOutcome, Storefront};

use super::CommandError;

/// Log every line and the totals.
pub fn show(storefront: &Storefront) {
    let cart = storefront.cart();
    let lines = cart.lines();
    if lines.is_empty() {
        tracing::info!("Cart is empty");
        return;
    }

    for line in &lines {
        tracing::info!(
            product_id = %line.product_id,
            quantity = line.quantity,
            unit_price = %line.unit_price,
            line_price = %line.line_price(),
            "Cart line"
        );
    }
    tracing::info!(
        device_id = %cart.device_id(),
        items = cart.total_count(),
        total = %cart.total_price(),
        "Cart total"
    );
}

/// Add `quantity` units of a product at `price` rupees each.
pub async fn add(
    storefront: &Storefront,
    product_id: &str,
    price: Decimal,
    quantity: u32,
) -> Result<(), CommandError> {
    let unit_price = Price::inr(price)?;
    let outcome = storefront
        .cart()
        .add_line(&ProductId::new(product_id), unit_price, quantity)
        .await?;
    report(storefront, product_id, outcome);
    Ok(())
}

pub async fn remove(storefront: &Storefront, product_id: &str) -> Result<(), CommandError> {
    let outcome = storefront
        .cart()
        .remove_line(&ProductId::new(product_id))
        .await?;
    report(storefront, product_id, outcome);
    Ok(())
}

pub async fn set(
    storefront: &Storefront,
    product_id: &str,
    quantity: i64,
) -> Result<(), CommandError> {
    let outcome = storefront
        .cart()
        .set_quantity(&ProductId::new(product_id), quantity)
        .await?;
    report(storefront, product_id, outcome);
    Ok(())
}

fn report(storefront: &Storefront, product_id: &str, outcome: MutationOutcome) {
    let quantity = storefront.cart().quantity_of(&ProductId::new(product_id));
    match outcome {
        MutationOutcome::Unchanged => tracing::info!(product_id, quantity, "Cart already up to date"),
        MutationOutcome::Applied | MutationOutcome::Discarded => {
            tracing::info!(product_id, quantity, items = storefront.cart().total_count(), "Cart updated");
        }
    }
}
