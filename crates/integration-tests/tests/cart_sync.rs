//! Integration tests for the cart aggregator.

#![allow(clippy::unwrap_used)]

use chrono::Utc;
use rust_decimal::Decimal;

use suraj_jewels_core::{CartLine, CartSnapshot, Credentials, DeviceId, SyncedCart, UserId};
use suraj_jewels_integration_tests::{EMAIL, PASSWORD, TestContext, inr, pid, settle};
use suraj_jewels_storefront::api::RemoteCartLine;
use suraj_jewels_storefront::testing::{ApiOp, Failure};
use suraj_jewels_storefront::{MutationOutcome, StoreError};

fn remote_line(product_id: &str, quantity: u32, rupees: i64) -> RemoteCartLine {
    RemoteCartLine {
        product_id: pid(product_id),
        quantity,
        unit_price: Decimal::new(rupees, 0),
        currency: None,
        updated_at: Some(Utc::now() - chrono::Duration::days(1)),
    }
}

// =============================================================================
// Anonymous cart
// =============================================================================

#[tokio::test]
async fn test_totals_after_interleaved_writes() {
    let ctx = TestContext::new();
    let cart = ctx.storefront.cart();

    let (a, b, c, d) = tokio::join!(
        cart.add_line(&pid("P1"), inr(1200), 2),
        cart.add_line(&pid("P2"), inr(45_999), 1),
        cart.add_line(&pid("P1"), inr(1200), 1),
        cart.remove_line(&pid("P3")),
    );
    assert_eq!(a.unwrap(), MutationOutcome::Applied);
    assert_eq!(b.unwrap(), MutationOutcome::Applied);
    assert_eq!(c.unwrap(), MutationOutcome::Applied);
    assert_eq!(d.unwrap(), MutationOutcome::Unchanged);

    assert_eq!(cart.total_count(), 4);
    assert_eq!(cart.total_price(), inr(1200 * 3 + 45_999));
    let order: Vec<_> = cart.lines().into_iter().map(|line| line.product_id).collect();
    assert_eq!(order, [pid("P1"), pid("P2")]);

    let saved = ctx.cart_store.snapshot().unwrap();
    assert_eq!(saved.lines, cart.lines());
    assert!(ctx.api.calls().is_empty());
}

#[tokio::test]
async fn test_failed_save_rolls_back() {
    let ctx = TestContext::new();
    let cart = ctx.storefront.cart();
    cart.add_line(&pid("P1"), inr(500), 1).await.unwrap();

    ctx.cart_store.set_failing(true);
    let err = cart.add_line(&pid("P1"), inr(500), 4).await.unwrap_err();
    assert!(matches!(err, StoreError::Persistence(_)));
    assert_eq!(cart.quantity_of(&pid("P1")), 1);
    assert_eq!(cart.total_price(), inr(500));
}

#[tokio::test]
async fn test_set_quantity_on_unknown_line_is_rejected() {
    let ctx = TestContext::new();
    let err = ctx
        .storefront
        .cart()
        .set_quantity(&pid("P1"), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

// =============================================================================
// Signed-in cart
// =============================================================================

#[tokio::test]
async fn test_repeated_set_quantity_sends_one_update() {
    let ctx = TestContext::new();
    ctx.api.seed_cart(EMAIL, remote_line("P1", 1, 800));
    ctx.sign_in().await;
    let cart = ctx.storefront.cart();

    let (first, second) = tokio::join!(
        cart.set_quantity(&pid("P1"), 3),
        cart.set_quantity(&pid("P1"), 3)
    );
    assert_eq!(first.unwrap(), MutationOutcome::Applied);
    assert_eq!(second.unwrap(), MutationOutcome::Unchanged);

    assert_eq!(ctx.api.count(ApiOp::UpdateCartLine), 1);
    assert_eq!(ctx.api.cart_of(EMAIL)[0].quantity, 3);
}

#[tokio::test]
async fn test_failed_remote_write_rolls_back() {
    let ctx = TestContext::new();
    ctx.sign_in().await;
    let cart = ctx.storefront.cart();

    ctx.api.fail_next(ApiOp::CreateCartLine, Failure::Network);
    let err = cart.add_line(&pid("P1"), inr(750), 2).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(cart.total_count(), 0);
    assert!(ctx.api.cart_of(EMAIL).is_empty());
}

#[tokio::test]
async fn test_remove_sends_delete() {
    let ctx = TestContext::new();
    ctx.api.seed_cart(EMAIL, remote_line("P1", 2, 800));
    ctx.sign_in().await;

    let outcome = ctx.storefront.cart().remove_line(&pid("P1")).await.unwrap();
    assert_eq!(outcome, MutationOutcome::Applied);
    assert_eq!(ctx.api.count(ApiOp::DeleteCartLine), 1);
    assert!(ctx.api.cart_of(EMAIL).is_empty());
}

// =============================================================================
// Merge on sign-in
// =============================================================================

#[tokio::test]
async fn test_merge_sums_matching_lines() {
    let ctx = TestContext::new();
    let cart = ctx.storefront.cart();
    cart.add_line(&pid("P1"), inr(999), 1).await.unwrap();
    cart.add_line(&pid("P1"), inr(999), 1).await.unwrap();
    ctx.api.seed_cart(EMAIL, remote_line("P1", 3, 899));

    ctx.sign_in().await;

    assert_eq!(cart.quantity_of(&pid("P1")), 5);
    // The device price is the more recent write.
    assert_eq!(cart.total_price(), inr(999 * 5));
    let remote = ctx.api.cart_of(EMAIL);
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].quantity, 5);
    assert_eq!(ctx.api.count(ApiOp::UpdateCartLine), 1);
}

#[tokio::test]
async fn test_merge_keeps_remote_lines_first() {
    let ctx = TestContext::new();
    ctx.storefront
        .cart()
        .add_line(&pid("P2"), inr(300), 1)
        .await
        .unwrap();
    ctx.api.seed_cart(EMAIL, remote_line("P1", 1, 100));

    ctx.sign_in().await;

    let order: Vec<_> = ctx
        .storefront
        .cart()
        .lines()
        .into_iter()
        .map(|line| line.product_id)
        .collect();
    assert_eq!(order, [pid("P1"), pid("P2")]);
    assert_eq!(ctx.api.count(ApiOp::CreateCartLine), 1);
}

#[tokio::test]
async fn test_merge_runs_once_per_session() {
    let ctx = TestContext::new();
    ctx.storefront
        .cart()
        .add_line(&pid("P1"), inr(300), 1)
        .await
        .unwrap();
    ctx.sign_in().await;

    let report = ctx.storefront.cart().merge_on_login().await.unwrap();
    assert_eq!(report.outcome, MutationOutcome::Unchanged);
    assert_eq!(ctx.api.count(ApiOp::FetchCart), 1);
    assert_eq!(ctx.storefront.cart().quantity_of(&pid("P1")), 1);
}

#[tokio::test]
async fn test_merge_push_failure_keeps_line_locally() {
    let ctx = TestContext::new();
    ctx.storefront
        .cart()
        .add_line(&pid("P1"), inr(300), 2)
        .await
        .unwrap();
    ctx.api.fail_next(ApiOp::CreateCartLine, Failure::Network);

    ctx.sign_in().await;

    assert_eq!(ctx.storefront.cart().quantity_of(&pid("P1")), 2);
    assert!(ctx.api.cart_of(EMAIL).is_empty());
}

// =============================================================================
// Session changes
// =============================================================================

#[tokio::test]
async fn test_logout_login_cycle_keeps_quantities() {
    let ctx = TestContext::new();
    let cart = ctx.storefront.cart();
    ctx.sign_in().await;
    cart.add_line(&pid("P1"), inr(999), 2).await.unwrap();

    for _ in 0..2 {
        ctx.storefront.logout().await;
        ctx.sign_in().await;
    }

    assert_eq!(cart.quantity_of(&pid("P1")), 2);
    assert_eq!(ctx.api.cart_of(EMAIL)[0].quantity, 2);
    assert_eq!(ctx.api.count(ApiOp::UpdateCartLine), 0);
}

#[tokio::test]
async fn test_only_signed_out_additions_are_merged() {
    let ctx = TestContext::new();
    let cart = ctx.storefront.cart();
    ctx.sign_in().await;
    cart.add_line(&pid("P1"), inr(999), 2).await.unwrap();

    ctx.storefront.logout().await;
    cart.add_line(&pid("P1"), inr(999), 1).await.unwrap();
    ctx.sign_in().await;

    assert_eq!(cart.quantity_of(&pid("P1")), 3);
    assert_eq!(ctx.api.cart_of(EMAIL)[0].quantity, 3);
    assert_eq!(ctx.api.count(ApiOp::UpdateCartLine), 1);
}

#[tokio::test]
async fn test_restored_cart_is_not_merged_twice() {
    // An earlier run signed in as the first account and synced two units.
    let mut synced = SyncedCart::new(UserId::new("user-1"));
    synced.record(&pid("P1"), 2);
    let ctx = TestContext::with_device_cart(CartSnapshot {
        device_id: DeviceId::generate(),
        lines: vec![CartLine {
            product_id: pid("P1"),
            quantity: 2,
            unit_price: inr(899),
            updated_at: Utc::now() - chrono::Duration::days(1),
        }],
        synced: Some(synced),
    });
    ctx.api.seed_cart(EMAIL, remote_line("P1", 2, 899));

    ctx.storefront.cart().restore().await.unwrap();
    ctx.sign_in().await;

    assert_eq!(ctx.storefront.cart().quantity_of(&pid("P1")), 2);
    assert_eq!(ctx.api.cart_of(EMAIL)[0].quantity, 2);
    assert_eq!(ctx.api.count(ApiOp::UpdateCartLine), 0);
}

#[tokio::test]
async fn test_write_during_merge_is_counted_once() {
    let ctx = TestContext::new();
    let cart = ctx.storefront.cart().clone();
    ctx.storefront
        .session()
        .login(&Credentials::parse(EMAIL, PASSWORD).unwrap())
        .await
        .unwrap();

    ctx.api.pause();
    let merging = cart.clone();
    let merge = tokio::spawn(async move { merging.merge_on_login().await });
    // Login, then the held FetchCart.
    ctx.api.wait_for_calls(2).await;
    let write = cart.add_line(&pid("P1"), inr(500), 1);
    settle().await;
    ctx.api.resume();

    merge.await.unwrap().unwrap();
    assert_eq!(write.await.unwrap(), MutationOutcome::Applied);

    assert_eq!(cart.quantity_of(&pid("P1")), 1);
    let remote = ctx.api.cart_of(EMAIL);
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].quantity, 1);
    assert_eq!(ctx.api.count(ApiOp::CreateCartLine), 1);
    assert_eq!(ctx.api.count(ApiOp::UpdateCartLine), 0);
}

#[tokio::test]
async fn test_logout_during_write_keeps_line_on_device() {
    let ctx = TestContext::new();
    ctx.sign_in().await;
    let calls = ctx.api.calls().len();

    ctx.api.pause();
    let write = ctx.storefront.cart().add_line(&pid("P1"), inr(700), 1);
    ctx.api.wait_for_calls(calls + 1).await;
    let storefront = ctx.storefront.clone();
    let logout = tokio::spawn(async move { storefront.logout().await });
    // The session ends before the logout request goes out.
    ctx.api.wait_for_calls(calls + 2).await;
    ctx.api.resume();

    assert_eq!(write.await.unwrap(), MutationOutcome::Discarded);
    logout.await.unwrap();

    let cart = ctx.storefront.cart();
    assert!(!ctx.storefront.session().is_authenticated());
    assert_eq!(cart.lines().len(), 1);
    assert_eq!(cart.quantity_of(&pid("P1")), 1);
    assert_eq!(ctx.cart_store.snapshot().unwrap().total_count(), 1);
}
