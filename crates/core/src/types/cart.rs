//! Cart line types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{DeviceId, ProductId, UserId};
use super::price::{CurrencyCode, Price};

/// One product's quantity and price snapshot within the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Product this line is for. Unique within a cart.
    pub product_id: ProductId,
    /// Always at least one; a line with zero quantity is removed.
    pub quantity: u32,
    /// Unit price captured when the product was added.
    pub unit_price: Price,
    /// Time of the write that last set `unit_price`.
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    /// Price of the whole line.
    #[must_use]
    pub fn line_price(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// Persisted form of the device cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    /// Device the cart belongs to.
    pub device_id: DeviceId,
    /// Lines in display order.
    pub lines: Vec<CartLine>,
    /// What the last signed-in account's server cart held, as far as this
    /// device knows. Absent for a cart that was never synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced: Option<SyncedCart>,
}

/// Quantities an account's server cart was last confirmed to hold.
///
/// The part of a device line above its synced quantity was added while
/// signed out; only that part is added to the account cart at sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedCart {
    pub user_id: UserId,
    pub quantities: BTreeMap<ProductId, u32>,
}

impl SyncedCart {
    /// Nothing known yet for `user_id`.
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            quantities: BTreeMap::new(),
        }
    }

    /// Synced quantity of a product for `user_id` (zero for another account).
    #[must_use]
    pub fn quantity_for(&self, user_id: &UserId, product_id: &ProductId) -> u32 {
        if self.user_id == *user_id {
            self.quantities.get(product_id).copied().unwrap_or(0)
        } else {
            0
        }
    }

    /// Record the server's quantity for a product; zero forgets it.
    pub fn record(&mut self, product_id: &ProductId, quantity: u32) {
        if quantity == 0 {
            self.quantities.remove(product_id);
        } else {
            self.quantities.insert(product_id.clone(), quantity);
        }
    }
}

impl CartSnapshot {
    /// An empty cart for a device.
    #[must_use]
    pub const fn empty(device_id: DeviceId) -> Self {
        Self {
            device_id,
            lines: Vec::new(),
            synced: None,
        }
    }

    /// Sum of line quantities.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        total_count(&self.lines)
    }
}

/// Sum of quantities across lines.
#[must_use]
pub fn total_count(lines: &[CartLine]) -> u64 {
    lines.iter().map(|line| u64::from(line.quantity)).sum()
}

/// Sum of line prices, in the currency of the first line (INR when empty).
#[must_use]
pub fn total_price(lines: &[CartLine]) -> Price {
    let currency = lines
        .first()
        .map_or(CurrencyCode::default(), |line| line.unit_price.currency_code());
    lines
        .iter()
        .fold(Price::zero(currency), |acc, line| acc.plus(&line.line_price()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn line(id: &str, quantity: u32, rupees: i64) -> CartLine {
        CartLine {
            product_id: ProductId::new(id),
            quantity,
            unit_price: Price::inr(Decimal::new(rupees, 0)).unwrap(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_totals() {
        let lines = vec![line("ring", 2, 1000), line("kada", 1, 2500)];
        assert_eq!(total_count(&lines), 3);
        assert_eq!(total_price(&lines).amount(), Decimal::new(4500, 0));
    }

    #[test]
    fn test_empty_totals() {
        assert_eq!(total_count(&[]), 0);
        assert_eq!(total_price(&[]).amount(), Decimal::ZERO);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = CartSnapshot {
            device_id: DeviceId::generate(),
            lines: vec![line("P1", 2, 10)],
            synced: None,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["deviceId"].is_string());
        assert!(json.get("synced").is_none());
        assert_eq!(json["lines"][0]["productId"], "P1");
        assert_eq!(json["lines"][0]["quantity"], 2);

        let back: CartSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back.total_count(), 2);
    }

    #[test]
    fn test_synced_cart_round_trips_with_product_keys() {
        let mut synced = SyncedCart::new(UserId::new("u1"));
        synced.record(&ProductId::new("P1"), 3);
        let snapshot = CartSnapshot {
            device_id: DeviceId::generate(),
            lines: vec![line("P1", 3, 10)],
            synced: Some(synced),
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["synced"]["userId"], "u1");
        assert_eq!(json["synced"]["quantities"]["P1"], 3);

        let back: CartSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_synced_quantity_is_per_account() {
        let mut synced = SyncedCart::new(UserId::new("u1"));
        synced.record(&ProductId::new("P1"), 2);
        assert_eq!(synced.quantity_for(&UserId::new("u1"), &ProductId::new("P1")), 2);
        assert_eq!(synced.quantity_for(&UserId::new("u2"), &ProductId::new("P1")), 0);

        synced.record(&ProductId::new("P1"), 0);
        assert!(synced.quantities.is_empty());
    }
}
