//! Confirmed cart lines plus the pending deltas layered on top of them.
//!
//! The ledger is pure bookkeeping: no I/O, no locking. The aggregator owns
//! one behind its state lock.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use suraj_jewels_core::{CartLine, Price, ProductId};

/// Price snapshot carried by a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PricedAt {
    pub price: Price,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Delta {
    id: u64,
    change: i64,
    price: Option<PricedAt>,
}

#[derive(Debug, Default)]
struct Entry {
    confirmed: Option<CartLine>,
    pending: Vec<Delta>,
}

impl Entry {
    fn confirmed_quantity(&self) -> i64 {
        self.confirmed
            .as_ref()
            .map_or(0, |line| i64::from(line.quantity))
    }

    fn quantity(&self) -> u32 {
        let total = self.confirmed_quantity() + self.pending.iter().map(|d| d.change).sum::<i64>();
        clamp(total)
    }

    fn priced(&self) -> Option<PricedAt> {
        self.pending
            .iter()
            .rev()
            .find_map(|delta| delta.price)
            .or_else(|| {
                self.confirmed.as_ref().map(|line| PricedAt {
                    price: line.unit_price,
                    at: line.updated_at,
                })
            })
    }

    fn is_vacant(&self) -> bool {
        self.confirmed.is_none() && self.pending.is_empty()
    }
}

/// The remote write a delta resolves to once it reaches the front of its
/// product's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Plan {
    pub product_id: ProductId,
    /// Confirmed quantity before this delta.
    pub previous: u32,
    /// Confirmed line after this delta; `None` once the quantity hits zero.
    pub line: Option<CartLine>,
    /// Price the confirmed line had before this delta.
    previous_price: Option<Price>,
}

impl Plan {
    /// Confirmed quantity after this delta.
    pub fn quantity(&self) -> u32 {
        self.line.as_ref().map_or(0, |line| line.quantity)
    }

    /// Whether applying the plan leaves the confirmed line as it was.
    pub fn is_noop(&self) -> bool {
        match &self.line {
            None => self.previous == 0,
            Some(line) => {
                line.quantity == self.previous && Some(line.unit_price) == self.previous_price
            }
        }
    }
}

/// Ordered cart lines with reversible pending deltas.
#[derive(Debug, Default)]
pub(crate) struct CartLedger {
    entries: IndexMap<ProductId, Entry>,
    next_delta: u64,
}

impl CartLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the confirmed lines with `lines`, in their order.
    ///
    /// Pending deltas stay layered on top. Products that only have pending
    /// deltas left follow the new lines.
    pub fn replace(&mut self, lines: Vec<CartLine>) {
        let mut previous = std::mem::take(&mut self.entries);
        for line in lines.into_iter().filter(|line| line.quantity > 0) {
            let pending = previous
                .shift_remove(&line.product_id)
                .map(|entry| entry.pending)
                .unwrap_or_default();
            self.entries.insert(
                line.product_id.clone(),
                Entry {
                    confirmed: Some(line),
                    pending,
                },
            );
        }
        for (product_id, entry) in previous {
            if !entry.pending.is_empty() {
                self.entries.insert(
                    product_id,
                    Entry {
                        confirmed: None,
                        pending: entry.pending,
                    },
                );
            }
        }
    }

    /// Quantity shown for a product (zero when it has no line).
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.entries.get(product_id).map_or(0, Entry::quantity)
    }

    /// Price snapshot shown for a product.
    pub fn priced(&self, product_id: &ProductId) -> Option<PricedAt> {
        self.entries.get(product_id).and_then(Entry::priced)
    }

    /// Lines as shown: confirmed state with every pending delta applied.
    pub fn lines(&self) -> Vec<CartLine> {
        self.entries
            .iter()
            .filter_map(|(product_id, entry)| {
                let quantity = entry.quantity();
                let priced = entry.priced()?;
                (quantity > 0).then(|| CartLine {
                    product_id: product_id.clone(),
                    quantity,
                    unit_price: priced.price,
                    updated_at: priced.at,
                })
            })
            .collect()
    }

    /// Lines the remote (or device) store has acknowledged.
    pub fn confirmed_lines(&self) -> Vec<CartLine> {
        self.entries
            .values()
            .filter_map(|entry| entry.confirmed.clone())
            .collect()
    }

    /// Confirmed lines as they would be after `plan` commits.
    pub fn confirmed_lines_with(&self, plan: &Plan) -> Vec<CartLine> {
        let mut lines: Vec<CartLine> = Vec::with_capacity(self.entries.len() + 1);
        let mut placed = false;
        for (product_id, entry) in &self.entries {
            if *product_id == plan.product_id {
                placed = true;
                lines.extend(plan.line.clone());
            } else {
                lines.extend(entry.confirmed.clone());
            }
        }
        if !placed {
            lines.extend(plan.line.clone());
        }
        lines
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|entry| entry.quantity() == 0)
    }

    /// Record a delta and return its id.
    ///
    /// A product whose shown quantity goes from zero to positive moves to
    /// the end of the cart.
    pub fn push(&mut self, product_id: &ProductId, change: i64, price: Option<PricedAt>) -> u64 {
        let id = self.next_delta;
        self.next_delta += 1;

        let was_shown = self.quantity_of(product_id) > 0;
        let entry = self.entries.entry(product_id.clone()).or_default();
        entry.pending.push(Delta { id, change, price });

        if !was_shown
            && entry.quantity() > 0
            && let Some(index) = self.entries.get_index_of(product_id)
        {
            let last = self.entries.len() - 1;
            self.entries.move_index(index, last);
        }
        id
    }

    /// What committing delta `id` would write. `None` if it is gone.
    pub fn plan(&self, product_id: &ProductId, id: u64) -> Option<Plan> {
        let entry = self.entries.get(product_id)?;
        let delta = entry.pending.iter().find(|delta| delta.id == id)?;

        let previous = clamp(entry.confirmed_quantity());
        let target = clamp(entry.confirmed_quantity() + delta.change);
        let previous_price = entry.confirmed.as_ref().map(|line| line.unit_price);
        let priced = delta.price.or_else(|| {
            entry.confirmed.as_ref().map(|line| PricedAt {
                price: line.unit_price,
                at: line.updated_at,
            })
        });

        let line = match priced {
            Some(priced) if target > 0 => Some(CartLine {
                product_id: product_id.clone(),
                quantity: target,
                unit_price: priced.price,
                updated_at: priced.at,
            }),
            _ => None,
        };

        Some(Plan {
            product_id: product_id.clone(),
            previous,
            line,
            previous_price,
        })
    }

    /// Fold delta `id` into the confirmed state. Returns false if it is gone.
    pub fn commit(&mut self, plan: &Plan, id: u64) -> bool {
        let Some(entry) = self.entries.get_mut(&plan.product_id) else {
            return false;
        };
        let Some(index) = entry.pending.iter().position(|delta| delta.id == id) else {
            return false;
        };
        entry.pending.remove(index);
        entry.confirmed.clone_from(&plan.line);
        self.prune(&plan.product_id);
        true
    }

    /// Forget delta `id` without committing it. Returns false if it is gone.
    pub fn discard(&mut self, product_id: &ProductId, id: u64) -> bool {
        let Some(entry) = self.entries.get_mut(product_id) else {
            return false;
        };
        let before = entry.pending.len();
        entry.pending.retain(|delta| delta.id != id);
        let removed = entry.pending.len() != before;
        self.prune(product_id);
        removed
    }

    fn prune(&mut self, product_id: &ProductId) {
        if self.entries.get(product_id).is_some_and(Entry::is_vacant) {
            self.entries.shift_remove(product_id);
        }
    }
}

fn clamp(quantity: i64) -> u32 {
    u32::try_from(quantity.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn pid(id: &str) -> ProductId {
        ProductId::new(id)
    }

    fn priced(rupees: i64) -> Option<PricedAt> {
        Some(PricedAt {
            price: Price::inr(Decimal::new(rupees, 0)).unwrap(),
            at: Utc::now(),
        })
    }

    fn line(id: &str, quantity: u32, rupees: i64) -> CartLine {
        CartLine {
            product_id: pid(id),
            quantity,
            unit_price: Price::inr(Decimal::new(rupees, 0)).unwrap(),
            updated_at: Utc::now(),
        }
    }

    fn ids(ledger: &CartLedger) -> Vec<String> {
        ledger
            .lines()
            .into_iter()
            .map(|line| line.product_id.into_inner())
            .collect()
    }

    #[test]
    fn test_repeated_adds_share_one_line() {
        let mut ledger = CartLedger::new();
        ledger.push(&pid("P1"), 1, priced(100));
        ledger.push(&pid("P1"), 1, priced(100));

        let lines = ledger.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 2);
    }

    #[test]
    fn test_new_lines_append_in_order() {
        let mut ledger = CartLedger::new();
        ledger.replace(vec![line("ring", 1, 100)]);
        ledger.push(&pid("kada"), 1, priced(200));
        ledger.push(&pid("chain"), 1, priced(300));
        ledger.push(&pid("ring"), 1, priced(100));
        assert_eq!(ids(&ledger), ["ring", "kada", "chain"]);
    }

    #[test]
    fn test_readded_line_moves_to_end() {
        let mut ledger = CartLedger::new();
        ledger.replace(vec![line("ring", 1, 100), line("kada", 1, 200)]);
        ledger.push(&pid("ring"), -1, None);
        ledger.push(&pid("ring"), 1, priced(100));
        assert_eq!(ids(&ledger), ["kada", "ring"]);
    }

    #[test]
    fn test_discard_rolls_back_only_that_delta() {
        let mut ledger = CartLedger::new();
        let first = ledger.push(&pid("P1"), 2, priced(100));
        let second = ledger.push(&pid("P1"), 3, priced(100));

        assert!(ledger.discard(&pid("P1"), first));
        assert_eq!(ledger.quantity_of(&pid("P1")), 3);
        assert!(!ledger.discard(&pid("P1"), first));

        assert!(ledger.discard(&pid("P1"), second));
        assert!(ledger.lines().is_empty());
        assert!(ledger.entries.is_empty());
    }

    #[test]
    fn test_plan_uses_confirmed_state_at_dispatch() {
        let mut ledger = CartLedger::new();
        let add = ledger.push(&pid("P1"), 1, priced(100));
        let more = ledger.push(&pid("P1"), 1, priced(100));

        let plan = ledger.plan(&pid("P1"), add).unwrap();
        assert_eq!(plan.previous, 0);
        assert_eq!(plan.line.as_ref().unwrap().quantity, 1);
        assert!(ledger.commit(&plan, add));

        let plan = ledger.plan(&pid("P1"), more).unwrap();
        assert_eq!(plan.previous, 1);
        assert_eq!(plan.line.as_ref().unwrap().quantity, 2);
        assert!(ledger.commit(&plan, more));

        assert_eq!(ledger.confirmed_lines().len(), 1);
        assert_eq!(ledger.confirmed_lines()[0].quantity, 2);
    }

    #[test]
    fn test_remove_after_failed_add_is_noop() {
        let mut ledger = CartLedger::new();
        let add = ledger.push(&pid("P1"), 1, priced(100));
        let remove = ledger.push(&pid("P1"), -1, None);
        assert_eq!(ledger.quantity_of(&pid("P1")), 0);

        ledger.discard(&pid("P1"), add);
        assert_eq!(ledger.quantity_of(&pid("P1")), 0);

        let plan = ledger.plan(&pid("P1"), remove).unwrap();
        assert!(plan.is_noop());
        assert!(ledger.commit(&plan, remove));
        assert!(ledger.entries.is_empty());
    }

    #[test]
    fn test_plan_to_zero_deletes_line() {
        let mut ledger = CartLedger::new();
        ledger.replace(vec![line("P1", 3, 100)]);
        let remove = ledger.push(&pid("P1"), -3, None);

        let plan = ledger.plan(&pid("P1"), remove).unwrap();
        assert_eq!(plan.previous, 3);
        assert!(plan.line.is_none());
        assert_eq!(plan.quantity(), 0);
        assert!(!plan.is_noop());

        assert!(ledger.commit(&plan, remove));
        assert!(ledger.is_empty());
        assert!(ledger.confirmed_lines().is_empty());
    }

    #[test]
    fn test_confirmed_lines_with_keeps_position() {
        let mut ledger = CartLedger::new();
        ledger.replace(vec![line("a", 1, 10), line("b", 1, 20)]);
        let delta = ledger.push(&pid("a"), 1, priced(10));
        let plan = ledger.plan(&pid("a"), delta).unwrap();

        let lines = ledger.confirmed_lines_with(&plan);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].product_id, pid("a"));
        assert_eq!(lines[0].quantity, 2);

        let delta = ledger.push(&pid("c"), 1, priced(30));
        let plan = ledger.plan(&pid("c"), delta).unwrap();
        let lines = ledger.confirmed_lines_with(&plan);
        assert_eq!(lines.last().unwrap().product_id, pid("c"));
    }

    #[test]
    fn test_latest_price_snapshot_wins_in_view() {
        let mut ledger = CartLedger::new();
        ledger.replace(vec![line("P1", 1, 100)]);
        ledger.push(&pid("P1"), 1, priced(120));
        let shown = ledger.lines();
        assert_eq!(shown[0].unit_price.amount(), Decimal::new(120, 0));
        assert_eq!(ledger.confirmed_lines()[0].unit_price.amount(), Decimal::new(100, 0));
    }

    #[test]
    fn test_replace_keeps_pending_deltas() {
        let mut ledger = CartLedger::new();
        ledger.replace(vec![line("P1", 1, 100), line("P3", 1, 10)]);
        let more = ledger.push(&pid("P1"), 2, priced(100));
        let fresh = ledger.push(&pid("P4"), 1, priced(40));

        ledger.replace(vec![line("P2", 4, 50), line("P1", 5, 100)]);

        assert_eq!(ids(&ledger), ["P2", "P1", "P4"]);
        assert_eq!(ledger.quantity_of(&pid("P1")), 7);
        assert_eq!(ledger.quantity_of(&pid("P3")), 0);
        assert_eq!(ledger.plan(&pid("P1"), more).unwrap().previous, 5);
        assert_eq!(ledger.plan(&pid("P4"), fresh).unwrap().previous, 0);
    }
}
