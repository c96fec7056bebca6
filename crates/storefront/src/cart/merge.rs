//! Folding the device cart into the account cart at sign-in.

use suraj_jewels_core::{CartLine, ProductId};

/// A line the server has to be told about after merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Push {
    /// Only on this device: `POST`.
    Create(CartLine),
    /// On both sides with a different result: `PUT`.
    Update(CartLine),
}

impl Push {
    pub const fn line(&self) -> &CartLine {
        match self {
            Self::Create(line) | Self::Update(line) => line,
        }
    }
}

/// Merged cart and the writes needed to bring the server in line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Merged {
    pub lines: Vec<CartLine>,
    pub pushes: Vec<Push>,
}

/// Merge `local` into `remote`.
///
/// `synced` gives, per product, how much of a local line the account's
/// server cart already held when this device last synced with it. Only the
/// part above that was added while signed out and is added to the remote
/// quantity; a local line with nothing above it takes the remote value, or
/// is dropped when the server no longer has it.
///
/// Remote lines keep their order and local-only lines follow. The unit
/// price of a summed line comes from whichever side wrote it last, with the
/// local line winning ties.
pub(crate) fn merge(
    local: &[CartLine],
    remote: &[CartLine],
    synced: impl Fn(&ProductId) -> u32,
) -> Merged {
    let mut merged = Merged::default();
    let added_offline = |ours: &CartLine| ours.quantity.saturating_sub(synced(&ours.product_id));

    for theirs in remote {
        let extra = local
            .iter()
            .find(|ours| ours.product_id == theirs.product_id)
            .map(|ours| (ours, added_offline(ours)));
        match extra {
            Some((ours, extra)) if extra > 0 => {
                let newer = if ours.updated_at >= theirs.updated_at {
                    ours
                } else {
                    theirs
                };
                let line = CartLine {
                    product_id: theirs.product_id.clone(),
                    quantity: theirs.quantity.saturating_add(extra),
                    unit_price: newer.unit_price,
                    updated_at: newer.updated_at,
                };
                merged.pushes.push(Push::Update(line.clone()));
                merged.lines.push(line);
            }
            _ => merged.lines.push(theirs.clone()),
        }
    }

    for ours in local {
        if remote.iter().any(|theirs| theirs.product_id == ours.product_id) {
            continue;
        }
        let extra = added_offline(ours);
        if extra > 0 {
            let line = CartLine {
                quantity: extra,
                ..ours.clone()
            };
            merged.pushes.push(Push::Create(line.clone()));
            merged.lines.push(line);
        }
    }

    merged
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;
    use suraj_jewels_core::Price;

    use super::*;

    fn unsynced(_: &ProductId) -> u32 {
        0
    }

    fn line(id: &str, quantity: u32, rupees: i64, at: DateTime<Utc>) -> CartLine {
        CartLine {
            product_id: ProductId::new(id),
            quantity,
            unit_price: Price::inr(Decimal::new(rupees, 0)).unwrap(),
            updated_at: at,
        }
    }

    #[test]
    fn test_matching_lines_sum_quantities() {
        let now = Utc::now();
        let merged = merge(&[line("P1", 2, 100, now)], &[line("P1", 3, 100, now)], unsynced);

        assert_eq!(merged.lines.len(), 1);
        assert_eq!(merged.lines[0].quantity, 5);
        assert_eq!(merged.pushes, vec![Push::Update(merged.lines[0].clone())]);
    }

    #[test]
    fn test_newer_remote_price_wins() {
        let now = Utc::now();
        let merged = merge(
            &[line("P1", 1, 100, now - Duration::hours(1))],
            &[line("P1", 1, 150, now)],
            unsynced,
        );
        assert_eq!(merged.lines[0].unit_price.amount(), Decimal::new(150, 0));
    }

    #[test]
    fn test_local_price_wins_ties_and_missing_timestamps() {
        let now = Utc::now();
        let merged = merge(&[line("P1", 1, 100, now)], &[line("P1", 1, 150, now)], unsynced);
        assert_eq!(merged.lines[0].unit_price.amount(), Decimal::new(100, 0));

        let merged = merge(
            &[line("P1", 1, 100, now)],
            &[line("P1", 1, 150, DateTime::<Utc>::MIN_UTC)],
            unsynced,
        );
        assert_eq!(merged.lines[0].unit_price.amount(), Decimal::new(100, 0));
    }

    #[test]
    fn test_order_is_remote_then_local_only() {
        let now = Utc::now();
        let merged = merge(
            &[line("kada", 1, 10, now), line("ring", 1, 10, now)],
            &[line("chain", 1, 10, now), line("ring", 1, 10, now)],
            unsynced,
        );
        let ids: Vec<&str> = merged.lines.iter().map(|l| l.product_id.as_str()).collect();
        assert_eq!(ids, ["chain", "ring", "kada"]);

        let pushed: Vec<&str> = merged
            .pushes
            .iter()
            .map(|p| p.line().product_id.as_str())
            .collect();
        assert_eq!(pushed, ["ring", "kada"]);
        assert!(matches!(merged.pushes[1], Push::Create(_)));
    }

    #[test]
    fn test_empty_local_takes_remote() {
        let now = Utc::now();
        let remote = vec![line("P1", 3, 100, now)];
        let merged = merge(&[], &remote, unsynced);
        assert_eq!(merged.lines, remote);
        assert!(merged.pushes.is_empty());
    }

    #[test]
    fn test_synced_lines_take_the_remote_value() {
        let now = Utc::now();
        let merged = merge(
            &[line("P1", 2, 100, now), line("P2", 1, 50, now)],
            &[line("P1", 2, 100, now)],
            |_| 2,
        );
        // P1 was already on the account; P2 was synced and since removed there.
        assert_eq!(merged.lines, vec![line("P1", 2, 100, now)]);
        assert!(merged.pushes.is_empty());
    }

    #[test]
    fn test_only_offline_additions_are_summed() {
        let now = Utc::now();
        let merged = merge(
            &[line("P1", 5, 100, now), line("P2", 4, 50, now)],
            &[line("P1", 2, 100, now)],
            |product_id| match product_id.as_str() {
                "P1" | "P2" => 2,
                _ => 0,
            },
        );
        assert_eq!(merged.lines[0].quantity, 5);
        assert_eq!(merged.lines[1].quantity, 2);
        assert_eq!(
            merged.pushes,
            vec![
                Push::Update(merged.lines[0].clone()),
                Push::Create(merged.lines[1].clone())
            ]
        );
    }
}
