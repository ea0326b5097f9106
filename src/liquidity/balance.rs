//! Optimistic balance bookkeeping
//!
//! Confirmed balances plus per-order pending adjustments. The displayed
//! balance is confirmed + every pending delta. A pending delta leaves the book
//! exactly once, either reverted or committed.

use crate::liquidity::{order::OrderId, types::SwapIntent};
use dashmap::DashMap;
use log::debug;
use serde::{Deserialize, Serialize};

/// Signed per-mint adjustments produced by one order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub adjustments: Vec<(String, i128)>,
}

impl BalanceDelta {
    /// The input amount leaves the wallet as soon as the order exists. Side is
    /// informational; both sides spend the input mint.
    pub fn for_intent(intent: &SwapIntent) -> Self {
        Self {
            adjustments: vec![(intent.input_mint.clone(), -(intent.amount as i128))],
        }
    }

    pub fn amount_for(&self, mint: &str) -> i128 {
        self.adjustments
            .iter()
            .filter(|(m, _)| m == mint)
            .map(|(_, amount)| *amount)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.adjustments.iter().all(|(_, amount)| *amount == 0)
    }
}

#[derive(Default)]
pub struct BalanceBook {
    confirmed: DashMap<String, i128>,
    pending: DashMap<OrderId, BalanceDelta>,
}

impl BalanceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_confirmed(&self, mint: &str, amount: i128) {
        self.confirmed.insert(mint.to_string(), amount);
    }

    pub fn confirmed_balance(&self, mint: &str) -> i128 {
        self.confirmed.get(mint).map(|b| *b).unwrap_or(0)
    }

    /// Confirmed balance with every pending delta applied.
    pub fn display_balance(&self, mint: &str) -> i128 {
        let pending: i128 = self
            .pending
            .iter()
            .map(|entry| entry.value().amount_for(mint))
            .sum();
        self.confirmed_balance(mint) + pending
    }

    pub fn apply(&self, order_id: OrderId, delta: BalanceDelta) {
        debug!("➕ Applying optimistic delta for order {}", order_id);
        self.pending.insert(order_id, delta);
    }

    /// Discard the pending delta. `false` if it was already finalized.
    pub fn revert(&self, order_id: &OrderId) -> bool {
        match self.pending.remove(order_id) {
            Some(_) => {
                debug!("↩️  Reverted optimistic delta for order {}", order_id);
                true
            }
            None => false,
        }
    }

    /// Fold the pending delta into confirmed balances. `false` if already finalized.
    pub fn commit(&self, order_id: &OrderId) -> bool {
        let Some((_, delta)) = self.pending.remove(order_id) else {
            return false;
        };
        for (mint, amount) in delta.adjustments {
            *self.confirmed.entry(mint).or_insert(0) += amount;
        }
        debug!("✅ Committed optimistic delta for order {}", order_id);
        true
    }

    pub fn is_pending(&self, order_id: &OrderId) -> bool {
        self.pending.contains_key(order_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liquidity::types::SwapSide;
    use pretty_assertions::assert_eq;

    fn intent(amount: u64) -> SwapIntent {
        SwapIntent::new("SOL", "USDC", amount, SwapSide::Acquire, 50)
    }

    #[test]
    fn test_apply_then_revert_restores_display_balance() {
        let book = BalanceBook::new();
        book.set_confirmed("SOL", 10_000);
        let before = book.display_balance("SOL");

        let id = OrderId::new();
        book.apply(id, BalanceDelta::for_intent(&intent(2_500)));
        assert_eq!(book.display_balance("SOL"), 7_500);
        assert_eq!(book.confirmed_balance("SOL"), 10_000);

        assert!(book.revert(&id));
        assert_eq!(book.display_balance("SOL"), before);
    }

    #[test]
    fn test_commit_makes_delta_permanent() {
        let book = BalanceBook::new();
        book.set_confirmed("SOL", 10_000);
        let id = OrderId::new();
        book.apply(id, BalanceDelta::for_intent(&intent(4_000)));

        assert!(book.commit(&id));
        assert_eq!(book.confirmed_balance("SOL"), 6_000);
        assert_eq!(book.display_balance("SOL"), 6_000);
        assert_eq!(book.pending_count(), 0);
    }

    #[test]
    fn test_finalization_happens_once() {
        let book = BalanceBook::new();
        let id = OrderId::new();
        book.apply(id, BalanceDelta::for_intent(&intent(1)));

        assert!(book.revert(&id));
        assert!(!book.revert(&id));
        assert!(!book.commit(&id));
        assert_eq!(book.display_balance("SOL"), 0);
    }

    #[test]
    fn test_independent_orders_do_not_interfere() {
        let book = BalanceBook::new();
        book.set_confirmed("SOL", 100);
        let (a, b) = (OrderId::new(), OrderId::new());
        book.apply(a, BalanceDelta::for_intent(&intent(10)));
        book.apply(b, BalanceDelta::for_intent(&intent(20)));
        assert_eq!(book.display_balance("SOL"), 70);

        book.revert(&a);
        book.commit(&b);
        assert_eq!(book.display_balance("SOL"), 80);
    }
}
