//! Destination for orders that reached a terminal state.

use crate::liquidity::order::{Order, OrderId};
use log::{debug, warn};
use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

pub const DEFAULT_HISTORY_CAPACITY: usize = 1_000;

pub trait OrderHistory: Send + Sync {
    /// Re-recording an id replaces the earlier entry.
    fn record(&self, order: Order);

    /// A transaction signature that surfaced after the order left the
    /// in-flight set. Flags the order for reconciliation, whether it has
    /// been archived yet or not.
    fn attach_late_signature(&self, id: &OrderId, signature: &str);

    fn get(&self, id: &OrderId) -> Option<Order>;

    /// Newest first
    fn recent(&self, limit: usize) -> Vec<Order>;
}

/// Bounded ring of the most recent terminal orders.
pub struct InMemoryOrderHistory {
    state: Mutex<HistoryState>,
    capacity: usize,
}

struct HistoryState {
    orders: VecDeque<Order>,
    /// Signatures that arrived before their order was archived
    late_signatures: HashMap<OrderId, String>,
}

fn flag_sent(order: &mut Order, signature: String) {
    order.tx_signature = Some(signature);
    order.needs_reconciliation = true;
}

impl InMemoryOrderHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(HistoryState {
                orders: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
                late_signatures: HashMap::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.orders.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryOrderHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl OrderHistory for InMemoryOrderHistory {
    fn record(&self, mut order: Order) {
        if let Ok(mut state) = self.state.lock() {
            debug!("🗂️  Archiving order {} ({})", order.id, order.status);
            if let Some(signature) = state.late_signatures.remove(&order.id) {
                flag_sent(&mut order, signature);
            }
            state.orders.retain(|archived| archived.id != order.id);
            state.orders.push_back(order);
            while state.orders.len() > self.capacity {
                state.orders.pop_front();
            }
        }
    }

    fn attach_late_signature(&self, id: &OrderId, signature: &str) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        warn!("🔁 Order {} left in flight with tx {} already sent", id, signature);
        match state.orders.iter_mut().rev().find(|order| &order.id == id) {
            Some(order) => flag_sent(order, signature.to_string()),
            None => {
                state.late_signatures.insert(*id, signature.to_string());
            }
        }
    }

    fn get(&self, id: &OrderId) -> Option<Order> {
        self.state
            .lock()
            .ok()?
            .orders
            .iter()
            .rev()
            .find(|order| &order.id == id)
            .cloned()
    }

    fn recent(&self, limit: usize) -> Vec<Order> {
        self.state
            .lock()
            .map(|state| state.orders.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}
