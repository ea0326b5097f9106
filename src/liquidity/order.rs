//! Order record and its forward-only state machine.

use crate::{
    error::{Result, SwapError},
    liquidity::{
        balance::BalanceDelta,
        types::{FeeEstimate, Quote, SwapIntent, SwapSide},
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for OrderId {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(OrderId)
            .map_err(|e| SwapError::InvalidInput(format!("invalid order id '{}': {}", s, e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Submitted,
    Filled,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Submitted, Filled)
                | (Submitted, Failed)
                | (Submitted, Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Filled => "filled",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// One accepted swap intent as it moves through execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub intent: SwapIntent,
    pub owner: String,
    pub status: OrderStatus,
    pub delta: BalanceDelta,
    pub quote: Option<Quote>,
    pub fee: Option<FeeEstimate>,
    pub tx_signature: Option<String>,
    pub error: Option<String>,
    /// Set when a transaction was sent but its outcome is unknown
    pub needs_reconciliation: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(id: OrderId, intent: SwapIntent, owner: impl Into<String>, at: DateTime<Utc>) -> Self {
        let delta = BalanceDelta::for_intent(&intent);
        Self {
            id,
            intent,
            owner: owner.into(),
            status: OrderStatus::Pending,
            delta,
            quote: None,
            fee: None,
            tx_signature: None,
            error: None,
            needs_reconciliation: false,
            created_at: at,
            completed_at: None,
        }
    }

    pub fn side(&self) -> SwapSide {
        self.intent.side
    }

    pub fn amount(&self) -> u64 {
        self.intent.amount
    }

    /// Advance the state machine. Terminal states stamp `completed_at`.
    pub fn transition(&mut self, next: OrderStatus, at: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SwapError::InvalidTransition(format!(
                "order {}: {} -> {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(at);
        }
        Ok(())
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.created_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn order() -> Order {
        Order::new(
            OrderId::new(),
            SwapIntent::new("SOL", "USDC", 1_000, SwapSide::Acquire, 50),
            "owner",
            Utc::now(),
        )
    }

    #[test]
    fn test_order_id_round_trips_through_display() {
        let id = OrderId::new();
        assert_eq!(id.to_string().parse::<OrderId>().unwrap(), id);
        assert!("not-a-uuid".parse::<OrderId>().is_err());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut order = order();
        assert_eq!(order.status, OrderStatus::Pending);
        order.transition(OrderStatus::Submitted, Utc::now()).unwrap();
        assert!(order.completed_at.is_none());
        order.transition(OrderStatus::Filled, Utc::now()).unwrap();
        assert!(order.completed_at.is_some());
        assert!(order.duration_ms().unwrap() >= 0);
    }

    #[test]
    fn test_transitions_are_forward_only() {
        let mut order = order();
        assert!(order.transition(OrderStatus::Filled, Utc::now()).is_err());

        order.transition(OrderStatus::Cancelled, Utc::now()).unwrap();
        for next in [
            OrderStatus::Pending,
            OrderStatus::Submitted,
            OrderStatus::Filled,
            OrderStatus::Failed,
            OrderStatus::Cancelled,
        ] {
            let err = order.transition(next, Utc::now()).unwrap_err();
            assert!(matches!(err, SwapError::InvalidTransition(_)));
        }
        assert_eq!(order.status, OrderStatus::Cancelled);
    }
}
