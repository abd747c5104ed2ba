//! Real-time balance-change notification.
//!
//! The ledger's callers publish an event after every committed balance
//! mutation; connected clients observe their own account's changes over SSE.
//! Lossy by design: a slow subscriber misses events rather than backing up
//! the publisher, and can always re-read the balance.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceChangeKind {
    Grant,
    Spend,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceEvent {
    pub account_id: String,
    pub balance: i64,
    pub kind: BalanceChangeKind,
}

#[derive(Clone)]
pub struct BalanceEvents {
    tx: broadcast::Sender<BalanceEvent>,
}

impl BalanceEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a balance change. No-op when nobody is listening.
    pub fn publish(&self, event: BalanceEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BalanceEvent> {
        self.tx.subscribe()
    }
}

impl Default for BalanceEvents {
    fn default() -> Self {
        Self::new(64)
    }
}
