//! Fulfillment reconciliation: apply each paid pack purchase exactly once.
//!
//! Two unsynchronized channels report the same completed payment - the
//! processor's webhook and the buyer's own client after redirect - in any
//! order, arbitrarily delayed, each possibly more than once. Both funnel
//! into [`reconcile`], which decides per invocation whether to apply the
//! credit grant. The only coordination primitive is the `fulfilled` flag in
//! processor-side session metadata; there is no lock service and no local
//! claim table, and the entry points may run in separate processes.
//!
//! Ordering: the flag is written only after the ledger credit commits
//! ("grant confirmed before flag durable"). A failed grant therefore leaves
//! the flag unset and the event retryable; a paid customer is never stranded
//! creditless behind a set flag. The price is a claim window: between one
//! invocation's flag read and its flag write, a concurrent invocation can
//! read stale "unfulfilled" state and also grant. The metadata store has no
//! compare-and-swap to close that window, so it is accepted, bounded by one
//! grant-plus-write round trip, and covered by an explicit test.

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::ledger;
use crate::notify::{BalanceChangeKind, BalanceEvent};
use crate::payments::{CheckoutEvent, EventStatus, PaymentProcessor};

/// Outcome of a claim check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The event is unfulfilled as of the supplied snapshot; the caller may
    /// proceed to grant.
    Granted,
    /// Another attempt already fulfilled (or is fulfilling) this event.
    AlreadyFulfilled,
}

/// The idempotency guard over a payment event's `fulfilled` metadata flag.
///
/// `try_claim` judges a snapshot the reconciler fetched fresh from canonical
/// storage this invocation; `confirm` makes the claim durable once the grant
/// has committed. Check and write are separate remote operations with no
/// compare-and-swap between them - the residual race is analyzed above.
pub struct FulfillmentGuard<'a> {
    processor: &'a dyn PaymentProcessor,
}

impl<'a> FulfillmentGuard<'a> {
    pub fn new(processor: &'a dyn PaymentProcessor) -> Self {
        Self { processor }
    }

    /// Check the flag on a freshly fetched event.
    pub fn try_claim(&self, event: &CheckoutEvent) -> Claim {
        if event.fulfilled {
            Claim::AlreadyFulfilled
        } else {
            Claim::Granted
        }
    }

    /// Write `fulfilled = true` back to the processor. Called strictly after
    /// the ledger credit commits. On failure the flag must be treated as
    /// unset and the grant compensated.
    pub async fn confirm(&self, event_id: &str) -> Result<()> {
        self.processor.mark_fulfilled(event_id).await
    }
}

/// Result of one reconciliation attempt. Everything here is an ordinary
/// business outcome; transport and storage failures surface as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// This invocation applied the credit grant.
    Granted { account_id: String, balance: i64 },
    /// The event was already fulfilled; no balance change.
    AlreadyFulfilled,
    /// The session is pending, cancelled or expired; no balance change.
    NotPaid,
    /// Paid session whose payee metadata is missing or references no known
    /// account. Acknowledged so the processor stops redelivering; logged for
    /// operator follow-up.
    UnknownPayee,
}

/// Reconcile one payment event against the ledger.
///
/// Invoked from both the webhook handler and the client sync endpoint with
/// identical semantics. Every invocation after the first successful grant is
/// a no-op, and an invocation abandoned by its caller is harmless - the
/// other channel completes fulfillment on its own schedule.
pub async fn reconcile(state: &AppState, session_id: &str) -> Result<ReconcileOutcome> {
    // Always a fresh read of canonical state - never cached across paths.
    let event = state.processor.fetch_event(session_id).await?;

    if event.status != EventStatus::Paid {
        tracing::debug!("session {} not paid ({:?}), nothing to fulfill", event.id, event.status);
        return Ok(ReconcileOutcome::NotPaid);
    }

    let guard = FulfillmentGuard::new(state.processor.as_ref());
    if guard.try_claim(&event) == Claim::AlreadyFulfilled {
        tracing::debug!("session {} already fulfilled", event.id);
        return Ok(ReconcileOutcome::AlreadyFulfilled);
    }

    let Some(account_id) = event.account_id.as_deref() else {
        tracing::warn!("paid session {} has no payee metadata", event.id);
        return Ok(ReconcileOutcome::UnknownPayee);
    };

    let conn = state.db.get()?;
    if queries::get_account_by_id(&conn, account_id)?.is_none() {
        tracing::warn!("paid session {} references unknown account {}", event.id, account_id);
        return Ok(ReconcileOutcome::UnknownPayee);
    }

    let credits = state.credits_per_pack;
    let balance = ledger::credit_grant(&conn, account_id, credits)?;

    if let Err(e) = guard.confirm(&event.id).await {
        // The flag never became durable. Revoke the grant so redelivery can
        // retry the whole sequence instead of double-crediting.
        match ledger::revoke_grant(&conn, account_id, credits) {
            Ok(true) => {
                tracing::warn!(
                    "session {}: fulfilled flag write failed, grant revoked pending retry",
                    event.id
                );
            }
            Ok(false) => {
                tracing::error!(
                    "session {}: flag write failed and credits already spent from {}; \
                     manual reconciliation required",
                    event.id,
                    account_id
                );
            }
            Err(rev_err) => {
                tracing::error!(
                    "session {}: flag write failed and revocation errored ({}); \
                     manual reconciliation required",
                    event.id,
                    rev_err
                );
            }
        }
        return Err(e);
    }

    state.balance_events.publish(BalanceEvent {
        account_id: account_id.to_string(),
        balance,
        kind: BalanceChangeKind::Grant,
    });

    tracing::info!(
        "fulfilled session {}: granted {} credits to {} (balance {})",
        event.id,
        credits,
        account_id,
        balance
    );

    Ok(ReconcileOutcome::Granted {
        account_id: account_id.to_string(),
        balance,
    })
}
