//! Eager fulfillment path: the buyer's own client reports the completed
//! checkout straight after redirect, racing the processor's webhook.

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{msg, OptionExt, Result};
use crate::extractors::{AuthedAccount, Json};
use crate::fulfillment::{self, ReconcileOutcome};

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    /// Whether this call applied the grant.
    pub granted: bool,
    /// Whether the event had already been fulfilled (by either path).
    pub already_fulfilled: bool,
    /// The caller's current balance. Omitted when the session's payee is a
    /// different account than the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
}

/// Reconcile a checkout session on behalf of the redirected buyer.
///
/// The session id names which event to reconcile; it never decides who gets
/// paid - the grant is keyed by the payee stamped into session metadata at
/// checkout time. Abandoning this call mid-flight is harmless: the webhook
/// path completes fulfillment on its own.
pub async fn sync_checkout(
    State(state): State<AppState>,
    AuthedAccount(account): AuthedAccount,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>> {
    match fulfillment::reconcile(&state, &request.session_id).await? {
        ReconcileOutcome::Granted {
            account_id,
            balance,
        } => Ok(Json(SyncResponse {
            granted: true,
            already_fulfilled: false,
            balance: (account_id == account.id).then_some(balance),
        })),
        ReconcileOutcome::AlreadyFulfilled => {
            let conn = state.db.get()?;
            let current = queries::get_account_by_id(&conn, &account.id)?
                .or_not_found(msg::ACCOUNT_NOT_FOUND)?;
            Ok(Json(SyncResponse {
                granted: false,
                already_fulfilled: true,
                balance: Some(current.balance),
            }))
        }
        ReconcileOutcome::NotPaid | ReconcileOutcome::UnknownPayee => Ok(Json(SyncResponse {
            granted: false,
            already_fulfilled: false,
            balance: None,
        })),
    }
}
