//! The consumption endpoint: spend one credit, create one record.

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{AuthedAccount, Json};
use crate::ledger;
use crate::models::Creation;
use crate::notify::{BalanceChangeKind, BalanceEvent};

/// Cost of one generation, in credits.
pub const GENERATION_COST: i64 = 1;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub creation: Creation,
    pub balance: i64,
}

/// Debit one credit and create the consumption record, atomically.
///
/// The spending account comes from the bearer token, never from the request
/// body. Insufficient balance is an expected outcome (402 with a
/// machine-readable flag), not a server error.
pub async fn generate(
    State(state): State<AppState>,
    AuthedAccount(account): AuthedAccount,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::BadRequest("Prompt cannot be empty".into()));
    }

    let mut conn = state.db.get()?;
    let (creation, balance) = ledger::spend(&mut conn, &account.id, GENERATION_COST, |tx| {
        queries::create_creation(tx, &account.id, prompt)
    })?;

    state.balance_events.publish(BalanceEvent {
        account_id: account.id.clone(),
        balance,
        kind: BalanceChangeKind::Spend,
    });

    tracing::debug!(
        "creation {} for account {} (balance {})",
        creation.id,
        account.id,
        balance
    );

    Ok(Json(GenerateResponse { creation, balance }))
}
