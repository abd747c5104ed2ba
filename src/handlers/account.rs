use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use rusqlite::ErrorCode;
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{AuthedAccount, Json};
use crate::models::{Account, CreateAccount, Creation};

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub email: String,
    pub balance: i64,
    pub created_at: i64,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            balance: account.balance,
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub account: AccountResponse,
    /// Shown exactly once; only a hash is stored.
    pub api_key: String,
}

/// Create an account with a zero balance and issue its api key.
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<CreateAccount>,
) -> Result<Json<SignupResponse>> {
    request.validate()?;

    let conn = state.db.get()?;
    let (account, api_key) = match queries::create_account(&conn, &request) {
        Ok(created) => created,
        Err(AppError::Database(rusqlite::Error::SqliteFailure(e, _)))
            if e.code == ErrorCode::ConstraintViolation =>
        {
            return Err(AppError::Conflict("Email already registered".into()));
        }
        Err(e) => return Err(e),
    };

    tracing::info!("account {} created", account.id);

    Ok(Json(SignupResponse {
        account: account.into(),
        api_key,
    }))
}

/// Current balance snapshot for the authenticated account.
pub async fn get_account(
    State(state): State<AppState>,
    AuthedAccount(account): AuthedAccount,
) -> Result<Json<AccountResponse>> {
    // Re-read rather than echoing the extractor's copy - the balance may
    // have moved since authentication.
    let conn = state.db.get()?;
    let current = queries::get_account_by_id(&conn, &account.id)?.unwrap_or(account);
    Ok(Json(current.into()))
}

/// The authenticated account's consumption history, newest first.
///
/// Visibility is scoped to the caller's own records; there is no cross-
/// account read path.
pub async fn list_creations(
    State(state): State<AppState>,
    AuthedAccount(account): AuthedAccount,
) -> Result<Json<Vec<Creation>>> {
    let conn = state.db.get()?;
    let creations = queries::list_creations_for_account(&conn, &account.id)?;
    Ok(Json(creations))
}

/// SSE stream of the authenticated account's balance changes.
pub async fn account_events(
    State(state): State<AppState>,
    AuthedAccount(account): AuthedAccount,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.balance_events.subscribe();
    let account_id = account.id;

    let stream = BroadcastStream::new(rx).filter_map(move |event| match event {
        Ok(e) if e.account_id == account_id => Event::default()
            .event("balance")
            .json_data(&e)
            .ok()
            .map(Ok),
        // Other accounts' events, and gaps from a lagged receiver: the
        // client re-reads /account rather than replaying history.
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
