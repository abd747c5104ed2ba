//! Custom extractors that return JSON errors instead of plain text, plus the
//! authenticated-account extractor.

use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::db::{queries, AppState};
use crate::error::AppError;
use crate::models::Account;

/// JSON extractor that returns `AppError` on failure.
///
/// Use this instead of `axum::Json` to get JSON error responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let result = axum::Json::<T>::from_request(req, state).await?;
        Ok(Json(result.0))
    }
}

impl<T> std::ops::Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// The account authenticated by the request's bearer token.
///
/// This is the only place a spending or syncing account id enters the
/// system: handlers never read an account id out of a client-supplied body
/// for authorization decisions.
#[derive(Debug, Clone)]
pub struct AuthedAccount(pub Account);

impl FromRequestParts<AppState> for AuthedAccount {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let token = header.strip_prefix("Bearer ").ok_or(AppError::Unauthorized)?;

        let conn = state.db.get()?;
        let account = queries::get_account_by_api_key_hash(&conn, &queries::hash_api_key(token))?
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthedAccount(account))
    }
}
