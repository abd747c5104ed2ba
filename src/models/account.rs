use serde::{Deserialize, Serialize};

use crate::error::{msg, AppError, Result};

/// An end-user account holding a credit balance.
///
/// `balance` is never mutated outside the ledger module's two authorized
/// operations (credit-grant and debit). The storage layer backs the
/// non-negativity invariant with a CHECK constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    /// Processor-side customer id (e.g. Stripe `cus_xxx`). Created lazily on
    /// the first checkout and reused for every purchase thereafter.
    pub customer_ref: Option<String>,
    /// Credits remaining. Always >= 0.
    pub balance: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccount {
    pub email: String,
}

impl CreateAccount {
    pub fn validate(&self) -> Result<()> {
        validate_email_format(&self.email)
    }
}

/// Basic email format validation.
///
/// Intentionally permissive - a sanity check, not RFC 5322 compliance.
fn validate_email_format(email: &str) -> Result<()> {
    let email = email.trim();

    if email.is_empty() {
        return Err(AppError::BadRequest(msg::EMAIL_EMPTY.into()));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(AppError::BadRequest(msg::INVALID_EMAIL_FORMAT.into()));
    }

    let (local_part, domain_part) = (parts[0], parts[1]);

    if local_part.is_empty() || local_part.contains(' ') {
        return Err(AppError::BadRequest(msg::INVALID_EMAIL_FORMAT.into()));
    }

    if domain_part.is_empty()
        || !domain_part.contains('.')
        || domain_part.starts_with('.')
        || domain_part.ends_with('.')
    {
        return Err(AppError::BadRequest(msg::INVALID_EMAIL_FORMAT.into()));
    }

    Ok(())
}
