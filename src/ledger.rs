//! The balance ledger.
//!
//! Every balance mutation in the system goes through this module - there are
//! exactly two authorized operations, credit-grant and debit - so every call
//! site shares one atomicity contract instead of ad hoc increments scattered
//! across handlers.
//!
//! Both operations are single-statement conditional updates. SQLite applies
//! each statement atomically with respect to other writers, which is the
//! atomic read-modify-write the protocol requires.

use rusqlite::{params, Connection, TransactionBehavior};

use crate::error::{AppError, Result};
use crate::models::Creation;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Apply a credit grant: `balance += credits` as one atomic single-field
/// update. Returns the new balance.
///
/// Callers must have claimed the corresponding payment event first; the
/// ledger itself knows nothing about events.
pub fn credit_grant(conn: &Connection, account_id: &str, credits: i64) -> Result<i64> {
    let affected = conn.execute(
        "UPDATE accounts SET balance = balance + ?1, updated_at = ?2 WHERE id = ?3",
        params![credits, now(), account_id],
    )?;
    if affected == 0 {
        return Err(AppError::NotFound(format!("account {}", account_id)));
    }

    let balance = conn.query_row(
        "SELECT balance FROM accounts WHERE id = ?1",
        params![account_id],
        |row| row.get(0),
    )?;
    Ok(balance)
}

/// Undo a credit grant that could not be made durable (the fulfilled-flag
/// write failed after the credit was applied).
///
/// Returns `Ok(false)` when the balance has already dropped below the grant
/// amount - the account spent the credits inside the window - in which case
/// nothing is reverted and the caller must log for manual reconciliation.
pub fn revoke_grant(conn: &Connection, account_id: &str, credits: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE accounts SET balance = balance - ?1, updated_at = ?2
         WHERE id = ?3 AND balance >= ?1",
        params![credits, now(), account_id],
    )?;
    Ok(affected > 0)
}

/// Debit `unit_cost` credits and create the consumption record in a single
/// transaction: both commit or neither does.
///
/// The conditional update doubles as the authorization check - zero rows
/// affected with an existing account means the balance was short, and
/// nothing has been mutated. `produce` runs inside the transaction so a
/// failure there rolls the debit back too.
///
/// Returns the created record and the post-debit balance.
pub fn spend<F>(
    conn: &mut Connection,
    account_id: &str,
    unit_cost: i64,
    produce: F,
) -> Result<(Creation, i64)>
where
    F: FnOnce(&Connection) -> Result<Creation>,
{
    // Immediate: take the write lock up front so the conditional debit and
    // the record insert see one consistent snapshot.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let affected = tx.execute(
        "UPDATE accounts SET balance = balance - ?1, updated_at = ?2
         WHERE id = ?3 AND balance >= ?1",
        params![unit_cost, now(), account_id],
    )?;

    if affected == 0 {
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE id = ?1)",
            params![account_id],
            |row| row.get(0),
        )?;
        // Transaction dropped without commit - nothing mutated either way.
        if exists {
            return Err(AppError::InsufficientBalance);
        }
        return Err(AppError::NotFound(format!("account {}", account_id)));
    }

    let record = produce(&tx)?;

    let balance: i64 = tx.query_row(
        "SELECT balance FROM accounts WHERE id = ?1",
        params![account_id],
        |row| row.get(0),
    )?;

    tx.commit()?;
    Ok((record, balance))
}
