//! Database queries for accounts and consumption records.
//!
//! Balance mutations are deliberately absent here: the two authorized
//! operations (credit-grant and debit) live in the ledger module, so every
//! caller goes through one atomicity contract.

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::id::EntityType;
use crate::models::{Account, CreateAccount, Creation};

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Generate a new api key for an account. Shown to the caller exactly once;
/// only the hash is stored.
pub fn generate_api_key() -> String {
    EntityType::ApiKey.gen_id()
}

/// SHA-256 hex digest of an api key, as stored in `accounts.api_key_hash`.
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

const ACCOUNT_COLS: &str = "id, email, customer_ref, balance, created_at, updated_at";

fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        customer_ref: row.get(2)?,
        balance: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Create an account with a zero balance. Returns the account and the
/// plaintext api key.
pub fn create_account(conn: &Connection, input: &CreateAccount) -> Result<(Account, String)> {
    let id = EntityType::Account.gen_id();
    let api_key = generate_api_key();
    let now = now();

    conn.execute(
        "INSERT INTO accounts (id, email, api_key_hash, customer_ref, balance, created_at, updated_at)
         VALUES (?1, ?2, ?3, NULL, 0, ?4, ?4)",
        params![&id, &input.email, hash_api_key(&api_key), now],
    )?;

    Ok((
        Account {
            id,
            email: input.email.clone(),
            customer_ref: None,
            balance: 0,
            created_at: now,
            updated_at: now,
        },
        api_key,
    ))
}

pub fn get_account_by_id(conn: &Connection, id: &str) -> Result<Option<Account>> {
    let account = conn
        .query_row(
            &format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLS),
            params![id],
            account_from_row,
        )
        .optional()?;
    Ok(account)
}

pub fn get_account_by_api_key_hash(conn: &Connection, hash: &str) -> Result<Option<Account>> {
    let account = conn
        .query_row(
            &format!("SELECT {} FROM accounts WHERE api_key_hash = ?1", ACCOUNT_COLS),
            params![hash],
            account_from_row,
        )
        .optional()?;
    Ok(account)
}

/// Set the processor customer reference, but only if none is set yet.
///
/// The ref is created lazily on first checkout and is permanent thereafter.
/// The `IS NULL` predicate makes concurrent first checkouts converge on a
/// single stored ref: the loser of the race keeps the winner's value.
/// Returns the ref that ended up stored.
pub fn set_customer_ref_once(
    conn: &Connection,
    account_id: &str,
    customer_ref: &str,
) -> Result<String> {
    conn.execute(
        "UPDATE accounts SET customer_ref = ?1, updated_at = ?2
         WHERE id = ?3 AND customer_ref IS NULL",
        params![customer_ref, now(), account_id],
    )?;

    let stored: String = conn.query_row(
        "SELECT customer_ref FROM accounts WHERE id = ?1",
        params![account_id],
        |row| row.get(0),
    )?;
    Ok(stored)
}

/// Insert a consumption record. Callers inside a spend transaction pass the
/// transaction handle so the record commits together with the debit.
pub fn create_creation(conn: &Connection, account_id: &str, prompt: &str) -> Result<Creation> {
    let id = EntityType::Creation.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO creations (id, account_id, prompt, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![&id, account_id, prompt, now],
    )?;

    Ok(Creation {
        id,
        account_id: account_id.to_string(),
        prompt: prompt.to_string(),
        created_at: now,
    })
}

/// List an account's consumption history, newest first.
///
/// Visibility is scoped to the owning account by predicate - the only read
/// path for creations goes through an authenticated account id.
pub fn list_creations_for_account(conn: &Connection, account_id: &str) -> Result<Vec<Creation>> {
    let mut stmt = conn.prepare(
        "SELECT id, account_id, prompt, created_at FROM creations
         WHERE account_id = ?1 ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![account_id], |row| {
        Ok(Creation {
            id: row.get(0)?,
            account_id: row.get(1)?,
            prompt: row.get(2)?,
            created_at: row.get(3)?,
        })
    })?;

    let mut creations = Vec::new();
    for creation in rows {
        creations.push(creation?);
    }
    Ok(creations)
}

pub fn count_creations_for_account(conn: &Connection, account_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM creations WHERE account_id = ?1",
        params![account_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
