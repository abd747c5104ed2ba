use rusqlite::Connection;

/// Initialize the database schema.
///
/// The CHECK constraint on `accounts.balance` backs the ledger's
/// non-negativity invariant at the storage layer: no code path, authorized
/// or not, can commit a negative balance.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- End-user accounts holding credit balances
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            api_key_hash TEXT NOT NULL UNIQUE,
            customer_ref TEXT,
            balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_accounts_api_key ON accounts(api_key_hash);

        -- Consumption records, created atomically with each one-credit debit.
        -- Immutable after creation; removed only by cascading account deletion.
        CREATE TABLE IF NOT EXISTS creations (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            prompt TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_creations_account ON creations(account_id, created_at);
        "#,
    )
}
