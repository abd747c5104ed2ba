mod schema;
pub mod queries;

pub use schema::init_db;

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::notify::BalanceEvents;
use crate::payments::PaymentProcessor;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding the database pool, the processor client and
/// configuration shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Payment processor API. Also the home of the idempotency flag: the
    /// `fulfilled` marker lives in processor-side session metadata, not in
    /// the local database.
    pub processor: Arc<dyn PaymentProcessor>,
    pub base_url: String,
    pub success_page_url: String,
    pub cancel_page_url: String,
    /// Credits granted per fulfilled pack purchase.
    pub credits_per_pack: i64,
    /// Broadcast hub for balance-change notifications (SSE observers).
    pub balance_events: BalanceEvents,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    Pool::builder().max_size(10).build(manager)
}
