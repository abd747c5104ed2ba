//! Test utilities and fixtures for Till integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Barrier;

pub use till::db::{init_db, queries, AppState};
pub use till::error::{msg, AppError, Result};
pub use till::handlers::{
    generate, get_account, handle_processor_webhook, initiate_checkout, list_creations, signup,
    sync_checkout,
};
pub use till::models::*;
pub use till::notify::BalanceEvents;
pub use till::payments::{
    CheckoutEvent, EventStatus, NewCheckout, PaymentProcessor, ProcessorConfig, StripeClient,
};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// In-memory payment processor double.
///
/// Holds checkout sessions and their metadata the way the real processor
/// does, including the non-atomic read-then-write semantics of the
/// `fulfilled` flag. Two knobs drive the failure-mode tests:
///
/// - `fail_metadata_writes` makes `mark_fulfilled` fail, simulating a
///   processor outage between the grant and the flag write;
/// - `fetch_barrier` makes concurrent `fetch_event` calls rendezvous, so a
///   test can force two reconcilers to read the same unfulfilled snapshot
///   (the claim-race window).
pub struct FakeProcessor {
    sessions: Mutex<HashMap<String, FakeSession>>,
    customer_emails: Mutex<Vec<String>>,
    next_id: AtomicU64,
    pub fail_metadata_writes: AtomicBool,
    fetch_barrier: Mutex<Option<Arc<Barrier>>>,
    /// Real verifier: signature checks in endpoint tests exercise the
    /// production HMAC implementation.
    verifier: StripeClient,
}

#[derive(Debug, Clone)]
pub struct FakeSession {
    pub id: String,
    pub status: EventStatus,
    pub account_id: Option<String>,
    pub fulfilled: bool,
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            customer_emails: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fail_metadata_writes: AtomicBool::new(false),
            fetch_barrier: Mutex::new(None),
            verifier: StripeClient::new(&ProcessorConfig {
                secret_key: "sk_test_xxx".to_string(),
                webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
                pack_price_id: "price_test_pack".to_string(),
            }),
        }
    }

    fn gen_id(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Insert a session in the given payment state.
    pub fn insert_session(&self, status: EventStatus, account_id: Option<&str>) -> String {
        let id = self.gen_id("cs_test");
        self.sessions.lock().unwrap().insert(
            id.clone(),
            FakeSession {
                id: id.clone(),
                status,
                account_id: account_id.map(|s| s.to_string()),
                fulfilled: false,
            },
        );
        id
    }

    pub fn insert_paid_session(&self, account_id: &str) -> String {
        self.insert_session(EventStatus::Paid, Some(account_id))
    }

    pub fn session(&self, id: &str) -> Option<FakeSession> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    pub fn customer_count(&self) -> usize {
        self.customer_emails.lock().unwrap().len()
    }

    /// Make the next `n`-way set of fetches rendezvous before returning.
    pub fn set_fetch_barrier(&self, parties: usize) {
        *self.fetch_barrier.lock().unwrap() = Some(Arc::new(Barrier::new(parties)));
    }

    pub fn clear_fetch_barrier(&self) {
        *self.fetch_barrier.lock().unwrap() = None;
    }

    pub fn set_fail_metadata_writes(&self, fail: bool) {
        self.fail_metadata_writes.store(fail, Ordering::SeqCst);
    }
}

impl Default for FakeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn create_customer(&self, email: &str, _account_id: &str) -> Result<String> {
        self.customer_emails.lock().unwrap().push(email.to_string());
        Ok(self.gen_id("cus_test"))
    }

    async fn create_checkout_session(
        &self,
        account_id: &str,
        _customer_ref: &str,
        _success_url: &str,
        _cancel_url: &str,
    ) -> Result<NewCheckout> {
        let id = self.insert_session(EventStatus::Pending, Some(account_id));
        Ok(NewCheckout {
            url: format!("https://checkout.test/{}", id),
            session_id: id,
        })
    }

    async fn fetch_event(&self, session_id: &str) -> Result<CheckoutEvent> {
        // Snapshot first, then rendezvous: every barrier participant walks
        // away with state read before any of them can write the flag. This
        // is exactly the stale-read window of the real metadata store.
        let snapshot = {
            let sessions = self.sessions.lock().unwrap();
            let session = sessions
                .get(session_id)
                .ok_or_else(|| AppError::NotFound(msg::SESSION_NOT_FOUND.to_string()))?;
            CheckoutEvent {
                id: session.id.clone(),
                status: session.status,
                account_id: session.account_id.clone(),
                fulfilled: session.fulfilled,
            }
        };

        let barrier = self.fetch_barrier.lock().unwrap().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }

        Ok(snapshot)
    }

    async fn mark_fulfilled(&self, session_id: &str) -> Result<()> {
        if self.fail_metadata_writes.load(Ordering::SeqCst) {
            return Err(AppError::Processor("metadata write refused".to_string()));
        }
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::NotFound(msg::SESSION_NOT_FOUND.to_string()))?;
        session.fulfilled = true;
        Ok(())
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        self.verifier.verify_webhook_signature(payload, signature)
    }
}

/// Create an AppState backed by a throwaway database file and a fake
/// processor. Grants are 10 credits per pack, as in production defaults.
///
/// A file (not `:memory:`) so that every pooled connection sees the same
/// database and concurrent writers serialize through the busy handler, the
/// same way they do in production.
pub fn create_test_state() -> (AppState, Arc<FakeProcessor>) {
    let db_path = std::env::temp_dir().join(format!(
        "till-test-{}.db",
        uuid::Uuid::new_v4().as_simple()
    ));
    let pool = till::db::create_pool(db_path.to_str().unwrap()).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    let processor = Arc::new(FakeProcessor::new());
    let state = AppState {
        db: pool,
        processor: processor.clone(),
        base_url: "http://localhost:3000".to_string(),
        success_page_url: "http://localhost:3000/success".to_string(),
        cancel_page_url: "http://localhost:3000/cancel".to_string(),
        credits_per_pack: 10,
        balance_events: BalanceEvents::default(),
    };
    (state, processor)
}

/// Create a test account, returning it with its plaintext api key.
pub fn create_test_account(state: &AppState, email: &str) -> (Account, String) {
    let conn = state.db.get().unwrap();
    queries::create_account(
        &conn,
        &CreateAccount {
            email: email.to_string(),
        },
    )
    .expect("Failed to create test account")
}

pub fn account_balance(state: &AppState, account_id: &str) -> i64 {
    let conn = state.db.get().unwrap();
    queries::get_account_by_id(&conn, account_id)
        .unwrap()
        .expect("account missing")
        .balance
}

/// Router with all endpoints (without rate limiting for tests).
pub fn test_app(state: AppState) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/checkout", post(initiate_checkout))
        .route("/checkout/sync", post(sync_checkout))
        .route("/generate", post(generate))
        .route("/account", get(get_account))
        .route("/account/creations", get(list_creations))
        .route("/webhooks/processor", post(handle_processor_webhook))
        .with_state(state)
}

/// Compute a processor-style webhook signature header for a payload.
pub fn sign_webhook(payload: &[u8], secret: &str, timestamp: i64) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signed_payload.as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// Webhook payload for a completed checkout session.
pub fn checkout_completed_payload(session_id: &str) -> Vec<u8> {
    serde_json::json!({
        "type": "checkout.session.completed",
        "data": { "object": { "id": session_id } }
    })
    .to_string()
    .into_bytes()
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
