//! Payment processor integration.
//!
//! The processor is the system of record for payment events: checkout
//! sessions, their payment status, and the per-session metadata that carries
//! both the trusted payee and the fulfillment flag. Handlers talk to it
//! through the [`PaymentProcessor`] trait so tests can substitute an
//! in-memory processor with controllable interleavings.

mod stripe;

pub use stripe::{ProcessorConfig, StripeClient, WebhookData, WebhookEnvelope, WebhookObject};

use async_trait::async_trait;

use crate::error::Result;

/// Payment status of a checkout session as reported by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Pending,
    Paid,
    Expired,
}

/// A payment event (checkout session) fetched from the processor.
///
/// Always a fresh snapshot of canonical storage - never cached across the
/// webhook and sync reconciliation paths.
#[derive(Debug, Clone)]
pub struct CheckoutEvent {
    pub id: String,
    pub status: EventStatus,
    /// The payee: account id written into session metadata at creation time.
    /// The only trusted source for "who gets the credits" - never the
    /// requesting client.
    pub account_id: Option<String>,
    /// The idempotency flag, read from session metadata.
    pub fulfilled: bool,
}

/// A newly created checkout session.
#[derive(Debug, Clone)]
pub struct NewCheckout {
    pub session_id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create a processor-side customer for an account. Called at most once
    /// per account, lazily, from the first checkout.
    async fn create_customer(&self, email: &str, account_id: &str) -> Result<String>;

    /// Create a checkout session for one credit pack, stamping the payee
    /// account id into session metadata.
    async fn create_checkout_session(
        &self,
        account_id: &str,
        customer_ref: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<NewCheckout>;

    /// Fetch a session's current status and metadata.
    async fn fetch_event(&self, session_id: &str) -> Result<CheckoutEvent>;

    /// Write `fulfilled = true` into the session metadata.
    ///
    /// The metadata store offers no compare-and-swap, so a read-check
    /// followed by this write is not atomic; see `fulfillment` for the race
    /// analysis. A failure here must be treated as "flag not set".
    async fn mark_fulfilled(&self, session_id: &str) -> Result<()>;

    /// Verify a webhook payload signature. Nothing in the payload may be
    /// trusted before this returns `Ok(true)`.
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool>;
}
