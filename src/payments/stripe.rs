use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{msg, AppError, Result};

use super::{CheckoutEvent, EventStatus, NewCheckout, PaymentProcessor};

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.stripe.com/v1";

/// Processor credentials plus the pre-configured price for the credit pack.
/// Using a dashboard price (price_xxx) instead of ad-hoc price_data keeps
/// purchases organized on the processor side.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub pack_price_id: String,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
    pack_price_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateCustomerResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    status: Option<String>,
    payment_status: String,
    metadata: Option<SessionMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionMetadata {
    account_id: Option<String>,
    fulfilled: Option<String>,
}

/// Webhook envelope - only the event type and the object id are taken from
/// the payload. Everything else is re-fetched from the API so reconciliation
/// always works from canonical state.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: WebhookObject,
}

#[derive(Debug, Deserialize)]
pub struct WebhookObject {
    pub id: String,
}

impl StripeClient {
    pub fn new(config: &ProcessorConfig) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            pack_price_id: config.pack_price_id.clone(),
        }
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    /// Stripe recommends 300 seconds (5 minutes).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::Processor(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Processor(error_text));
        }
        Ok(response)
    }

    fn map_status(session: &SessionResponse) -> EventStatus {
        if session.payment_status == "paid" {
            EventStatus::Paid
        } else if session.status.as_deref() == Some("expired") {
            EventStatus::Expired
        } else {
            EventStatus::Pending
        }
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_customer(&self, email: &str, account_id: &str) -> Result<String> {
        let response = self
            .post_form(
                &format!("{}/customers", API_BASE),
                &[("email", email), ("metadata[account_id]", account_id)],
            )
            .await?;

        let customer: CreateCustomerResponse = response
            .json()
            .await
            .map_err(|e| AppError::Processor(format!("failed to parse customer: {}", e)))?;
        Ok(customer.id)
    }

    async fn create_checkout_session(
        &self,
        account_id: &str,
        customer_ref: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<NewCheckout> {
        let response = self
            .post_form(
                &format!("{}/checkout/sessions", API_BASE),
                &[
                    ("mode", "payment"),
                    ("customer", customer_ref),
                    ("success_url", success_url),
                    ("cancel_url", cancel_url),
                    ("line_items[0][price]", &self.pack_price_id),
                    ("line_items[0][quantity]", "1"),
                    // The payee. Trusted precisely because it is set here,
                    // server-side, and never accepted from a client again.
                    ("metadata[account_id]", account_id),
                ],
            )
            .await?;

        let session: CreateSessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Processor(format!("failed to parse session: {}", e)))?;

        Ok(NewCheckout {
            session_id: session.id,
            url: session.url,
        })
    }

    async fn fetch_event(&self, session_id: &str) -> Result<CheckoutEvent> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{}", API_BASE, session_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| AppError::Processor(format!("request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(msg::SESSION_NOT_FOUND.to_string()));
        }
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Processor(error_text));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Processor(format!("failed to parse session: {}", e)))?;

        let status = Self::map_status(&session);
        let metadata = session.metadata.unwrap_or_default();
        Ok(CheckoutEvent {
            status,
            account_id: metadata.account_id,
            fulfilled: metadata.fulfilled.as_deref() == Some("true"),
            id: session.id,
        })
    }

    async fn mark_fulfilled(&self, session_id: &str) -> Result<()> {
        self.post_form(
            &format!("{}/checkout/sessions/{}", API_BASE, session_id),
            &[("metadata[fulfilled]", "true")],
        )
        .await?;
        Ok(())
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        // Signature header format: t=timestamp,v1=signature
        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in signature.split(',') {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str =
            timestamp.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;
        let sig_v1 =
            sig_v1.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;

        // Reject stale timestamps to prevent replay of captured payloads.
        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::BadRequest(msg::INVALID_TIMESTAMP_IN_SIGNATURE.into()))?;

        let age = chrono::Utc::now().timestamp() - timestamp;

        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }

        // Clock skew tolerance for future timestamps: 60 seconds
        if age < -60 {
            tracing::warn!("webhook rejected: timestamp in the future (age={}s)", age);
            return Ok(false);
        }

        let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();

        // Length is not secret (always 64 hex chars for SHA-256), so the
        // non-constant-time length check leaks nothing.
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        // Constant-time comparison; a byte-wise compare would let response
        // timing leak signature prefixes.
        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}
