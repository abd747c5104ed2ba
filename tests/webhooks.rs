//! Event-driven path tests: signature verification and webhook dispatch.

mod common;

use axum::{body::Body, http::Request};
use tower::ServiceExt;

use common::*;

// ============ Signature verification (processor client) ============

fn test_verifier() -> StripeClient {
    StripeClient::new(&ProcessorConfig {
        secret_key: "sk_test_xxx".to_string(),
        webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
        pack_price_id: "price_test_pack".to_string(),
    })
}

#[test]
fn valid_signature_is_accepted() {
    let client = test_verifier();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let header = sign_webhook(payload, TEST_WEBHOOK_SECRET, now());

    let result = client
        .verify_webhook_signature(payload, &header)
        .expect("Verification should not error");
    assert!(result);
}

#[test]
fn wrong_secret_is_rejected() {
    let client = test_verifier();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let header = sign_webhook(payload, "wrong_secret", now());

    let result = client
        .verify_webhook_signature(payload, &header)
        .expect("Verification should not error");
    assert!(!result);
}

#[test]
fn modified_payload_is_rejected() {
    let client = test_verifier();
    let original = b"{\"type\":\"checkout.session.completed\"}";
    let modified = b"{\"type\":\"checkout.session.completed\",\"extra\":true}";
    let header = sign_webhook(original, TEST_WEBHOOK_SECRET, now());

    let result = client
        .verify_webhook_signature(modified, &header)
        .expect("Verification should not error");
    assert!(!result);
}

#[test]
fn stale_timestamp_is_rejected() {
    let client = test_verifier();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    // 10 minutes ago - beyond the 5-minute tolerance
    let header = sign_webhook(payload, TEST_WEBHOOK_SECRET, now() - 600);

    let result = client
        .verify_webhook_signature(payload, &header)
        .expect("Verification should not error");
    assert!(!result);
}

#[test]
fn malformed_header_is_an_error() {
    let client = test_verifier();
    let payload = b"{}";

    assert!(client.verify_webhook_signature(payload, "not-a-signature").is_err());
    assert!(client.verify_webhook_signature(payload, "t=abc,v1=def").is_err());
}

// ============ Webhook endpoint ============

async fn post_webhook(app: axum::Router, payload: Vec<u8>, header: &str) -> axum::http::Response<Body> {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/webhooks/processor")
            .header("stripe-signature", header)
            .body(Body::from(payload))
            .unwrap(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn completed_checkout_credits_the_payee() {
    let (state, processor) = create_test_state();
    let (account, _) = create_test_account(&state, "buyer@example.com");
    let session_id = processor.insert_paid_session(&account.id);

    let payload = checkout_completed_payload(&session_id);
    let header = sign_webhook(&payload, TEST_WEBHOOK_SECRET, now());

    let response = post_webhook(test_app(state.clone()), payload, &header).await;

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert_eq!(account_balance(&state, &account.id), 10);
    assert!(processor.session(&session_id).unwrap().fulfilled);
}

#[tokio::test]
async fn invalid_signature_is_unauthorized_and_credits_nothing() {
    let (state, processor) = create_test_state();
    let (account, _) = create_test_account(&state, "buyer@example.com");
    let session_id = processor.insert_paid_session(&account.id);

    let payload = checkout_completed_payload(&session_id);
    let header = sign_webhook(&payload, "wrong_secret", now());

    let response = post_webhook(test_app(state.clone()), payload, &header).await;

    assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
    assert_eq!(account_balance(&state, &account.id), 0);
}

#[tokio::test]
async fn missing_signature_header_is_bad_request() {
    let (state, processor) = create_test_state();
    let (account, _) = create_test_account(&state, "buyer@example.com");
    let session_id = processor.insert_paid_session(&account.id);

    let response = test_app(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/processor")
                .body(Body::from(checkout_completed_payload(&session_id)))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(account_balance(&state, &account.id), 0);
}

#[tokio::test]
async fn irrelevant_event_types_are_acknowledged() {
    let (state, _) = create_test_state();

    let payload = serde_json::json!({
        "type": "customer.created",
        "data": { "object": { "id": "cus_test_1" } }
    })
    .to_string()
    .into_bytes();
    let header = sign_webhook(&payload, TEST_WEBHOOK_SECRET, now());

    let response = post_webhook(test_app(state), payload, &header).await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
}

#[tokio::test]
async fn unpaid_session_is_acknowledged_without_credit() {
    let (state, processor) = create_test_state();
    let (account, _) = create_test_account(&state, "buyer@example.com");
    let session_id = processor.insert_session(EventStatus::Pending, Some(&account.id));

    let payload = checkout_completed_payload(&session_id);
    let header = sign_webhook(&payload, TEST_WEBHOOK_SECRET, now());

    let response = post_webhook(test_app(state.clone()), payload, &header).await;

    // Acknowledged so the processor does not redeliver, but no balance change.
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert_eq!(account_balance(&state, &account.id), 0);
}

#[tokio::test]
async fn unknown_session_is_acknowledged() {
    let (state, _) = create_test_state();

    let payload = checkout_completed_payload("cs_test_unknown");
    let header = sign_webhook(&payload, TEST_WEBHOOK_SECRET, now());

    let response = post_webhook(test_app(state), payload, &header).await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
}

#[tokio::test]
async fn redelivered_event_acknowledges_and_credits_once() {
    let (state, processor) = create_test_state();
    let (account, _) = create_test_account(&state, "buyer@example.com");
    let session_id = processor.insert_paid_session(&account.id);

    for _ in 0..3 {
        let payload = checkout_completed_payload(&session_id);
        let header = sign_webhook(&payload, TEST_WEBHOOK_SECRET, now());
        let response = post_webhook(test_app(state.clone()), payload, &header).await;
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    assert_eq!(account_balance(&state, &account.id), 10);
}

/// Transient failure during fulfillment must NOT be acknowledged - the
/// processor's redelivery is the retry mechanism.
#[tokio::test]
async fn transient_failure_returns_5xx_for_redelivery() {
    let (state, processor) = create_test_state();
    let (account, _) = create_test_account(&state, "buyer@example.com");
    let session_id = processor.insert_paid_session(&account.id);

    processor.set_fail_metadata_writes(true);
    let payload = checkout_completed_payload(&session_id);
    let header = sign_webhook(&payload, TEST_WEBHOOK_SECRET, now());
    let response = post_webhook(test_app(state.clone()), payload, &header).await;

    assert_eq!(response.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(account_balance(&state, &account.id), 0);

    // Redelivery after recovery succeeds.
    processor.set_fail_metadata_writes(false);
    let payload = checkout_completed_payload(&session_id);
    let header = sign_webhook(&payload, TEST_WEBHOOK_SECRET, now());
    let response = post_webhook(test_app(state.clone()), payload, &header).await;

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert_eq!(account_balance(&state, &account.id), 10);
}
