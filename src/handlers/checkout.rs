use axum::extract::State;
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::extractors::{AuthedAccount, Json};

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
}

/// Start a credit-pack purchase for the authenticated account.
///
/// Lazily creates the processor-side customer on first checkout; after that
/// the stored ref is reused forever. The account id rides along as session
/// metadata - it is the trusted payee the reconciler will credit, regardless
/// of who later reports the payment.
pub async fn initiate_checkout(
    State(state): State<AppState>,
    AuthedAccount(account): AuthedAccount,
) -> Result<Json<CheckoutResponse>> {
    let customer_ref = match account.customer_ref {
        Some(ref existing) => existing.clone(),
        None => {
            let created = state
                .processor
                .create_customer(&account.email, &account.id)
                .await?;
            let conn = state.db.get()?;
            // Concurrent first checkouts converge on whichever ref landed
            // first; the processor-side duplicate customer is harmless.
            queries::set_customer_ref_once(&conn, &account.id, &created)?
        }
    };

    // The processor substitutes the real session id into the template, so
    // the redirected client can fire the eager sync call with it.
    let success_url = format!(
        "{}?session_id={{CHECKOUT_SESSION_ID}}",
        state.success_page_url
    );

    let checkout = state
        .processor
        .create_checkout_session(&account.id, &customer_ref, &success_url, &state.cancel_page_url)
        .await?;

    tracing::info!(
        "checkout session {} created for account {}",
        checkout.session_id,
        account.id
    );

    Ok(Json(CheckoutResponse {
        checkout_url: checkout.url,
        session_id: checkout.session_id,
    }))
}
