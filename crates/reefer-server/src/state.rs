//! Application State

use std::sync::Arc;

use reefer_billing::{CheckoutInitiator, Reconciler, WebhookVerifier};

/// Shared application state, built once in `main`
#[derive(Clone)]
pub struct AppState {
    /// Checkout session initiator (None if Stripe is not configured)
    pub checkout: Option<Arc<CheckoutInitiator>>,

    /// Webhook signature verifier (None if no signing secret is set)
    pub webhooks: Option<Arc<WebhookVerifier>>,

    /// Applies verified events to the profile store
    pub reconciler: Arc<Reconciler>,
}
