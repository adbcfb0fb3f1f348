//! HTTP Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use reefer_billing::{BillingError, BillingEvent, CheckoutMode, SIGNATURE_HEADER};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
    pub store: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub email: String,
    pub mode: CheckoutMode,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.checkout.is_some() && state.webhooks.is_some(),
        store: state.reconciler.store_name(),
    })
}

/// Create a hosted Stripe checkout session
pub async fn create_checkout(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?;

    let checkout = state
        .checkout
        .as_ref()
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "Payments not configured"))?;

    let session = checkout
        .start(&payload.email, payload.mode)
        .await
        .map_err(|e| {
            let status = match &e {
                BillingError::Config(_) => StatusCode::BAD_REQUEST,
                e if e.is_retryable() => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            if status != StatusCode::BAD_REQUEST {
                tracing::error!(error = %e, "Checkout error");
            }
            api_error(status, e.user_message())
        })?;

    Ok(Json(CheckoutResponse { url: session.url }))
}

/// Stripe webhook handler.
///
/// Only a missing or invalid signature yields a non-2xx response; every
/// verified event is acknowledged whatever the store did with it.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(verifier) = state.webhooks.as_ref() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Payments not configured").into_response();
    };

    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return (StatusCode::BAD_REQUEST, "Missing signature").into_response();
    };

    let event = match verifier.verify(&body, signature) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Stripe webhook error");
            return (StatusCode::BAD_REQUEST, format!("Webhook Error: {e}")).into_response();
        }
    };

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Processing Stripe webhook");

    let outcome = state.reconciler.reconcile(BillingEvent::classify(&event)).await;
    tracing::debug!(event_id = %event.id, outcome = ?outcome, "Webhook reconciled");

    Json(WebhookAck { received: true }).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use hmac::{Hmac, Mac};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use sha2::Sha256;
    use tower::ServiceExt;

    use reefer_billing::{
        BillingError, CheckoutInitiator, CheckoutProvider, HostedSession, MemoryProfileStore,
        Plan, PlanAssignment, PriceTable, Profile, ProfileStore, Reconciler, SessionParams,
        WebhookVerifier,
    };

    use crate::router;
    use crate::state::AppState;

    const SECRET: &str = "whsec_test_secret";

    #[derive(Default)]
    struct FakeStripe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CheckoutProvider for FakeStripe {
        async fn create_subscription_session(
            &self,
            params: &SessionParams,
        ) -> reefer_billing::Result<HostedSession> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HostedSession {
                id: "cs_test_1".into(),
                url: format!("https://checkout.stripe.com/pay/{}", params.price_id),
            })
        }
    }

    struct DownStripe;

    #[async_trait]
    impl CheckoutProvider for DownStripe {
        async fn create_subscription_session(
            &self,
            _: &SessionParams,
        ) -> reefer_billing::Result<HostedSession> {
            Err(BillingError::Stripe("connection refused".into()))
        }
    }

    struct UnreachableStore;

    #[async_trait]
    impl ProfileStore for UnreachableStore {
        async fn apply_plan(&self, _: &str, _: PlanAssignment) -> reefer_billing::Result<usize> {
            Err(BillingError::Store("503: upstream unavailable".into()))
        }

        async fn link_customer(&self, _: &str, _: &str) -> reefer_billing::Result<usize> {
            Err(BillingError::Store("503: upstream unavailable".into()))
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }
    }

    struct Harness {
        state: AppState,
        stripe: Arc<FakeStripe>,
        store: Arc<MemoryProfileStore>,
    }

    fn harness(per_truck_price: Option<&str>) -> Harness {
        let prices = Arc::new(PriceTable::new(
            Some("price_base".into()),
            per_truck_price.map(String::from),
        ));
        let stripe = Arc::new(FakeStripe::default());
        let store = Arc::new(MemoryProfileStore::new());
        let state = AppState {
            checkout: Some(Arc::new(CheckoutInitiator::new(
                stripe.clone(),
                prices.clone(),
                "https://reefershield.app",
            ))),
            webhooks: Some(Arc::new(WebhookVerifier::new(
                SECRET,
                Duration::from_secs(300),
            ))),
            reconciler: Arc::new(Reconciler::new(store.clone(), prices)),
        };
        Harness {
            state,
            stripe,
            store,
        }
    }

    fn signature(payload: &str, secret: &str) -> String {
        let timestamp = unix_now();
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{payload}").as_bytes());
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn unix_now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    async fn post(state: AppState, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn post_checkout(state: AppState, body: Value) -> (StatusCode, Value) {
        let request = Request::post("/checkout")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, body) = post(state, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn post_webhook(
        state: AppState,
        payload: &str,
        signature: Option<String>,
    ) -> (StatusCode, Vec<u8>) {
        let mut request = Request::post("/webhook");
        if let Some(signature) = signature {
            request = request.header("stripe-signature", signature);
        }
        post(state, request.body(Body::from(payload.to_string())).unwrap()).await
    }

    fn subscription_event(event_type: &str, customer: &str, price: &str) -> String {
        json!({
            "id": "evt_sub",
            "type": event_type,
            "data": { "object": {
                "id": "sub_1",
                "object": "subscription",
                "customer": customer,
                "items": { "object": "list", "data": [ { "price": { "id": price } } ] }
            } }
        })
        .to_string()
    }

    fn checkout_event(email: &str, customer: &str) -> String {
        json!({
            "id": "evt_cs",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_1",
                "object": "checkout.session",
                "customer": customer,
                "customer_details": { "email": email }
            } }
        })
        .to_string()
    }

    #[tokio::test]
    async fn checkout_returns_hosted_url() {
        let h = harness(Some("price_truck"));
        let (status, body) =
            post_checkout(h.state, json!({ "email": "a@b.com", "mode": "per_truck" })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "url": "https://checkout.stripe.com/pay/price_truck" }));
        assert_eq!(h.stripe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn checkout_unconfigured_price_is_400_without_provider_call() {
        let h = harness(None);
        let (status, body) =
            post_checkout(h.state, json!({ "email": "a@b.com", "mode": "per_truck" })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Price not configured" }));
        assert_eq!(h.stripe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn checkout_rejects_unknown_mode() {
        let h = harness(Some("price_truck"));
        let (status, body) =
            post_checkout(h.state, json!({ "email": "a@b.com", "mode": "enterprise" })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert_eq!(h.stripe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn checkout_without_stripe_is_503() {
        let mut h = harness(Some("price_truck"));
        h.state.checkout = None;
        let (status, _) =
            post_checkout(h.state, json!({ "email": "a@b.com", "mode": "base" })).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn webhook_missing_signature_is_400() {
        let h = harness(Some("price_truck"));
        let payload = checkout_event("a@b.com", "cus_1");
        let (status, body) = post_webhook(h.state, &payload, None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Missing signature");
    }

    #[tokio::test]
    async fn webhook_bad_signature_mutates_nothing() {
        let h = harness(Some("price_truck"));
        h.store.insert(Profile::new("a@b.com")).await;

        let payload = checkout_event("a@b.com", "cus_1");
        let forged = signature(&payload, "whsec_attacker");
        let (status, body) = post_webhook(h.state, &payload, Some(forged)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(body).unwrap().starts_with("Webhook Error: "));
        assert_eq!(h.store.get_by_email("a@b.com").await.unwrap(), Profile::new("a@b.com"));
    }

    #[tokio::test]
    async fn webhook_checkout_then_subscription() {
        let h = harness(Some("price_truck"));
        h.store.insert(Profile::new("a@b.com")).await;

        let payload = checkout_event("a@b.com", "cus_1");
        let (status, body) =
            post_webhook(h.state.clone(), &payload, Some(signature(&payload, SECRET))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({ "received": true }));

        let payload = subscription_event("customer.subscription.created", "cus_1", "price_truck");
        let (status, _) =
            post_webhook(h.state.clone(), &payload, Some(signature(&payload, SECRET))).await;
        assert_eq!(status, StatusCode::OK);

        let profile = h.store.get_by_email("a@b.com").await.unwrap();
        assert_eq!(profile.stripe_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(profile.plan, Plan::PerTruck);
        assert_eq!(profile.max_trucks, 100);
    }

    #[tokio::test]
    async fn webhook_unmatched_customer_still_acknowledged() {
        let h = harness(Some("price_truck"));
        let payload = subscription_event("customer.subscription.updated", "cus_unknown", "price_base");
        let (status, body) =
            post_webhook(h.state, &payload, Some(signature(&payload, SECRET))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({ "received": true }));
    }

    #[tokio::test]
    async fn webhook_unhandled_event_acknowledged() {
        let h = harness(Some("price_truck"));
        let payload = json!({ "id": "evt_x", "type": "invoice.paid", "data": { "object": {} } })
            .to_string();
        let (status, _) = post_webhook(h.state, &payload, Some(signature(&payload, SECRET))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn checkout_provider_failure_is_502() {
        let mut h = harness(Some("price_truck"));
        let prices = Arc::new(PriceTable::new(Some("price_base".into()), None));
        h.state.checkout = Some(Arc::new(CheckoutInitiator::new(
            Arc::new(DownStripe),
            prices,
            "https://reefershield.app",
        )));
        let (status, body) =
            post_checkout(h.state, json!({ "email": "a@b.com", "mode": "base" })).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(
            body,
            json!({ "error": "Payment processing failed. Please try again." })
        );
    }

    #[tokio::test]
    async fn webhook_store_failure_still_acknowledged() {
        let mut h = harness(Some("price_truck"));
        let prices = Arc::new(PriceTable::new(
            Some("price_base".into()),
            Some("price_truck".into()),
        ));
        h.state.reconciler = Arc::new(Reconciler::new(Arc::new(UnreachableStore), prices));

        for payload in [
            subscription_event("customer.subscription.updated", "cus_1", "price_base"),
            checkout_event("a@b.com", "cus_1"),
        ] {
            let (status, body) =
                post_webhook(h.state.clone(), &payload, Some(signature(&payload, SECRET))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(
                serde_json::from_slice::<Value>(&body).unwrap(),
                json!({ "received": true })
            );
        }
    }

    #[tokio::test]
    async fn health_reports_store() {
        let h = harness(None);
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = post(h.state, request).await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "memory");
        assert_eq!(body["stripe_configured"], true);
    }
}
