//! Stripe Checkout Integration
//!
//! Creates hosted subscription checkout sessions. Nothing is written
//! locally; profile changes arrive later through the webhook path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionSubscriptionData,
};

use crate::error::{BillingError, Result};
use crate::plan::{CheckoutMode, PriceTable};

/// Free trial granted on every new subscription
pub const TRIAL_PERIOD_DAYS: u32 = 14;

/// Parameters for a hosted subscription checkout
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionParams {
    pub price_id: String,
    pub customer_email: String,
    pub trial_period_days: u32,
    pub success_url: String,
    pub cancel_url: String,
}

/// A created checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostedSession {
    /// Stripe session ID
    pub id: String,

    /// URL to redirect the user to
    pub url: String,
}

/// Anything that can open a hosted checkout session
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_subscription_session(&self, params: &SessionParams) -> Result<HostedSession>;
}

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }
}

#[async_trait]
impl CheckoutProvider for StripeClient {
    async fn create_subscription_session(&self, params: &SessionParams) -> Result<HostedSession> {
        let mut request = CreateCheckoutSession::new();
        request.mode = Some(CheckoutSessionMode::Subscription);
        request.customer_email = Some(&params.customer_email);
        request.success_url = Some(&params.success_url);
        request.cancel_url = Some(&params.cancel_url);
        request.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(params.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);
        request.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
            trial_period_days: Some(params.trial_period_days),
            ..Default::default()
        });

        let session = StripeCheckoutSession::create(&self.client, request)
            .await
            .map_err(|e| BillingError::Stripe(e.to_string()))?;

        let url = session
            .url
            .ok_or_else(|| BillingError::Stripe("No checkout URL returned".into()))?;

        Ok(HostedSession {
            id: session.id.to_string(),
            url,
        })
    }
}

/// Resolves a checkout mode to its price and asks the provider for a session
pub struct CheckoutInitiator {
    provider: Arc<dyn CheckoutProvider>,
    prices: Arc<PriceTable>,
    site_url: String,
}

impl CheckoutInitiator {
    pub fn new(
        provider: Arc<dyn CheckoutProvider>,
        prices: Arc<PriceTable>,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            prices,
            site_url: site_url.into(),
        }
    }

    /// Start a subscription checkout for `email` on `mode`.
    ///
    /// Fails with [`BillingError::Config`] before any provider call when the
    /// mode has no configured price.
    pub async fn start(&self, email: &str, mode: CheckoutMode) -> Result<HostedSession> {
        let price_id = self
            .prices
            .price_for(mode)
            .ok_or_else(|| BillingError::Config("Price not configured".into()))?;

        let params = SessionParams {
            price_id: price_id.to_string(),
            customer_email: email.to_string(),
            trial_period_days: TRIAL_PERIOD_DAYS,
            success_url: format!(
                "{}/dashboard?session_id={{CHECKOUT_SESSION_ID}}",
                self.site_url
            ),
            cancel_url: format!("{}/?canceled=true", self.site_url),
        };

        let session = self.provider.create_subscription_session(&params).await?;

        tracing::info!(
            session_id = %session.id,
            email = %email,
            mode = ?mode,
            "Created checkout session"
        );

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<SessionParams>>,
    }

    #[async_trait]
    impl CheckoutProvider for RecordingProvider {
        async fn create_subscription_session(
            &self,
            params: &SessionParams,
        ) -> Result<HostedSession> {
            self.calls.lock().await.push(params.clone());
            Ok(HostedSession {
                id: "cs_test_1".into(),
                url: "https://checkout.stripe.com/c/pay/cs_test_1".into(),
            })
        }
    }

    fn initiator(provider: Arc<RecordingProvider>, prices: PriceTable) -> CheckoutInitiator {
        CheckoutInitiator::new(provider, Arc::new(prices), "https://reefershield.app")
    }

    #[tokio::test]
    async fn test_resolves_configured_price() {
        let provider = Arc::new(RecordingProvider::default());
        let prices = PriceTable::new(Some("price_base".into()), Some("price_truck".into()));
        let checkout = initiator(provider.clone(), prices);

        let session = checkout.start("a@b.com", CheckoutMode::PerTruck).await.unwrap();
        assert_eq!(session.url, "https://checkout.stripe.com/c/pay/cs_test_1");

        let calls = provider.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            SessionParams {
                price_id: "price_truck".into(),
                customer_email: "a@b.com".into(),
                trial_period_days: 14,
                success_url: "https://reefershield.app/dashboard?session_id={CHECKOUT_SESSION_ID}"
                    .into(),
                cancel_url: "https://reefershield.app/?canceled=true".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_unconfigured_price_never_calls_provider() {
        let provider = Arc::new(RecordingProvider::default());
        let checkout = initiator(provider.clone(), PriceTable::new(Some("price_base".into()), None));

        let err = checkout.start("a@b.com", CheckoutMode::PerTruck).await.unwrap_err();
        assert!(matches!(err, BillingError::Config(ref m) if m == "Price not configured"));
        assert!(provider.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_same_mode_same_price() {
        let provider = Arc::new(RecordingProvider::default());
        let prices = PriceTable::new(Some("price_base".into()), Some("price_truck".into()));
        let checkout = initiator(provider.clone(), prices);

        checkout.start("a@b.com", CheckoutMode::Base).await.unwrap();
        checkout.start("c@d.com", CheckoutMode::Base).await.unwrap();

        let calls = provider.calls.lock().await;
        assert!(calls.iter().all(|c| c.price_id == "price_base"));
    }
}
