//! ReeferShield billing server
//!
//! Axum server exposing Stripe checkout creation and the Stripe webhook
//! that keeps each profile's plan and truck entitlement in sync.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reefer_billing::{
    BillingConfig, CheckoutInitiator, MemoryProfileStore, ProfileStore, Reconciler,
    StripeClient, SupabaseProfileStore, WebhookVerifier,
};

use crate::handlers::{create_checkout, health_check, stripe_webhook};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BillingConfig::from_env();
    let state = build_state(&config);

    let app = router(state);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("ReeferShield billing server running on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health   - Health check");
    tracing::info!("  POST /checkout - Create Stripe checkout session");
    tracing::info!("  POST /webhook  - Stripe webhook");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Construct collaborators once and wire them into the shared state
fn build_state(config: &BillingConfig) -> AppState {
    let prices = Arc::new(config.price_table());
    let configured = prices.configured_modes();
    if configured.len() < 2 {
        tracing::warn!(
            configured = ?configured,
            "Not every plan has a Stripe price id; checkout for the rest will fail"
        );
    }

    let checkout = config.stripe_secret_key.as_deref().map(|key| {
        Arc::new(CheckoutInitiator::new(
            Arc::new(StripeClient::new(key)),
            prices.clone(),
            config.site_url.clone(),
        ))
    });
    let webhooks = config
        .webhook_secret
        .as_deref()
        .map(|secret| Arc::new(WebhookVerifier::new(secret, config.webhook_tolerance)));

    if checkout.is_some() && webhooks.is_some() {
        tracing::info!("Stripe configured");
    } else {
        tracing::warn!("Stripe not fully configured - payments disabled");
        tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
    }

    let store: Arc<dyn ProfileStore> =
        match (&config.supabase_url, &config.supabase_service_key) {
            (Some(url), Some(key)) => Arc::new(SupabaseProfileStore::new(url, key.clone())),
            _ => {
                tracing::warn!("Supabase not configured - using in-memory profile store");
                Arc::new(MemoryProfileStore::new())
            }
        };

    AppState {
        checkout,
        webhooks,
        reconciler: Arc::new(Reconciler::new(store, prices)),
    }
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/checkout", post(create_checkout))
        .route("/webhook", post(stripe_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
