//! # reefer-billing
//!
//! Stripe billing for ReeferShield: hosted checkout for the paid plans and
//! webhook-driven reconciliation of the plan stored on each user profile.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐  /checkout  ┌─────────────────┐  webhook  ┌────────────┐  PATCH  ┌──────────┐
//! │ Browser  │────────────▶│ Stripe Checkout │──────────▶│ Reconciler │────────▶│ profiles │
//! └──────────┘             └─────────────────┘           └────────────┘         └──────────┘
//! ```
//!
//! `checkout.session.completed` links the Stripe customer to a profile by
//! email. Every later `customer.subscription.*` event is matched by that
//! customer id and rewrites `plan` / `max_trucks` from the price table.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use reefer_billing::{BillingConfig, CheckoutInitiator, CheckoutMode, StripeClient};
//!
//! let config = BillingConfig::from_env();
//! let prices = Arc::new(config.price_table());
//! let stripe = Arc::new(StripeClient::new("sk_test_xxx"));
//! let checkout = CheckoutInitiator::new(stripe, prices, config.site_url.clone());
//!
//! let session = checkout.start("dispatch@fleet.example", CheckoutMode::Base).await?;
//! // Redirect user to: session.url
//! ```

mod checkout;
mod config;
mod error;
mod plan;
mod profile;
mod reconcile;
mod webhook;

pub use checkout::{
    CheckoutInitiator, CheckoutProvider, HostedSession, SessionParams, StripeClient,
    TRIAL_PERIOD_DAYS,
};
pub use config::BillingConfig;
pub use error::{BillingError, Result};
pub use plan::{CheckoutMode, Plan, PlanAssignment, PriceTable};
pub use profile::{MemoryProfileStore, Profile, ProfileStore, SupabaseProfileStore};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use webhook::{
    BillingEvent, EventData, SIGNATURE_HEADER, StripeEvent, SubscriptionChange, WebhookVerifier,
};
