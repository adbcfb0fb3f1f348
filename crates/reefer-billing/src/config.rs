//! Environment Configuration

use std::time::Duration;

use crate::plan::PriceTable;

const DEFAULT_SITE_URL: &str = "http://localhost:3000";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Billing configuration read from the process environment
#[derive(Clone, Debug, Default)]
pub struct BillingConfig {
    /// Stripe API secret key
    pub stripe_secret_key: Option<String>,

    /// Webhook signing secret (`whsec_...`)
    pub webhook_secret: Option<String>,

    /// Price id for the base plan
    pub price_id_base: Option<String>,

    /// Price id for the per-truck plan
    pub price_id_per_truck: Option<String>,

    /// Public site URL used for checkout redirects, without trailing slash
    pub site_url: String,

    /// Supabase project URL
    pub supabase_url: Option<String>,

    /// Supabase service role key
    pub supabase_service_key: Option<String>,

    /// Accepted clock skew for webhook timestamps
    pub webhook_tolerance: Duration,
}

impl BillingConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        let tolerance = var("WEBHOOK_TOLERANCE_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_WEBHOOK_TOLERANCE_SECS);

        Self {
            stripe_secret_key: var("STRIPE_SECRET_KEY"),
            webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            price_id_base: var("STRIPE_PRICE_ID_BASE")
                .or_else(|| var("NEXT_PUBLIC_STRIPE_PRICE_ID_BASE")),
            price_id_per_truck: var("STRIPE_PRICE_ID_PER_TRUCK")
                .or_else(|| var("NEXT_PUBLIC_STRIPE_PRICE_ID_PER_TRUCK")),
            site_url: normalize_site_url(
                var("SITE_URL").or_else(|| var("NEXT_PUBLIC_SITE_URL")),
            ),
            supabase_url: var("SUPABASE_URL").or_else(|| var("NEXT_PUBLIC_SUPABASE_URL")),
            supabase_service_key: var("SUPABASE_SERVICE_ROLE_KEY"),
            webhook_tolerance: Duration::from_secs(tolerance),
        }
    }

    /// Build the price table from the configured price ids
    pub fn price_table(&self) -> PriceTable {
        PriceTable::new(self.price_id_base.clone(), self.price_id_per_truck.clone())
    }
}

/// Non-empty environment variable
fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn normalize_site_url(url: Option<String>) -> String {
    url.as_deref()
        .unwrap_or(DEFAULT_SITE_URL)
        .trim_end_matches('/')
        .to_string()
}
