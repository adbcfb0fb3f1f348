//! Plan Tiers and Price Table
//!
//! Maps Stripe price ids to plan tiers and truck entitlements.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Subscription plan tiers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    #[default]
    Free,
    Base,
    PerTruck,
}

impl Plan {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Base => "base",
            Self::PerTruck => "per_truck",
        }
    }

    /// Maximum number of trucks a profile on this plan may monitor
    pub const fn max_trucks(self) -> u32 {
        match self {
            Self::Free => 0,
            Self::Base => 5,
            Self::PerTruck => 100,
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two plans a customer can buy through checkout
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    Base,
    PerTruck,
}

impl CheckoutMode {
    pub const ALL: [Self; 2] = [Self::Base, Self::PerTruck];

    /// Plan tier granted once this mode is paid for
    pub const fn plan(self) -> Plan {
        match self {
            Self::Base => Plan::Base,
            Self::PerTruck => Plan::PerTruck,
        }
    }
}

/// Plan plus its entitlement. The only constructor derives `max_trucks`
/// from `plan`, so the pair written to a profile never disagrees.
///
/// ```compile_fail
/// use reefer_billing::{Plan, PlanAssignment};
///
/// let mismatched = PlanAssignment { plan: Plan::Free, max_trucks: 100 };
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PlanAssignment {
    plan: Plan,
    max_trucks: u32,
}

impl PlanAssignment {
    pub const fn for_plan(plan: Plan) -> Self {
        Self {
            plan,
            max_trucks: plan.max_trucks(),
        }
    }

    pub const fn plan(self) -> Plan {
        self.plan
    }

    pub const fn max_trucks(self) -> u32 {
        self.max_trucks
    }
}

/// Price id lookup, built once from configuration
#[derive(Clone, Debug, Default)]
pub struct PriceTable {
    by_mode: HashMap<CheckoutMode, String>,
    by_price: HashMap<String, Plan>,
}

impl PriceTable {
    /// Build from the configured price ids. Empty ids count as unconfigured;
    /// a price id shared by both modes resolves to the base plan.
    pub fn new(base: Option<String>, per_truck: Option<String>) -> Self {
        let mut table = Self::default();
        for (mode, price) in [(CheckoutMode::Base, base), (CheckoutMode::PerTruck, per_truck)] {
            let Some(price) = price.filter(|p| !p.trim().is_empty()) else {
                continue;
            };
            table.by_price.entry(price.clone()).or_insert(mode.plan());
            table.by_mode.insert(mode, price);
        }
        table
    }

    /// Price id configured for a checkout mode
    pub fn price_for(&self, mode: CheckoutMode) -> Option<&str> {
        self.by_mode.get(&mode).map(String::as_str)
    }

    /// Plan for a subscription's price id. Unknown or absent ids fall back to free.
    pub fn plan_for_price(&self, price_id: Option<&str>) -> Plan {
        price_id
            .and_then(|id| self.by_price.get(id))
            .copied()
            .unwrap_or_default()
    }

    pub fn configured_modes(&self) -> Vec<CheckoutMode> {
        CheckoutMode::ALL
            .into_iter()
            .filter(|m| self.by_mode.contains_key(m))
            .collect()
    }
}
