//! Profile Store
//!
//! The profile table lives in Supabase; this crate only ever updates the
//! billing columns (`plan`, `max_trucks`, `stripe_customer_id`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{BillingError, Result};
use crate::plan::{Plan, PlanAssignment};

/// Billing view of a user profile row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub email: String,
    pub plan: Plan,
    pub max_trucks: u32,
    pub stripe_customer_id: Option<String>,
}

impl Profile {
    /// A fresh free-tier profile with no Stripe linkage
    pub fn new(email: impl Into<String>) -> Self {
        let assignment = PlanAssignment::for_plan(Plan::Free);
        Self {
            email: email.into(),
            plan: assignment.plan(),
            max_trucks: assignment.max_trucks(),
            stripe_customer_id: None,
        }
    }
}

/// Profile storage trait. Both operations return the number of rows updated;
/// zero is not an error.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Set plan, entitlement and customer id on rows with this customer id
    async fn apply_plan(&self, customer_id: &str, assignment: PlanAssignment) -> Result<usize>;

    /// Record the customer id on rows with this email
    async fn link_customer(&self, email: &str, customer_id: &str) -> Result<usize>;

    /// Short name for logs and health output
    fn name(&self) -> &'static str;
}

/// In-memory profile store (for development and tests)
#[derive(Default)]
pub struct MemoryProfileStore {
    rows: RwLock<Vec<Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, profile: Profile) {
        self.rows.write().await.push(profile);
    }

    pub async fn get_by_email(&self, email: &str) -> Option<Profile> {
        self.rows
            .read()
            .await
            .iter()
            .find(|p| p.email == email)
            .cloned()
    }

    pub async fn get_by_customer(&self, customer_id: &str) -> Option<Profile> {
        self.rows
            .read()
            .await
            .iter()
            .find(|p| p.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn apply_plan(&self, customer_id: &str, assignment: PlanAssignment) -> Result<usize> {
        let mut rows = self.rows.write().await;
        let mut updated = 0;
        for profile in rows
            .iter_mut()
            .filter(|p| p.stripe_customer_id.as_deref() == Some(customer_id))
        {
            profile.plan = assignment.plan();
            profile.max_trucks = assignment.max_trucks();
            profile.stripe_customer_id = Some(customer_id.to_string());
            updated += 1;
        }
        Ok(updated)
    }

    async fn link_customer(&self, email: &str, customer_id: &str) -> Result<usize> {
        let mut rows = self.rows.write().await;
        let mut updated = 0;
        for profile in rows.iter_mut().filter(|p| p.email == email) {
            profile.stripe_customer_id = Some(customer_id.to_string());
            updated += 1;
        }
        Ok(updated)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[derive(Serialize)]
struct PlanUpdate<'a> {
    plan: Plan,
    max_trucks: u32,
    stripe_customer_id: &'a str,
}

#[derive(Serialize)]
struct CustomerLink<'a> {
    stripe_customer_id: &'a str,
}

/// Supabase `profiles` table via PostgREST, authenticated with the service role key
pub struct SupabaseProfileStore {
    http: reqwest::Client,
    endpoint: String,
    service_key: String,
}

impl SupabaseProfileStore {
    pub fn new(project_url: &str, service_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/rest/v1/profiles", project_url.trim_end_matches('/')),
            service_key: service_key.into(),
        }
    }

    /// `PATCH` rows where `column = value`, returning how many matched
    async fn update_where<T: Serialize + Sync>(
        &self,
        column: &str,
        value: &str,
        body: &T,
    ) -> Result<usize> {
        let response = self
            .http
            .patch(&self.endpoint)
            .query(&[(column, format!("eq.{value}")), ("select", "id".to_string())])
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BillingError::Store(format!("{status}: {detail}")));
        }

        let rows: Vec<serde_json::Value> = response.json().await?;
        Ok(rows.len())
    }
}

#[async_trait]
impl ProfileStore for SupabaseProfileStore {
    async fn apply_plan(&self, customer_id: &str, assignment: PlanAssignment) -> Result<usize> {
        let body = PlanUpdate {
            plan: assignment.plan(),
            max_trucks: assignment.max_trucks(),
            stripe_customer_id: customer_id,
        };
        self.update_where("stripe_customer_id", customer_id, &body)
            .await
    }

    async fn link_customer(&self, email: &str, customer_id: &str) -> Result<usize> {
        let body = CustomerLink {
            stripe_customer_id: customer_id,
        };
        self.update_where("email", email, &body).await
    }

    fn name(&self) -> &'static str {
        "supabase"
    }
}
