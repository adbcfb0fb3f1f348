//! Subscription Reconciliation
//!
//! Turns a verified webhook event into at most one profile update. Store
//! failures are logged and reported in the outcome but never returned as
//! errors: Stripe redelivers anything not acknowledged with a 2xx.

use std::sync::Arc;

use crate::plan::{PlanAssignment, PriceTable};
use crate::profile::ProfileStore;
use crate::webhook::BillingEvent;

/// What reconciling one event did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Plan written to profiles matching the customer id
    PlanApplied {
        customer_id: String,
        assignment: PlanAssignment,
        rows: usize,
    },

    /// Customer id recorded on profiles matching the email
    CustomerLinked {
        customer_id: String,
        email: String,
        rows: usize,
    },

    /// Nothing to write (e.g. checkout without an email)
    Skipped { reason: &'static str },

    /// The profile store rejected the update
    StoreFailed { reason: String },

    /// Event type we do not handle
    Ignored { event_type: String },
}

/// Applies billing events to the profile store
pub struct Reconciler {
    store: Arc<dyn ProfileStore>,
    prices: Arc<PriceTable>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ProfileStore>, prices: Arc<PriceTable>) -> Self {
        Self { store, prices }
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Reconcile one event. Never fails.
    pub async fn reconcile(&self, event: BillingEvent) -> ReconcileOutcome {
        match event {
            BillingEvent::SubscriptionChanged {
                change,
                customer_id,
                price_id,
            } => {
                // Deleted subscriptions take the same path as created/updated
                let plan = self.prices.plan_for_price(price_id.as_deref());
                let assignment = PlanAssignment::for_plan(plan);

                match self.store.apply_plan(&customer_id, assignment).await {
                    Ok(rows) => {
                        if rows == 0 {
                            tracing::debug!(
                                customer_id = %customer_id,
                                "No profile linked to customer yet"
                            );
                        }
                        tracing::info!(
                            customer_id = %customer_id,
                            change = ?change,
                            plan = %plan,
                            max_trucks = assignment.max_trucks(),
                            rows,
                            "Applied subscription plan"
                        );
                        ReconcileOutcome::PlanApplied {
                            customer_id,
                            assignment,
                            rows,
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            customer_id = %customer_id,
                            error = %e,
                            "Failed to apply subscription plan"
                        );
                        ReconcileOutcome::StoreFailed {
                            reason: e.to_string(),
                        }
                    }
                }
            }

            BillingEvent::CheckoutCompleted { customer_id, email } => {
                let Some(email) = email.filter(|e| !e.trim().is_empty()) else {
                    return ReconcileOutcome::Skipped {
                        reason: "checkout session has no customer email",
                    };
                };
                let Some(customer_id) = customer_id else {
                    tracing::warn!(email = %email, "Checkout completed without a customer");
                    return ReconcileOutcome::Skipped {
                        reason: "checkout session has no customer",
                    };
                };

                match self.store.link_customer(&email, &customer_id).await {
                    Ok(rows) => {
                        tracing::info!(
                            customer_id = %customer_id,
                            email = %email,
                            rows,
                            "Linked Stripe customer to profile"
                        );
                        ReconcileOutcome::CustomerLinked {
                            customer_id,
                            email,
                            rows,
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            email = %email,
                            error = %e,
                            "Error linking Stripe customer to profile"
                        );
                        ReconcileOutcome::StoreFailed {
                            reason: e.to_string(),
                        }
                    }
                }
            }

            BillingEvent::Ignored { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                ReconcileOutcome::Ignored { event_type }
            }
        }
    }
}
