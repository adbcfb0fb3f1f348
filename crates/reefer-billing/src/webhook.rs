//! Stripe Webhook Handling
//!
//! Verifies `Stripe-Signature` headers against the raw request body and
//! classifies the events the reconciler cares about.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

use crate::error::{BillingError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Event envelope as delivered by Stripe
#[derive(Clone, Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    pub data: EventData,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// Verifies webhook payloads with the endpoint's signing secret
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    /// Verify `header` against the raw `payload` and parse the event.
    ///
    /// The payload must be the exact bytes received; a re-serialized body
    /// will not match the signature.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<StripeEvent> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<StripeEvent> {
        let header = SignatureHeader::parse(header)?;

        let age = now.abs_diff(header.timestamp);
        if age > self.tolerance.as_secs() {
            return Err(BillingError::Signature(
                "Timestamp outside the tolerance zone".into(),
            ));
        }

        let mac = self.mac(header.timestamp, payload)?;
        let matched = header.signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .is_ok_and(|expected| mac.clone().verify_slice(&expected).is_ok())
        });
        if !matched {
            return Err(BillingError::Signature(
                "No signatures found matching the expected signature for payload".into(),
            ));
        }

        serde_json::from_slice(payload)
            .map_err(|e| BillingError::Signature(format!("Invalid event payload: {e}")))
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| BillingError::Signature(e.to_string()))?;
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        Ok(mac)
    }
}

/// Parsed `t=...,v1=...` header
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

impl SignatureHeader {
    fn parse(header: &str) -> Result<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = value.parse::<i64>().ok(),
                "v1" => signatures.push(value.to_string()),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            BillingError::Signature("Unable to extract timestamp and signatures from header".into())
        })?;
        if signatures.is_empty() {
            return Err(BillingError::Signature(
                "No signatures found with expected scheme".into(),
            ));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Which subscription lifecycle event was received
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionChange {
    Created,
    Updated,
    Deleted,
}

/// Classified webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BillingEvent {
    /// Subscription created, updated or deleted
    SubscriptionChanged {
        change: SubscriptionChange,
        customer_id: String,
        price_id: Option<String>,
    },

    /// Checkout finished; links the customer to a profile by email
    CheckoutCompleted {
        customer_id: Option<String>,
        email: Option<String>,
    },

    /// Event type we do not act on
    Ignored { event_type: String },
}

impl BillingEvent {
    /// Classify a verified event.
    ///
    /// Objects that fail to decode become [`BillingEvent::Ignored`] so the
    /// delivery is still acknowledged.
    pub fn classify(event: &StripeEvent) -> Self {
        let change = match event.event_type.as_str() {
            "customer.subscription.created" => Some(SubscriptionChange::Created),
            "customer.subscription.updated" => Some(SubscriptionChange::Updated),
            "customer.subscription.deleted" => Some(SubscriptionChange::Deleted),
            _ => None,
        };

        let parsed = match (change, event.event_type.as_str()) {
            (Some(change), _) => Self::subscription(change, &event.data.object),
            (None, "checkout.session.completed") => Self::checkout(&event.data.object),
            _ => {
                return Self::Ignored {
                    event_type: event.event_type.clone(),
                };
            }
        };

        parsed.unwrap_or_else(|e| {
            tracing::warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "Ignoring undecodable webhook object"
            );
            Self::Ignored {
                event_type: event.event_type.clone(),
            }
        })
    }

    fn subscription(change: SubscriptionChange, object: &serde_json::Value) -> Result<Self> {
        let sub = SubscriptionObject::deserialize(object)
            .map_err(|e| BillingError::Parse(format!("Invalid subscription data: {e}")))?;

        let price_id = sub
            .items
            .data
            .into_iter()
            .next()
            .and_then(|item| item.price)
            .map(|price| price.id);

        Ok(Self::SubscriptionChanged {
            change,
            customer_id: sub.customer.into_id(),
            price_id,
        })
    }

    fn checkout(object: &serde_json::Value) -> Result<Self> {
        let session = CheckoutSessionObject::deserialize(object)
            .map_err(|e| BillingError::Parse(format!("Invalid checkout session data: {e}")))?;

        let email = session
            .customer_details
            .and_then(|d| d.email)
            .or(session.customer_email);

        Ok(Self::CheckoutCompleted {
            customer_id: session.customer.map(Expandable::into_id),
            email,
        })
    }
}

/// A Stripe reference that may arrive as an id or an expanded object
#[derive(Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    fn into_id(self) -> String {
        match self {
            Self::Id(id) | Self::Object { id } => id,
        }
    }
}

#[derive(Deserialize)]
struct SubscriptionObject {
    customer: Expandable,
    #[serde(default)]
    items: ItemList,
}

#[derive(Default, Deserialize)]
struct ItemList {
    #[serde(default)]
    data: Vec<SubscriptionItem>,
}

#[derive(Deserialize)]
struct SubscriptionItem {
    price: Option<PriceRef>,
}

#[derive(Deserialize)]
struct PriceRef {
    id: String,
}

#[derive(Deserialize)]
struct CheckoutSessionObject {
    customer: Option<Expandable>,
    customer_email: Option<String>,
    customer_details: Option<CustomerDetails>,
}

#[derive(Deserialize)]
struct CustomerDetails {
    email: Option<String>,
}
