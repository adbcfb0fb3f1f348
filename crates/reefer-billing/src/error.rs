//! Billing Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, BillingError>;

/// Billing-related errors
#[derive(Error, Debug)]
pub enum BillingError {
    /// Required configuration value absent (e.g. a price id for a plan mode)
    #[error("{0}")]
    Config(String),

    /// Webhook signature verification failed
    #[error("{0}")]
    Signature(String),

    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Profile store rejected or failed the update
    #[error("Store error: {0}")]
    Store(String),

    /// Verified event carried an object we could not decode
    #[error("Webhook parse error: {0}")]
    Parse(String),
}

impl BillingError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Stripe(_) | Self::Store(_))
    }

    /// Get client-facing message
    pub fn user_message(&self) -> &str {
        match self {
            Self::Config(msg) | Self::Signature(msg) => msg,
            Self::Stripe(_) => "Payment processing failed. Please try again.",
            _ => "An error occurred processing your request.",
        }
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        Self::Store(err.to_string())
    }
}
