//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Payment gateway API error
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Payment not confirmed for the session; no side effects occurred
    #[error("Payment not confirmed: {0}")]
    VerificationFailed(String),

    /// Code generation kept colliding; entropy or configuration problem
    #[error("Gift code generation exhausted after {0} attempts")]
    CodeSpaceExhausted(u32),

    /// Ledger write failed; the purchase is NOT fulfilled and the
    /// gateway's redelivery must complete it later
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// Code e-mail delivery failed
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::Gateway(_)
                | PaymentError::Persistence(_)
                | PaymentError::Delivery(_)
        )
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Gateway(_) => "Payment processing failed. Please try again.",
            PaymentError::VerificationFailed(_) => "Payment has not been confirmed yet.",
            PaymentError::Persistence(_) | PaymentError::CodeSpaceExhausted(_) => {
                "Your payment went through but we could not finish setting up your order. Please retry in a moment."
            }
            PaymentError::Delivery(_) => "Your code could not be e-mailed yet; it will be retried.",
            PaymentError::Config(_) => "Service configuration error.",
            _ => "An error occurred processing your request.",
        }
    }
}

impl From<kwp_ledger::LedgerError> for PaymentError {
    fn from(err: kwp_ledger::LedgerError) -> Self {
        PaymentError::Persistence(err.to_string())
    }
}
