//! Payment Gateway Integration
//!
//! Abstraction over the hosted-checkout provider, plus the Stripe
//! implementation and an in-memory mock.

mod mock;
mod stripe;

pub use mock::MockGateway;
pub use self::stripe::StripeGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kwp_core::ProductId;

use crate::error::Result;

/// A hosted checkout session the customer is redirected to
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostedSession {
    /// Gateway session id
    pub session_id: String,

    /// URL to redirect the customer to
    pub url: String,
}

/// Payment state of a checkout session
#[derive(Clone, Debug)]
pub struct SessionStatus {
    /// Gateway session id
    pub session_id: String,

    /// Whether the session's payment is complete
    pub paid: bool,

    /// Customer e-mail attached to the session
    pub customer_email: String,

    /// Product the session was created for
    pub product: ProductId,

    /// Amount charged, in cents
    pub amount_cents: i64,
}

/// A verified webhook event
#[derive(Clone, Debug)]
pub enum GatewayEvent {
    /// Checkout completed: proof of payment for the session
    CheckoutCompleted { session_id: String },

    /// Authentic but irrelevant event type
    Ignored { event_type: String },
}

/// Payment gateway trait (Strategy pattern)
///
/// Implement this per provider. `verify_webhook` must reject a bad
/// signature before the caller touches any state.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session for a product
    async fn create_session(
        &self,
        customer_email: &str,
        product: ProductId,
    ) -> Result<HostedSession>;

    /// Query the payment state of a session
    async fn session_status(&self, session_id: &str) -> Result<SessionStatus>;

    /// Verify a webhook payload against the shared secret and parse it
    fn verify_webhook(&self, payload: &str, signature: &str) -> Result<GatewayEvent>;

    /// Gateway name
    fn name(&self) -> &str;
}
