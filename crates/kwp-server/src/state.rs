//! Application State

use std::sync::Arc;

use kwp_ledger::Ledger;
use kwp_payments::{FulfillmentCoordinator, PaymentGateway};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Payment gateway (Stripe, or the mock in development)
    pub gateway: Arc<dyn PaymentGateway>,

    /// Purchase ledger
    pub ledger: Arc<dyn Ledger>,

    /// Fulfillment coordinator
    pub coordinator: Arc<FulfillmentCoordinator>,

    /// Whether a real payment gateway is configured
    pub stripe_configured: bool,
}
