//! Ledger Records
//!
//! The durable records the store keeps: purchases, gift codes, the
//! notification outbox, and the recomputed stats aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kwp_core::ProductId;

/// A confirmed purchase. Created exactly once per paid session and
/// immutable afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Purchase {
    /// Stable order id derived from the gateway session
    pub order_id: String,

    /// Purchaser e-mail
    pub email: String,

    /// Product bought
    pub product: ProductId,

    /// Amount paid, in cents
    pub amount_cents: i64,

    /// Gift code minted for this purchase
    pub gift_code: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Purchase {
    pub fn new(
        order_id: impl Into<String>,
        email: impl Into<String>,
        product: ProductId,
        amount_cents: i64,
        gift_code: impl Into<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            email: email.into(),
            product,
            amount_cents,
            gift_code: gift_code.into(),
            created_at: Utc::now(),
        }
    }
}

/// A redeemable gift code. Written alongside its purchase; flips to
/// redeemed at most once and is never deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GiftCode {
    /// The code itself (`KWP-XXXXXX-YYYY`)
    pub code: String,

    /// E-mail of the purchaser who created it
    pub created_by_email: String,

    /// Whether the code has been redeemed
    pub redeemed: bool,

    /// Who redeemed it, once redeemed
    pub redeemed_by_email: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Redemption timestamp, once redeemed
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl GiftCode {
    pub fn new(code: impl Into<String>, created_by_email: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            created_by_email: created_by_email.into(),
            redeemed: false,
            redeemed_by_email: None,
            created_at: Utc::now(),
            redeemed_at: None,
        }
    }
}

/// Outbox record for an undelivered code e-mail. Created in the same
/// transaction as the purchase; removed when delivery succeeds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingNotification {
    pub order_id: String,
    pub email: String,
    pub product: ProductId,
    pub gift_code: String,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl PendingNotification {
    pub fn for_purchase(purchase: &Purchase) -> Self {
        Self {
            order_id: purchase.order_id.clone(),
            email: purchase.email.clone(),
            product: purchase.product,
            gift_code: purchase.gift_code.clone(),
            created_at: purchase.created_at,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Aggregate over all purchases. Always recomputed, never authoritative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_revenue_cents: i64,
    pub total_sales: u64,
}
