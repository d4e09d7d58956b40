//! # kwp-ledger
//!
//! Durable mapping from order id to purchase and from code to gift
//! code, plus the notification outbox. All mutating operations are
//! atomic at record granularity: a purchase, its gift code, and its
//! outbox entry persist together or not at all, and a code flips to
//! redeemed exactly once even under concurrent attempts.
//!
//! Two implementations: [`MemoryLedger`] for tests and development,
//! [`RedbLedger`] backed by an embedded transactional store for
//! production.

mod durable;
mod error;
mod memory;
mod model;

pub use durable::RedbLedger;
pub use error::{LedgerError, Result};
pub use memory::MemoryLedger;
pub use model::{GiftCode, PendingNotification, Purchase, Stats};

/// Ledger storage trait
pub trait Ledger: Send + Sync {
    /// Atomically persist a purchase, its gift code, and a pending
    /// notification for it. Fails with [`LedgerError::DuplicateOrder`]
    /// if the order id exists (duplicate completion event) and
    /// [`LedgerError::DuplicateCode`] if the code exists (caller
    /// regenerates and retries).
    fn record_purchase(&self, purchase: &Purchase, gift: &GiftCode) -> Result<()>;

    /// Look up a purchase by order id
    fn purchase(&self, order_id: &str) -> Result<Option<Purchase>>;

    /// Look up a gift code
    fn gift_code(&self, code: &str) -> Result<Option<GiftCode>>;

    /// Atomically redeem a code: reads the redeemed flag and, if unset,
    /// sets it with the redeemer and timestamp. Fails with `NotFound`
    /// or `AlreadyRedeemed` without mutation otherwise. Returns the
    /// redeemed record.
    fn redeem(&self, code: &str, redeemer_email: &str) -> Result<GiftCode>;

    /// Recompute the stats aggregate over all purchases
    fn stats(&self) -> Result<Stats>;

    /// All undelivered notifications, oldest first
    fn pending_notifications(&self) -> Result<Vec<PendingNotification>>;

    /// Remove a delivered notification from the outbox. Idempotent.
    fn mark_notified(&self, order_id: &str) -> Result<()>;

    /// Record a failed delivery attempt against an outbox entry
    fn mark_notification_failed(&self, order_id: &str, error: &str) -> Result<()>;
}
