//! In-memory ledger (for tests and development)

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use crate::error::{LedgerError, Result};
use crate::model::{GiftCode, PendingNotification, Purchase, Stats};
use crate::Ledger;

/// In-memory ledger. A single lock over all three maps so that
/// check-then-insert and read-then-flip are atomic sections.
pub struct MemoryLedger {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    purchases: HashMap<String, Purchase>,
    gift_codes: HashMap<String, GiftCode>,
    outbox: HashMap<String, PendingNotification>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Ledger for MemoryLedger {
    fn record_purchase(&self, purchase: &Purchase, gift: &GiftCode) -> Result<()> {
        let mut inner = self.inner.write().unwrap();

        if inner.purchases.contains_key(&purchase.order_id) {
            return Err(LedgerError::DuplicateOrder(purchase.order_id.clone()));
        }
        if inner.gift_codes.contains_key(&gift.code) {
            return Err(LedgerError::DuplicateCode(gift.code.clone()));
        }

        inner
            .outbox
            .insert(purchase.order_id.clone(), PendingNotification::for_purchase(purchase));
        inner
            .gift_codes
            .insert(gift.code.clone(), gift.clone());
        inner
            .purchases
            .insert(purchase.order_id.clone(), purchase.clone());

        Ok(())
    }

    fn purchase(&self, order_id: &str) -> Result<Option<Purchase>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.purchases.get(order_id).cloned())
    }

    fn gift_code(&self, code: &str) -> Result<Option<GiftCode>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.gift_codes.get(code).cloned())
    }

    fn redeem(&self, code: &str, redeemer_email: &str) -> Result<GiftCode> {
        let mut inner = self.inner.write().unwrap();

        let gift = inner
            .gift_codes
            .get_mut(code)
            .ok_or_else(|| LedgerError::NotFound(code.to_string()))?;

        if gift.redeemed {
            return Err(LedgerError::AlreadyRedeemed(code.to_string()));
        }

        gift.redeemed = true;
        gift.redeemed_by_email = Some(redeemer_email.to_string());
        gift.redeemed_at = Some(Utc::now());

        Ok(gift.clone())
    }

    fn stats(&self) -> Result<Stats> {
        let inner = self.inner.read().unwrap();
        Ok(inner.purchases.values().fold(Stats::default(), |mut acc, p| {
            acc.total_sales += 1;
            acc.total_revenue_cents += p.amount_cents;
            acc
        }))
    }

    fn pending_notifications(&self) -> Result<Vec<PendingNotification>> {
        let inner = self.inner.read().unwrap();
        let mut pending: Vec<PendingNotification> = inner.outbox.values().cloned().collect();
        pending.sort_by_key(|n| n.created_at);
        Ok(pending)
    }

    fn mark_notified(&self, order_id: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.outbox.remove(order_id);
        Ok(())
    }

    fn mark_notification_failed(&self, order_id: &str, error: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(entry) = inner.outbox.get_mut(order_id) {
            entry.attempts += 1;
            entry.last_error = Some(error.to_string());
        }
        Ok(())
    }
}
