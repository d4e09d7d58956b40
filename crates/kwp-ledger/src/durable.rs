//! redb-backed durable ledger
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `purchases` | `order_id` | `Purchase` | Confirmed purchases (append-only) |
//! | `gift_codes` | `code` | `GiftCode` | Codes + redemption state |
//! | `notification_outbox` | `order_id` | `PendingNotification` | Undelivered code e-mails |
//!
//! # Durability
//!
//! redb commits with `Durability::Immediate`: once `commit()` returns the
//! records survive power loss, and the file is always in a consistent
//! state (copy-on-write with atomic pointer swap). Write transactions
//! are single-writer, which serializes every check-then-insert and
//! read-then-flip in this module. That is the per-key linearization
//! the fulfillment and redemption paths depend on.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::{LedgerError, Result};
use crate::model::{GiftCode, PendingNotification, Purchase, Stats};
use crate::Ledger;

/// Table for purchases: key = order_id, value = JSON-serialized Purchase
const PURCHASES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("purchases");

/// Table for gift codes: key = code, value = JSON-serialized GiftCode
const GIFT_CODES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("gift_codes");

/// Table for the outbox: key = order_id, value = JSON-serialized PendingNotification
const OUTBOX_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("notification_outbox");

/// Purchase ledger backed by redb
#[derive(Clone)]
pub struct RedbLedger {
    db: Arc<Database>,
}

impl RedbLedger {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let db =
            Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        // Create tables up front so reads never race table creation
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PURCHASES_TABLE)?;
            let _ = write_txn.open_table(GIFT_CODES_TABLE)?;
            let _ = write_txn.open_table(OUTBOX_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Ledger for RedbLedger {
    fn record_purchase(&self, purchase: &Purchase, gift: &GiftCode) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut purchases = txn.open_table(PURCHASES_TABLE)?;
            if purchases.get(purchase.order_id.as_str())?.is_some() {
                // Dropping the uncommitted transaction aborts it
                return Err(LedgerError::DuplicateOrder(purchase.order_id.clone()));
            }

            let mut codes = txn.open_table(GIFT_CODES_TABLE)?;
            if codes.get(gift.code.as_str())?.is_some() {
                return Err(LedgerError::DuplicateCode(gift.code.clone()));
            }

            let value = serde_json::to_vec(purchase)?;
            purchases.insert(purchase.order_id.as_str(), value.as_slice())?;

            let value = serde_json::to_vec(gift)?;
            codes.insert(gift.code.as_str(), value.as_slice())?;

            let mut outbox = txn.open_table(OUTBOX_TABLE)?;
            let pending = PendingNotification::for_purchase(purchase);
            let value = serde_json::to_vec(&pending)?;
            outbox.insert(purchase.order_id.as_str(), value.as_slice())?;
        }
        txn.commit()?;

        tracing::debug!(order_id = %purchase.order_id, "Purchase recorded");
        Ok(())
    }

    fn purchase(&self, order_id: &str) -> Result<Option<Purchase>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PURCHASES_TABLE)?;

        match table.get(order_id)? {
            Some(value) => {
                let purchase: Purchase = serde_json::from_slice(value.value())?;
                Ok(Some(purchase))
            }
            None => Ok(None),
        }
    }

    fn gift_code(&self, code: &str) -> Result<Option<GiftCode>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(GIFT_CODES_TABLE)?;

        match table.get(code)? {
            Some(value) => {
                let gift: GiftCode = serde_json::from_slice(value.value())?;
                Ok(Some(gift))
            }
            None => Ok(None),
        }
    }

    fn redeem(&self, code: &str, redeemer_email: &str) -> Result<GiftCode> {
        let txn = self.db.begin_write()?;
        let redeemed = {
            let mut codes = txn.open_table(GIFT_CODES_TABLE)?;

            // Read and clone first to avoid borrow conflict with insert
            let gift_opt = match codes.get(code)? {
                Some(value) => Some(serde_json::from_slice::<GiftCode>(value.value())?),
                None => None,
            };

            let mut gift = gift_opt.ok_or_else(|| LedgerError::NotFound(code.to_string()))?;
            if gift.redeemed {
                return Err(LedgerError::AlreadyRedeemed(code.to_string()));
            }

            gift.redeemed = true;
            gift.redeemed_by_email = Some(redeemer_email.to_string());
            gift.redeemed_at = Some(Utc::now());

            let value = serde_json::to_vec(&gift)?;
            codes.insert(code, value.as_slice())?;
            gift
        };
        txn.commit()?;

        tracing::debug!(code = %code, "Gift code redeemed");
        Ok(redeemed)
    }

    fn stats(&self) -> Result<Stats> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PURCHASES_TABLE)?;

        let mut stats = Stats::default();
        for result in table.iter()? {
            let (_key, value) = result?;
            let purchase: Purchase = serde_json::from_slice(value.value())?;
            stats.total_sales += 1;
            stats.total_revenue_cents += purchase.amount_cents;
        }
        Ok(stats)
    }

    fn pending_notifications(&self) -> Result<Vec<PendingNotification>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OUTBOX_TABLE)?;

        let mut pending = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let entry: PendingNotification = serde_json::from_slice(value.value())?;
            pending.push(entry);
        }
        pending.sort_by_key(|n| n.created_at);
        Ok(pending)
    }

    fn mark_notified(&self, order_id: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(OUTBOX_TABLE)?;
            table.remove(order_id)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn mark_notification_failed(&self, order_id: &str, error: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(OUTBOX_TABLE)?;

            let entry_opt = match table.get(order_id)? {
                Some(value) => {
                    Some(serde_json::from_slice::<PendingNotification>(value.value())?)
                }
                None => None,
            };

            if let Some(mut entry) = entry_opt {
                entry.attempts += 1;
                entry.last_error = Some(error.to_string());
                let value = serde_json::to_vec(&entry)?;
                table.insert(order_id, value.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwp_core::ProductId;

    fn sample_purchase(order_id: &str, code: &str) -> (Purchase, GiftCode) {
        let purchase = Purchase::new(
            order_id,
            "a@x.com",
            ProductId::RecoveryRoadmap,
            1499,
            code,
        );
        let gift = GiftCode::new(code, "a@x.com");
        (purchase, gift)
    }

    #[test]
    fn test_record_is_atomic_across_tables() {
        let ledger = RedbLedger::open_in_memory().unwrap();
        let (purchase, gift) = sample_purchase("KWP-ORD-1", "KWP-AAAAAA-0001");

        ledger.record_purchase(&purchase, &gift).unwrap();

        assert!(ledger.purchase("KWP-ORD-1").unwrap().is_some());
        assert!(ledger.gift_code("KWP-AAAAAA-0001").unwrap().is_some());
        assert_eq!(ledger.pending_notifications().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_order_aborts_whole_write() {
        let ledger = RedbLedger::open_in_memory().unwrap();
        let (purchase, gift) = sample_purchase("KWP-ORD-1", "KWP-AAAAAA-0001");
        ledger.record_purchase(&purchase, &gift).unwrap();

        let (replay, other_gift) = sample_purchase("KWP-ORD-1", "KWP-BBBBBB-0002");
        let err = ledger.record_purchase(&replay, &other_gift).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateOrder(_)));

        // The aborted transaction must not have written the new code
        assert!(ledger.gift_code("KWP-BBBBBB-0002").unwrap().is_none());
        assert_eq!(ledger.stats().unwrap().total_sales, 1);
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let ledger = RedbLedger::open_in_memory().unwrap();
        let (purchase, gift) = sample_purchase("KWP-ORD-1", "KWP-AAAAAA-0001");
        ledger.record_purchase(&purchase, &gift).unwrap();

        let (other, same_code) = sample_purchase("KWP-ORD-2", "KWP-AAAAAA-0001");
        let err = ledger.record_purchase(&other, &same_code).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateCode(_)));
        assert!(ledger.purchase("KWP-ORD-2").unwrap().is_none());
    }

    #[test]
    fn test_redeem_flow() {
        let ledger = RedbLedger::open_in_memory().unwrap();
        let (purchase, gift) = sample_purchase("KWP-ORD-1", "KWP-AAAAAA-0001");
        ledger.record_purchase(&purchase, &gift).unwrap();

        let redeemed = ledger.redeem("KWP-AAAAAA-0001", "b@y.com").unwrap();
        assert!(redeemed.redeemed);
        assert_eq!(redeemed.redeemed_by_email.as_deref(), Some("b@y.com"));

        let err = ledger.redeem("KWP-AAAAAA-0001", "c@z.com").unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyRedeemed(_)));

        let stored = ledger.gift_code("KWP-AAAAAA-0001").unwrap().unwrap();
        assert_eq!(stored.redeemed_by_email.as_deref(), Some("b@y.com"));

        let err = ledger.redeem("KWP-FFFFFF-0000", "b@y.com").unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn test_stats_recompute() {
        let ledger = RedbLedger::open_in_memory().unwrap();
        assert_eq!(ledger.stats().unwrap(), Stats::default());

        let (p1, g1) = sample_purchase("KWP-ORD-1", "KWP-AAAAAA-0001");
        ledger.record_purchase(&p1, &g1).unwrap();
        let p2 = Purchase::new(
            "KWP-ORD-2",
            "b@y.com",
            ProductId::AgencyOnetime,
            49900,
            "KWP-BBBBBB-0002",
        );
        let g2 = GiftCode::new("KWP-BBBBBB-0002", "b@y.com");
        ledger.record_purchase(&p2, &g2).unwrap();

        let stats = ledger.stats().unwrap();
        assert_eq!(stats.total_sales, 2);
        assert_eq!(stats.total_revenue_cents, 1499 + 49900);
    }

    #[test]
    fn test_outbox_retry_bookkeeping() {
        let ledger = RedbLedger::open_in_memory().unwrap();
        let (purchase, gift) = sample_purchase("KWP-ORD-1", "KWP-AAAAAA-0001");
        ledger.record_purchase(&purchase, &gift).unwrap();

        ledger
            .mark_notification_failed("KWP-ORD-1", "connection refused")
            .unwrap();
        ledger
            .mark_notification_failed("KWP-ORD-1", "connection refused")
            .unwrap();

        let pending = ledger.pending_notifications().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 2);
        assert_eq!(pending[0].last_error.as_deref(), Some("connection refused"));

        ledger.mark_notified("KWP-ORD-1").unwrap();
        assert!(ledger.pending_notifications().unwrap().is_empty());

        // Unknown order ids are ignored
        ledger.mark_notification_failed("KWP-ORD-9", "x").unwrap();
        ledger.mark_notified("KWP-ORD-9").unwrap();
    }
}
