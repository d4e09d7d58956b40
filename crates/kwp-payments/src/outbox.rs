//! Notification Outbox Worker
//!
//! Background task that drains the ledger's notification outbox:
//! every poll interval it retries undelivered code e-mails, removing
//! entries on success and recording the failure otherwise. Entries that
//! exhaust the attempt cap stay on the outbox and are never deleted,
//! so a lost e-mail is always visible for manual reconciliation.

use std::sync::Arc;
use std::time::Duration;

use kwp_ledger::Ledger;

use crate::notify::Notifier;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Outbox delivery worker
pub struct OutboxWorker {
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl OutboxWorker {
    pub fn new(ledger: Arc<dyn Ledger>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            ledger,
            notifier,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the worker on a background task
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            loop {
                interval.tick().await;
                self.drain_once().await;
            }
        })
    }

    /// One delivery pass over the outbox
    pub async fn drain_once(&self) {
        let pending = match self.ledger.pending_notifications() {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!(error = %e, "Could not read notification outbox");
                return;
            }
        };

        for entry in pending {
            if entry.attempts >= self.max_attempts {
                // Already given up on; stays visible on the outbox
                continue;
            }

            match self
                .notifier
                .send_code_email(&entry.email, entry.product, &entry.gift_code)
                .await
            {
                Ok(()) => {
                    if let Err(e) = self.ledger.mark_notified(&entry.order_id) {
                        tracing::warn!(
                            order_id = %entry.order_id,
                            error = %e,
                            "Delivered but could not clear outbox entry"
                        );
                    } else {
                        tracing::info!(
                            order_id = %entry.order_id,
                            "Code e-mail delivered from outbox"
                        );
                    }
                }
                Err(e) => {
                    if let Err(mark_err) = self
                        .ledger
                        .mark_notification_failed(&entry.order_id, &e.to_string())
                    {
                        tracing::error!(
                            order_id = %entry.order_id,
                            error = %mark_err,
                            "Could not record delivery failure"
                        );
                        continue;
                    }

                    if entry.attempts + 1 >= self.max_attempts {
                        tracing::error!(
                            order_id = %entry.order_id,
                            email = %entry.email,
                            error = %e,
                            "Giving up on code e-mail; manual reconciliation required"
                        );
                    } else {
                        tracing::warn!(
                            order_id = %entry.order_id,
                            attempt = entry.attempts + 1,
                            error = %e,
                            "Code e-mail delivery failed; will retry"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kwp_core::ProductId;
    use kwp_ledger::{GiftCode, MemoryLedger, Purchase};
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::error::{PaymentError, Result};

    /// Fails the first `failures` sends, then succeeds
    struct FlakyNotifier {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn send_code_email(&self, _to: &str, _product: ProductId, _code: &str) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(PaymentError::Delivery("mail API 503".into()))
            } else {
                Ok(())
            }
        }
    }

    fn ledger_with_entry() -> Arc<MemoryLedger> {
        let ledger = Arc::new(MemoryLedger::new());
        let purchase = Purchase::new(
            "KWP-ORD-1",
            "a@x.com",
            ProductId::RecoveryRoadmap,
            1499,
            "KWP-AAAAAA-0001",
        );
        let gift = GiftCode::new("KWP-AAAAAA-0001", "a@x.com");
        ledger.record_purchase(&purchase, &gift).unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_retries_until_delivered() {
        let ledger = ledger_with_entry();
        let notifier = Arc::new(FlakyNotifier {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let worker = OutboxWorker::new(ledger.clone(), notifier.clone());

        worker.drain_once().await;
        worker.drain_once().await;
        let pending = ledger.pending_notifications().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 2);

        worker.drain_once().await;
        assert!(ledger.pending_notifications().unwrap().is_empty());
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempt_cap() {
        let ledger = ledger_with_entry();
        let notifier = Arc::new(FlakyNotifier {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let worker = OutboxWorker::new(ledger.clone(), notifier.clone());

        for _ in 0..DEFAULT_MAX_ATTEMPTS + 3 {
            worker.drain_once().await;
        }

        // Capped: no further sends, entry still visible for reconciliation
        assert_eq!(notifier.calls.load(Ordering::SeqCst), DEFAULT_MAX_ATTEMPTS);
        let pending = ledger.pending_notifications().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, DEFAULT_MAX_ATTEMPTS);
    }
}
