//! Purchase Fulfillment
//!
//! The state machine at the center of the store: verify payment with
//! the gateway, mint a gift code, persist purchase + code + outbox
//! entry in one transaction, then hand off delivery. Verification
//! strictly precedes persistence, persistence strictly precedes
//! notification: never notify without a durable record, never record
//! without confirmed payment.
//!
//! Both invocation paths (client-supplied session reference after
//! redirect, and the gateway's completion webhook) funnel into
//! [`FulfillmentCoordinator::fulfill`], which is idempotent per
//! session: replays and concurrent invocations converge on the same
//! receipt with exactly one purchase, one code, and one e-mail.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use kwp_ledger::{GiftCode, Ledger, LedgerError, Purchase};

use crate::error::{PaymentError, Result};
use crate::gateway::{PaymentGateway, SessionStatus};
use crate::notify::Notifier;

/// Regeneration bound for gift-code collisions. Hitting it means the
/// entropy source is broken, not that we were unlucky.
const MAX_CODE_ATTEMPTS: u32 = 5;

const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a fulfillment attempt
#[derive(Clone, Debug)]
pub struct FulfillmentReceipt {
    /// Order id derived from the gateway session
    pub order_id: String,

    /// Gift code minted for (or previously minted for) the purchase
    pub gift_code: String,

    /// Whether this invocation found the purchase already recorded
    pub already_fulfilled: bool,
}

/// Derive the stable order id for a gateway session. The session
/// identifier is the idempotency key: every retry or duplicate
/// delivery of the same session maps to the same order.
pub fn order_id_for_session(session_id: &str) -> String {
    let digest = Sha256::digest(session_id.as_bytes());
    format!("KWP-ORD-{}", hex::encode_upper(&digest[..8]))
}

/// Fulfillment coordinator
pub struct FulfillmentCoordinator {
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    verify_timeout: Duration,
}

impl FulfillmentCoordinator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            gateway,
            ledger,
            notifier,
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    pub fn with_verify_timeout(mut self, verify_timeout: Duration) -> Self {
        self.verify_timeout = verify_timeout;
        self
    }

    /// Fulfill a purchase for a checkout session.
    ///
    /// Verifies payment, then records and delivers exactly once per
    /// session. Returns the existing receipt when the session was
    /// already fulfilled. `VerificationFailed` leaves no trace;
    /// `Persistence` means the purchase is NOT fulfilled and a retry
    /// (e.g. webhook redelivery) must complete it.
    pub async fn fulfill(&self, session_ref: &str) -> Result<FulfillmentReceipt> {
        let status = match tokio::time::timeout(
            self.verify_timeout,
            self.gateway.session_status(session_ref),
        )
        .await
        {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(PaymentError::VerificationFailed(e.to_string())),
            Err(_) => {
                return Err(PaymentError::VerificationFailed(format!(
                    "gateway status query timed out after {:?}",
                    self.verify_timeout
                )));
            }
        };

        if !status.paid {
            tracing::info!(session_id = %status.session_id, "Session not paid; refusing to fulfill");
            return Err(PaymentError::VerificationFailed(format!(
                "session {} is not paid",
                status.session_id
            )));
        }

        // Payment verified. Settle on a detached task: a caller that
        // disconnects mid-flight must not abandon a half-finished
        // fulfillment.
        let ledger = Arc::clone(&self.ledger);
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(settle(ledger, notifier, status))
            .await
            .map_err(|e| PaymentError::Persistence(format!("fulfillment task aborted: {e}")))?
    }
}

async fn settle(
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    session: SessionStatus,
) -> Result<FulfillmentReceipt> {
    let order_id = order_id_for_session(&session.session_id);

    if let Some(existing) = ledger.purchase(&order_id)? {
        tracing::info!(order_id = %order_id, "Order already fulfilled; returning existing receipt");
        return Ok(FulfillmentReceipt {
            order_id,
            gift_code: existing.gift_code,
            already_fulfilled: true,
        });
    }

    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = kwp_core::code::generate();
        let purchase = Purchase::new(
            &order_id,
            &session.customer_email,
            session.product,
            session.amount_cents,
            &code,
        );
        let gift = GiftCode::new(&code, &session.customer_email);

        match ledger.record_purchase(&purchase, &gift) {
            Ok(()) => {
                tracing::info!(
                    order_id = %order_id,
                    product = %session.product,
                    amount_cents = session.amount_cents,
                    "Purchase fulfilled"
                );
                deliver(ledger.as_ref(), notifier.as_ref(), &purchase).await;
                return Ok(FulfillmentReceipt {
                    order_id,
                    gift_code: code,
                    already_fulfilled: false,
                });
            }
            Err(LedgerError::DuplicateOrder(_)) => {
                // Lost the race against a concurrent fulfillment of the
                // same session; its receipt is the answer
                let existing = ledger.purchase(&order_id)?.ok_or_else(|| {
                    PaymentError::Persistence(format!(
                        "order {order_id} missing after duplicate detection"
                    ))
                })?;
                tracing::info!(order_id = %order_id, "Concurrent fulfillment won the race");
                return Ok(FulfillmentReceipt {
                    order_id,
                    gift_code: existing.gift_code,
                    already_fulfilled: true,
                });
            }
            Err(LedgerError::DuplicateCode(code)) => {
                tracing::warn!(attempt, code = %code, "Gift code collision; regenerating");
            }
            Err(e) => return Err(PaymentError::Persistence(e.to_string())),
        }
    }

    Err(PaymentError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS))
}

/// Best-effort inline delivery. The purchase is already economically
/// final: failure is recorded on the outbox and retried by the worker,
/// never surfaced to the fulfillment caller.
async fn deliver(ledger: &dyn Ledger, notifier: &dyn Notifier, purchase: &Purchase) {
    match notifier
        .send_code_email(&purchase.email, purchase.product, &purchase.gift_code)
        .await
    {
        Ok(()) => {
            if let Err(e) = ledger.mark_notified(&purchase.order_id) {
                tracing::warn!(
                    order_id = %purchase.order_id,
                    error = %e,
                    "Delivered but could not clear outbox entry"
                );
            }
        }
        Err(e) => {
            if let Err(mark_err) =
                ledger.mark_notification_failed(&purchase.order_id, &e.to_string())
            {
                tracing::error!(
                    order_id = %purchase.order_id,
                    error = %mark_err,
                    "Could not record delivery failure"
                );
            }
            tracing::warn!(
                order_id = %purchase.order_id,
                error = %e,
                "Code e-mail delivery failed; left on outbox for retry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kwp_core::ProductId;
    use kwp_ledger::MemoryLedger;
    use std::sync::Mutex;

    use crate::gateway::MockGateway;

    /// Records every send
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_code_email(&self, to: &str, _product: ProductId, code: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), code.to_string()));
            Ok(())
        }
    }

    /// Always fails
    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send_code_email(&self, _to: &str, _product: ProductId, _code: &str) -> Result<()> {
            Err(PaymentError::Delivery("mail API down".into()))
        }
    }

    struct Harness {
        gateway: Arc<MockGateway>,
        ledger: Arc<MemoryLedger>,
        notifier: Arc<RecordingNotifier>,
        coordinator: FulfillmentCoordinator,
    }

    fn harness() -> Harness {
        let gateway = Arc::new(MockGateway::new());
        let ledger = Arc::new(MemoryLedger::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator = FulfillmentCoordinator::new(
            gateway.clone(),
            ledger.clone(),
            notifier.clone(),
        );
        Harness {
            gateway,
            ledger,
            notifier,
            coordinator,
        }
    }

    fn assert_code_format(code: &str) {
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3, "unexpected code shape: {code}");
        assert_eq!(parts[0], "KWP");
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 4);
    }

    #[test]
    fn test_order_id_is_stable_and_session_scoped() {
        let a = order_id_for_session("cs_test_123");
        let b = order_id_for_session("cs_test_123");
        let c = order_id_for_session("cs_test_124");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("KWP-ORD-"));
    }

    #[tokio::test]
    async fn test_fulfill_paid_session() {
        let h = harness();
        let session_id = h.gateway.paid_session("a@x.com", ProductId::RecoveryRoadmap);

        let receipt = h.coordinator.fulfill(&session_id).await.unwrap();
        assert!(!receipt.already_fulfilled);
        assert_code_format(&receipt.gift_code);

        let purchase = h.ledger.purchase(&receipt.order_id).unwrap().unwrap();
        assert_eq!(purchase.email, "a@x.com");
        assert_eq!(purchase.amount_cents, 1499);
        assert_eq!(purchase.gift_code, receipt.gift_code);

        let stats = h.ledger.stats().unwrap();
        assert_eq!(stats.total_sales, 1);
        assert_eq!(stats.total_revenue_cents, 1499);

        // Delivered inline: outbox cleared, exactly one e-mail
        assert!(h.ledger.pending_notifications().unwrap().is_empty());
        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], ("a@x.com".to_string(), receipt.gift_code.clone()));
    }

    #[tokio::test]
    async fn test_fulfill_is_idempotent() {
        let h = harness();
        let session_id = h.gateway.paid_session("a@x.com", ProductId::RecoveryRoadmap);

        let first = h.coordinator.fulfill(&session_id).await.unwrap();
        let second = h.coordinator.fulfill(&session_id).await.unwrap();

        assert_eq!(first.order_id, second.order_id);
        assert_eq!(first.gift_code, second.gift_code);
        assert!(second.already_fulfilled);

        assert_eq!(h.ledger.stats().unwrap().total_sales, 1);
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unpaid_session_leaves_no_trace() {
        let h = harness();
        let session = h
            .gateway
            .create_session("a@x.com", ProductId::RecoveryRoadmap)
            .await
            .unwrap();

        let err = h.coordinator.fulfill(&session.session_id).await.unwrap_err();
        assert!(matches!(err, PaymentError::VerificationFailed(_)));

        assert_eq!(h.ledger.stats().unwrap().total_sales, 0);
        assert!(h.ledger.pending_notifications().unwrap().is_empty());
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_fails_verification() {
        let h = harness();
        let err = h.coordinator.fulfill("cs_mock_unknown").await.unwrap_err();
        assert!(matches!(err, PaymentError::VerificationFailed(_)));
    }

    #[tokio::test]
    async fn test_concurrent_fulfill_single_purchase() {
        let h = harness();
        let session_id = h.gateway.paid_session("a@x.com", ProductId::AgencyOnetime);

        let (first, second) = tokio::join!(
            h.coordinator.fulfill(&session_id),
            h.coordinator.fulfill(&session_id),
        );
        let first = first.unwrap();
        let second = second.unwrap();

        assert_eq!(first.order_id, second.order_id);
        assert_eq!(first.gift_code, second.gift_code);

        assert_eq!(h.ledger.stats().unwrap().total_sales, 1);
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_failure_keeps_purchase_and_outbox() {
        let gateway = Arc::new(MockGateway::new());
        let ledger = Arc::new(MemoryLedger::new());
        let coordinator = FulfillmentCoordinator::new(
            gateway.clone(),
            ledger.clone(),
            Arc::new(FailingNotifier),
        );

        let session_id = gateway.paid_session("a@x.com", ProductId::RecoveryRoadmap);
        let receipt = coordinator.fulfill(&session_id).await.unwrap();

        // Fulfillment succeeded despite the failed e-mail
        assert!(!receipt.already_fulfilled);
        assert_eq!(ledger.stats().unwrap().total_sales, 1);

        let pending = ledger.pending_notifications().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].gift_code, receipt.gift_code);
    }

    #[tokio::test]
    async fn test_redeem_scenario_end_to_end() {
        let h = harness();
        let session_id = h.gateway.paid_session("a@x.com", ProductId::RecoveryRoadmap);
        let receipt = h.coordinator.fulfill(&session_id).await.unwrap();

        let redeemed = h.ledger.redeem(&receipt.gift_code, "b@y.com").unwrap();
        assert_eq!(redeemed.created_by_email, "a@x.com");
        assert_eq!(redeemed.redeemed_by_email.as_deref(), Some("b@y.com"));

        let err = h.ledger.redeem(&receipt.gift_code, "b@y.com").unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyRedeemed(_)));
    }
}
