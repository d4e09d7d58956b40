//! Mock Payment Gateway
//!
//! For testing and for development without Stripe credentials. Sessions
//! live in memory and are marked paid explicitly; webhook "signatures"
//! are a shared-secret comparison over a small JSON payload.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use kwp_core::ProductId;

use crate::error::{PaymentError, Result};
use crate::gateway::{GatewayEvent, HostedSession, PaymentGateway, SessionStatus};

struct MockSession {
    customer_email: String,
    product: ProductId,
    paid: bool,
}

/// In-memory payment gateway
pub struct MockGateway {
    sessions: RwLock<HashMap<String, MockSession>>,
    webhook_secret: String,
}

#[derive(Deserialize)]
struct MockWebhookPayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    session_id: Option<String>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::with_secret("whsec_mock")
    }

    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            webhook_secret: secret.into(),
        }
    }

    /// Flip a session to paid, as the hosted checkout would
    pub fn mark_paid(&self, session_id: &str) {
        let mut sessions = self.sessions.write().unwrap();
        if let Some(session) = sessions.get_mut(session_id) {
            session.paid = true;
        }
    }

    /// Register an already-paid session and return its id
    pub fn paid_session(&self, customer_email: &str, product: ProductId) -> String {
        let session_id = format!("cs_mock_{}", Uuid::new_v4().simple());
        self.sessions.write().unwrap().insert(
            session_id.clone(),
            MockSession {
                customer_email: customer_email.to_string(),
                product,
                paid: true,
            },
        );
        session_id
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_session(
        &self,
        customer_email: &str,
        product: ProductId,
    ) -> Result<HostedSession> {
        let session_id = format!("cs_mock_{}", Uuid::new_v4().simple());
        self.sessions.write().unwrap().insert(
            session_id.clone(),
            MockSession {
                customer_email: customer_email.to_string(),
                product,
                paid: false,
            },
        );

        Ok(HostedSession {
            url: format!("https://checkout.invalid/pay/{session_id}"),
            session_id,
        })
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus> {
        let sessions = self.sessions.read().unwrap();
        let session = sessions
            .get(session_id)
            .ok_or_else(|| PaymentError::Gateway(format!("unknown session: {session_id}")))?;

        Ok(SessionStatus {
            session_id: session_id.to_string(),
            paid: session.paid,
            customer_email: session.customer_email.clone(),
            product: session.product,
            amount_cents: session.product.product().price_cents,
        })
    }

    fn verify_webhook(&self, payload: &str, signature: &str) -> Result<GatewayEvent> {
        if signature != self.webhook_secret {
            return Err(PaymentError::WebhookSignature(
                "signature does not match webhook secret".into(),
            ));
        }

        let parsed: MockWebhookPayload = serde_json::from_str(payload)
            .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

        match parsed.event_type.as_str() {
            "checkout.session.completed" => {
                let session_id = parsed.session_id.ok_or_else(|| {
                    PaymentError::WebhookParse("completed event without session_id".into())
                })?;
                Ok(GatewayEvent::CheckoutCompleted { session_id })
            }
            other => Ok(GatewayEvent::Ignored {
                event_type: other.to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "MockGateway"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_lifecycle() {
        let gateway = MockGateway::new();

        let session = gateway
            .create_session("a@x.com", ProductId::RecoveryRoadmap)
            .await
            .unwrap();
        assert!(session.session_id.starts_with("cs_mock_"));

        let status = gateway.session_status(&session.session_id).await.unwrap();
        assert!(!status.paid);
        assert_eq!(status.amount_cents, 1499);

        gateway.mark_paid(&session.session_id);
        let status = gateway.session_status(&session.session_id).await.unwrap();
        assert!(status.paid);
        assert_eq!(status.customer_email, "a@x.com");
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let gateway = MockGateway::new();
        assert!(gateway.session_status("cs_mock_nope").await.is_err());
    }

    #[test]
    fn test_webhook_signature_check() {
        let gateway = MockGateway::with_secret("whsec_test");
        let payload = r#"{"type":"checkout.session.completed","session_id":"cs_mock_1"}"#;

        let err = gateway.verify_webhook(payload, "wrong").unwrap_err();
        assert!(matches!(err, PaymentError::WebhookSignature(_)));

        let event = gateway.verify_webhook(payload, "whsec_test").unwrap();
        assert!(matches!(
            event,
            GatewayEvent::CheckoutCompleted { session_id } if session_id == "cs_mock_1"
        ));
    }

    #[test]
    fn test_webhook_irrelevant_event() {
        let gateway = MockGateway::with_secret("whsec_test");
        let payload = r#"{"type":"invoice.paid"}"#;

        let event = gateway.verify_webhook(payload, "whsec_test").unwrap();
        assert!(matches!(event, GatewayEvent::Ignored { .. }));
    }
}
