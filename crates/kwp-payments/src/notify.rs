//! Code Delivery
//!
//! Outbound e-mail for gift codes. Delivery is best-effort from the
//! fulfillment path: failures land on the ledger outbox and are retried
//! by the worker, never rolling back a purchase.

use async_trait::async_trait;

use kwp_core::ProductId;

use crate::error::{PaymentError, Result};

/// Notification gateway trait
#[async_trait]
pub trait Notifier: Send + Sync {
    /// E-mail a gift code to a purchaser
    async fn send_code_email(&self, to: &str, product: ProductId, code: &str) -> Result<()>;
}

/// Notifier backed by an HTTP mail API (Resend-style JSON endpoint)
pub struct MailApiNotifier {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl MailApiNotifier {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("MAIL_API_KEY")
            .map_err(|_| PaymentError::Config("MAIL_API_KEY not set".into()))?;
        let api_url = std::env::var("MAIL_API_URL")
            .unwrap_or_else(|_| "https://api.resend.com/emails".into());
        let from = std::env::var("MAIL_FROM")
            .unwrap_or_else(|_| "KWP <no-reply@kwp.example>".into());

        Ok(Self::new(api_url, api_key, from))
    }
}

#[async_trait]
impl Notifier for MailApiNotifier {
    async fn send_code_email(&self, to: &str, product: ProductId, code: &str) -> Result<()> {
        let display_name = product.product().display_name;
        let body = serde_json::json!({
            "from": self.from,
            "to": [to],
            "subject": format!("Your {display_name} + Gift Code"),
            "html": format!(
                "<h1>Welcome to KWP</h1><p>Your gift code: <strong>{code}</strong></p>"
            ),
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Delivery(format!(
                "mail API returned {}",
                response.status()
            )));
        }

        tracing::info!(to = %to, product = %product, "Code e-mail sent");
        Ok(())
    }
}

/// No-op notifier for development without a mail API key
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_code_email(&self, to: &str, product: ProductId, _code: &str) -> Result<()> {
        tracing::info!(to = %to, product = %product, "Mail API not configured; code e-mail suppressed");
        Ok(())
    }
}
