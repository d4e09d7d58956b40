//! Stripe Checkout Integration
//!
//! Implements the "Stripe Checkout (Hosted)" approach: the customer is
//! redirected to Stripe's hosted page and we confirm payment afterwards,
//! by session retrieval (pull) or by signed webhook (push).

use async_trait::async_trait;
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionId, CheckoutSessionMode,
    CheckoutSessionPaymentStatus, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData,
    CreateCheckoutSessionLineItemsPriceDataRecurring,
    CreateCheckoutSessionLineItemsPriceDataRecurringInterval, Currency, EventObject, EventType,
    Webhook,
};

use kwp_core::{BillingMode, ProductId};

use crate::error::{PaymentError, Result};
use crate::gateway::{GatewayEvent, HostedSession, PaymentGateway, SessionStatus};

/// Stripe gateway adapter
pub struct StripeGateway {
    client: Client,
    webhook_secret: String,
    success_url: String,
    cancel_url: String,
}

impl StripeGateway {
    /// Create a new Stripe gateway
    pub fn new(secret_key: &str, webhook_secret: &str, frontend_url: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret: webhook_secret.to_string(),
            success_url: format!(
                "{frontend_url}/success.html?session_id={{CHECKOUT_SESSION_ID}}"
            ),
            cancel_url: format!("{frontend_url}/canceled.html"),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;
        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".into());

        Ok(Self::new(&secret_key, &webhook_secret, &frontend_url))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_session(
        &self,
        customer_email: &str,
        product_id: ProductId,
    ) -> Result<HostedSession> {
        let product = product_id.product();

        let mut params = CreateCheckoutSession::new();
        params.customer_email = Some(customer_email);
        params.success_url = Some(&self.success_url);
        params.cancel_url = Some(&self.cancel_url);
        params.mode = Some(match product.billing {
            BillingMode::OneTime => CheckoutSessionMode::Payment,
            BillingMode::RecurringMonthly => CheckoutSessionMode::Subscription,
        });

        // Metadata ties the session back to the catalog on verification
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("product".to_string(), product_id.as_str().to_string());
        metadata.insert("email".to_string(), customer_email.to_string());
        params.metadata = Some(metadata);

        let recurring = match product.billing {
            BillingMode::OneTime => None,
            BillingMode::RecurringMonthly => {
                Some(CreateCheckoutSessionLineItemsPriceDataRecurring {
                    interval: CreateCheckoutSessionLineItemsPriceDataRecurringInterval::Month,
                    interval_count: Some(1),
                })
            }
        };

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: Currency::USD,
                unit_amount: Some(product.price_cents),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: product.display_name.clone(),
                    ..Default::default()
                }),
                recurring,
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        let url = session
            .url
            .ok_or_else(|| PaymentError::Gateway("No checkout URL returned".into()))?;

        Ok(HostedSession {
            session_id: session.id.to_string(),
            url,
        })
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus> {
        let id = session_id
            .parse::<CheckoutSessionId>()
            .map_err(|e| PaymentError::Gateway(format!("invalid session id: {e}")))?;

        let session = StripeCheckoutSession::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        // no_payment_required covers trialing subscriptions: the session
        // is complete and the customer must still receive their code
        let paid = matches!(
            session.payment_status,
            CheckoutSessionPaymentStatus::Paid | CheckoutSessionPaymentStatus::NoPaymentRequired
        );

        let customer_email = session
            .customer_email
            .clone()
            .ok_or_else(|| PaymentError::Gateway("session has no customer email".into()))?;

        let product = session
            .metadata
            .as_ref()
            .and_then(|m| m.get("product"))
            .and_then(|p| ProductId::parse(p))
            .ok_or_else(|| PaymentError::Gateway("session has no product metadata".into()))?;

        let amount_cents = session
            .amount_total
            .unwrap_or_else(|| product.product().price_cents);

        Ok(SessionStatus {
            session_id: session.id.to_string(),
            paid,
            customer_email,
            product,
            amount_cents,
        })
    }

    fn verify_webhook(&self, payload: &str, signature: &str) -> Result<GatewayEvent> {
        let event = Webhook::construct_event(payload, signature, &self.webhook_secret)
            .map_err(|e| PaymentError::WebhookSignature(e.to_string()))?;

        match event.type_ {
            EventType::CheckoutSessionCompleted => {
                if let EventObject::CheckoutSession(session) = &event.data.object {
                    Ok(GatewayEvent::CheckoutCompleted {
                        session_id: session.id.to_string(),
                    })
                } else {
                    Err(PaymentError::WebhookParse(
                        "Invalid checkout session data".into(),
                    ))
                }
            }
            _ => Ok(GatewayEvent::Ignored {
                event_type: format!("{:?}", event.type_),
            }),
        }
    }

    fn name(&self) -> &str {
        "Stripe"
    }
}
