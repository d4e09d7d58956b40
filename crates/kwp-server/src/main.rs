//! KWP Storefront HTTP Server
//!
//! Axum-based server exposing checkout-session creation, payment
//! verification (pull path and signed webhook push path), gift-code
//! redemption, and sales stats.

mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kwp_ledger::RedbLedger;
use kwp_payments::{
    FulfillmentCoordinator, MailApiNotifier, MockGateway, NoopNotifier, Notifier, OutboxWorker,
    PaymentGateway, StripeGateway,
};

use crate::config::ServerConfig;
use crate::handlers::{create_session, redeem_gift, stats, status, verify_recovery, webhook};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env();

    // Open the purchase ledger
    let ledger = Arc::new(RedbLedger::open(&config.db_path)?);
    tracing::info!(path = %config.db_path, "✓ Ledger open");

    // Payment gateway: Stripe when configured, mock otherwise
    let (gateway, stripe_configured): (Arc<dyn PaymentGateway>, bool) =
        match StripeGateway::from_env() {
            Ok(stripe) => {
                tracing::info!("✓ Stripe configured");
                (Arc::new(stripe), true)
            }
            Err(e) => {
                tracing::warn!("⚠ Stripe not configured - using mock gateway ({e})");
                tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
                (Arc::new(MockGateway::new()), false)
            }
        };

    // Notifier: HTTP mail API when configured
    let notifier: Arc<dyn Notifier> = match MailApiNotifier::from_env() {
        Ok(mailer) => {
            tracing::info!("✓ Mail API configured");
            Arc::new(mailer)
        }
        Err(_) => {
            tracing::warn!("⚠ MAIL_API_KEY not set - code e-mails disabled");
            Arc::new(NoopNotifier)
        }
    };

    // Fulfillment coordinator + outbox delivery worker
    let coordinator = Arc::new(FulfillmentCoordinator::new(
        gateway.clone(),
        ledger.clone(),
        notifier.clone(),
    ));

    OutboxWorker::new(ledger.clone(), notifier.clone())
        .with_poll_interval(config.outbox_poll_interval)
        .spawn();

    // Build application state
    let state = AppState {
        gateway,
        ledger,
        coordinator,
        stripe_configured,
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        // Health & reporting
        .route("/", get(status))
        .route("/stats", get(stats))
        // Checkout & fulfillment
        .route("/create-recovery-session", post(create_session))
        .route("/verify-recovery", post(verify_recovery))
        .route("/webhook", post(webhook))
        // Redemption
        .route("/redeem-gift", post(redeem_gift))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 KWP server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /                        - Status & product list");
    tracing::info!("  GET  /stats                   - Sales stats");
    tracing::info!("  POST /create-recovery-session - Create checkout session");
    tracing::info!("  POST /verify-recovery         - Verify payment, get code");
    tracing::info!("  POST /webhook                 - Payment gateway events");
    tracing::info!("  POST /redeem-gift             - Redeem a gift code");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
