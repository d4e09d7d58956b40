//! # kwp-payments
//!
//! Payment orchestration for the KWP storefront: the gateway adapter
//! for hosted checkout, the fulfillment coordinator, and gift-code
//! delivery with a durable outbox.
//!
//! ## Fulfillment flow
//!
//! ```text
//!  pull path                     push path
//!  POST /verify-recovery         POST /webhook (signed)
//!        │                             │ verify signature
//!        └──────────┬──────────────────┘
//!                   ▼
//!   ┌────────────────────────┐
//!   │ FulfillmentCoordinator │  verify paid ─► mint code ─► record
//!   └────────────────────────┘  (gateway)      (kwp-core)   (ledger, atomic)
//!                                                              │
//!                                                              ▼
//!                                           notify (inline, best-effort)
//!                                           └─ outbox worker retries
//! ```
//!
//! Replays and concurrent invocations for one session converge on the
//! same receipt: one purchase, one code, one e-mail.

mod error;
mod fulfillment;
mod gateway;
mod notify;
mod outbox;

pub use error::{PaymentError, Result};
pub use fulfillment::{FulfillmentCoordinator, FulfillmentReceipt, order_id_for_session};
pub use gateway::{
    GatewayEvent, HostedSession, MockGateway, PaymentGateway, SessionStatus, StripeGateway,
};
pub use notify::{MailApiNotifier, NoopNotifier, Notifier};
pub use outbox::OutboxWorker;
