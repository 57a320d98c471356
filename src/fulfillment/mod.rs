//! Fulfillment orchestration: the sequence that turns a captured payment into
//! a delivered report.
//!
//! ```text
//! dispatch(event)
//!   ├─ Unhandled  → acknowledge, done
//!   ├─ Failed     → send failure notice (best effort, errors swallowed)
//!   └─ Captured   → no recipient email?   → skipped
//!                   already seen id?      → duplicate, no-op
//!                   otherwise:
//!                     lookup.fetch(email)        ─┐ transient errors retried
//!                     renderer.render(...)        │ per the backoff schedule;
//!                     notifier.send_report(...)  ─┘ render never retried
//! ```
//!
//! Fulfillment runs on a spawned task: if the provider drops the connection
//! before the handler finishes, the sequence still runs to completion.
//! Fulfillment failure never fails the webhook response — the provider's
//! event was authenticated and acknowledged, and redelivery would not fix a
//! permanent error.

pub mod dedup;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::breach::BreachLookup;
use crate::config::FulfillmentConfig;
use crate::email::{DeliveryReceipt, Notifier};
use crate::report::ReportRenderer;
use crate::webhooks::events::{PaymentEvent, PaymentRecord};
use dedup::SeenPayments;

/// Errors from the external collaborators a fulfillment touches.
#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    /// The breach lookup service answered with a non-success status or was
    /// unreachable.
    #[error("breach lookup unavailable: {detail}")]
    UpstreamUnavailable { status: Option<u16>, detail: String },

    /// The breach lookup did not answer within the configured timeout.
    #[error("breach lookup timed out")]
    UpstreamTimeout,

    /// The breach lookup answered but the body did not parse.
    #[error("breach lookup returned an unparseable response: {0}")]
    UpstreamMalformedResponse(String),

    /// The PDF engine failed. Rendering is deterministic, so a retry would
    /// fail identically.
    #[error("report rendering failed: {0}")]
    RenderFailure(String),

    /// The mail transport rejected the message (bad recipient, bad
    /// credentials). Permanent for this request.
    #[error("mail transport rejected the message: {0}")]
    TransportRejected(String),

    /// The mail transport could not be reached or answered with a transient
    /// failure.
    #[error("mail transport unavailable: {0}")]
    TransportUnavailable(String),
}

impl FulfillmentError {
    /// Transient errors are retry-eligible; everything else fails the
    /// fulfillment immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. } | Self::UpstreamTimeout | Self::TransportUnavailable(_)
        )
    }
}

/// Terminal state of one dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Processing finished (including ignored unhandled events).
    Done,
    /// Captured payment carried no customer email; nothing to fulfil.
    Skipped,
    /// Payment id was already processed within the retention window.
    Duplicate,
    /// Fulfillment failed after exhausting the retry schedule.
    Failed,
}

/// Sequences lookup → render → deliver for captured payments and the
/// notification-only path for failed ones.
pub struct Orchestrator {
    lookup: Arc<dyn BreachLookup>,
    renderer: Arc<dyn ReportRenderer>,
    notifier: Arc<dyn Notifier>,
    seen: SeenPayments,
    retry_schedule: Vec<Duration>,
}

impl Orchestrator {
    pub fn new(
        lookup: Arc<dyn BreachLookup>,
        renderer: Arc<dyn ReportRenderer>,
        notifier: Arc<dyn Notifier>,
        config: &FulfillmentConfig,
    ) -> Self {
        Self {
            lookup,
            renderer,
            notifier,
            seen: SeenPayments::new(config.dedup_retention, config.dedup_max_entries),
            retry_schedule: config.retry_schedule(),
        }
    }

    /// Dispatch a classified event and wait for its outcome.
    ///
    /// The work runs on a spawned task, so if the caller's future is dropped
    /// (client disconnected mid-request) fulfillment still completes. A
    /// `JoinError` means the task panicked, an internal fault the caller
    /// should surface rather than acknowledge.
    pub async fn dispatch(self: Arc<Self>, event: PaymentEvent) -> Result<Outcome, tokio::task::JoinError> {
        let handle = tokio::spawn(async move { self.process(event).await });
        handle.await.map_err(|e| {
            tracing::error!(error = %e, "fulfillment task panicked");
            e
        })
    }

    async fn process(&self, event: PaymentEvent) -> Outcome {
        match event {
            PaymentEvent::Unhandled { event } => {
                tracing::info!(%event, "ignoring unhandled event type");
                Outcome::Done
            }
            PaymentEvent::Failed(record) => self.handle_failed(record).await,
            PaymentEvent::Captured(record) => self.handle_captured(record).await,
        }
    }

    async fn handle_captured(&self, payment: PaymentRecord) -> Outcome {
        let Some(email) = payment.recipient().map(str::to_string) else {
            tracing::warn!(payment_id = %payment.id, "captured payment has no customer email, skipping fulfillment");
            return Outcome::Skipped;
        };

        if !self.seen.try_claim(&payment.id) {
            tracing::info!(payment_id = %payment.id, "duplicate delivery of already-processed payment, skipping");
            return Outcome::Duplicate;
        }

        tracing::info!(
            payment_id = %payment.id,
            amount = payment.amount_major(),
            method = payment.method.as_deref().unwrap_or("unknown"),
            "payment captured, starting report fulfillment"
        );

        match self.fulfill(&email, &payment.id).await {
            Ok(receipt) => {
                tracing::info!(
                    payment_id = %payment.id,
                    message_id = receipt.message_id.as_deref().unwrap_or("-"),
                    "report delivered"
                );
                Outcome::Done
            }
            Err(e) => {
                tracing::error!(payment_id = %payment.id, error = %e, "fulfillment failed");
                Outcome::Failed
            }
        }
    }

    /// Fetch → render → deliver, retrying transient failures per the backoff
    /// schedule. Rendering is deterministic and therefore never retried.
    async fn fulfill(&self, email: &str, payment_id: &str) -> Result<DeliveryReceipt, FulfillmentError> {
        let report = self
            .with_retries("breach lookup", || self.lookup.fetch(email))
            .await?;

        let artifact = self.renderer.render(email, &report)?;
        tracing::info!(breach_count = artifact.breach_count, "report rendered");

        self.with_retries("report delivery", || {
            self.notifier.send_report(email, &artifact, payment_id)
        })
        .await
    }

    async fn handle_failed(&self, payment: PaymentRecord) -> Outcome {
        let Some(email) = payment.recipient() else {
            tracing::info!(payment_id = %payment.id, "failed payment has no customer email, nothing to notify");
            return Outcome::Skipped;
        };

        tracing::info!(
            payment_id = %payment.id,
            reason = payment.failure_reason.as_deref().unwrap_or("unknown"),
            "payment failed, sending failure notice"
        );

        // Best effort: the provider's event was legitimate regardless of
        // whether the notice lands, so delivery errors are swallowed here.
        if let Err(e) = self
            .notifier
            .send_failure_notice(email, payment.failure_reason.as_deref())
            .await
        {
            tracing::warn!(payment_id = %payment.id, error = %e, "failed to send payment-failure notice");
        }

        Outcome::Done
    }

    async fn with_retries<T, F, Fut>(&self, stage: &str, mut op: F) -> Result<T, FulfillmentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FulfillmentError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry_schedule.len() => {
                    let delay = self.retry_schedule[attempt];
                    attempt += 1;
                    tracing::warn!(stage, attempt, delay = ?delay, error = %e, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
