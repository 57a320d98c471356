//! # lookout: Payment-Webhook Fulfillment Service
//!
//! `lookout` receives asynchronous payment-provider notifications and, for a
//! captured payment, turns the event into a delivered product: it fetches
//! breach data for the customer's email from an external lookup service,
//! renders a PDF risk report, and emails the report to the customer. Failed
//! payments trigger a notification email; unknown events are acknowledged and
//! ignored.
//!
//! ## Request Flow
//!
//! An inbound `POST /api/webhooks/payments` is authenticated first: the
//! provider signs the raw request body with a shared secret, and
//! [`webhooks::signing`] recomputes and compares the HMAC in constant time.
//! Authenticated bodies are classified by [`webhooks::events`] into captured,
//! failed, or unhandled events, and handed to the [`fulfillment`]
//! orchestrator, which sequences the [`breach`] lookup, the [`report`]
//! renderer and the [`email`] notifier with a bounded retry schedule for
//! transient failures.
//!
//! Webhook acknowledgment is deliberately decoupled from fulfillment success:
//! once the event is authenticated, the response is 200 even if fulfillment
//! later fails, because the provider's only reaction to an error status is to
//! redeliver an event that was already valid. Fulfillment runs on a spawned
//! task so a dropped provider connection never abandons a paid customer's
//! report.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use lookout::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = lookout::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     lookout::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config)?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await
//! }
//! ```

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

pub mod api;
pub mod breach;
pub mod config;
pub mod email;
pub mod errors;
pub mod fulfillment;
pub mod report;
pub mod telemetry;
pub mod webhooks;

pub use config::Config;

use breach::{BreachLookup, LeakLookupClient};
use email::{EmailNotifier, Notifier};
use fulfillment::Orchestrator;
use report::{PdfRenderer, ReportRenderer};
use webhooks::{SecretPolicy, SignatureVerifier};

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: Arc<SignatureVerifier>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Assemble state from a config and the three external collaborators.
    ///
    /// The collaborators are trait objects so tests can substitute counting
    /// doubles for the real lookup service, PDF engine and mail transport.
    pub fn new(
        config: Config,
        lookup: Arc<dyn BreachLookup>,
        renderer: Arc<dyn ReportRenderer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let policy = if config.provider.allow_unverified {
            SecretPolicy::FailOpen
        } else {
            SecretPolicy::FailClosed
        };
        let verifier = SignatureVerifier::new(config.provider.webhook_secret.clone(), policy);
        let orchestrator = Orchestrator::new(lookup, renderer, notifier, &config.fulfillment);

        Self {
            config: Arc::new(config),
            verifier: Arc::new(verifier),
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// The assembled application, ready to serve.
pub struct Application {
    router: Router,
    config: Arc<Config>,
}

impl Application {
    /// Create a new application instance with the real collaborators.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let lookup: Arc<dyn BreachLookup> = Arc::new(LeakLookupClient::new(&config.lookup)?);
        let renderer: Arc<dyn ReportRenderer> = Arc::new(PdfRenderer::new());
        let notifier: Arc<dyn Notifier> = Arc::new(EmailNotifier::new(&config.email)?);

        let state = AppState::new(config, lookup, renderer, notifier);
        let config = state.config.clone();
        let router = api::build_router(state);

        Ok(Self { router, config })
    }

    /// Start serving until the shutdown future resolves.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        tracing::info!("lookout listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Shutdown complete");
        Ok(())
    }
}
