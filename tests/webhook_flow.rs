//! End-to-end webhook scenarios over the real router, with counting doubles
//! standing in for the lookup service, PDF engine and mail transport.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};

use lookout::breach::{BreachLookup, BreachReport, BreachSource};
use lookout::config::{Config, ProviderConfig};
use lookout::email::{DeliveryReceipt, Notifier};
use lookout::fulfillment::FulfillmentError;
use lookout::report::{ReportArtifact, ReportRenderer};
use lookout::webhooks::signing;
use lookout::AppState;

const SECRET: &str = "test-webhook-secret";
const SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[derive(Default)]
struct FakeLookup {
    calls: AtomicUsize,
    time_out: bool,
    report: BreachReport,
}

#[async_trait]
impl BreachLookup for FakeLookup {
    async fn fetch(&self, _email: &str) -> Result<BreachReport, FulfillmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.time_out {
            Err(FulfillmentError::UpstreamTimeout)
        } else {
            Ok(self.report.clone())
        }
    }
}

#[derive(Default)]
struct FakeRenderer {
    calls: AtomicUsize,
    last_breach_count: AtomicU32,
}

impl ReportRenderer for FakeRenderer {
    fn render(&self, _email: &str, report: &BreachReport) -> Result<ReportArtifact, FulfillmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_breach_count.store(report.match_count, Ordering::SeqCst);
        Ok(ReportArtifact {
            content: b"%PDF-stub".to_vec(),
            breach_count: report.match_count,
        })
    }
}

#[derive(Default)]
struct FakeNotifier {
    report_calls: AtomicUsize,
    failure_calls: AtomicUsize,
    last_failure_reason: Mutex<Option<String>>,
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send_report(
        &self,
        _email: &str,
        _artifact: &ReportArtifact,
        _payment_id: &str,
    ) -> Result<DeliveryReceipt, FulfillmentError> {
        self.report_calls.fetch_add(1, Ordering::SeqCst);
        Ok(DeliveryReceipt {
            accepted: true,
            message_id: Some("stub-message-id".to_string()),
        })
    }

    async fn send_failure_notice(&self, _email: &str, reason: Option<&str>) -> Result<DeliveryReceipt, FulfillmentError> {
        self.failure_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_failure_reason.lock().unwrap() = reason.map(str::to_string);
        Ok(DeliveryReceipt {
            accepted: true,
            message_id: None,
        })
    }
}

struct Harness {
    server: TestServer,
    lookup: Arc<FakeLookup>,
    renderer: Arc<FakeRenderer>,
    notifier: Arc<FakeNotifier>,
}

fn harness_with_lookup(lookup: FakeLookup) -> Harness {
    let config = Config {
        provider: ProviderConfig {
            webhook_secret: Some(SECRET.to_string()),
            ..Default::default()
        },
        fulfillment: lookout::config::FulfillmentConfig {
            // No retries in scenario tests: transient failures surface at once
            retry_schedule_secs: vec![],
            ..Default::default()
        },
        ..Default::default()
    };

    let lookup = Arc::new(lookup);
    let renderer = Arc::new(FakeRenderer::default());
    let notifier = Arc::new(FakeNotifier::default());

    let state = AppState::new(config, lookup.clone(), renderer.clone(), notifier.clone());
    let server = TestServer::new(lookout::api::build_router(state)).expect("test server should build");

    Harness {
        server,
        lookup,
        renderer,
        notifier,
    }
}

fn harness() -> Harness {
    harness_with_lookup(FakeLookup::default())
}

fn captured_body(payment_id: &str, email: Option<&str>) -> String {
    let mut entity = json!({
        "id": payment_id,
        "amount": 49900,
        "method": "card",
    });
    if let Some(email) = email {
        entity["email"] = json!(email);
    }
    json!({
        "event": "payment.captured",
        "payload": {"payment": {"entity": entity}}
    })
    .to_string()
}

async fn post_signed(server: &TestServer, body: &str) -> axum_test::TestResponse {
    let signature = signing::sign(body.as_bytes(), SECRET.as_bytes()).expect("should sign");
    server
        .post("/api/webhooks/payments")
        .add_header(
            HeaderName::from_static(SIGNATURE_HEADER),
            HeaderValue::from_str(&signature).unwrap(),
        )
        .bytes(body.as_bytes().to_vec().into())
        .await
}

// Scenario A: captured payment with two breaches found → report rendered with
// breach count 2 and delivered exactly once.
#[tokio::test]
async fn test_captured_payment_delivers_report() {
    let harness = harness_with_lookup(FakeLookup {
        report: BreachReport {
            match_count: 2,
            sources: vec![
                BreachSource {
                    name: Some("ExampleCorp".to_string()),
                    date: Some("2021-06".to_string()),
                    exposed_fields: vec!["email".to_string(), "password".to_string()],
                },
                BreachSource::default(),
            ],
        },
        ..Default::default()
    });

    let response = post_signed(&harness.server, &captured_body("pay_A1", Some("customer@example.com"))).await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["event"], json!("payment.captured"));

    assert_eq!(harness.lookup.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.renderer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.renderer.last_breach_count.load(Ordering::SeqCst), 2);
    assert_eq!(harness.notifier.report_calls.load(Ordering::SeqCst), 1);
}

// Scenario B: breach lookup times out → the provider still gets 200, nothing
// is delivered.
#[tokio::test]
async fn test_lookup_timeout_still_acknowledged() {
    let harness = harness_with_lookup(FakeLookup {
        time_out: true,
        ..Default::default()
    });

    let response = post_signed(&harness.server, &captured_body("pay_B1", Some("customer@example.com"))).await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], json!(true));

    assert_eq!(harness.renderer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.notifier.report_calls.load(Ordering::SeqCst), 0);
}

// Scenario C: signature mismatch → 401 and no processing at all.
#[tokio::test]
async fn test_bad_signature_rejected_before_processing() {
    let harness = harness();
    let body = captured_body("pay_C1", Some("customer@example.com"));

    let response = harness
        .server
        .post("/api/webhooks/payments")
        .add_header(
            HeaderName::from_static(SIGNATURE_HEADER),
            HeaderValue::from_static("0000000000000000000000000000000000000000000000000000000000000000"),
        )
        .bytes(body.into_bytes().into())
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let json: Value = response.json();
    assert_eq!(json["error"], "Invalid signature");

    assert_eq!(harness.lookup.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.notifier.report_calls.load(Ordering::SeqCst), 0);
}

// Scenario D: failed payment with an email → one failure notice carrying the
// provider's reason.
#[tokio::test]
async fn test_failed_payment_sends_notice_with_reason() {
    let harness = harness();
    let body = json!({
        "event": "payment.failed",
        "payload": {"payment": {"entity": {
            "id": "pay_D1",
            "email": "customer@example.com",
            "error_description": "Card declined by issuer"
        }}}
    })
    .to_string();

    let response = post_signed(&harness.server, &body).await;

    response.assert_status(StatusCode::OK);
    assert_eq!(harness.notifier.failure_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        harness.notifier.last_failure_reason.lock().unwrap().as_deref(),
        Some("Card declined by issuer")
    );
    assert_eq!(harness.notifier.report_calls.load(Ordering::SeqCst), 0);
}

// Scenario E: unknown event type → acknowledged, no collaborator touched.
#[tokio::test]
async fn test_unknown_event_acknowledged_without_side_effects() {
    let harness = harness();
    let body = json!({"event": "subscription.created", "payload": {}}).to_string();

    let response = post_signed(&harness.server, &body).await;

    response.assert_status(StatusCode::OK);
    let json: Value = response.json();
    assert_eq!(json["success"], json!(true));

    assert_eq!(harness.lookup.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.renderer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.notifier.report_calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.notifier.failure_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_signature_rejected() {
    let harness = harness();

    let response = harness
        .server
        .post("/api/webhooks/payments")
        .bytes(captured_body("pay_X1", None).into_bytes().into())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert_eq!(json["error"], "Missing signature");
}

#[tokio::test]
async fn test_non_post_method_rejected() {
    let harness = harness();

    let response = harness.server.get("/api/webhooks/payments").await;

    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    let json: Value = response.json();
    assert_eq!(json["error"], "Method not allowed");
}

#[tokio::test]
async fn test_captured_without_email_short_circuits() {
    let harness = harness();

    let response = post_signed(&harness.server, &captured_body("pay_N1", None)).await;

    response.assert_status(StatusCode::OK);
    assert_eq!(harness.lookup.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.renderer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.notifier.report_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_duplicate_delivery_fulfills_once() {
    let harness = harness();
    let body = captured_body("pay_DUP", Some("customer@example.com"));

    let first = post_signed(&harness.server, &body).await;
    let second = post_signed(&harness.server, &body).await;

    first.assert_status(StatusCode::OK);
    second.assert_status(StatusCode::OK);
    assert_eq!(harness.notifier.report_calls.load(Ordering::SeqCst), 1);
}

struct PanickingLookup;

#[async_trait]
impl BreachLookup for PanickingLookup {
    async fn fetch(&self, _email: &str) -> Result<BreachReport, FulfillmentError> {
        panic!("lookup wiring bug");
    }
}

#[tokio::test]
async fn test_panicking_fulfillment_answers_internal_error() {
    let config = Config {
        provider: ProviderConfig {
            webhook_secret: Some(SECRET.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    let state = AppState::new(
        config,
        Arc::new(PanickingLookup),
        Arc::new(FakeRenderer::default()),
        Arc::new(FakeNotifier::default()),
    );
    let server = TestServer::new(lookout::api::build_router(state)).expect("test server should build");

    let response = post_signed(&server, &captured_body("pay_PANIC", Some("customer@example.com"))).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = response.json();
    assert_eq!(json["error"], "Internal server error");
    // The fault must not leak internals to the caller
    assert_eq!(json["message"], "Internal server error");
}

#[tokio::test]
async fn test_malformed_payload_acknowledged_as_anomaly() {
    let harness = harness();
    let body = json!({"event": "payment.captured", "payload": {}}).to_string();

    let response = post_signed(&harness.server, &body).await;

    response.assert_status(StatusCode::OK);
    let json: Value = response.json();
    assert_eq!(json["success"], json!(false));

    assert_eq!(harness.lookup.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_non_json_body_acknowledged_as_anomaly() {
    let harness = harness();

    let response = post_signed(&harness.server, "definitely not json").await;

    response.assert_status(StatusCode::OK);
    let json: Value = response.json();
    assert_eq!(json["success"], json!(false));
}
