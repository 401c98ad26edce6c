//! End-to-end capture flows through the MCP server: tool calls go to a fake
//! vendor API, vendor callbacks are fed through the callback processor, and
//! the status resource and prompts are read back.

use std::sync::{Arc, Mutex};

use agentpay_core::audit::{AuditCategory, AuditOutcome, InMemoryAuditSink};
use agentpay_core::callback::{CallbackPayload, CallbackProcessor};
use agentpay_core::gateway::{
    CallStatus, CallbackUrl, CaptureSettings, CreatePaymentRequest, PaymentHandle, PaymentUpdate,
    PaymentsApi, UpdatePaymentRequest, VendorError, VendorGateway,
};
use agentpay_core::payment::{PaymentSessionStore, SessionStatus};
use agentpay_mcp::{AgentPaymentMcpServer, ALL_TOOL_NAMES};
use agentpay_mcp::tools::{PaymentInput, ResetFieldInput, StartCaptureInput};
use async_trait::async_trait;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, ErrorCode, ResourceContents};
use rmcp::ServerHandler;
use serde_json::{json, Value};

#[derive(Default)]
struct FakeVendor {
    call_status: Mutex<String>,
    fail_next: Mutex<Option<VendorError>>,
    updates: Mutex<Vec<PaymentUpdate>>,
}

impl FakeVendor {
    fn in_progress() -> Self {
        Self { call_status: Mutex::new("in-progress".to_string()), ..Self::default() }
    }

    fn take_failure(&self) -> Option<VendorError> {
        self.fail_next.lock().expect("lock").take()
    }
}

#[async_trait]
impl PaymentsApi for FakeVendor {
    async fn create_payment(&self, request: CreatePaymentRequest) -> Result<PaymentHandle, VendorError> {
        if let Some(failure) = self.take_failure() {
            return Err(failure);
        }
        Ok(PaymentHandle {
            sid: "PA100".to_string(),
            call_sid: Some(request.call_sid),
            ..PaymentHandle::default()
        })
    }

    async fn update_payment(&self, request: UpdatePaymentRequest) -> Result<PaymentHandle, VendorError> {
        if let Some(failure) = self.take_failure() {
            return Err(failure);
        }
        self.updates.lock().expect("lock").push(request.update);
        Ok(PaymentHandle { sid: request.payment_sid, ..PaymentHandle::default() })
    }

    async fn fetch_call_status(&self, _call_sid: &str) -> Result<CallStatus, VendorError> {
        Ok(CallStatus(self.call_status.lock().expect("lock").clone()))
    }
}

struct Harness {
    server: AgentPaymentMcpServer,
    vendor: Arc<FakeVendor>,
    processor: CallbackProcessor,
    audit: InMemoryAuditSink,
    store: Arc<PaymentSessionStore>,
}

fn harness() -> Harness {
    let store = Arc::new(PaymentSessionStore::new());
    let vendor = Arc::new(FakeVendor::in_progress());
    let audit = InMemoryAuditSink::default();
    let gateway = Arc::new(VendorGateway::new(
        vendor.clone(),
        CaptureSettings {
            token_type: "reusable".to_string(),
            currency: "USD".to_string(),
            payment_connector: "Default".to_string(),
            require_security_code: true,
            require_postal_code: false,
        },
        CallbackUrl::new("https://pay.example.test/payments/callback"),
    ));
    let server = AgentPaymentMcpServer::new(store.clone(), gateway, Arc::new(audit.clone()));
    let processor = CallbackProcessor::new(store.clone(), Arc::new(audit.clone()));
    Harness { server, vendor, processor, audit, store }
}

fn callback(harness: &Harness, last_call: &str, fields: &[(&str, &str)]) {
    let mut payload = CallbackPayload {
        call_sid: Some("CA1".to_string()),
        payment_sid: Some("PA100".to_string()),
        ..CallbackPayload::default()
    };
    for (key, value) in fields {
        let value = Some((*value).to_string());
        match *key {
            "Result" => payload.result = value,
            "ErrorMessage" => payload.error_message = value,
            "PaymentCardNumber" => payload.payment_card_number = value,
            "PaymentCardType" => payload.payment_card_type = value,
            "SecurityCode" => payload.security_code = value,
            "ExpirationDate" => payload.expiration_date = value,
            "PaymentToken" => payload.payment_token = value,
            other => panic!("unsupported callback field {other}"),
        }
    }
    let notification = payload.into_notification(Some(last_call)).expect("valid callback");
    harness.processor.process(notification);
}

fn body(result: &CallToolResult) -> Value {
    let content = serde_json::to_value(&result.content[0]).expect("content serializes");
    let text = content["text"].as_str().expect("text content");
    serde_json::from_str(text).expect("json body")
}

fn payment() -> Parameters<PaymentInput> {
    Parameters(PaymentInput { call_sid: "CA1".to_string(), payment_sid: "PA100".to_string() })
}

fn status(harness: &Harness) -> Value {
    let result = harness.server.payment_status("CA1", "PA100").expect("status resource");
    match &result.contents[0] {
        ResourceContents::TextResourceContents { text, .. } => {
            serde_json::from_str(text).expect("json status")
        }
        other => panic!("unexpected resource contents: {other:?}"),
    }
}

#[tokio::test]
async fn full_capture_flow_reaches_completion() {
    let harness = harness();

    let started = harness
        .server
        .start_payment_capture(Parameters(StartCaptureInput { call_sid: "CA1".to_string() }))
        .await
        .expect("tool result");
    assert_ne!(started.is_error, Some(true));
    assert_eq!(body(&started)["paymentSid"], "PA100");
    callback(&harness, "startCapture", &[("Result", "success")]);

    let view = status(&harness);
    assert_eq!(view["session"]["status"], "in-progress");
    assert_eq!(view["session"]["nextStep"], "capture");

    let captured = harness.server.capture_card_number(payment()).await.expect("tool result");
    assert_eq!(body(&captured)["success"], true);
    callback(
        &harness,
        "payment-card-number",
        &[("Result", "success"), ("PaymentCardNumber", "xxxx-xxxx-xxxx-4242"), ("PaymentCardType", "visa")],
    );

    harness.server.capture_security_code(payment()).await.expect("tool result");
    callback(&harness, "security-code", &[("Result", "success"), ("SecurityCode", "xxx")]);

    harness.server.capture_expiration_date(payment()).await.expect("tool result");
    callback(&harness, "expiration-date", &[("Result", "success"), ("ExpirationDate", "1227")]);

    let view = status(&harness);
    assert_eq!(view["session"]["nextStep"], "finish");
    assert_eq!(view["snapshot"]["paymentCardType"], "visa");

    let completed = harness.server.complete_payment_capture(payment()).await.expect("tool result");
    assert_eq!(body(&completed)["success"], true);
    callback(&harness, "finishCapture", &[("Result", "success"), ("PaymentToken", "tok_abc")]);

    let session = harness.store.get_session("CA1", "PA100").expect("session");
    assert_eq!(session.status, SessionStatus::Complete);
    assert_eq!(session.token.as_deref(), Some("tok_abc"));

    let guidance = harness
        .server
        .render_prompt("PaymentGuidance", json!({ "callSid": "CA1", "paymentSid": "PA100" }).as_object())
        .expect("prompt");
    let text = serde_json::to_string(&guidance.messages).expect("messages serialize");
    assert!(text.contains("tok_abc"));

    assert_eq!(
        *harness.vendor.updates.lock().expect("lock"),
        vec![
            PaymentUpdate::Capture(agentpay_core::payment::PaymentField::CardNumber),
            PaymentUpdate::Capture(agentpay_core::payment::PaymentField::SecurityCode),
            PaymentUpdate::Capture(agentpay_core::payment::PaymentField::ExpirationDate),
            PaymentUpdate::Complete,
        ]
    );
}

#[tokio::test]
async fn rejected_field_is_reset_and_recaptured() {
    let harness = harness();
    harness
        .server
        .start_payment_capture(Parameters(StartCaptureInput { call_sid: "CA1".to_string() }))
        .await
        .expect("tool result");

    harness.server.capture_card_number(payment()).await.expect("tool result");
    callback(&harness, "payment-card-number", &[("Result", "error"), ("ErrorMessage", "invalid card number")]);

    let view = status(&harness);
    assert_eq!(view["session"]["nextStep"], "reentry");
    assert_eq!(view["session"]["cardNumber"]["needsReentry"], true);
    assert!(view["session"]["narration"].as_str().expect("narration").contains("invalid card number"));

    let reset = harness
        .server
        .reset_payment_field(Parameters(ResetFieldInput {
            call_sid: "CA1".to_string(),
            payment_sid: "PA100".to_string(),
            field: "cardNumber".to_string(),
        }))
        .await
        .expect("tool result");
    assert_eq!(body(&reset)["attempts"], 2);

    let view = status(&harness);
    assert_eq!(view["session"]["nextStep"], "capture");
    assert_eq!(view["session"]["cardNumber"]["needsReentry"], false);
}

#[tokio::test]
async fn failures_are_reported_as_error_envelopes() {
    let harness = harness();

    let missing = harness.server.capture_card_number(payment()).await.expect("tool result");
    assert_eq!(missing.is_error, Some(true));
    assert_eq!(body(&missing)["error"], "session_not_found");

    *harness.vendor.fail_next.lock().expect("lock") = Some(VendorError::Timeout);
    let failed = harness
        .server
        .start_payment_capture(Parameters(StartCaptureInput { call_sid: "CA1".to_string() }))
        .await
        .expect("tool result");
    assert_eq!(failed.is_error, Some(true));
    assert_eq!(body(&failed)["error"], "vendor_failure");

    harness.store.create_session("CA1", "PA100");
    *harness.vendor.call_status.lock().expect("lock") = "completed".to_string();
    let inactive = harness.server.capture_security_code(payment()).await.expect("tool result");
    assert_eq!(body(&inactive)["error"], "call_not_active");

    let bad_field = harness
        .server
        .reset_payment_field(Parameters(ResetFieldInput {
            call_sid: "CA1".to_string(),
            payment_sid: "PA100".to_string(),
            field: "postalCode".to_string(),
        }))
        .await
        .expect("tool result");
    assert_eq!(body(&bad_field)["error"], "invalid_input");

    let capability_events: Vec<_> = harness
        .audit
        .events()
        .into_iter()
        .filter(|event| event.category == AuditCategory::Capability)
        .collect();
    assert_eq!(capability_events.len(), 4);
    assert!(capability_events.iter().all(|event| event.outcome != AuditOutcome::Success));
}

#[tokio::test]
async fn malformed_identifiers_are_rejected_before_the_vendor() {
    let harness = harness();
    harness.store.create_session("CA1/../x", "PA100");

    let capture = harness
        .server
        .capture_card_number(Parameters(PaymentInput {
            call_sid: "CA1/../x".to_string(),
            payment_sid: "PA100".to_string(),
        }))
        .await
        .expect("tool result");
    assert_eq!(capture.is_error, Some(true));
    assert_eq!(body(&capture)["error"], "invalid_input");

    let start = harness
        .server
        .start_payment_capture(Parameters(StartCaptureInput {
            call_sid: "CA1?Status=complete".to_string(),
        }))
        .await
        .expect("tool result");
    assert_eq!(body(&start)["error"], "invalid_input");

    harness.store.create_session("CA1", "PA100");
    let complete = harness
        .server
        .complete_payment_capture(Parameters(PaymentInput {
            call_sid: "CA1".to_string(),
            payment_sid: "PA100/../../Messages".to_string(),
        }))
        .await
        .expect("tool result");
    assert_eq!(body(&complete)["error"], "invalid_input");

    assert!(harness.vendor.updates.lock().expect("lock").is_empty());
    assert!(harness
        .audit
        .events()
        .iter()
        .filter(|event| event.category == AuditCategory::Capability)
        .all(|event| event.outcome == AuditOutcome::Rejected));
}

#[test]
fn status_resource_is_served_as_json() {
    let harness = harness();
    harness.store.create_session("CA1", "PA100");

    let result = harness.server.payment_status("CA1", "PA100").expect("status resource");
    match &result.contents[0] {
        ResourceContents::TextResourceContents { uri, mime_type, .. } => {
            assert_eq!(uri, "payment://CA1/PA100/status");
            assert_eq!(mime_type.as_deref(), Some("application/json"));
        }
        other => panic!("unexpected resource contents: {other:?}"),
    }
}

#[test]
fn unknown_payment_status_is_resource_not_found() {
    let harness = harness();
    let error = harness.server.payment_status("CA1", "PA404").expect_err("not found");
    assert_eq!(error.code, ErrorCode::RESOURCE_NOT_FOUND);
}

#[test]
fn server_info_advertises_capabilities() {
    let harness = harness();
    let info = harness.server.get_info();

    assert_eq!(info.server_info.name, "agentpay-mcp");
    assert!(info.capabilities.tools.is_some());
    assert!(info.capabilities.resources.is_some());
    assert!(info.capabilities.prompts.is_some());
    assert_eq!(ALL_TOOL_NAMES.len(), 6);
}
