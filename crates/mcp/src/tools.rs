//! Tool inputs, the static tool catalog and the result envelope.

use agentpay_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use agentpay_core::errors::CaptureError;
use agentpay_core::gateway::is_valid_sid;
use rmcp::model::{CallToolResult, Content};
use rmcp::schemars;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const START_PAYMENT_CAPTURE: &str = "startPaymentCapture";
pub const CAPTURE_CARD_NUMBER: &str = "captureCardNumber";
pub const CAPTURE_SECURITY_CODE: &str = "captureSecurityCode";
pub const CAPTURE_EXPIRATION_DATE: &str = "captureExpirationDate";
pub const COMPLETE_PAYMENT_CAPTURE: &str = "completePaymentCapture";
pub const RESET_PAYMENT_FIELD: &str = "resetPaymentField";

pub const ALL_TOOL_NAMES: &[&str] = &[
    START_PAYMENT_CAPTURE,
    CAPTURE_CARD_NUMBER,
    CAPTURE_SECURITY_CODE,
    CAPTURE_EXPIRATION_DATE,
    COMPLETE_PAYMENT_CAPTURE,
    RESET_PAYMENT_FIELD,
];

const ACTOR: &str = "mcp";

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartCaptureInput {
    #[schemars(description = "The Twilio Call SID")]
    pub call_sid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    #[schemars(description = "The Twilio Call SID")]
    pub call_sid: String,
    #[schemars(description = "The Twilio Payment SID")]
    pub payment_sid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetFieldInput {
    #[schemars(description = "The Twilio Call SID")]
    pub call_sid: String,
    #[schemars(description = "The Twilio Payment SID")]
    pub payment_sid: String,
    #[schemars(description = "Field to capture again: cardNumber, securityCode or expirationDate")]
    pub field: String,
}

/// Checks a caller-supplied call or payment SID before it reaches the store or
/// the vendor.
pub(crate) fn validate_sid(label: &str, value: &str) -> Result<(), CaptureError> {
    if value.trim().is_empty() {
        Err(CaptureError::InvalidInput(format!("{label} is required")))
    } else if !is_valid_sid(value) {
        Err(CaptureError::InvalidInput(format!("{label} must be an alphanumeric vendor identifier")))
    } else {
        Ok(())
    }
}

pub(crate) fn success(body: serde_json::Value) -> CallToolResult {
    let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
    CallToolResult::success(vec![Content::text(text)])
}

/// Error envelope: a stable class plus a caller-safe message and the operation
/// that failed. Internal detail stays in the logs.
pub(crate) fn failure(operation: &str, error: &CaptureError) -> CallToolResult {
    let body = json!({
        "error": error.error_class(),
        "message": error.user_message(),
        "operation": operation,
    });
    let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
    CallToolResult::error(vec![Content::text(text)])
}

pub(crate) fn audit_event(
    tool: &str,
    call_sid: &str,
    payment_sid: Option<&str>,
    result: Result<(), &CaptureError>,
) -> AuditEvent {
    let outcome = match result {
        Ok(()) => AuditOutcome::Success,
        Err(error) if error.error_class() == "invalid_input" => AuditOutcome::Rejected,
        Err(CaptureError::SessionNotFound { .. }) => AuditOutcome::Rejected,
        Err(_) => AuditOutcome::Failed,
    };
    let event = AuditEvent::new(
        Some(call_sid.to_string()),
        payment_sid.map(str::to_string),
        format!("capability.{tool}"),
        AuditCategory::Capability,
        ACTOR,
        outcome,
    );
    match result {
        Ok(()) => event,
        Err(error) => event.with_metadata("error_class", error.error_class()),
    }
}
