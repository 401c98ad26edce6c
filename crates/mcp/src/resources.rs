//! `payment://{callSid}/{paymentSid}/status` resource.

use agentpay_core::narration;
use agentpay_core::payment::{
    PaymentFieldState, PaymentSessionState, PaymentSessionStore, PaymentSnapshot, SessionStatus,
};
use serde::Serialize;

pub const STATUS_URI_TEMPLATE: &str = "payment://{callSid}/{paymentSid}/status";
pub const STATUS_RESOURCE_NAME: &str = "getPaymentStatus";
pub const STATUS_MIME_TYPE: &str = "application/json";

pub fn status_uri(call_sid: &str, payment_sid: &str) -> String {
    format!("payment://{call_sid}/{payment_sid}/status")
}

/// Splits a concrete status URI into `(callSid, paymentSid)`.
pub fn parse_status_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("payment://")?.strip_suffix("/status")?;
    let (call_sid, payment_sid) = rest.split_once('/')?;
    if call_sid.is_empty() || payment_sid.is_empty() || payment_sid.contains('/') {
        return None;
    }
    Some((call_sid, payment_sid))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldStatus {
    pub complete: bool,
    pub masked: String,
    pub needs_reentry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reentry_reason: Option<String>,
    pub attempts: u32,
}

impl From<&PaymentFieldState> for FieldStatus {
    fn from(state: &PaymentFieldState) -> Self {
        Self {
            complete: state.complete,
            masked: state.masked.clone(),
            needs_reentry: state.needs_reentry,
            reentry_reason: state.reentry_reason.clone(),
            attempts: state.attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub card_number: FieldStatus,
    pub security_code: FieldStatus,
    pub expiration_date: FieldStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub next_step: String,
    pub narration: String,
}

impl From<&PaymentSessionState> for SessionView {
    fn from(session: &PaymentSessionState) -> Self {
        Self {
            status: session.status,
            error_message: session.error_message.clone(),
            card_number: FieldStatus::from(&session.card_number),
            security_code: FieldStatus::from(&session.security_code),
            expiration_date: FieldStatus::from(&session.expiration_date),
            token: session.token.clone(),
            next_step: narration::next_step(session).as_str().to_string(),
            narration: narration::render(session),
        }
    }
}

/// Body of the status resource: the tracked session plus the vendor's latest
/// view of it, once a callback has reported one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub call_sid: String,
    pub payment_sid: String,
    pub snapshot: Option<PaymentSnapshot>,
    pub session: SessionView,
}

pub fn payment_status(
    store: &PaymentSessionStore,
    call_sid: &str,
    payment_sid: &str,
) -> Option<PaymentStatusView> {
    let session = store.get_session(call_sid, payment_sid)?;

    Some(PaymentStatusView {
        call_sid: call_sid.to_string(),
        payment_sid: payment_sid.to_string(),
        snapshot: store.snapshot(payment_sid),
        session: SessionView::from(&session),
    })
}
