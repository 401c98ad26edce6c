//! Callback ingestion: turns vendor status callbacks into session store mutations.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::payment::{FieldUpdate, PaymentField, PaymentSessionStore, PaymentSnapshot, SessionStatus};

/// Query parameter on the callback URL that names the operation being reported.
pub const DISCRIMINATOR_PARAM: &str = "lastCall";

const AUDIT_ACTOR: &str = "vendor-callback";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackOperation {
    StartCapture,
    Field(PaymentField),
    FinishCapture,
    Unknown(String),
}

impl CallbackOperation {
    pub fn parse(raw: Option<&str>) -> Self {
        let raw = raw.map(str::trim).unwrap_or_default();
        match raw {
            "startCapture" => Self::StartCapture,
            "finishCapture" => Self::FinishCapture,
            other => PaymentField::from_capture_type(other)
                .map(Self::Field)
                .unwrap_or_else(|| Self::Unknown(other.to_string())),
        }
    }

    pub fn discriminator(&self) -> &str {
        match self {
            Self::StartCapture => "startCapture",
            Self::Field(field) => field.capture_type(),
            Self::FinishCapture => "finishCapture",
            Self::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for CallbackOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.discriminator())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureResult {
    Success,
    Error,
}

impl CaptureResult {
    fn from_vendor(raw: Option<&str>) -> Self {
        match raw {
            Some(value) if value.trim().eq_ignore_ascii_case("error") => Self::Error,
            _ => Self::Success,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CallbackError {
    #[error("callback is missing required field `{0}`")]
    MissingField(&'static str),
}

/// Form-encoded body the vendor posts to the callback endpoint.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CallbackPayload {
    pub call_sid: Option<String>,
    pub payment_sid: Option<String>,
    pub sid: Option<String>,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub payment_card_number: Option<String>,
    pub payment_card_type: Option<String>,
    pub security_code: Option<String>,
    pub payment_security_code: Option<String>,
    pub expiration_date: Option<String>,
    pub payment_expiration_date: Option<String>,
    pub payment_confirmation_code: Option<String>,
    pub profile_id: Option<String>,
    pub payment_token: Option<String>,
    pub payment_method: Option<String>,
    pub capture: Option<String>,
    pub required: Option<String>,
    pub partial_result: Option<String>,
}

impl CallbackPayload {
    pub fn into_notification(
        self,
        discriminator: Option<&str>,
    ) -> Result<CallbackNotification, CallbackError> {
        let call_sid = non_empty(self.call_sid).ok_or(CallbackError::MissingField("CallSid"))?;
        let payment_sid = non_empty(self.payment_sid)
            .or_else(|| non_empty(self.sid))
            .ok_or(CallbackError::MissingField("PaymentSid"))?;

        let partial = self
            .partial_result
            .as_deref()
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let snapshot = PaymentSnapshot {
            payment_card_number: self.payment_card_number,
            payment_card_type: self.payment_card_type,
            security_code: non_empty(self.payment_security_code.clone())
                .or_else(|| self.security_code.clone()),
            expiration_date: non_empty(self.payment_expiration_date.clone())
                .or_else(|| self.expiration_date.clone()),
            payment_confirmation_code: self.payment_confirmation_code,
            result: self.result.clone(),
            profile_id: self.profile_id,
            payment_token: self.payment_token,
            payment_method: self.payment_method,
            capture: self.capture,
            required: self.required,
            partial_result: self.partial_result.as_ref().map(|_| partial),
        };

        Ok(CallbackNotification {
            operation: CallbackOperation::parse(discriminator),
            call_sid,
            payment_sid,
            result: CaptureResult::from_vendor(self.result.as_deref()),
            error_message: non_empty(self.error_message),
            partial,
            snapshot,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackNotification {
    pub operation: CallbackOperation,
    pub call_sid: String,
    pub payment_sid: String,
    pub result: CaptureResult,
    pub error_message: Option<String>,
    pub partial: bool,
    pub snapshot: PaymentSnapshot,
}

impl CallbackNotification {
    /// Masked value for a captured field, falling back to the placeholder mask.
    fn masked_value(&self, field: PaymentField) -> String {
        let reported = match field {
            PaymentField::CardNumber => self.snapshot.payment_card_number.clone(),
            PaymentField::SecurityCode => self.snapshot.security_code.clone(),
            PaymentField::ExpirationDate => self.snapshot.expiration_date.clone(),
        };
        non_empty(reported).unwrap_or_else(|| field.placeholder_mask().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    SessionOpened,
    FieldCaptured(PaymentField),
    FieldRejected { field: PaymentField, attempts: u32 },
    PartialResult,
    CaptureCompleted,
    CaptureFailed,
    SessionMissing,
    UnknownOperation(String),
}

impl CallbackOutcome {
    fn event_type(&self) -> &'static str {
        match self {
            Self::SessionOpened => "callback.session_opened",
            Self::FieldCaptured(_) => "callback.field_captured",
            Self::FieldRejected { .. } => "callback.field_rejected",
            Self::PartialResult => "callback.partial_result",
            Self::CaptureCompleted => "callback.capture_completed",
            Self::CaptureFailed => "callback.capture_failed",
            Self::SessionMissing => "callback.session_missing",
            Self::UnknownOperation(_) => "callback.unknown_operation",
        }
    }

    fn audit_outcome(&self) -> AuditOutcome {
        match self {
            Self::SessionOpened
            | Self::FieldCaptured(_)
            | Self::PartialResult
            | Self::CaptureCompleted => AuditOutcome::Success,
            Self::FieldRejected { .. } => AuditOutcome::Rejected,
            Self::CaptureFailed => AuditOutcome::Failed,
            Self::SessionMissing | Self::UnknownOperation(_) => AuditOutcome::Ignored,
        }
    }
}

pub struct CallbackProcessor {
    store: Arc<PaymentSessionStore>,
    audit: Arc<dyn AuditSink>,
}

impl CallbackProcessor {
    pub fn new(store: Arc<PaymentSessionStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    pub fn process(&self, notification: CallbackNotification) -> CallbackOutcome {
        let outcome = self.apply(&notification);

        info!(
            event_name = "payment.callback.processed",
            call_sid = %notification.call_sid,
            payment_sid = %notification.payment_sid,
            operation = %notification.operation,
            outcome = outcome.event_type(),
            "vendor callback processed"
        );

        let mut event = AuditEvent::new(
            Some(notification.call_sid.clone()),
            Some(notification.payment_sid.clone()),
            outcome.event_type(),
            AuditCategory::Callback,
            AUDIT_ACTOR,
            outcome.audit_outcome(),
        )
        .with_metadata("operation", notification.operation.discriminator());
        if let Some(message) = &notification.error_message {
            event = event.with_metadata("error_message", message.as_str());
        }
        self.audit.emit(event);

        outcome
    }

    fn apply(&self, notification: &CallbackNotification) -> CallbackOutcome {
        let call_sid = notification.call_sid.as_str();
        let payment_sid = notification.payment_sid.as_str();

        if let CallbackOperation::Unknown(raw) = &notification.operation {
            warn!(
                event_name = "payment.callback.unknown_operation",
                call_sid,
                payment_sid,
                operation = %raw,
                "unrecognized callback discriminator; ignoring"
            );
            return CallbackOutcome::UnknownOperation(raw.clone());
        }

        if notification.operation == CallbackOperation::StartCapture {
            self.store.create_session(call_sid, payment_sid);
            self.store.update_session_status(call_sid, payment_sid, SessionStatus::InProgress, None);
        }

        if self
            .store
            .record_snapshot(call_sid, payment_sid, notification.snapshot.clone())
            .is_none()
        {
            return CallbackOutcome::SessionMissing;
        }

        match &notification.operation {
            CallbackOperation::StartCapture => CallbackOutcome::SessionOpened,
            CallbackOperation::Field(_) | CallbackOperation::FinishCapture if notification.partial => {
                CallbackOutcome::PartialResult
            }
            CallbackOperation::Field(field) => self.apply_field(notification, *field),
            CallbackOperation::FinishCapture => self.apply_finish(notification),
            CallbackOperation::Unknown(raw) => CallbackOutcome::UnknownOperation(raw.clone()),
        }
    }

    fn apply_field(&self, notification: &CallbackNotification, field: PaymentField) -> CallbackOutcome {
        let call_sid = notification.call_sid.as_str();
        let payment_sid = notification.payment_sid.as_str();

        let updated = match notification.result {
            CaptureResult::Error => {
                let reason = notification
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("Error capturing {}", field.label()));
                self.store.modify_field(call_sid, payment_sid, field, |current| {
                    FieldUpdate::rejected(reason, current.attempts.saturating_add(1))
                })
            }
            CaptureResult::Success => self.store.update_field_state(
                call_sid,
                payment_sid,
                field,
                FieldUpdate::captured(notification.masked_value(field)),
            ),
        };

        match (updated, notification.result) {
            (None, _) => CallbackOutcome::SessionMissing,
            (Some(session), CaptureResult::Error) => {
                CallbackOutcome::FieldRejected { field, attempts: session.field(field).attempts }
            }
            (Some(_), CaptureResult::Success) => CallbackOutcome::FieldCaptured(field),
        }
    }

    fn apply_finish(&self, notification: &CallbackNotification) -> CallbackOutcome {
        let call_sid = notification.call_sid.as_str();
        let payment_sid = notification.payment_sid.as_str();

        match notification.result {
            CaptureResult::Error => {
                let message = notification
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Error completing payment capture".to_string());
                match self.store.update_session_status(
                    call_sid,
                    payment_sid,
                    SessionStatus::Error,
                    Some(message),
                ) {
                    Some(_) => CallbackOutcome::CaptureFailed,
                    None => CallbackOutcome::SessionMissing,
                }
            }
            CaptureResult::Success => {
                let token = notification.snapshot.payment_token.clone().unwrap_or_default();
                match self.store.set_payment_token(call_sid, payment_sid, token) {
                    Some(_) => CallbackOutcome::CaptureCompleted,
                    None => CallbackOutcome::SessionMissing,
                }
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
