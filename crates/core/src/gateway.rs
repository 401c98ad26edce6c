//! Outbound capture policy in front of the vendor's payments API.
//!
//! `PaymentsApi` is the wire contract; `VendorGateway` owns idempotency keys,
//! callback URL discrimination, the in-progress precondition and failure
//! logging. Every failure is logged here; callers only map the typed error
//! into their own envelope.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::callback::CallbackOperation;
use crate::config::PaymentConfig;
use crate::payment::PaymentField;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VendorError {
    #[error("vendor request timed out")]
    Timeout,
    #[error("vendor transport failure: {0}")]
    Transport(String),
    #[error("vendor rejected request with status {status}: {message}")]
    Rejected { status: u16, code: Option<i64>, message: String },
    #[error("vendor response could not be decoded: {0}")]
    Decode(String),
    #[error("call {call_sid} is not in progress (status `{status}`)")]
    CallNotActive { call_sid: String, status: String },
    #[error("{field} `{value}` is not a valid vendor identifier")]
    InvalidIdentifier { field: &'static str, value: String },
}

/// Vendor-side payment resource as returned by create/update calls.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentHandle {
    pub sid: String,
    pub call_sid: Option<String>,
    pub account_sid: Option<String>,
    pub date_created: Option<String>,
    pub date_updated: Option<String>,
    pub uri: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallStatus(pub String);

impl CallStatus {
    pub fn is_in_progress(&self) -> bool {
        self.0.eq_ignore_ascii_case("in-progress")
    }
}

/// Deployment-level capture options sent with every new payment session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureSettings {
    pub token_type: String,
    pub currency: String,
    pub payment_connector: String,
    pub require_security_code: bool,
    pub require_postal_code: bool,
}

impl From<&PaymentConfig> for CaptureSettings {
    fn from(config: &PaymentConfig) -> Self {
        Self {
            token_type: config.token_type.clone(),
            currency: config.currency.clone(),
            payment_connector: config.payment_connector.clone(),
            require_security_code: config.require_security_code,
            require_postal_code: config.require_postal_code,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatePaymentRequest {
    pub call_sid: String,
    pub idempotency_key: String,
    pub status_callback: String,
    pub settings: CaptureSettings,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentUpdate {
    Capture(PaymentField),
    Complete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdatePaymentRequest {
    pub call_sid: String,
    pub payment_sid: String,
    pub update: PaymentUpdate,
    pub idempotency_key: String,
    pub status_callback: String,
}

#[async_trait]
pub trait PaymentsApi: Send + Sync {
    async fn create_payment(&self, request: CreatePaymentRequest) -> Result<PaymentHandle, VendorError>;
    async fn update_payment(&self, request: UpdatePaymentRequest) -> Result<PaymentHandle, VendorError>;
    async fn fetch_call_status(&self, call_sid: &str) -> Result<CallStatus, VendorError>;
}

/// Public callback endpoint, discriminated per operation via the `lastCall` query parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackUrl(String);

impl CallbackUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn for_operation(&self, operation: &CallbackOperation) -> String {
        let separator = if self.0.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}{}={}",
            self.0,
            crate::callback::DISCRIMINATOR_PARAM,
            operation.discriminator()
        )
    }
}

pub fn idempotency_key(call_sid: &str, now: DateTime<Utc>) -> String {
    format!("{call_sid}-{}", now.timestamp_millis())
}

const MAX_SID_LEN: usize = 64;

/// Call and payment SIDs end up as request path segments, so only short runs
/// of ASCII alphanumerics qualify.
pub fn is_valid_sid(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_SID_LEN
        && value.bytes().all(|byte| byte.is_ascii_alphanumeric())
}

pub struct VendorGateway {
    api: Arc<dyn PaymentsApi>,
    settings: CaptureSettings,
    callback_url: CallbackUrl,
}

impl VendorGateway {
    pub fn new(api: Arc<dyn PaymentsApi>, settings: CaptureSettings, callback_url: CallbackUrl) -> Self {
        Self { api, settings, callback_url }
    }

    pub fn callback_url(&self) -> &CallbackUrl {
        &self.callback_url
    }

    pub async fn start_capture(&self, call_sid: &str) -> Result<PaymentHandle, VendorError> {
        let request = CreatePaymentRequest {
            call_sid: call_sid.to_string(),
            idempotency_key: idempotency_key(call_sid, Utc::now()),
            status_callback: self.callback_url.for_operation(&CallbackOperation::StartCapture),
            settings: self.settings.clone(),
        };

        match self.api.create_payment(request).await {
            Ok(handle) => {
                info!(
                    event_name = "vendor.capture.started",
                    call_sid,
                    payment_sid = %handle.sid,
                    "payment capture session created"
                );
                Ok(handle)
            }
            Err(vendor_error) => {
                log_failure("start_capture", call_sid, None, &vendor_error);
                Err(vendor_error)
            }
        }
    }

    pub async fn update_capture_field(
        &self,
        call_sid: &str,
        payment_sid: &str,
        field: PaymentField,
    ) -> Result<PaymentHandle, VendorError> {
        if let Err(precondition) = self.ensure_call_active(call_sid).await {
            log_failure("update_capture_field", call_sid, Some(payment_sid), &precondition);
            return Err(precondition);
        }

        let request = UpdatePaymentRequest {
            call_sid: call_sid.to_string(),
            payment_sid: payment_sid.to_string(),
            update: PaymentUpdate::Capture(field),
            idempotency_key: idempotency_key(call_sid, Utc::now()),
            status_callback: self.callback_url.for_operation(&CallbackOperation::Field(field)),
        };

        match self.api.update_payment(request).await {
            Ok(handle) => {
                info!(
                    event_name = "vendor.capture.field_requested",
                    call_sid,
                    payment_sid,
                    field = field.capture_type(),
                    "vendor asked to collect payment field"
                );
                Ok(handle)
            }
            Err(vendor_error) => {
                log_failure("update_capture_field", call_sid, Some(payment_sid), &vendor_error);
                Err(vendor_error)
            }
        }
    }

    pub async fn finish_capture(
        &self,
        call_sid: &str,
        payment_sid: &str,
    ) -> Result<PaymentHandle, VendorError> {
        let request = UpdatePaymentRequest {
            call_sid: call_sid.to_string(),
            payment_sid: payment_sid.to_string(),
            update: PaymentUpdate::Complete,
            idempotency_key: idempotency_key(call_sid, Utc::now()),
            status_callback: self.callback_url.for_operation(&CallbackOperation::FinishCapture),
        };

        match self.api.update_payment(request).await {
            Ok(handle) => {
                info!(
                    event_name = "vendor.capture.finish_requested",
                    call_sid,
                    payment_sid,
                    "vendor asked to complete payment capture"
                );
                Ok(handle)
            }
            Err(vendor_error) => {
                log_failure("finish_capture", call_sid, Some(payment_sid), &vendor_error);
                Err(vendor_error)
            }
        }
    }

    async fn ensure_call_active(&self, call_sid: &str) -> Result<(), VendorError> {
        let status = self.api.fetch_call_status(call_sid).await?;
        if status.is_in_progress() {
            Ok(())
        } else {
            Err(VendorError::CallNotActive { call_sid: call_sid.to_string(), status: status.0 })
        }
    }
}

fn log_failure(operation: &'static str, call_sid: &str, payment_sid: Option<&str>, failure: &VendorError) {
    let payment_sid = payment_sid.unwrap_or("-");
    match failure {
        VendorError::CallNotActive { .. } => warn!(
            event_name = "vendor.capture.call_not_active",
            operation,
            call_sid,
            payment_sid,
            error = %failure,
            "skipping vendor call for inactive call"
        ),
        _ => error!(
            event_name = "vendor.capture.failed",
            operation,
            call_sid,
            payment_sid,
            error = %failure,
            "vendor capture request failed"
        ),
    }
}
