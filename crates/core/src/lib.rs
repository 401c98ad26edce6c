pub mod audit;
pub mod callback;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod narration;
pub mod payment;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use callback::{
    CallbackError, CallbackNotification, CallbackOperation, CallbackOutcome, CallbackPayload,
    CallbackProcessor, CaptureResult,
};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use errors::CaptureError;
pub use gateway::{
    CallStatus, CallbackUrl, CaptureSettings, CreatePaymentRequest, PaymentHandle, PaymentUpdate,
    PaymentsApi, UpdatePaymentRequest, VendorError, VendorGateway,
};
pub use narration::NarrationStep;
pub use payment::{
    FieldUpdate, PaymentField, PaymentFieldState, PaymentSessionState, PaymentSessionStore,
    PaymentSnapshot, SessionKey, SessionStatus,
};
