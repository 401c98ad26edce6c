pub mod field;
pub mod session;
pub mod snapshot;
pub mod store;

pub use field::{PaymentField, UnknownPaymentField};
pub use session::{FieldUpdate, PaymentFieldState, PaymentSessionState, SessionKey, SessionStatus};
pub use snapshot::PaymentSnapshot;
pub use store::PaymentSessionStore;
