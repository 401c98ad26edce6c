use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::field::PaymentField;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub call_sid: String,
    pub payment_sid: String,
}

impl SessionKey {
    pub fn new(call_sid: impl Into<String>, payment_sid: impl Into<String>) -> Self {
        Self { call_sid: call_sid.into(), payment_sid: payment_sid.into() }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.call_sid, self.payment_sid)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Initialized,
    InProgress,
    Complete,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::InProgress => "in-progress",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFieldState {
    pub masked: String,
    pub complete: bool,
    pub needs_reentry: bool,
    pub reentry_reason: Option<String>,
    pub attempts: u32,
}

/// Partial update merged into a [`PaymentFieldState`]. `None` leaves the attribute untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldUpdate {
    pub masked: Option<String>,
    pub complete: Option<bool>,
    pub needs_reentry: Option<bool>,
    pub reentry_reason: Option<Option<String>>,
    pub attempts: Option<u32>,
}

impl FieldUpdate {
    pub fn captured(masked: impl Into<String>) -> Self {
        Self {
            masked: Some(masked.into()),
            complete: Some(true),
            needs_reentry: Some(false),
            reentry_reason: Some(None),
            attempts: None,
        }
    }

    pub fn rejected(reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            masked: None,
            complete: None,
            needs_reentry: Some(true),
            reentry_reason: Some(Some(reason.into())),
            attempts: Some(attempts),
        }
    }
}

impl PaymentFieldState {
    pub fn apply(&mut self, update: FieldUpdate) {
        let flags_reentry = update.needs_reentry == Some(true);

        if let Some(masked) = update.masked {
            self.masked = masked;
        }
        if let Some(complete) = update.complete {
            self.complete = complete;
        }
        if let Some(needs_reentry) = update.needs_reentry {
            self.needs_reentry = needs_reentry;
        }
        if let Some(reason) = update.reentry_reason {
            self.reentry_reason = reason;
        }
        if let Some(attempts) = update.attempts {
            // attempts never move backwards
            self.attempts = self.attempts.max(attempts);
        }

        if flags_reentry {
            self.complete = false;
        } else if self.complete {
            self.needs_reentry = false;
        }
    }

    /// Clears the captured value for another attempt, carrying the attempt counter forward.
    pub fn reset(&mut self) {
        let attempts = self.attempts.saturating_add(1);
        *self = Self { attempts, ..Self::default() };
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSessionState {
    pub call_sid: String,
    pub payment_sid: String,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub card_number: PaymentFieldState,
    pub security_code: PaymentFieldState,
    pub expiration_date: PaymentFieldState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl PaymentSessionState {
    pub fn new(call_sid: impl Into<String>, payment_sid: impl Into<String>) -> Self {
        Self {
            call_sid: call_sid.into(),
            payment_sid: payment_sid.into(),
            status: SessionStatus::Initialized,
            error_message: None,
            card_number: PaymentFieldState::default(),
            security_code: PaymentFieldState::default(),
            expiration_date: PaymentFieldState::default(),
            token: None,
            last_updated: Utc::now(),
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.call_sid.clone(), self.payment_sid.clone())
    }

    pub fn field(&self, field: PaymentField) -> &PaymentFieldState {
        match field {
            PaymentField::CardNumber => &self.card_number,
            PaymentField::SecurityCode => &self.security_code,
            PaymentField::ExpirationDate => &self.expiration_date,
        }
    }

    pub fn field_mut(&mut self, field: PaymentField) -> &mut PaymentFieldState {
        match field {
            PaymentField::CardNumber => &mut self.card_number,
            PaymentField::SecurityCode => &mut self.security_code,
            PaymentField::ExpirationDate => &mut self.expiration_date,
        }
    }

    /// First field in canonical order that the vendor rejected.
    pub fn first_reentry(&self) -> Option<PaymentField> {
        PaymentField::CANONICAL_ORDER.into_iter().find(|field| self.field(*field).needs_reentry)
    }

    /// First field in canonical order that has not been captured yet.
    pub fn next_incomplete(&self) -> Option<PaymentField> {
        PaymentField::CANONICAL_ORDER.into_iter().find(|field| !self.field(*field).complete)
    }
}
