use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the sensitive card fields collected during a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaymentField {
    CardNumber,
    SecurityCode,
    ExpirationDate,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown payment field `{0}` (expected cardNumber|securityCode|expirationDate)")]
pub struct UnknownPaymentField(pub String);

impl PaymentField {
    /// Order in which guidance walks the caller through the fields.
    pub const CANONICAL_ORDER: [PaymentField; 3] =
        [PaymentField::CardNumber, PaymentField::SecurityCode, PaymentField::ExpirationDate];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CardNumber => "cardNumber",
            Self::SecurityCode => "securityCode",
            Self::ExpirationDate => "expirationDate",
        }
    }

    /// Identifier the vendor uses for this field in capture requests and callbacks.
    pub fn capture_type(self) -> &'static str {
        match self {
            Self::CardNumber => "payment-card-number",
            Self::SecurityCode => "security-code",
            Self::ExpirationDate => "expiration-date",
        }
    }

    pub fn from_capture_type(raw: &str) -> Option<Self> {
        match raw.trim() {
            "payment-card-number" => Some(Self::CardNumber),
            "security-code" => Some(Self::SecurityCode),
            "expiration-date" => Some(Self::ExpirationDate),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::CardNumber => "card number",
            Self::SecurityCode => "security code",
            Self::ExpirationDate => "expiration date",
        }
    }

    /// Display value used when the vendor confirms a capture without a masked value.
    pub fn placeholder_mask(self) -> &'static str {
        match self {
            Self::CardNumber => "•••• •••• •••• ••••",
            Self::SecurityCode => "•••",
            Self::ExpirationDate => "••/••",
        }
    }
}

impl fmt::Display for PaymentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentField {
    type Err = UnknownPaymentField;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Some(field) = Self::from_capture_type(value) {
            return Ok(field);
        }

        let normalized = value.trim().to_ascii_lowercase().replace(['_', '-', ' '], "");
        match normalized.as_str() {
            "cardnumber" | "paymentcardnumber" => Ok(Self::CardNumber),
            "securitycode" | "cvv" => Ok(Self::SecurityCode),
            "expirationdate" | "expiry" => Ok(Self::ExpirationDate),
            _ => Err(UnknownPaymentField(value.to_string())),
        }
    }
}
