use serde::{Deserialize, Serialize};

/// Latest vendor-reported view of a payment, assembled from callbacks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSnapshot {
    pub payment_card_number: Option<String>,
    pub payment_card_type: Option<String>,
    pub security_code: Option<String>,
    pub expiration_date: Option<String>,
    pub payment_confirmation_code: Option<String>,
    pub result: Option<String>,
    pub profile_id: Option<String>,
    pub payment_token: Option<String>,
    pub payment_method: Option<String>,
    pub capture: Option<String>,
    pub required: Option<String>,
    pub partial_result: Option<bool>,
}

impl PaymentSnapshot {
    /// Overlays every value present in `newer` on top of this snapshot.
    pub fn merge(&mut self, newer: PaymentSnapshot) {
        overlay(&mut self.payment_card_number, newer.payment_card_number);
        overlay(&mut self.payment_card_type, newer.payment_card_type);
        overlay(&mut self.security_code, newer.security_code);
        overlay(&mut self.expiration_date, newer.expiration_date);
        overlay(&mut self.payment_confirmation_code, newer.payment_confirmation_code);
        overlay(&mut self.result, newer.result);
        overlay(&mut self.profile_id, newer.profile_id);
        overlay(&mut self.payment_token, newer.payment_token);
        overlay(&mut self.payment_method, newer.payment_method);
        overlay(&mut self.capture, newer.capture);
        overlay(&mut self.required, newer.required);
        if newer.partial_result.is_some() {
            self.partial_result = newer.partial_result;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn overlay(target: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
        *target = Some(value);
    }
}
