//! Static prompt registry. Each prompt renders text from `agentpay_core::narration`.

use agentpay_core::narration;
use agentpay_core::payment::{PaymentField, PaymentSessionStore};
use rmcp::model::{GetPromptResult, JsonObject, Prompt, PromptMessage, PromptMessageRole};
use serde_json::json;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptKind {
    StartCapture,
    PaymentGuidance,
    CardNumber,
    SecurityCode,
    ExpirationDate,
    FinishCapture,
    Completion,
    Error,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("unknown prompt `{0}`")]
    UnknownPrompt(String),
    #[error("prompt `{prompt}` requires the `{argument}` argument")]
    MissingArgument { prompt: &'static str, argument: &'static str },
    #[error("no payment session for call {call_sid} and payment {payment_sid}")]
    SessionNotFound { call_sid: String, payment_sid: String },
}

impl PromptKind {
    pub const ALL: [PromptKind; 8] = [
        PromptKind::StartCapture,
        PromptKind::PaymentGuidance,
        PromptKind::CardNumber,
        PromptKind::SecurityCode,
        PromptKind::ExpirationDate,
        PromptKind::FinishCapture,
        PromptKind::Completion,
        PromptKind::Error,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::StartCapture => "StartCapture",
            Self::PaymentGuidance => "PaymentGuidance",
            Self::CardNumber => "CardNumber",
            Self::SecurityCode => "SecurityCode",
            Self::ExpirationDate => "ExpirationDate",
            Self::FinishCapture => "FinishCapture",
            Self::Completion => "Completion",
            Self::Error => "Error",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::StartCapture => "Prompt for starting the payment capture process",
            Self::PaymentGuidance => "Next step for an in-flight payment capture, derived from its current state",
            Self::CardNumber => "Prompt for capturing the card number",
            Self::SecurityCode => "Prompt for capturing the card security code",
            Self::ExpirationDate => "Prompt for capturing the card expiration date",
            Self::FinishCapture => "Prompt for completing the payment capture",
            Self::Completion => "Prompt for a completed payment capture",
            Self::Error => "Prompt for recovering from payment capture errors",
        }
    }

    fn arguments(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::StartCapture => &[("callSid", "The Twilio Call SID")],
            Self::PaymentGuidance => {
                &[("callSid", "The Twilio Call SID"), ("paymentSid", "The Twilio Payment SID")]
            }
            _ => &[],
        }
    }

    pub fn definition(self) -> Prompt {
        let arguments: Vec<_> = self
            .arguments()
            .iter()
            .map(|(name, description)| json!({ "name": name, "description": description, "required": true }))
            .collect();
        let mut value = json!({ "name": self.name(), "description": self.description() });
        if !arguments.is_empty() {
            value["arguments"] = json!(arguments);
        }
        serde_json::from_value(value).unwrap_or_else(|_| {
            Prompt::new(self.name(), Some(self.description()), None)
        })
    }
}

pub fn definitions() -> Vec<Prompt> {
    PromptKind::ALL.into_iter().map(PromptKind::definition).collect()
}

pub fn render(
    store: &PaymentSessionStore,
    name: &str,
    arguments: Option<&JsonObject>,
) -> Result<GetPromptResult, PromptError> {
    let kind = PromptKind::from_name(name).ok_or_else(|| PromptError::UnknownPrompt(name.to_string()))?;

    let text = match kind {
        PromptKind::StartCapture => {
            let call_sid = required(kind, arguments, "callSid")?;
            narration::render_start(call_sid)
        }
        PromptKind::PaymentGuidance => {
            let call_sid = required(kind, arguments, "callSid")?;
            let payment_sid = required(kind, arguments, "paymentSid")?;
            let session = store.get_session(call_sid, payment_sid).ok_or_else(|| {
                PromptError::SessionNotFound {
                    call_sid: call_sid.to_string(),
                    payment_sid: payment_sid.to_string(),
                }
            })?;
            narration::render(&session)
        }
        PromptKind::CardNumber => narration::capture_guide(PaymentField::CardNumber),
        PromptKind::SecurityCode => narration::capture_guide(PaymentField::SecurityCode),
        PromptKind::ExpirationDate => narration::capture_guide(PaymentField::ExpirationDate),
        PromptKind::FinishCapture => narration::finish_guide(),
        PromptKind::Completion => narration::completion_guide(),
        PromptKind::Error => narration::error_guide(),
    };

    Ok(GetPromptResult {
        description: Some(kind.description().to_string()),
        messages: vec![PromptMessage::new_text(PromptMessageRole::Assistant, text)],
    })
}

fn required<'a>(
    kind: PromptKind,
    arguments: Option<&'a JsonObject>,
    argument: &'static str,
) -> Result<&'a str, PromptError> {
    arguments
        .and_then(|arguments| arguments.get(argument))
        .and_then(|value| value.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(PromptError::MissingArgument { prompt: kind.name(), argument })
}
