//! Agent-facing narration derived from a payment session.
//!
//! [`render`] is a pure function of the session snapshot; the same session
//! always yields the same text. Precedence: error, completion, re-entry of the
//! first rejected field in canonical order, next incomplete field, finish.

use std::fmt::Write as _;

use crate::payment::{PaymentField, PaymentSessionState, SessionStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NarrationStep {
    Error,
    Completion,
    Reentry(PaymentField),
    Capture(PaymentField),
    Finish,
}

impl NarrationStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Completion => "completion",
            Self::Reentry(_) => "reentry",
            Self::Capture(_) => "capture",
            Self::Finish => "finish",
        }
    }
}

pub fn next_step(session: &PaymentSessionState) -> NarrationStep {
    match session.status {
        SessionStatus::Error => return NarrationStep::Error,
        SessionStatus::Complete => return NarrationStep::Completion,
        SessionStatus::Initialized | SessionStatus::InProgress => {}
    }
    if let Some(field) = session.first_reentry() {
        return NarrationStep::Reentry(field);
    }
    match session.next_incomplete() {
        Some(field) => NarrationStep::Capture(field),
        None => NarrationStep::Finish,
    }
}

pub fn render(session: &PaymentSessionState) -> String {
    match next_step(session) {
        NarrationStep::Error => render_error(session),
        NarrationStep::Completion => render_completion(session),
        NarrationStep::Reentry(field) => render_reentry(session, field),
        NarrationStep::Capture(field) => render_capture(session, field),
        NarrationStep::Finish => render_finish(session),
    }
}

struct FieldCopy {
    tool: &'static str,
    ask: &'static str,
    dialogue: &'static str,
    reentry_tip: &'static str,
}

fn copy_for(field: PaymentField) -> FieldCopy {
    match field {
        PaymentField::CardNumber => FieldCopy {
            tool: "captureCardNumber",
            ask: "Ask the customer to enter their card number on the keypad",
            dialogue: "Please enter your card number using your phone keypad. I'll wait while you enter it.",
            reentry_tip: "Suggest they check the card number carefully before entering it again",
        },
        PaymentField::SecurityCode => FieldCopy {
            tool: "captureSecurityCode",
            ask: "Ask the customer to enter the 3 or 4 digit security code from their card",
            dialogue: "Now please enter the security code from your card. For most cards it is the 3 digits on the back.",
            reentry_tip: "American Express cards carry a 4 digit code on the front",
        },
        PaymentField::ExpirationDate => FieldCopy {
            tool: "captureExpirationDate",
            ask: "Ask the customer to enter the expiration date as MM/YY",
            dialogue: "Finally, please enter your card's expiration date as month and year, for example 05/27.",
            reentry_tip: "Check whether the card has already expired",
        },
    }
}

/// Masked values captured so far, in canonical order, stopping before `until`.
fn captured_lines(session: &PaymentSessionState, until: Option<PaymentField>) -> String {
    let mut lines = String::new();
    for field in PaymentField::CANONICAL_ORDER {
        if Some(field) == until {
            break;
        }
        let state = session.field(field);
        if state.complete {
            let _ = writeln!(lines, "- {}: {}", title(field), state.masked);
        }
    }
    lines
}

fn title(field: PaymentField) -> &'static str {
    match field {
        PaymentField::CardNumber => "Card Number",
        PaymentField::SecurityCode => "Security Code",
        PaymentField::ExpirationDate => "Expiration Date",
    }
}

fn status_block(session: &PaymentSessionState, until: Option<PaymentField>) -> String {
    format!(
        "## Current Status\n- Call SID: {}\n- Payment SID: {}\n{}- Status: {}\n",
        session.call_sid,
        session.payment_sid,
        captured_lines(session, until),
        session.status
    )
}

fn render_capture(session: &PaymentSessionState, field: PaymentField) -> String {
    let copy = copy_for(field);
    format!(
        "# Payment Card Capture: {title}\n\n{status}\n## Next Step: Capture {title}\n\n\
         1. {ask}\n\
         2. Use the '{tool}' tool with callSid and paymentSid\n\
         3. Read the 'payment://{call}/{payment}/status' resource until the field shows as captured\n\n\
         Example dialogue:\n\"{dialogue}\"\n\n\
         ## Important Notes\n\
         - The {label} is collected by the telephony provider and is never visible to you\n\
         - If the customer makes a mistake, use the 'resetPaymentField' tool with field '{name}'\n",
        title = title(field),
        status = status_block(session, Some(field)),
        ask = copy.ask,
        tool = copy.tool,
        call = session.call_sid,
        payment = session.payment_sid,
        dialogue = copy.dialogue,
        label = field.label(),
        name = field.as_str(),
    )
}

fn render_reentry(session: &PaymentSessionState, field: PaymentField) -> String {
    let copy = copy_for(field);
    let state = session.field(field);
    let reason = state.reentry_reason.as_deref().unwrap_or("The value could not be validated");
    format!(
        "# Payment Card Capture: {title} Re-entry Required\n\n\
         There was an issue with the {label} provided.\n\n{status}\
         - Issue: {reason}\n\
         - Attempts: {attempts}\n\n\
         ## Next Step: Re-capture {title}\n\n\
         1. Tell the customer there was a problem with the {label}\n\
         2. Use the 'resetPaymentField' tool with field '{name}'\n\
         3. Then use the '{tool}' tool to collect it again\n\n\
         Example dialogue:\n\"I'm sorry, there was a problem with the {label}: {reason}. Could you enter it again?\"\n\n\
         ## Important Notes\n\
         - {tip}\n",
        title = title(field),
        label = field.label(),
        status = status_block(session, Some(field)),
        reason = reason,
        attempts = state.attempts,
        name = field.as_str(),
        tool = copy.tool,
        tip = copy.reentry_tip,
    )
}

fn render_finish(session: &PaymentSessionState) -> String {
    format!(
        "# Payment Card Capture: Complete Process\n\n\
         All card details have been captured.\n\n{status}\n\
         ## Next Step: Complete Payment Capture\n\n\
         1. Tell the customer all details have been collected\n\
         2. Use the 'completePaymentCapture' tool to finalize the payment\n\
         3. Read the payment status resource until the payment token is available\n\n\
         Example dialogue:\n\"Thank you, I have everything I need. I'm completing the payment now.\"\n",
        status = status_block(session, None),
    )
}

fn render_completion(session: &PaymentSessionState) -> String {
    let token = session.token.as_deref().filter(|token| !token.is_empty());
    let masked = &session.card_number.masked;
    let last_four: String = {
        let count = masked.chars().count();
        masked.chars().skip(count.saturating_sub(4)).collect()
    };
    format!(
        "# Payment Card Capture: Successfully Completed\n\n{status}\
         - Payment Token: {token}\n\n\
         ## Next Steps\n\n\
         1. Tell the customer their payment details were processed and stored securely\n\
         2. Continue with the rest of the conversation\n\
         3. Keep the payment token for future transactions\n\n\
         Example dialogue:\n\"Thank you! Your card ending in {last_four} has been securely stored for this transaction.\"\n",
        status = status_block(session, None),
        token = token.unwrap_or("Generated (masked for security)"),
        last_four = last_four,
    )
}

fn render_error(session: &PaymentSessionState) -> String {
    let message = session.error_message.as_deref().unwrap_or("Unknown error");
    format!(
        "# Payment Card Capture: Error\n\n\
         An error occurred during the payment capture process.\n\n\
         ## Current Status\n- Call SID: {call}\n- Payment SID: {payment}\n- Status: {status}\n- Error: {message}\n\n\
         ## Next Steps\n\n\
         1. Tell the customer about the issue\n\
         2. Offer to restart the payment capture\n\
         3. Use the 'startPaymentCapture' tool to begin a new session\n\n\
         Example dialogue:\n\"I'm sorry, we ran into a problem processing your payment details: {message}. Would you like to try again?\"\n",
        call = session.call_sid,
        payment = session.payment_sid,
        status = session.status,
        message = message,
    )
}

/// Guidance shown before any payment session exists for the call.
pub fn render_start(call_sid: &str) -> String {
    format!(
        "# Payment Card Capture Process\n\n\
         I'll guide you through capturing the customer's payment card securely.\n\n\
         Call SID: {call_sid}\n\n\
         ## Next Step: Start Payment Capture\n\n\
         1. Ask the customer if they're ready to provide their payment card\n\
         2. Explain that their card details are collected by keypad and tokenized\n\
         3. Use the 'startPaymentCapture' tool with this callSid\n\
         4. After every capture step, read the 'payment://{{callSid}}/{{paymentSid}}/status' resource before moving on\n\n\
         Example dialogue:\n\"I'll need to collect your payment card now. Your details are processed securely and never shared with me. Are you ready?\"\n\n\
         ## Important Notes\n\
         - Capture is asynchronous; always check the status after each tool call\n\
         - Do not move to the next field until the current one shows as captured\n"
    )
}

pub fn capture_guide(field: PaymentField) -> String {
    let copy = copy_for(field);
    format!(
        "# Capturing the {label}\n\n\
         1. {ask}\n\
         2. Use the '{tool}' tool with callSid and paymentSid\n\
         3. Check the payment status resource; if the field needs re-entry, use 'resetPaymentField' with field '{name}' and try again\n\n\
         Example dialogue:\n\"{dialogue}\"\n",
        label = field.label(),
        ask = copy.ask,
        tool = copy.tool,
        name = field.as_str(),
        dialogue = copy.dialogue,
    )
}

pub fn finish_guide() -> String {
    "# Finishing the payment capture\n\n\
     1. Confirm the card number, security code and expiration date all show as captured\n\
     2. Use the 'completePaymentCapture' tool with callSid and paymentSid\n\
     3. Check the payment status resource for the payment token\n"
        .to_string()
}

pub fn completion_guide() -> String {
    "# Payment capture completed\n\n\
     1. Thank the customer and confirm the card was stored securely\n\
     2. Refer to the card only by its last four digits\n\
     3. Keep the payment token for the rest of the workflow\n"
        .to_string()
}

pub fn error_guide() -> String {
    "# Handling payment capture errors\n\n\
     - Read the payment status resource to see which step failed\n\
     - For a rejected field, use 'resetPaymentField' and capture it again\n\
     - For a failed completion, apologise and offer to restart with 'startPaymentCapture'\n\n\
     Example dialogue:\n\"I'm sorry, there was an issue processing that information. Let's try again.\"\n"
        .to_string()
}
