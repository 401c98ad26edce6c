//! REST client for the telephony vendor's agent-assisted payments API.

use async_trait::async_trait;
use agentpay_core::config::VendorConfig;
use agentpay_core::gateway::{
    is_valid_sid, CallStatus, CreatePaymentRequest, PaymentHandle, PaymentUpdate, PaymentsApi,
    UpdatePaymentRequest, VendorError,
};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

const API_VERSION: &str = "2010-04-01";

pub struct TwilioPaymentsClient {
    client: Client,
    base_url: String,
    account_sid: String,
    api_key: SecretString,
    api_secret: SecretString,
}

#[derive(Debug, Default, Deserialize)]
struct VendorErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallResource {
    status: String,
}

impl TwilioPaymentsClient {
    pub fn new(config: &VendorConfig) -> Result<Self, VendorError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|error| VendorError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            account_sid: config.account_sid.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    fn call_url(&self, call_sid: &str) -> Result<String, VendorError> {
        let call_sid = path_segment("callSid", call_sid)?;
        Ok(format!("{}/{API_VERSION}/Accounts/{}/Calls/{call_sid}", self.base_url, self.account_sid))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(self.api_key.expose_secret(), Some(self.api_secret.expose_secret()))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, VendorError> {
        let response = self.authorized(request).send().await.map_err(map_transport)?;
        decode(response).await
    }
}

#[async_trait]
impl PaymentsApi for TwilioPaymentsClient {
    async fn create_payment(&self, request: CreatePaymentRequest) -> Result<PaymentHandle, VendorError> {
        let url = format!("{}/Payments.json", self.call_url(&request.call_sid)?);
        let settings = &request.settings;
        let form = [
            ("IdempotencyKey", request.idempotency_key.clone()),
            ("StatusCallback", request.status_callback.clone()),
            ("TokenType", settings.token_type.clone()),
            ("Currency", settings.currency.clone()),
            ("PaymentConnector", settings.payment_connector.clone()),
            ("SecurityCode", settings.require_security_code.to_string()),
            ("PostalCode", settings.require_postal_code.to_string()),
        ];

        debug!(event_name = "vendor.http.create_payment", call_sid = %request.call_sid, "POST payments");
        self.send(self.client.post(url).form(&form)).await
    }

    async fn update_payment(&self, request: UpdatePaymentRequest) -> Result<PaymentHandle, VendorError> {
        let url = format!(
            "{}/Payments/{}.json",
            self.call_url(&request.call_sid)?,
            path_segment("paymentSid", &request.payment_sid)?
        );
        let mut form = vec![
            ("IdempotencyKey", request.idempotency_key.clone()),
            ("StatusCallback", request.status_callback.clone()),
        ];
        match request.update {
            PaymentUpdate::Capture(field) => form.push(("Capture", field.capture_type().to_string())),
            PaymentUpdate::Complete => form.push(("Status", "complete".to_string())),
        }

        debug!(
            event_name = "vendor.http.update_payment",
            call_sid = %request.call_sid,
            payment_sid = %request.payment_sid,
            "POST payment update"
        );
        self.send(self.client.post(url).form(&form)).await
    }

    async fn fetch_call_status(&self, call_sid: &str) -> Result<CallStatus, VendorError> {
        let url = format!("{}.json", self.call_url(call_sid)?);
        let call: CallResource = self.send(self.client.get(url)).await?;
        Ok(CallStatus(call.status))
    }
}

fn path_segment<'a>(field: &'static str, value: &'a str) -> Result<&'a str, VendorError> {
    if is_valid_sid(value) {
        Ok(value)
    } else {
        Err(VendorError::InvalidIdentifier { field, value: value.to_string() })
    }
}

fn map_transport(error: reqwest::Error) -> VendorError {
    if error.is_timeout() {
        VendorError::Timeout
    } else {
        VendorError::Transport(error.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, VendorError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(|error| {
            if error.is_timeout() {
                VendorError::Timeout
            } else {
                VendorError::Decode(error.to_string())
            }
        });
    }

    let body = response.json::<VendorErrorBody>().await.unwrap_or_default();
    Err(VendorError::Rejected {
        status: status.as_u16(),
        code: body.code,
        message: body.message.unwrap_or_else(|| {
            status.canonical_reason().unwrap_or("unexpected vendor response").to_string()
        }),
    })
}
