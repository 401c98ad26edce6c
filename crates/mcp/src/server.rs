//! MCP server exposing payment capture tools, the status resource and prompts.

use std::sync::Arc;

use agentpay_core::audit::AuditSink;
use agentpay_core::errors::CaptureError;
use agentpay_core::gateway::VendorGateway;
use agentpay_core::payment::{PaymentField, PaymentSessionStore};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    service::RequestContext,
    tool, tool_handler, tool_router, ErrorData as McpError, RoleServer, ServerHandler,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::prompts::{self, PromptError};
use crate::resources::{self, STATUS_MIME_TYPE, STATUS_RESOURCE_NAME, STATUS_URI_TEMPLATE};
use crate::tools::{
    audit_event, failure, success, validate_sid, PaymentInput, ResetFieldInput, StartCaptureInput,
    CAPTURE_CARD_NUMBER, CAPTURE_EXPIRATION_DATE, CAPTURE_SECURITY_CODE,
    COMPLETE_PAYMENT_CAPTURE, RESET_PAYMENT_FIELD, START_PAYMENT_CAPTURE,
};

#[derive(Clone)]
pub struct AgentPaymentMcpServer {
    store: Arc<PaymentSessionStore>,
    gateway: Arc<VendorGateway>,
    audit: Arc<dyn AuditSink>,
    tool_router: ToolRouter<Self>,
}

impl AgentPaymentMcpServer {
    pub fn new(
        store: Arc<PaymentSessionStore>,
        gateway: Arc<VendorGateway>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { store, gateway, audit, tool_router: Self::tool_router() }
    }

    pub fn store(&self) -> &Arc<PaymentSessionStore> {
        &self.store
    }

    /// Reads the status resource for one payment.
    pub fn payment_status(
        &self,
        call_sid: &str,
        payment_sid: &str,
    ) -> Result<ReadResourceResult, McpError> {
        let uri = resources::status_uri(call_sid, payment_sid);
        let Some(view) = resources::payment_status(&self.store, call_sid, payment_sid) else {
            warn!(
                event_name = "mcp.resource.not_found",
                call_sid,
                payment_sid,
                "payment status requested for unknown payment"
            );
            return Err(McpError::resource_not_found(
                format!("payment session state not found for {payment_sid}"),
                Some(json!({ "uri": uri })),
            ));
        };

        let text = serde_json::to_string_pretty(&view)
            .map_err(|error| McpError::internal_error(error.to_string(), None))?;
        let mut contents = ResourceContents::text(text, uri);
        if let ResourceContents::TextResourceContents { mime_type, .. } = &mut contents {
            *mime_type = Some(STATUS_MIME_TYPE.to_string());
        }
        Ok(ReadResourceResult { contents: vec![contents] })
    }

    pub fn render_prompt(
        &self,
        name: &str,
        arguments: Option<&JsonObject>,
    ) -> Result<GetPromptResult, McpError> {
        prompts::render(&self.store, name, arguments).map_err(|error| match error {
            PromptError::UnknownPrompt(_) | PromptError::MissingArgument { .. } => {
                McpError::invalid_params(error.to_string(), None)
            }
            PromptError::SessionNotFound { .. } => McpError::resource_not_found(error.to_string(), None),
        })
    }

    fn require_session(&self, call_sid: &str, payment_sid: &str) -> Result<(), CaptureError> {
        validate_sid("callSid", call_sid)?;
        validate_sid("paymentSid", payment_sid)?;
        match self.store.get_session(call_sid, payment_sid) {
            Some(_) => Ok(()),
            None => Err(CaptureError::SessionNotFound {
                call_sid: call_sid.to_string(),
                payment_sid: payment_sid.to_string(),
            }),
        }
    }

    fn finish(
        &self,
        tool: &str,
        call_sid: &str,
        payment_sid: Option<&str>,
        outcome: Result<serde_json::Value, CaptureError>,
    ) -> CallToolResult {
        self.audit.emit(audit_event(tool, call_sid, payment_sid, outcome.as_ref().map(|_| ())));
        match outcome {
            Ok(body) => {
                info!(
                    event_name = "mcp.tool.succeeded",
                    tool,
                    call_sid,
                    payment_sid = payment_sid.unwrap_or("-"),
                    "tool call succeeded"
                );
                success(body)
            }
            Err(error) => {
                warn!(
                    event_name = "mcp.tool.failed",
                    tool,
                    call_sid,
                    payment_sid = payment_sid.unwrap_or("-"),
                    error_class = error.error_class(),
                    error = %error,
                    "tool call failed"
                );
                failure(tool, &error)
            }
        }
    }

    async fn capture_field(&self, tool: &str, input: PaymentInput, field: PaymentField) -> CallToolResult {
        let PaymentInput { call_sid, payment_sid } = input;
        debug!(
            event_name = "mcp.tool.called",
            tool,
            call_sid = %call_sid,
            payment_sid = %payment_sid,
            "capture tool called"
        );

        let outcome = match self.require_session(&call_sid, &payment_sid) {
            Ok(()) => self
                .gateway
                .update_capture_field(&call_sid, &payment_sid, field)
                .await
                .map(|_| json!({ "success": true, "field": field.as_str() }))
                .map_err(CaptureError::from),
            Err(error) => Err(error),
        };
        self.finish(tool, &call_sid, Some(&payment_sid), outcome)
    }
}

#[tool_router]
impl AgentPaymentMcpServer {
    #[tool(name = "startPaymentCapture", description = "Start a new payment capture session")]
    pub async fn start_payment_capture(
        &self,
        Parameters(input): Parameters<StartCaptureInput>,
    ) -> Result<CallToolResult, McpError> {
        let call_sid = input.call_sid;
        debug!(
            event_name = "mcp.tool.called",
            tool = START_PAYMENT_CAPTURE,
            call_sid = %call_sid,
            "start capture called"
        );

        let outcome = match validate_sid("callSid", &call_sid) {
            Ok(()) => match self.gateway.start_capture(&call_sid).await {
                Ok(handle) => {
                    // The start callback may already have opened the session.
                    self.store.open_session(&call_sid, &handle.sid);
                    Ok(handle.sid)
                }
                Err(error) => Err(CaptureError::from(error)),
            },
            Err(error) => Err(error),
        };

        let payment_sid = outcome.as_ref().ok().cloned();
        Ok(self.finish(
            START_PAYMENT_CAPTURE,
            &call_sid,
            payment_sid.as_deref(),
            outcome.map(|payment_sid| json!({ "paymentSid": payment_sid })),
        ))
    }

    #[tool(name = "captureCardNumber", description = "Start capturing the payment card number")]
    pub async fn capture_card_number(
        &self,
        Parameters(input): Parameters<PaymentInput>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.capture_field(CAPTURE_CARD_NUMBER, input, PaymentField::CardNumber).await)
    }

    #[tool(name = "captureSecurityCode", description = "Start capturing the payment card security code")]
    pub async fn capture_security_code(
        &self,
        Parameters(input): Parameters<PaymentInput>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.capture_field(CAPTURE_SECURITY_CODE, input, PaymentField::SecurityCode).await)
    }

    #[tool(name = "captureExpirationDate", description = "Start capturing the payment card expiration date")]
    pub async fn capture_expiration_date(
        &self,
        Parameters(input): Parameters<PaymentInput>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.capture_field(CAPTURE_EXPIRATION_DATE, input, PaymentField::ExpirationDate).await)
    }

    #[tool(name = "completePaymentCapture", description = "Complete a payment capture session")]
    pub async fn complete_payment_capture(
        &self,
        Parameters(input): Parameters<PaymentInput>,
    ) -> Result<CallToolResult, McpError> {
        let PaymentInput { call_sid, payment_sid } = input;

        let outcome = match self.require_session(&call_sid, &payment_sid) {
            Ok(()) => match self.gateway.finish_capture(&call_sid, &payment_sid).await {
                // The token normally arrives with the finish callback; report it if already known.
                Ok(_) => {
                    let token = self
                        .store
                        .get_session(&call_sid, &payment_sid)
                        .and_then(|session| session.token);
                    Ok(json!({ "success": true, "token": token }))
                }
                Err(error) => Err(CaptureError::from(error)),
            },
            Err(error) => Err(error),
        };
        Ok(self.finish(COMPLETE_PAYMENT_CAPTURE, &call_sid, Some(&payment_sid), outcome))
    }

    #[tool(
        name = "resetPaymentField",
        description = "Reset a payment field so it can be captured again after the customer made a mistake"
    )]
    pub async fn reset_payment_field(
        &self,
        Parameters(input): Parameters<ResetFieldInput>,
    ) -> Result<CallToolResult, McpError> {
        let ResetFieldInput { call_sid, payment_sid, field } = input;

        let outcome = validate_sid("callSid", &call_sid)
            .and_then(|()| validate_sid("paymentSid", &payment_sid))
            .and_then(|()| {
                field.parse::<PaymentField>().map_err(|error| CaptureError::InvalidInput(error.to_string()))
            })
            .and_then(|field| {
                self.store
                    .reset_field(&call_sid, &payment_sid, field)
                    .map(|session| {
                        json!({
                            "success": true,
                            "field": field.as_str(),
                            "attempts": session.field(field).attempts,
                        })
                    })
                    .ok_or_else(|| CaptureError::SessionNotFound {
                        call_sid: call_sid.clone(),
                        payment_sid: payment_sid.clone(),
                    })
            });
        Ok(self.finish(RESET_PAYMENT_FIELD, &call_sid, Some(&payment_sid), outcome))
    }
}

#[tool_handler]
impl ServerHandler for AgentPaymentMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .enable_prompts()
                .enable_logging()
                .build(),
            server_info: Implementation {
                name: "agentpay-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Agent-assisted payment card capture. Start with the StartCapture prompt, call \
                 startPaymentCapture, then capture each card field and read the \
                 payment://{callSid}/{paymentSid}/status resource after every step."
                    .to_string(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult { resources: Vec::new(), next_cursor: None })
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        let template = serde_json::from_value::<ResourceTemplate>(json!({
            "uriTemplate": STATUS_URI_TEMPLATE,
            "name": STATUS_RESOURCE_NAME,
            "description": "Latest captured state of a payment session",
            "mimeType": STATUS_MIME_TYPE,
        }))
        .map_err(|error| McpError::internal_error(error.to_string(), None))?;

        Ok(ListResourceTemplatesResult { resource_templates: vec![template], next_cursor: None })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let uri = request.uri;
        match resources::parse_status_uri(&uri) {
            Some((call_sid, payment_sid)) => self.payment_status(call_sid, payment_sid),
            None => Err(McpError::resource_not_found(
                format!("unknown resource `{uri}`"),
                Some(json!({ "uri": uri })),
            )),
        }
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        Ok(ListPromptsResult { prompts: prompts::definitions(), next_cursor: None })
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        self.render_prompt(&request.name, request.arguments.as_ref())
    }
}
