//! Model Context Protocol surface for agent-assisted payment card capture.
//!
//! An AI agent on a live call drives the capture through tools
//! (`startPaymentCapture`, one tool per card field, `completePaymentCapture`,
//! `resetPaymentField`), polls the `payment://{callSid}/{paymentSid}/status`
//! resource, and asks the prompts for what to say next. Card data never passes
//! through this server: the telephony vendor collects it from the caller's
//! keypad and only masked values come back through status callbacks.
//!
//! ## Example Usage
//!
//! ```no_run
//! use agentpay_core::config::LoadOptions;
//! use agentpay_mcp::AgentPaymentMcpServer;
//! use rmcp::ServiceExt;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let app = agentpay_server::bootstrap(LoadOptions::default()).await?;
//!     let server = AgentPaymentMcpServer::new(app.store.clone(), app.gateway.clone(), app.audit.clone());
//!     server.serve(rmcp::transport::stdio()).await?.waiting().await?;
//!     app.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod prompts;
pub mod resources;
mod server;
pub mod tools;

pub use prompts::{PromptError, PromptKind};
pub use resources::{parse_status_uri, status_uri, PaymentStatusView, STATUS_URI_TEMPLATE};
pub use server::AgentPaymentMcpServer;
pub use tools::ALL_TOOL_NAMES;
