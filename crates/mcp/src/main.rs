//! agentpay MCP server binary.
//!
//! ## Usage
//!
//! ```bash
//! # Credentials from agentpay.toml or AGENTPAY_VENDOR_* variables
//! agentpay-mcp
//!
//! # Credentials as positional arguments
//! agentpay-mcp ACxxxxxxxx SKxxxxxxxx your-api-secret
//!
//! # Explicit config file
//! agentpay-mcp --config /etc/agentpay/agentpay.toml
//! ```

use std::path::PathBuf;

use agentpay_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use agentpay_mcp::AgentPaymentMcpServer;
use anyhow::{Context, Result};
use clap::Parser;
use rmcp::ServiceExt;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "agentpay-mcp", version, about = "MCP server for agent-assisted payment card capture")]
struct Args {
    /// Vendor account SID (AC...)
    account_sid: Option<String>,
    /// Vendor API key SID
    api_key: Option<String>,
    /// Vendor API key secret
    api_secret: Option<String>,
    /// Path to agentpay.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Port for vendor status callbacks (0 picks a free port)
    #[arg(long)]
    callback_port: Option<u16>,
    /// Public base URL the vendor uses to reach the callback receiver
    #[arg(long)]
    public_url: Option<String>,
}

impl Args {
    fn load_options(self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config,
            overrides: ConfigOverrides {
                account_sid: self.account_sid,
                api_key: self.api_key,
                api_secret: self.api_secret,
                callback_port: self.callback_port,
                public_url: self.public_url,
                log_level: None,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(args.load_options()).context("failed to load configuration")?;
    agentpay_server::init_logging(&config.logging);

    info!(event_name = "system.mcp.start", "starting agentpay MCP server");
    let app = agentpay_server::bootstrap_with_config(config).await?;
    let server = AgentPaymentMcpServer::new(app.store.clone(), app.gateway.clone(), app.audit.clone());

    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .context("failed to start MCP stdio transport")?;
    let quit_reason = service.waiting().await?;
    info!(event_name = "system.mcp.stopped", reason = ?quit_reason, "MCP session ended");

    app.shutdown().await;
    Ok(())
}
