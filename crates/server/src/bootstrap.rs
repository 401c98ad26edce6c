use std::sync::Arc;
use std::time::Duration;

use agentpay_core::audit::{AuditSink, TracingAuditSink};
use agentpay_core::callback::CallbackProcessor;
use agentpay_core::config::{AppConfig, ConfigError, LoadOptions};
use agentpay_core::gateway::{CaptureSettings, PaymentsApi, VendorError, VendorGateway};
use agentpay_core::payment::PaymentSessionStore;
use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::twilio::TwilioPaymentsClient;
use crate::webhook::CallbackReceiver;

pub struct Application {
    pub config: AppConfig,
    pub store: Arc<PaymentSessionStore>,
    pub gateway: Arc<VendorGateway>,
    pub audit: Arc<dyn AuditSink>,
    pub receiver: CallbackReceiver,
    sweeper: Option<JoinHandle<()>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("vendor client could not be built: {0}")]
    VendorClient(#[source] VendorError),
    #[error("callback receiver could not bind: {0}")]
    CallbackListener(#[source] std::io::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let api = TwilioPaymentsClient::new(&config.vendor).map_err(BootstrapError::VendorClient)?;
    bootstrap_with_api(config, Arc::new(api), Arc::new(TracingAuditSink)).await
}

/// Wires the runtime around an arbitrary vendor API. The callback receiver is
/// bound before the gateway exists, so no capture request can reference a URL
/// that is not yet listening.
pub async fn bootstrap_with_api(
    config: AppConfig,
    api: Arc<dyn PaymentsApi>,
    audit: Arc<dyn AuditSink>,
) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");
    config.validate()?;

    let store = Arc::new(PaymentSessionStore::new());
    let processor = Arc::new(CallbackProcessor::new(Arc::clone(&store), Arc::clone(&audit)));

    let receiver = CallbackReceiver::start(&config.callback, processor, Arc::clone(&store))
        .await
        .map_err(BootstrapError::CallbackListener)?;
    info!(
        event_name = "system.bootstrap.callback_ready",
        callback_url = %receiver.callback_url().as_str(),
        "callback receiver ready"
    );

    let gateway = Arc::new(VendorGateway::new(
        api,
        CaptureSettings::from(&config.payment),
        receiver.callback_url(),
    ));

    let sweeper = config.session.idle_ttl().map(|ttl| {
        spawn_idle_sweeper(Arc::clone(&store), ttl, config.session.sweep_interval())
    });

    info!(event_name = "system.bootstrap.complete", "application bootstrap complete");
    Ok(Application { config, store, gateway, audit, receiver, sweeper })
}

impl Application {
    pub async fn shutdown(mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
        self.receiver.shutdown().await;
        info!(event_name = "system.shutdown.complete", "application stopped");
    }
}

/// Periodically evicts sessions that have not changed for longer than `ttl`.
pub fn spawn_idle_sweeper(
    store: Arc<PaymentSessionStore>,
    ttl: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let pruned = store.prune_idle(Utc::now(), ttl);
            if pruned > 0 {
                info!(
                    event_name = "payment.store.pruned",
                    pruned,
                    remaining = store.len(),
                    "evicted idle payment sessions"
                );
            }
        }
    })
}
