//! Inbound vendor status callbacks.

use std::net::SocketAddr;
use std::sync::Arc;

use agentpay_core::callback::{CallbackPayload, CallbackProcessor};
use agentpay_core::config::CallbackConfig;
use agentpay_core::gateway::CallbackUrl;
use agentpay_core::payment::PaymentSessionStore;
use axum::{
    extract::{rejection::FormRejection, Form, Query, State},
    http::StatusCode,
    routing::post,
    Router,
};
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::health;

pub const CALLBACK_PATH: &str = "/payments/callback";

#[derive(Clone)]
pub struct CallbackState {
    processor: Arc<CallbackProcessor>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(rename = "lastCall")]
    pub last_call: Option<String>,
}

pub fn router(processor: Arc<CallbackProcessor>) -> Router {
    Router::new().route(CALLBACK_PATH, post(receive_callback)).with_state(CallbackState { processor })
}

pub async fn receive_callback(
    State(state): State<CallbackState>,
    Query(query): Query<CallbackQuery>,
    payload: Result<Form<CallbackPayload>, FormRejection>,
) -> (StatusCode, String) {
    let Form(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(
                event_name = "payment.callback.malformed",
                operation = query.last_call.as_deref().unwrap_or("-"),
                error = %rejection,
                "callback body could not be decoded"
            );
            return (StatusCode::BAD_REQUEST, format!("malformed callback body: {rejection}"));
        }
    };

    let notification = match payload.into_notification(query.last_call.as_deref()) {
        Ok(notification) => notification,
        Err(invalid) => {
            warn!(
                event_name = "payment.callback.malformed",
                operation = query.last_call.as_deref().unwrap_or("-"),
                error = %invalid,
                "callback rejected"
            );
            return (StatusCode::BAD_REQUEST, invalid.to_string());
        }
    };

    state.processor.process(notification);
    (StatusCode::OK, "OK".to_string())
}

/// Listener serving vendor callbacks and the health endpoint.
pub struct CallbackReceiver {
    local_addr: SocketAddr,
    public_base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl CallbackReceiver {
    pub async fn start(
        config: &CallbackConfig,
        processor: Arc<CallbackProcessor>,
        store: Arc<PaymentSessionStore>,
    ) -> std::io::Result<Self> {
        let address = format!("{}:{}", config.bind_address, config.port);
        let listener = tokio::net::TcpListener::bind(&address).await?;
        let local_addr = listener.local_addr()?;
        let public_base_url = config.public_base_url(local_addr);

        let app = router(processor).merge(health::router(store));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(error) = server.await {
                error!(
                    event_name = "system.callback.error",
                    error = %error,
                    "callback receiver terminated unexpectedly"
                );
            }
        });

        info!(
            event_name = "system.callback.start",
            bind_address = %local_addr,
            public_url = %public_base_url,
            "callback receiver started"
        );

        Ok(Self { local_addr, public_base_url, shutdown: Some(shutdown_tx), task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    /// URL handed to the vendor; discriminated per operation by the gateway.
    pub fn callback_url(&self) -> CallbackUrl {
        CallbackUrl::new(format!("{}{CALLBACK_PATH}", self.public_base_url))
    }

    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(error) = (&mut self.task).await {
            warn!(event_name = "system.callback.join_failed", error = %error, "callback receiver task failed");
        }
        info!(
            event_name = "system.callback.stopped",
            bind_address = %self.local_addr,
            "callback receiver stopped"
        );
    }
}
