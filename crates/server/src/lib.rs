//! Runtime shell around the payment capture core: the vendor REST client,
//! the callback receiver with its health endpoint, and process bootstrap.

pub mod bootstrap;
pub mod health;
pub mod logging;
pub mod twilio;
pub mod webhook;

pub use bootstrap::{bootstrap, bootstrap_with_api, bootstrap_with_config, Application, BootstrapError};
pub use logging::init_logging;
pub use twilio::TwilioPaymentsClient;
pub use webhook::{CallbackReceiver, CALLBACK_PATH};
