use agentpay_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const CONFIG_VALIDATION: &str = "config_validation";
const VENDOR_CREDENTIALS: &str = "vendor_credentials";
const CALLBACK_LISTENER: &str = "callback_listener";

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: CONFIG_VALIDATION,
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_vendor_credentials(&config));
            checks.push(check_callback_listener(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: CONFIG_VALIDATION,
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in [VENDOR_CREDENTIALS, CALLBACK_LISTENER] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_vendor_credentials(config: &AppConfig) -> DoctorCheck {
    let vendor = &config.vendor;
    let mut missing = Vec::new();
    if vendor.account_sid.trim().is_empty() {
        missing.push("account_sid");
    }
    if vendor.api_key.expose_secret().trim().is_empty() {
        missing.push("api_key");
    }
    if vendor.api_secret.expose_secret().trim().is_empty() {
        missing.push("api_secret");
    }

    if missing.is_empty() {
        DoctorCheck {
            name: VENDOR_CREDENTIALS,
            status: CheckStatus::Pass,
            details: format!(
                "account, API key and secret present; requests go to `{}`",
                vendor.base_url
            ),
        }
    } else {
        DoctorCheck {
            name: VENDOR_CREDENTIALS,
            status: CheckStatus::Fail,
            details: format!("missing vendor credentials: {}", missing.join(", ")),
        }
    }
}

fn check_callback_listener(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: CALLBACK_LISTENER,
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let address = format!("{}:{}", config.callback.bind_address, config.callback.port);
    let result = runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|error| format!("cannot bind callback listener on `{address}`: {error}"))?;
        listener.local_addr().map_err(|error| format!("listener has no local address: {error}"))
    });

    match result {
        Ok(bound) => DoctorCheck {
            name: CALLBACK_LISTENER,
            status: CheckStatus::Pass,
            details: format!(
                "bound `{bound}`; vendor callbacks will target `{}`",
                config.callback.public_base_url(bound)
            ),
        },
        Err(error) => DoctorCheck { name: CALLBACK_LISTENER, status: CheckStatus::Fail, details: error },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
