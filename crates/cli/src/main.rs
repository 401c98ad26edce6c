use std::process::ExitCode;

fn main() -> ExitCode {
    agentpay_cli::run()
}
