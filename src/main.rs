use ehrledger_lib::config::AppConfig;
use ehrledger_lib::error::ErrorBody;
use ehrledger_lib::{init_tracing, Services};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    let config = AppConfig::from_env();
    let mode = config.mode;
    let services = match Services::from_config(config) {
        Ok(services) => services,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return std::process::ExitCode::FAILURE;
        }
    };

    // Ledger connectivity check.
    match services.records.query_all().await {
        Ok(listing) => {
            tracing::info!(count = listing.count, "Ledger reachable");
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            let (status, body) = ErrorBody::from_error(&e, mode);
            tracing::error!(status, code = body.error.code, "Ledger connectivity check failed");
            std::process::ExitCode::FAILURE
        }
    }
}
