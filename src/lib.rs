pub mod artifact;
pub mod config;
pub mod diff;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod roster;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::artifact::PdfArtifactGenerator;
use crate::config::AppConfig;
use crate::directory::{DoctorDirectory, SqliteDoctorDirectory};
use crate::error::ServiceError;
use crate::ledger::HttpLedgerGateway;
use crate::notify::NotificationDispatcher;
use crate::orchestrator::RecordOrchestrator;
use crate::roster::DoctorRoster;

/// Install the global fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}

/// The wired service graph handed to the transport layer.
pub struct Services {
    pub config: AppConfig,
    pub records: RecordOrchestrator,
    pub roster: DoctorRoster,
}

impl Services {
    /// Build every collaborator once. Notification transports are chosen
    /// here and stay fixed for the process lifetime.
    pub fn from_config(config: AppConfig) -> Result<Self, ServiceError> {
        tracing::info!(
            "{} starting v{} ({:?})",
            config::APP_NAME,
            config::APP_VERSION,
            config.mode
        );

        let ledger = HttpLedgerGateway::new(config.ledger.clone())?;
        tracing::info!(
            identity = ledger.identity(),
            channel = config.ledger.channel.as_str(),
            "Ledger gateway configured"
        );

        let directory: Arc<dyn DoctorDirectory> =
            Arc::new(SqliteDoctorDirectory::open(&config.doctor_db)?);
        let notifier = NotificationDispatcher::from_config(&config);
        let artifacts = PdfArtifactGenerator::new(Arc::clone(&directory), &config.artifacts);

        let records = RecordOrchestrator::new(
            Arc::new(ledger),
            Arc::new(artifacts),
            notifier.clone(),
            config.ledger.timeout,
        );
        let roster = DoctorRoster::new(directory, notifier.sms().clone());

        Ok(Self {
            config,
            records,
            roster,
        })
    }
}
