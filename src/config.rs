use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "EhrLedger";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_LEDGER_URL: &str = "http://localhost:8801";
const DEFAULT_LEDGER_IDENTITY: &str = "user1";
const DEFAULT_LEDGER_CHANNEL: &str = "ehrchannel";
const DEFAULT_LEDGER_CHAINCODE: &str = "ehr-go";
const DEFAULT_LEDGER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_VERIFY_URL: &str = "https://xophospital.com/verify";
const DEFAULT_HOSPITAL_NAME: &str = "XOP HOSPITAL";
const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,ehrledger_lib=debug"
}

/// Get the application data directory (~/EhrLedger/).
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Directory where generated artifacts are kept, one file per patient.
pub fn artifacts_dir() -> PathBuf {
    app_data_dir().join("pdfs")
}

/// Default location of the doctor directory database.
pub fn doctor_db_path() -> PathBuf {
    app_data_dir().join("doctors.db")
}

/// Whether internal error detail may be shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Development,
    Production,
}

impl RunMode {
    fn parse(value: Option<String>) -> Self {
        match value.as_deref() {
            Some("development") | Some("dev") => Self::Development,
            _ => Self::Production,
        }
    }

    pub fn is_dev(&self) -> bool {
        *self == Self::Development
    }
}

/// Ledger network coordinates. The signing identity is explicit so every
/// session is attributable.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub gateway_url: String,
    pub identity: String,
    pub channel: String,
    pub chaincode: String,
    pub timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_LEDGER_URL.into(),
            identity: DEFAULT_LEDGER_IDENTITY.into(),
            channel: DEFAULT_LEDGER_CHANNEL.into(),
            chaincode: DEFAULT_LEDGER_CHAINCODE.into(),
            timeout: Duration::from_secs(DEFAULT_LEDGER_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub relay_url: String,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub api_base: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub output_dir: PathBuf,
    pub verification_url: String,
    pub hospital_name: String,
}

/// Everything read from the environment at startup.
/// `mail` and `sms` are `None` when their credentials are incomplete; the
/// matching notification channel is then disabled for the process lifetime.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: RunMode,
    pub ledger: LedgerConfig,
    pub mail: Option<MailConfig>,
    pub sms: Option<SmsConfig>,
    pub artifacts: ArtifactConfig,
    pub doctor_db: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let defaults = LedgerConfig::default();
        let timeout = get("EHR_LEDGER_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let ledger = LedgerConfig {
            gateway_url: get("EHR_LEDGER_URL").unwrap_or(defaults.gateway_url),
            identity: get("EHR_LEDGER_IDENTITY").unwrap_or(defaults.identity),
            channel: get("EHR_LEDGER_CHANNEL").unwrap_or(defaults.channel),
            chaincode: get("EHR_LEDGER_CHAINCODE").unwrap_or(defaults.chaincode),
            timeout,
        };

        let mail = match (get("EHR_MAIL_RELAY_URL"), get("EHR_MAIL_FROM")) {
            (Some(relay_url), Some(from)) => Some(MailConfig {
                relay_url,
                api_key: get("EHR_MAIL_API_KEY"),
                from,
            }),
            _ => None,
        };

        let sms = match (
            get("TWILIO_ACCOUNT_SID"),
            get("TWILIO_AUTH_TOKEN"),
            get("TWILIO_PHONE_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(SmsConfig {
                api_base: get("TWILIO_API_BASE").unwrap_or_else(|| TWILIO_API_BASE.into()),
                account_sid,
                auth_token,
                from_number,
            }),
            _ => None,
        };

        let artifacts = ArtifactConfig {
            output_dir: get("EHR_ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(artifacts_dir),
            verification_url: get("EHR_VERIFY_URL").unwrap_or_else(|| DEFAULT_VERIFY_URL.into()),
            hospital_name: get("EHR_HOSPITAL_NAME")
                .unwrap_or_else(|| DEFAULT_HOSPITAL_NAME.into()),
        };

        Self {
            mode: RunMode::parse(get("EHR_ENV")),
            ledger,
            mail,
            sms,
            artifacts,
            doctor_db: get("EHR_DOCTOR_DB")
                .map(PathBuf::from)
                .unwrap_or_else(doctor_db_path),
        }
    }
}
