//! Configuration management for RunAudit
//!
//! Every setting comes from the process environment (optionally preloaded
//! from a `.env` file). Variables are read once into [`EnvVars`] and then
//! validated into a typed [`Config`]; nothing else in the crate reads the
//! environment.

use std::collections::HashMap;
use std::time::Duration;

use config::{Environment, Source};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Default runs API host
pub const DEFAULT_PLATFORM_BASE_URL: &str = "https://platform.happyrobot.ai";
/// Default header carrying the bearer token
pub const DEFAULT_AUTH_HEADER: &str = "authorization";
/// Default audit cadence and lookback
pub const DEFAULT_AUDIT_PERIOD: Duration = Duration::from_secs(12 * 60 * 60);
/// Default failure ratio above which an alert is sent
pub const DEFAULT_THRESHOLD: f64 = 0.25;
/// Default `limit` query parameter
pub const DEFAULT_PAGE_LIMIT: u32 = 100;
/// Default outcome marker field on a run
pub const DEFAULT_MARKER_FIELD: &str = "could_not_find_load_id";
/// Default outcome marker value that counts as a failure
pub const DEFAULT_MARKER_VALUE: &str = "did_not_find_load";
/// Default alert email subject
pub const DEFAULT_SUBJECT: &str = "Payment Status Audit Happy Robot";

/// Main configuration struct
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// HTTP listener
    pub server: ServerConfig,

    /// Runs API access
    pub platform: PlatformConfig,

    /// Email dispatch through the remote function
    pub email: EmailConfig,

    /// Audit schedule and decision parameters
    pub audit: AuditConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// HTTP port
    pub port: u16,
}

impl ServerConfig {
    /// `host:port` listen address
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Runs API configuration
#[derive(Debug, Clone, Serialize)]
pub struct PlatformConfig {
    /// Base URL; the runs path is appended to it
    pub base_url: Url,
    /// Bearer token
    pub api_key: String,
    /// Tenant identifier, also used as the email `orgId`
    pub org_id: String,
    /// Use case whose runs are audited
    pub use_case_id: String,
    /// Name of the header carrying `Bearer <api_key>`
    pub auth_header: String,
    /// TCP connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Response read timeout
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Extra attempts after a transport failure
    pub max_retries: u32,
}

/// Static AWS credentials
#[derive(Clone, Serialize)]
pub struct StaticCredentials {
    /// Access key id
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .finish()
    }
}

/// Email dispatch configuration
#[derive(Debug, Clone, Serialize)]
pub struct EmailConfig {
    /// `from` address
    pub sender: String,
    /// Single alert recipient
    pub recipient: String,
    /// Region the function is deployed in
    pub region: String,
    /// Function name or ARN
    pub function_name: String,
    /// Static credentials; the default AWS provider chain is used when absent
    pub credentials: Option<StaticCredentials>,
}

/// Audit configuration
#[derive(Debug, Clone, Serialize)]
pub struct AuditConfig {
    /// Time between scheduled audits
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Size of the window ending at "now"
    #[serde(with = "humantime_serde")]
    pub lookback: Duration,
    /// Ratio strictly above which an alert is sent
    pub threshold: f64,
    /// `limit` query parameter
    pub page_limit: u32,
    /// Run field holding the outcome marker
    pub marker_field: String,
    /// Marker value that counts as a failure
    pub marker_value: String,
    /// Alert email subject
    pub subject: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_AUDIT_PERIOD,
            lookback: DEFAULT_AUDIT_PERIOD,
            threshold: DEFAULT_THRESHOLD,
            page_limit: DEFAULT_PAGE_LIMIT,
            marker_field: DEFAULT_MARKER_FIELD.to_string(),
            marker_value: DEFAULT_MARKER_VALUE.to_string(),
            subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Raw environment, one field per variable (keys are lowercased by `config`)
#[derive(Debug, Default, Deserialize)]
struct EnvVars {
    platform_api_key: Option<String>,
    dcl_org_id: Option<String>,
    payment_status_use_case_id: Option<String>,
    sender_email: Option<String>,
    email_to: Option<String>,
    aws_region: Option<String>,
    lambda_function_name: Option<String>,
    s3_access_key: Option<String>,
    s3_secret_key: Option<String>,

    host: Option<String>,
    port: Option<u16>,

    platform_base_url: Option<String>,
    platform_auth_header: Option<String>,

    #[serde(default, with = "humantime_serde")]
    audit_interval: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    audit_lookback: Option<Duration>,
    audit_threshold: Option<f64>,
    audit_page_limit: Option<u32>,
    audit_marker_field: Option<String>,
    audit_marker_value: Option<String>,
    audit_subject: Option<String>,

    log_level: Option<String>,
    log_format: Option<String>,
}

impl Config {
    /// Load `.env` (if `env_file` is given, that file must exist) and read the
    /// process environment.
    pub fn load(env_file: Option<&str>) -> Result<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path)
                    .map_err(|e| Error::config(format!("cannot read {path}: {e}")))?;
            }
            None => {
                // A missing .env is normal in deployed environments
                let _ = dotenvy::dotenv();
            }
        }

        Self::from_source(Environment::default())
    }

    /// Build from an explicit variable map instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::from_source(Environment::default().source(Some(vars)))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: Source + Send + Sync + 'static,
    {
        let env: EnvVars = config::Config::builder()
            .add_source(source)
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| Error::config(e.to_string()))?;

        Self::validate(env)
    }

    fn validate(env: EnvVars) -> Result<Self> {
        let mut missing = Vec::new();
        let mut require = |value: Option<String>, name: &'static str| -> String {
            match value.filter(|v| !v.trim().is_empty()) {
                Some(v) => v,
                None => {
                    missing.push(name);
                    String::new()
                }
            }
        };

        let api_key = require(env.platform_api_key, "PLATFORM_API_KEY");
        let org_id = require(env.dcl_org_id, "DCL_ORG_ID");
        let use_case_id = require(env.payment_status_use_case_id, "PAYMENT_STATUS_USE_CASE_ID");
        let sender = require(env.sender_email, "SENDER_EMAIL");
        let recipient = require(env.email_to, "EMAIL_TO");
        let region = require(env.aws_region, "AWS_REGION");
        let function_name = require(env.lambda_function_name, "LAMBDA_FUNCTION_NAME");

        if !missing.is_empty() {
            return Err(Error::config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let non_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let credentials = match (non_blank(env.s3_access_key), non_blank(env.s3_secret_key)) {
            (Some(access_key_id), Some(secret_access_key)) => Some(StaticCredentials {
                access_key_id,
                secret_access_key,
            }),
            (None, None) => None,
            _ => {
                return Err(Error::config(
                    "S3_ACCESS_KEY and S3_SECRET_KEY must be set together",
                ))
            }
        };

        let base_url = env
            .platform_base_url
            .as_deref()
            .unwrap_or(DEFAULT_PLATFORM_BASE_URL);
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("invalid PLATFORM_BASE_URL '{base_url}': {e}")))?;

        let audit_defaults = AuditConfig::default();
        let audit = AuditConfig {
            interval: env.audit_interval.unwrap_or(audit_defaults.interval),
            lookback: env.audit_lookback.unwrap_or(audit_defaults.lookback),
            threshold: env.audit_threshold.unwrap_or(audit_defaults.threshold),
            page_limit: env.audit_page_limit.unwrap_or(audit_defaults.page_limit),
            marker_field: env.audit_marker_field.unwrap_or(audit_defaults.marker_field),
            marker_value: env.audit_marker_value.unwrap_or(audit_defaults.marker_value),
            subject: env.audit_subject.unwrap_or(audit_defaults.subject),
        };

        if audit.interval.is_zero() {
            return Err(Error::config("AUDIT_INTERVAL must be greater than zero"));
        }
        if audit.lookback.is_zero() {
            return Err(Error::config("AUDIT_LOOKBACK must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&audit.threshold) {
            return Err(Error::config(format!(
                "AUDIT_THRESHOLD must be within [0, 1], got {}",
                audit.threshold
            )));
        }
        if audit.page_limit == 0 {
            return Err(Error::config("AUDIT_PAGE_LIMIT must be greater than zero"));
        }

        let server_defaults = ServerConfig::default();
        let logging_defaults = LoggingConfig::default();

        Ok(Self {
            server: ServerConfig {
                host: env.host.unwrap_or(server_defaults.host),
                port: env.port.unwrap_or(server_defaults.port),
            },
            platform: PlatformConfig {
                base_url,
                api_key,
                org_id,
                use_case_id,
                auth_header: env
                    .platform_auth_header
                    .unwrap_or_else(|| DEFAULT_AUTH_HEADER.to_string()),
                connect_timeout: Duration::from_millis(3050),
                read_timeout: Duration::from_secs(20),
                max_retries: 3,
            },
            email: EmailConfig {
                sender,
                recipient,
                region,
                function_name,
                credentials,
            },
            audit,
            logging: LoggingConfig {
                level: env.log_level.unwrap_or(logging_defaults.level),
                format: env.log_format.unwrap_or(logging_defaults.format),
            },
        })
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.platform.api_key = "***".to_string();
        if let Some(creds) = copy.email.credentials.as_mut() {
            creds.secret_access_key = "***".to_string();
        }
        copy
    }
}
