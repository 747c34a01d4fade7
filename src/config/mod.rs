//! Configuration management.
//!
//! Configuration comes from a TOML file, then `CFSECURITY_*` environment
//! variables override individual values. Secrets are kept as
//! [`SecretString`] and never printed by `Debug`.
//!
//! ```toml
//! listen_addr = "0.0.0.0:8091"
//! sqlite_path = "sec_entitlement.db"
//!
//! [jwt]
//! alg = "RS256"
//! secret = "-----BEGIN PUBLIC KEY-----..."
//!
//! [cloud_foundry]
//! endpoint = "https://api.sys.example.com"
//! client_id = "cfsecurity"
//! client_secret = "..."
//! ```

mod tuning;

pub use tuning::{MAX_FILTER_GUIDS, MAX_PER_PAGE, TuningConfig};

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::{Error, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "CFSECURITY_CONFIG_PATH";

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "cfsecurity.toml";

/// Scope that marks a platform administrator.
pub const DEFAULT_ADMIN_SCOPE: &str = "cloud_controller.admin";

/// Main configuration for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,
    /// PEM certificate chain; TLS is enabled when set together with the key.
    pub ssl_cert_file: Option<PathBuf>,
    /// PEM private key.
    pub ssl_key_file: Option<PathBuf>,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Emit JSON log lines instead of the human format.
    pub log_json: bool,
    /// Append logs to this file instead of stderr.
    pub log_file: Option<PathBuf>,
    /// Entitlement database file.
    pub sqlite_path: PathBuf,
    /// Keep running when the entitlement store stops answering.
    pub not_exit_when_conn_failed: bool,
    /// Keep booting when the platform or identity provider is unreachable.
    pub keep_serving_degraded: bool,
    /// Delay between two store liveness pings.
    pub liveness_interval: Duration,
    /// Consecutive failed pings before the process stops.
    pub liveness_max_failures: u32,
    /// Scope that grants platform administrator rights.
    pub admin_scope: String,
    /// Caller token verification.
    pub jwt: JwtConfig,
    /// Platform API and identity provider access.
    pub cloud_foundry: CloudFoundryConfig,
    /// Upstream sizing.
    pub tuning: TuningConfig,
}

/// Caller token verification settings.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Algorithm name (`HS256`, `RS256`, `ES256`, `EdDSA`, ...).
    pub alg: String,
    /// HMAC secret, or PEM encoded public key for asymmetric algorithms.
    pub secret: SecretString,
    /// Expected `iss` claim.
    pub issuer: Option<String>,
    /// Expected `aud` claim.
    pub audience: Option<String>,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            alg: "RS256".to_string(),
            secret: SecretString::from(String::new()),
            issuer: None,
            audience: None,
        }
    }
}

/// Platform API and identity provider settings.
#[derive(Debug, Clone)]
pub struct CloudFoundryConfig {
    /// Platform API base URL.
    pub endpoint: String,
    /// Identity provider base URL; discovered from the platform info document when unset.
    pub uaa_endpoint: Option<String>,
    /// Client id used for the client-credentials grant.
    pub client_id: String,
    /// Client secret used for the client-credentials grant.
    pub client_secret: SecretString,
    /// Accept any upstream certificate.
    pub skip_ssl_validation: bool,
    /// Extra PEM encoded root certificates.
    pub trusted_ca_certificates: Vec<String>,
    /// Timeout applied to every outbound request.
    pub request_timeout: Duration,
    /// Retries for idempotent reads. Writes are never retried.
    pub read_retries: u32,
    /// Linear backoff step between read retries.
    pub retry_backoff: Duration,
}

impl Default for CloudFoundryConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            uaa_endpoint: None,
            client_id: String::new(),
            client_secret: SecretString::from(String::new()),
            skip_ssl_validation: false,
            trusted_ca_certificates: Vec::new(),
            request_timeout: Duration::from_secs(30),
            read_retries: 0,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Listen address.
    pub listen_addr: Option<String>,
    /// TLS certificate file.
    pub ssl_cert_file: Option<String>,
    /// TLS key file.
    pub ssl_key_file: Option<String>,
    /// Log level.
    pub log_level: Option<String>,
    /// JSON logs.
    pub log_json: Option<bool>,
    /// Log file.
    pub log_file: Option<String>,
    /// Entitlement database file.
    pub sqlite_path: Option<String>,
    /// Disable the liveness terminator.
    pub not_exit_when_conn_failed: Option<bool>,
    /// Boot even when upstream is unreachable.
    pub keep_serving_degraded: Option<bool>,
    /// Liveness interval in seconds.
    pub liveness_interval_secs: Option<u64>,
    /// Liveness failure threshold.
    pub liveness_max_failures: Option<u32>,
    /// Admin scope.
    pub admin_scope: Option<String>,
    /// JWT section.
    pub jwt: Option<ConfigFileJwt>,
    /// Platform section.
    pub cloud_foundry: Option<ConfigFileCloudFoundry>,
    /// Tuning section.
    pub tuning: Option<ConfigFileTuning>,
}

/// `[jwt]` section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileJwt {
    /// Algorithm name.
    pub alg: Option<String>,
    /// Secret or public key.
    pub secret: Option<String>,
    /// Issuer.
    pub issuer: Option<String>,
    /// Audience.
    pub audience: Option<String>,
}

/// `[cloud_foundry]` section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileCloudFoundry {
    /// Platform API URL.
    pub endpoint: Option<String>,
    /// Identity provider URL.
    pub uaa_endpoint: Option<String>,
    /// Client id.
    pub client_id: Option<String>,
    /// Client secret.
    pub client_secret: Option<String>,
    /// Skip certificate validation.
    pub skip_ssl_validation: Option<bool>,
    /// Extra root certificates.
    pub trusted_ca_certificates: Option<Vec<String>>,
    /// Request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Read retries.
    pub read_retries: Option<u32>,
    /// Retry backoff in milliseconds.
    pub retry_backoff_ms: Option<u64>,
}

/// `[tuning]` section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileTuning {
    /// Security group chunk size.
    pub security_group_chunk_size: Option<usize>,
    /// Space chunk size.
    pub space_chunk_size: Option<usize>,
    /// Page size.
    pub per_page: Option<usize>,
    /// Token refresh margin in seconds.
    pub token_refresh_margin_secs: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8091)),
            ssl_cert_file: None,
            ssl_key_file: None,
            log_level: "info".to_string(),
            log_json: false,
            log_file: None,
            sqlite_path: PathBuf::from("sec_entitlement.db"),
            not_exit_when_conn_failed: false,
            keep_serving_degraded: false,
            liveness_interval: Duration::from_secs(300),
            liveness_max_failures: 1,
            admin_scope: DEFAULT_ADMIN_SCOPE.to_string(),
            jwt: JwtConfig::default(),
            cloud_foundry: CloudFoundryConfig::default(),
            tuning: TuningConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads, overrides from the environment, and validates.
    ///
    /// The file is `path` when given, then `$CFSECURITY_CONFIG_PATH`, then
    /// `./cfsecurity.toml`. A missing default file means defaults; a missing
    /// explicit file is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the result
    /// does not validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::load_from_file(&path)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::load_from_file(fallback)?
                } else {
                    Self::default()
                }
            },
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or a value has the
    /// wrong shape.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Self::from_config_file(file)
    }

    /// Converts a `ConfigFile` to `GatewayConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = file.listen_addr {
            config.listen_addr = parse_listen_addr(&addr)?;
        }
        config.ssl_cert_file = file.ssl_cert_file.map(PathBuf::from);
        config.ssl_key_file = file.ssl_key_file.map(PathBuf::from);
        if let Some(level) = file.log_level {
            config.log_level = level;
        }
        if let Some(v) = file.log_json {
            config.log_json = v;
        }
        config.log_file = file.log_file.map(PathBuf::from);
        if let Some(path) = file.sqlite_path {
            config.sqlite_path = PathBuf::from(path);
        }
        if let Some(v) = file.not_exit_when_conn_failed {
            config.not_exit_when_conn_failed = v;
        }
        if let Some(v) = file.keep_serving_degraded {
            config.keep_serving_degraded = v;
        }
        if let Some(secs) = file.liveness_interval_secs {
            config.liveness_interval = Duration::from_secs(secs);
        }
        if let Some(v) = file.liveness_max_failures {
            config.liveness_max_failures = v;
        }
        if let Some(scope) = file.admin_scope {
            config.admin_scope = scope;
        }

        if let Some(jwt) = file.jwt {
            if let Some(alg) = jwt.alg {
                config.jwt.alg = alg;
            }
            if let Some(secret) = jwt.secret {
                config.jwt.secret = SecretString::from(secret);
            }
            config.jwt.issuer = jwt.issuer;
            config.jwt.audience = jwt.audience;
        }

        if let Some(cf) = file.cloud_foundry {
            let target = &mut config.cloud_foundry;
            if let Some(endpoint) = cf.endpoint {
                target.endpoint = endpoint;
            }
            target.uaa_endpoint = cf.uaa_endpoint;
            if let Some(id) = cf.client_id {
                target.client_id = id;
            }
            if let Some(secret) = cf.client_secret {
                target.client_secret = SecretString::from(secret);
            }
            if let Some(v) = cf.skip_ssl_validation {
                target.skip_ssl_validation = v;
            }
            if let Some(certs) = cf.trusted_ca_certificates {
                target.trusted_ca_certificates = certs;
            }
            if let Some(secs) = cf.request_timeout_secs {
                target.request_timeout = Duration::from_secs(secs);
            }
            if let Some(v) = cf.read_retries {
                target.read_retries = v;
            }
            if let Some(ms) = cf.retry_backoff_ms {
                target.retry_backoff = Duration::from_millis(ms);
            }
        }

        if let Some(tuning) = file.tuning {
            let target = &mut config.tuning;
            if let Some(v) = tuning.security_group_chunk_size {
                target.security_group_chunk_size = v;
            }
            if let Some(v) = tuning.space_chunk_size {
                target.space_chunk_size = v;
            }
            if let Some(v) = tuning.per_page {
                target.per_page = v;
            }
            if let Some(secs) = tuning.token_refresh_margin_secs {
                target.token_refresh_margin = Duration::from_secs(secs);
            }
        }

        Ok(config)
    }

    /// Applies `CFSECURITY_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides using `lookup` to read variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("CFSECURITY_LISTEN_ADDR") {
            match parse_listen_addr(&v) {
                Ok(addr) => self.listen_addr = addr,
                Err(e) => tracing::warn!(error = %e, "Ignoring CFSECURITY_LISTEN_ADDR"),
            }
        }
        if let Some(v) = lookup("CFSECURITY_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = lookup("CFSECURITY_LOG_JSON") {
            self.log_json = parse_bool(&v);
        }
        if let Some(v) = lookup("CFSECURITY_SQLITE_PATH") {
            self.sqlite_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CFSECURITY_ADMIN_SCOPE") {
            self.admin_scope = v;
        }
        if let Some(v) = lookup("CFSECURITY_JWT_ALG") {
            self.jwt.alg = v;
        }
        if let Some(v) = lookup("CFSECURITY_JWT_SECRET") {
            self.jwt.secret = SecretString::from(v);
        }
        if let Some(v) = lookup("CFSECURITY_CF_ENDPOINT") {
            self.cloud_foundry.endpoint = v;
        }
        if let Some(v) = lookup("CFSECURITY_UAA_ENDPOINT") {
            self.cloud_foundry.uaa_endpoint = Some(v);
        }
        if let Some(v) = lookup("CFSECURITY_CLIENT_ID") {
            self.cloud_foundry.client_id = v;
        }
        if let Some(v) = lookup("CFSECURITY_CLIENT_SECRET") {
            self.cloud_foundry.client_secret = SecretString::from(v);
        }
        if let Some(v) = lookup("CFSECURITY_SKIP_SSL_VALIDATION") {
            self.cloud_foundry.skip_ssl_validation = parse_bool(&v);
        }
    }

    /// Checks the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the JWT algorithm is unknown, the
    /// platform endpoint is not a URL, TLS is half configured or a tuning
    /// value is out of range.
    pub fn validate(&self) -> Result<()> {
        jsonwebtoken::Algorithm::from_str(&self.jwt.alg).map_err(|_| {
            Error::InvalidInput(format!("unsupported jwt algorithm '{}'", self.jwt.alg))
        })?;

        url::Url::parse(&self.cloud_foundry.endpoint).map_err(|e| {
            Error::InvalidInput(format!(
                "cloud_foundry.endpoint '{}' is not a URL: {e}",
                self.cloud_foundry.endpoint
            ))
        })?;
        if let Some(uaa) = &self.cloud_foundry.uaa_endpoint {
            url::Url::parse(uaa).map_err(|e| {
                Error::InvalidInput(format!("cloud_foundry.uaa_endpoint '{uaa}' is not a URL: {e}"))
            })?;
        }

        if self.ssl_cert_file.is_some() != self.ssl_key_file.is_some() {
            return Err(Error::InvalidInput(
                "ssl_cert_file and ssl_key_file must be set together".to_string(),
            ));
        }

        if self.liveness_max_failures == 0 {
            return Err(Error::InvalidInput(
                "liveness_max_failures must be at least 1".to_string(),
            ));
        }

        self.tuning.validate()
    }

    /// Returns `true` when both TLS files are configured.
    #[must_use]
    pub const fn tls_enabled(&self) -> bool {
        self.ssl_cert_file.is_some() && self.ssl_key_file.is_some()
    }

    /// Sets the platform endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.cloud_foundry.endpoint = endpoint.into();
        self
    }

    /// Sets the entitlement database path.
    #[must_use]
    pub fn with_sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sqlite_path = path.into();
        self
    }
}

fn parse_listen_addr(value: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|e| Error::InvalidInput(format!("listen_addr '{value}' is invalid: {e}")))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
