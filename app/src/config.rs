use std::path::PathBuf;

use serde::Deserialize;

const RETRY_SECONDS_MIN: u64 = 30;
const RETRY_SECONDS_MAX: u64 = 604_800;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub jobs_root: PathBuf,

    #[serde(default)]
    pub destination_path: String,

    #[serde(default)]
    pub file_exceptions: Vec<String>,

    #[serde(default = "AppConfig::default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    #[serde(default = "AppConfig::default_retry_seconds")]
    pub retry_seconds: u64,

    #[serde(default = "AppConfig::default_crash_retry_secs")]
    pub crash_retry_secs: u64,

    pub oauth: OAuthConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_cache_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "TelemetryConfig::default_filter")]
    pub filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { filter: Self::default_filter() }
    }
}

impl TelemetryConfig {
    fn default_filter() -> String {
        "info".to_owned()
    }
}

impl AppConfig {
    fn default_scan_interval_secs() -> u64 {
        300
    }

    fn default_retry_seconds() -> u64 {
        300
    }

    fn default_crash_retry_secs() -> u64 {
        1800
    }

    /// Loads layered configuration: built-in defaults, then `<path>`, then `AGENT_`-prefixed
    /// environment overrides (e.g. `AGENT_RETRY_SECONDS=60`). `retry_seconds` is clamped to
    /// `[RETRY_SECONDS_MIN, RETRY_SECONDS_MAX]` rather than rejected.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("AGENT").separator("_"))
            .build()?;
        let mut parsed: AppConfig = built.try_deserialize()?;
        parsed.retry_seconds = parsed.retry_seconds.clamp(RETRY_SECONDS_MIN, RETRY_SECONDS_MAX);
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn loads_defaults_and_required_fields() {
        let file = write_fixture(
            r#"
            jobs_root = "/var/lib/agent/jobs"

            [oauth]
            client_id = "abc"
            client_secret = "secret"
            token_cache_path = "/var/lib/agent/token.json"
            "#,
        );
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.scan_interval_secs, 300);
        assert_eq!(config.retry_seconds, 300);
        assert_eq!(config.crash_retry_secs, 1800);
        assert_eq!(config.telemetry.filter, "info");
        assert!(config.file_exceptions.is_empty());
    }

    #[test]
    fn clamps_retry_seconds_below_minimum() {
        let file = write_fixture(
            r#"
            jobs_root = "/var/lib/agent/jobs"
            retry_seconds = 5

            [oauth]
            client_id = "abc"
            client_secret = "secret"
            token_cache_path = "/var/lib/agent/token.json"
            "#,
        );
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.retry_seconds, 30);
    }

    #[test]
    fn clamps_retry_seconds_above_maximum() {
        let file = write_fixture(
            r#"
            jobs_root = "/var/lib/agent/jobs"
            retry_seconds = 10000000

            [oauth]
            client_id = "abc"
            client_secret = "secret"
            token_cache_path = "/var/lib/agent/token.json"
            "#,
        );
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.retry_seconds, 604_800);
    }

    #[test]
    fn environment_overrides_file() {
        let file = write_fixture(
            r#"
            jobs_root = "/var/lib/agent/jobs"

            [oauth]
            client_id = "abc"
            client_secret = "secret"
            token_cache_path = "/var/lib/agent/token.json"
            "#,
        );
        std::env::set_var("AGENT_SCAN_INTERVAL_SECS", "42");
        let config = AppConfig::load(file.path()).unwrap();
        std::env::remove_var("AGENT_SCAN_INTERVAL_SECS");
        assert_eq!(config.scan_interval_secs, 42);
    }
}
