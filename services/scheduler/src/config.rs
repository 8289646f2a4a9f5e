//! Configuration for the scheduler supervisor.
//!
//! Flags and environment are parsed by [`Cli`]; [`Config::from_cli`]
//! validates them into the immutable [`Config`] used for the rest of the
//! process lifetime.

use std::fmt;
use std::time::Duration;

use cattle_supervise::{BackoffPolicy, RetryPolicy, DEFAULT_MAX_RETRIES};
use clap::Parser;
use reqwest::Url;
use thiserror::Error;

/// Reconcile interval handed to the scheduler when no override is set.
pub const DEFAULT_RECONCILE_INTERVAL_MINUTES: u64 = 1;

/// Largest accepted reconcile interval (one week). Larger values are
/// ignored like unparsable ones.
pub const MAX_RECONCILE_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Period of the forced resync loop.
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 180;

/// Base retry backoff in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Metadata service API version path.
pub const METADATA_API_VERSION: &str = "2016-07-29";

/// Timeout for outbound cluster API calls.
pub const CLUSTER_API_TIMEOUT: Duration = Duration::from_secs(30);

/// An external resource based scheduler for Rancher.
#[derive(Debug, Clone, Parser)]
#[command(name = "scheduler")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// The metadata service address.
    #[arg(long, default_value = "rancher-metadata")]
    pub metadata_address: String,

    /// Port to listen on for healthchecks.
    #[arg(long, default_value_t = 80)]
    pub health_check_port: u16,

    /// Retries allowed per supervised subsystem after its first failure.
    #[arg(long, env = "CATTLE_SCHEDULER_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Base delay between retries in milliseconds (0 disables backoff).
    #[arg(long, env = "CATTLE_SCHEDULER_RETRY_BACKOFF_MS", default_value_t = DEFAULT_RETRY_BACKOFF_MS)]
    pub retry_backoff_ms: u64,

    /// Period of the forced metadata resync in seconds.
    #[arg(long, env = "CATTLE_SCHEDULER_RESYNC_PERIOD_SECS", default_value_t = DEFAULT_RESYNC_PERIOD_SECS)]
    pub resync_period_secs: u64,

    /// Scheduler reconcile interval in minutes. Invalid values are ignored.
    #[arg(long, env = "CATTLE_SCHEDULER_SLEEPTIME")]
    pub sleeptime: Option<String>,

    /// Cluster API URL.
    #[arg(long, env = "CATTLE_URL")]
    pub cattle_url: Option<String>,

    /// Cluster API access key.
    #[arg(long, env = "CATTLE_ACCESS_KEY")]
    pub cattle_access_key: Option<String>,

    /// Cluster API secret key.
    #[arg(long, env = "CATTLE_SECRET_KEY", hide_env_values = true)]
    pub cattle_secret_key: Option<String>,

    /// Set to "true" for debug logging.
    #[arg(long, env = "RANCHER_DEBUG")]
    pub rancher_debug: Option<String>,
}

impl Cli {
    /// Log level selected by `RANCHER_DEBUG`.
    pub fn log_level(&self) -> &'static str {
        match self.rancher_debug.as_deref() {
            Some("true") => "debug",
            _ => "info",
        }
    }
}

/// Configuration errors. All of them abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more cluster API credentials are unset or empty.
    #[error(
        "cattle connection environment variables not available (missing {}); URL: {url}, access key: {access_key}, secret key redacted",
        .missing.join(", ")
    )]
    MissingCredentials {
        missing: Vec<&'static str>,
        url: String,
        access_key: String,
    },

    /// `CATTLE_URL` is not an absolute http(s) URL.
    #[error("invalid CATTLE_URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Cluster API location and credentials.
#[derive(Clone)]
pub struct CattleCredentials {
    pub url: Url,
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for CattleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CattleCredentials")
            .field("url", &self.url.as_str())
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Scheduler supervisor configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Metadata service host (and optional port).
    pub metadata_address: String,

    /// Health probe listen port.
    pub health_check_port: u16,

    /// Reconcile interval handed to the scheduler, in minutes.
    pub reconcile_interval_minutes: u64,

    /// Period of the forced resync loop.
    pub resync_period: Duration,

    /// Retry policy for each supervised subsystem.
    pub retry: RetryPolicy,

    /// Cluster API location and credentials.
    pub cattle: CattleCredentials,

    /// Log level (debug or info).
    pub log_level: String,
}

impl Config {
    /// Validate parsed flags and environment.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let url = non_empty(cli.cattle_url.as_deref());
        let access_key = non_empty(cli.cattle_access_key.as_deref());
        let secret_key = non_empty(cli.cattle_secret_key.as_deref());

        let (url, access_key, secret_key) = match (url, access_key, secret_key) {
            (Some(url), Some(access_key), Some(secret_key)) => (url, access_key, secret_key),
            (url, access_key, secret_key) => {
                let missing = [
                    ("CATTLE_URL", url.is_none()),
                    ("CATTLE_ACCESS_KEY", access_key.is_none()),
                    ("CATTLE_SECRET_KEY", secret_key.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();

                return Err(ConfigError::MissingCredentials {
                    missing,
                    url: url.unwrap_or_default().to_string(),
                    access_key: access_key.unwrap_or_default().to_string(),
                });
            }
        };

        let url = parse_cattle_url(url)?;

        let reconcile_interval_minutes = cli
            .sleeptime
            .as_deref()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|minutes| (1..=MAX_RECONCILE_INTERVAL_MINUTES).contains(minutes))
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL_MINUTES);

        let retry = RetryPolicy {
            budget: cli.max_retries,
            backoff: if cli.retry_backoff_ms == 0 {
                BackoffPolicy::none()
            } else {
                BackoffPolicy {
                    base: Duration::from_millis(cli.retry_backoff_ms),
                    ..BackoffPolicy::default()
                }
            },
        };

        Ok(Self {
            metadata_address: cli.metadata_address.clone(),
            health_check_port: cli.health_check_port,
            reconcile_interval_minutes,
            resync_period: Duration::from_secs(cli.resync_period_secs.max(1)),
            retry,
            cattle: CattleCredentials {
                url,
                access_key: access_key.to_string(),
                secret_key: secret_key.to_string(),
            },
            log_level: cli.log_level().to_string(),
        })
    }

    /// Base URL of the metadata service API.
    pub fn metadata_url(&self) -> String {
        format!("http://{}/{}", self.metadata_address, METADATA_API_VERSION)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_cattle_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn cli() -> Cli {
        Cli {
            metadata_address: "rancher-metadata".to_string(),
            health_check_port: 80,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            resync_period_secs: DEFAULT_RESYNC_PERIOD_SECS,
            sleeptime: None,
            cattle_url: Some("http://rancher:8080/v2-beta".to_string()),
            cattle_access_key: Some("access".to_string()),
            cattle_secret_key: Some("secret".to_string()),
            rancher_debug: None,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_cli(&cli()).unwrap();

        assert_eq!(config.reconcile_interval_minutes, 1);
        assert_eq!(config.resync_period, Duration::from_secs(180));
        assert_eq!(config.retry.budget, 2);
        assert_eq!(config.health_check_port, 80);
        assert_eq!(config.log_level, "info");
        assert_eq!(
            config.metadata_url(),
            "http://rancher-metadata/2016-07-29"
        );
    }

    #[test]
    fn test_cli_flag_defaults() {
        let cli = Cli::try_parse_from(["scheduler"]).unwrap();

        assert_eq!(cli.metadata_address, "rancher-metadata");
        assert_eq!(cli.health_check_port, 80);
    }

    #[test]
    fn test_cli_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "scheduler",
            "--metadata-address",
            "169.254.169.250",
            "--health-check-port",
            "8090",
        ])
        .unwrap();

        assert_eq!(cli.metadata_address, "169.254.169.250");
        assert_eq!(cli.health_check_port, 8090);
    }

    #[rstest]
    #[case::url(|c: &mut Cli| c.cattle_url = None, "CATTLE_URL")]
    #[case::access_key(|c: &mut Cli| c.cattle_access_key = None, "CATTLE_ACCESS_KEY")]
    #[case::secret_key(|c: &mut Cli| c.cattle_secret_key = Some("  ".to_string()), "CATTLE_SECRET_KEY")]
    fn test_missing_credential_is_fatal(#[case] strip: fn(&mut Cli), #[case] name: &str) {
        let mut cli = cli();
        strip(&mut cli);

        match Config::from_cli(&cli) {
            Err(ConfigError::MissingCredentials { missing, .. }) => {
                assert_eq!(missing, vec![name]);
            }
            other => panic!("expected missing credentials, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_credentials_error_redacts_secret() {
        let mut cli = cli();
        cli.cattle_url = None;
        cli.cattle_secret_key = Some("super-secret".to_string());

        let err = Config::from_cli(&cli).unwrap_err().to_string();
        assert!(err.contains("CATTLE_URL"));
        assert!(!err.contains("super-secret"));
    }

    #[rstest]
    #[case(Some("5"), 5)]
    #[case(Some("not-a-number"), 1)]
    #[case(Some("0"), 1)]
    #[case(Some("10080"), MAX_RECONCILE_INTERVAL_MINUTES)]
    #[case(Some("10081"), 1)]
    #[case(Some("18446744073709551615"), 1)]
    #[case(Some(""), 1)]
    #[case(None, 1)]
    fn test_sleeptime_override(#[case] raw: Option<&str>, #[case] expected: u64) {
        let mut cli = cli();
        cli.sleeptime = raw.map(str::to_string);

        let config = Config::from_cli(&cli).unwrap();
        assert_eq!(config.reconcile_interval_minutes, expected);
    }

    #[test]
    fn test_invalid_cattle_url() {
        let mut cli = cli();
        cli.cattle_url = Some("ftp://rancher/v2".to_string());

        assert!(matches!(
            Config::from_cli(&cli),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_rancher_debug_enables_debug_level() {
        let mut cli = cli();
        cli.rancher_debug = Some("true".to_string());
        assert_eq!(Config::from_cli(&cli).unwrap().log_level, "debug");

        cli.rancher_debug = Some("yes".to_string());
        assert_eq!(Config::from_cli(&cli).unwrap().log_level, "info");
    }

    #[test]
    fn test_zero_backoff_disables_delay() {
        let mut cli = cli();
        cli.retry_backoff_ms = 0;

        let config = Config::from_cli(&cli).unwrap();
        assert_eq!(config.retry.backoff, BackoffPolicy::none());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let config = Config::from_cli(&cli()).unwrap();
        let rendered = format!("{:?}", config.cattle);

        assert!(rendered.contains("access"));
        assert!(!rendered.contains("\"secret\""));
    }
}
