use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use rate_limit::RateLimitConfig;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,

    /// Failed attempts allowed per key before further attempts are rejected
    #[arg(long, env, default_value_t = 5,
        value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_limit_max_attempts: u32,

    /// Length in minutes of the window in which attempts are counted
    #[arg(long, env, default_value_t = 15,
        value_parser = clap::value_parser!(u64).range(1..))]
    pub rate_limit_lockout_minutes: u64,

    /// Minutes to wait before the first sweep of stale rate limit entries
    #[arg(long, env, default_value_t = 30)]
    pub rate_limit_sweep_delay_minutes: u64,

    /// Minutes between sweeps of stale rate limit entries
    #[arg(long, env, default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..))]
    pub rate_limit_sweep_interval_minutes: u64,

    /// Seconds between keepalive comments on idle event streams
    #[arg(long, env, default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..))]
    pub sse_heartbeat_interval_secs: u64,

    /// Seconds a single event write may take before the client is dropped
    #[arg(long, env, default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..))]
    pub sse_write_timeout_secs: u64,
}

impl Default for Config {
    /// Environment and defaults only; command-line arguments are ignored.
    fn default() -> Self {
        Config::parse_from([env!("CARGO_PKG_NAME")])
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn interface(&self) -> &str {
        self.interface.as_deref().unwrap_or("127.0.0.1")
    }

    pub fn lockout_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_lockout_minutes.saturating_mul(60))
    }

    pub fn rate_limit_config(&self) -> Result<RateLimitConfig, rate_limit::Error> {
        RateLimitConfig::new(self.rate_limit_max_attempts, self.lockout_window())
    }

    pub fn sweep_delay(&self) -> Duration {
        Duration::from_secs(self.rate_limit_sweep_delay_minutes.saturating_mul(60))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_sweep_interval_minutes.saturating_mul(60))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.sse_heartbeat_interval_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.sse_write_timeout_secs)
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::parse_from(["test"]);
        assert_eq!(config.interface(), "127.0.0.1");
        assert_eq!(config.rate_limit_max_attempts, 5);
        assert_eq!(config.lockout_window(), Duration::from_secs(15 * 60));
        assert_eq!(config.sweep_delay(), Duration::from_secs(30 * 60));
        assert_eq!(config.sweep_interval(), Duration::from_secs(60 * 60));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.write_timeout(), Duration::from_secs(10));
        assert!(!config.is_production());

        let limits = config.rate_limit_config().unwrap();
        assert_eq!(limits.max_attempts(), 5);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::parse_from([
            "test",
            "--rate-limit-max-attempts",
            "3",
            "--rate-limit-lockout-minutes",
            "1",
            "--sse-heartbeat-interval-secs",
            "10",
            "--runtime-env",
            "PRODUCTION",
        ]);
        assert_eq!(config.rate_limit_max_attempts, 3);
        assert_eq!(config.lockout_window(), Duration::from_secs(60));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(10));
        assert!(config.is_production());
    }

    #[test]
    fn test_zero_max_attempts_is_rejected() {
        let result = Config::try_parse_from(["test", "--rate-limit-max-attempts", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rust_env_parsing() {
        assert_eq!("Staging".parse::<RustEnv>(), Ok(RustEnv::Staging));
        assert_eq!("qa".parse::<RustEnv>(), Err(RustEnvParseError));
        assert_eq!(RustEnv::Production.to_string(), "production");
    }
}
