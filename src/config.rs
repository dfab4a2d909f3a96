//! Runtime configuration for the lifeec service.
//!
//! Configuration comes from the process environment.  Every option has a default except
//! the datastore URI; a missing URI is reported at startup and surfaces as a connection
//! failure rather than a configuration failure.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

/// Port the HTTP listener binds when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 10000;

/// Host the HTTP listener binds when `HOST` is unset.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Origins allowed to make credentialed cross-origin requests when `CORS_ORIGINS` is unset.
pub const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "https://lifeec-web.onrender.com",
    "https://lifeec.vercel.app",
];

/// Seconds between datastore liveness probes when `HEALTH_CHECK_INTERVAL_SECS` is unset.
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// Plaintext password given to the seeded privileged accounts when `SEED_PASSWORD` is unset.
pub const DEFAULT_SEED_PASSWORD: &str = "12345";

/////////////////////////////////////////// RuntimeMode ///////////////////////////////////////////

/// Distinguishes detail-exposing development behavior from production behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeMode {
    /// Error responses include diagnostic detail.
    Development,
    /// Error responses carry an empty `error` object.
    #[default]
    Production,
}

impl RuntimeMode {
    /// Parses an `APP_ENV` value.  Only `development` (or `dev`) exposes error detail;
    /// any other value, including an unset variable, is treated as production.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "development" || v == "dev" => RuntimeMode::Development,
            _ => RuntimeMode::Production,
        }
    }

    /// Whether 500 responses may carry diagnostic detail.
    pub fn exposes_error_detail(self) -> bool {
        self == RuntimeMode::Development
    }
}

impl Display for RuntimeMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RuntimeMode::Development => write!(f, "development"),
            RuntimeMode::Production => write!(f, "production"),
        }
    }
}

/////////////////////////////////////////// ConfigError ///////////////////////////////////////////

/// A configuration value was present but could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// The environment variable that held the bad value.
    pub key: &'static str,
    /// The rejected value.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "invalid {}={:?}: {}", self.key, self.value, self.reason)
    }
}

impl std::error::Error for ConfigError {}

////////////////////////////////////////////// Config //////////////////////////////////////////////

/// Fully resolved service configuration.
///
/// `JWT_SECRET` is never retained; only its presence is recorded so that startup can
/// report it.  The `Debug` output redacts the datastore URI and the seed password.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Datastore connection URI (`DATABASE_URL`).
    pub database_url: Option<String>,
    /// Listener host (`HOST`).
    pub host: String,
    /// Listener port (`PORT`).
    pub port: u16,
    /// Runtime mode (`APP_ENV`).
    pub mode: RuntimeMode,
    /// Whether `JWT_SECRET` is set.
    pub secret_present: bool,
    /// Cross-origin allow-list (`CORS_ORIGINS`, comma separated).
    pub cors_origins: Vec<String>,
    /// Interval between datastore liveness probes (`HEALTH_CHECK_INTERVAL_SECS`).
    pub health_check_interval: Duration,
    /// Reseed privileged accounts during boot (`SEED_ON_BOOT`).  Destructive.
    pub seed_on_boot: bool,
    /// Password for the seeded accounts (`SEED_PASSWORD`).
    pub seed_password: String,
    /// bcrypt cost factor (`BCRYPT_COST`).
    pub bcrypt_cost: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            mode: RuntimeMode::default(),
            secret_present: false,
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
            health_check_interval: Duration::from_secs(DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
            seed_on_boot: false,
            seed_password: DEFAULT_SEED_PASSWORD.to_string(),
            bcrypt_cost: crate::seed::DEFAULT_COST,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        const REDACTED: &str = "<redacted>";
        f.debug_struct("Config")
            .field("database_url", &self.database_url.as_ref().map(|_| REDACTED))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("mode", &self.mode)
            .field("secret_present", &self.secret_present)
            .field("cors_origins", &self.cors_origins)
            .field("health_check_interval", &self.health_check_interval)
            .field("seed_on_boot", &self.seed_on_boot)
            .field("seed_password", &REDACTED)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let port = match get("PORT") {
            Some(raw) => parse_number::<u16>("PORT", &raw)?,
            None => defaults.port,
        };
        let health_check_interval = match get("HEALTH_CHECK_INTERVAL_SECS") {
            Some(raw) => {
                let secs = parse_number::<u64>("HEALTH_CHECK_INTERVAL_SECS", &raw)?;
                if secs == 0 {
                    return Err(ConfigError {
                        key: "HEALTH_CHECK_INTERVAL_SECS",
                        value: raw,
                        reason: "must be at least one second".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => defaults.health_check_interval,
        };
        let bcrypt_cost = match get("BCRYPT_COST") {
            Some(raw) => {
                let cost = parse_number::<u32>("BCRYPT_COST", &raw)?;
                if !(crate::seed::MIN_COST..=crate::seed::MAX_COST).contains(&cost) {
                    return Err(ConfigError {
                        key: "BCRYPT_COST",
                        value: raw,
                        reason: format!(
                            "must be between {} and {}",
                            crate::seed::MIN_COST,
                            crate::seed::MAX_COST
                        ),
                    });
                }
                cost
            }
            None => defaults.bcrypt_cost,
        };
        let seed_on_boot = match get("SEED_ON_BOOT") {
            Some(raw) => parse_flag("SEED_ON_BOOT", &raw)?,
            None => false,
        };
        let cors_origins = match get("CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
            None => defaults.cors_origins,
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            host: get("HOST").unwrap_or(defaults.host),
            port,
            mode: RuntimeMode::parse(get("APP_ENV").as_deref()),
            secret_present: get("JWT_SECRET").is_some(),
            cors_origins,
            health_check_interval,
            seed_on_boot,
            seed_password: get("SEED_PASSWORD").unwrap_or(defaults.seed_password),
            bcrypt_cost,
        })
    }

    /// The `host:port` string the listener binds.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            key,
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
