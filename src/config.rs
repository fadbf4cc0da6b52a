//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Bot configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Name used in logs.
    pub name: String,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Enables the Telegram channel when set.
    pub telegram_token: Option<SecretString>,
    /// Telegram usernames or numeric ids allowed to talk to the bot. `*` allows all.
    pub telegram_allowed_users: Vec<String>,
    /// Whether the stdin/stdout channel is enabled.
    pub cli_enabled: bool,
    /// Port for the status HTTP server, if any.
    pub http_port: Option<u16>,
    /// Form sessions idle longer than this are pruned.
    pub session_idle_timeout: Duration,
    /// Per-user dispatch lanes idle longer than this exit.
    pub lane_idle_timeout: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "intake-bot".to_string(),
            db_path: PathBuf::from("./data/intake.db"),
            telegram_token: None,
            telegram_allowed_users: vec!["*".to_string()],
            cli_enabled: true,
            http_port: None,
            session_idle_timeout: Duration::from_secs(86_400), // 1 day
            lane_idle_timeout: Duration::from_secs(300),       // 5 minutes
        }
    }
}

impl BotConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for
    /// unset or empty keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let telegram_allowed_users = match get("TELEGRAM_ALLOWED_USERS") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.telegram_allowed_users,
        };

        Ok(Self {
            name: get("INTAKE_BOT_NAME").unwrap_or(defaults.name),
            db_path: get("INTAKE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            telegram_token: get("TELEGRAM_BOT_TOKEN").map(SecretString::from),
            telegram_allowed_users,
            cli_enabled: match get("INTAKE_CLI") {
                Some(v) => parse_bool("INTAKE_CLI", &v)?,
                None => defaults.cli_enabled,
            },
            http_port: get("INTAKE_HTTP_PORT")
                .map(|v| parse_value("INTAKE_HTTP_PORT", &v))
                .transpose()?,
            session_idle_timeout: match get("INTAKE_SESSION_IDLE_SECS") {
                Some(v) => Duration::from_secs(parse_value("INTAKE_SESSION_IDLE_SECS", &v)?),
                None => defaults.session_idle_timeout,
            },
            lane_idle_timeout: match get("INTAKE_LANE_IDLE_SECS") {
                Some(v) => Duration::from_secs(parse_value("INTAKE_LANE_IDLE_SECS", &v)?),
                None => defaults.lane_idle_timeout,
            },
        })
    }

    /// Whether every Telegram user may talk to the bot.
    pub fn telegram_open_to_all(&self) -> bool {
        self.telegram_allowed_users.iter().any(|u| u == "*")
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?} is not a boolean"),
        }),
    }
}
