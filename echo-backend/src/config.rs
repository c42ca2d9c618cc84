use crate::ordering::IdOrdering;
use crate::x::OAuth1Credentials;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use strum::{AsRefStr, Display, EnumString};

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const BIND_ADDRESS: &str = "ECHO_BIND_ADDRESS";
    pub const STORE: &str = "ECHO_STORE";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const REDIS_URL: &str = "REDIS_URL";
    // X API
    pub const X_API_BASE: &str = "X_API_BASE";
    pub const X_BEARER_TOKEN: &str = "X_BEARER_TOKEN";
    pub const X_API_KEY: &str = "X_API_KEY";
    pub const X_API_SECRET: &str = "X_API_SECRET";
    pub const X_ACCESS_TOKEN: &str = "X_ACCESS_TOKEN";
    pub const X_ACCESS_SECRET: &str = "X_ACCESS_SECRET";
    // Mention handling
    pub const TARGET_USERNAME: &str = "TARGET_USERNAME";
    pub const REPLY_MESSAGE: &str = "REPLY_MESSAGE";
    pub const LOOKBACK_PERIOD_MINUTES: &str = "LOOKBACK_PERIOD_MINUTES";
    pub const RETENTION_DAYS: &str = "ECHO_RETENTION_DAYS";
    pub const ID_ORDERING: &str = "ECHO_ID_ORDERING";
    pub const RESERVATION: &str = "ECHO_RESERVATION";
    pub const CLAIM_TTL_SECS: &str = "ECHO_CLAIM_TTL_SECS";
    // Scheduling
    pub const POLL_INTERVAL_SECS: &str = "ECHO_POLL_INTERVAL_SECS";
    pub const CRON: &str = "ECHO_CRON";
    pub const RUN_ON_STARTUP: &str = "ECHO_RUN_ON_STARTUP";
    pub const CLEANUP_INTERVAL_SECS: &str = "ECHO_CLEANUP_INTERVAL_SECS";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 8787;
    pub const BIND_ADDRESS: &str = "0.0.0.0";
    pub const DATABASE_URL: &str = "./.db/echo.db";
    pub const REDIS_URL: &str = "redis://127.0.0.1:6379";
    pub const X_API_BASE: &str = "https://api.twitter.com/2";
    pub const LOOKBACK_PERIOD_MINUTES: u64 = 60;
    pub const RETENTION_DAYS: u64 = 7;
    pub const CLAIM_TTL_SECS: u64 = 600;
    pub const POLL_INTERVAL_SECS: u64 = 300;
    /// X rate limit protection
    pub const MIN_POLL_INTERVAL_SECS: u64 = 60;
    pub const CLEANUP_INTERVAL_SECS: u64 = 3600;
}

/// Max characters in a reply on a non-premium account
pub const MAX_REPLY_CHARS: usize = 280;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StoreBackend {
    Sqlite,
    Redis,
    Memory,
}

/// Credentials for the X API. Reads work with either form; posting replies
/// needs a user-context token (OAuth 1.0a, or an OAuth 2.0 user token as bearer).
#[derive(Debug, Clone)]
pub struct XCredentials {
    pub bearer_token: Option<String>,
    pub oauth1: Option<OAuth1Credentials>,
}

/// What the processor needs to know, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct EchoConfig {
    /// Monitored account, without the leading '@'
    pub target_username: String,
    pub reply_message: String,
    /// How far back the first-ever fetch looks
    pub lookback: Duration,
    /// How long processed-mention records are retained
    pub retention: Duration,
    pub id_ordering: IdOrdering,
    /// Claim each mention atomically before replying
    pub reservation: bool,
    pub claim_ttl: Duration,
}

impl EchoConfig {
    pub fn new(target_username: &str, reply_message: &str) -> Self {
        Self {
            target_username: target_username.trim_start_matches('@').to_string(),
            reply_message: reply_message.to_string(),
            lookback: Duration::from_secs(defaults::LOOKBACK_PERIOD_MINUTES * 60),
            retention: days(defaults::RETENTION_DAYS),
            id_ordering: IdOrdering::default(),
            reservation: true,
            claim_ttl: Duration::from_secs(defaults::CLAIM_TTL_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Trigger {
    Interval(Duration),
    Cron(cron::Schedule),
}

impl Trigger {
    pub fn describe(&self) -> String {
        match self {
            Trigger::Interval(every) => format!("every {}s", every.as_secs()),
            Trigger::Cron(schedule) => format!("cron {}", schedule),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub trigger: Trigger,
    pub run_on_startup: bool,
    pub cleanup_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub store_backend: StoreBackend,
    pub database_url: String,
    pub redis_url: String,
    pub api_base: String,
    pub credentials: XCredentials,
    pub echo: EchoConfig,
    pub scheduler: SchedulerConfig,
}

fn days(n: u64) -> Duration {
    Duration::from_secs(n * 24 * 60 * 60)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let get_u64 = |key: &str, default: u64| -> Result<u64, String> {
            match get(key) {
                Some(v) => v
                    .parse()
                    .map_err(|_| format!("{} must be a non-negative integer, got '{}'", key, v)),
                None => Ok(default),
            }
        };

        // Mention handling
        let target_username = get(env_vars::TARGET_USERNAME)
            .map(|u| u.trim_start_matches('@').to_string())
            .ok_or_else(|| format!("{} not configured", env_vars::TARGET_USERNAME))?;
        if !target_username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(format!("Invalid target username '{}'", target_username));
        }

        // Keep the message verbatim: leading/trailing whitespace may be intentional
        let reply_message = lookup(env_vars::REPLY_MESSAGE)
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| format!("{} not configured", env_vars::REPLY_MESSAGE))?;
        if reply_message.chars().count() > MAX_REPLY_CHARS {
            log::warn!(
                "{} is {} chars; replies over {} chars are rejected for non-premium accounts",
                env_vars::REPLY_MESSAGE,
                reply_message.chars().count(),
                MAX_REPLY_CHARS
            );
        }

        let id_ordering = match get(env_vars::ID_ORDERING) {
            Some(v) => IdOrdering::from_str(&v)
                .map_err(|_| format!("Unknown {} '{}'. Use 'lexicographic' or 'numeric'.", env_vars::ID_ORDERING, v))?,
            None => IdOrdering::default(),
        };

        let echo = EchoConfig {
            target_username,
            reply_message,
            lookback: Duration::from_secs(
                get_u64(env_vars::LOOKBACK_PERIOD_MINUTES, defaults::LOOKBACK_PERIOD_MINUTES)? * 60,
            ),
            retention: days(get_u64(env_vars::RETENTION_DAYS, defaults::RETENTION_DAYS)?.max(1)),
            id_ordering,
            reservation: get(env_vars::RESERVATION).map(|v| parse_bool(&v)).unwrap_or(true),
            claim_ttl: Duration::from_secs(
                get_u64(env_vars::CLAIM_TTL_SECS, defaults::CLAIM_TTL_SECS)?.max(1),
            ),
        };

        // Credentials: OAuth 1.0a only when all four parts are present
        let oauth1 = match (
            get(env_vars::X_API_KEY),
            get(env_vars::X_API_SECRET),
            get(env_vars::X_ACCESS_TOKEN),
            get(env_vars::X_ACCESS_SECRET),
        ) {
            (Some(ck), Some(cs), Some(at), Some(ats)) => Some(OAuth1Credentials::new(ck, cs, at, ats)),
            (None, None, None, None) => None,
            _ => {
                return Err(format!(
                    "Incomplete OAuth 1.0a credentials: set all of {}, {}, {}, {}",
                    env_vars::X_API_KEY,
                    env_vars::X_API_SECRET,
                    env_vars::X_ACCESS_TOKEN,
                    env_vars::X_ACCESS_SECRET
                ))
            }
        };
        let credentials = XCredentials {
            bearer_token: get(env_vars::X_BEARER_TOKEN),
            oauth1,
        };
        if credentials.bearer_token.is_none() && credentials.oauth1.is_none() {
            return Err(format!(
                "No X credentials: set {} or the OAuth 1.0a keys",
                env_vars::X_BEARER_TOKEN
            ));
        }

        // Scheduling: a cron expression wins over the fixed interval
        let trigger = match get(env_vars::CRON) {
            Some(expr) => Trigger::Cron(
                cron::Schedule::from_str(&expr)
                    .map_err(|e| format!("Invalid {} '{}': {}", env_vars::CRON, expr, e))?,
            ),
            None => Trigger::Interval(Duration::from_secs(
                get_u64(env_vars::POLL_INTERVAL_SECS, defaults::POLL_INTERVAL_SECS)?
                    .max(defaults::MIN_POLL_INTERVAL_SECS),
            )),
        };
        let scheduler = SchedulerConfig {
            trigger,
            run_on_startup: get(env_vars::RUN_ON_STARTUP).map(|v| parse_bool(&v)).unwrap_or(true),
            cleanup_interval: Duration::from_secs(
                get_u64(env_vars::CLEANUP_INTERVAL_SECS, defaults::CLEANUP_INTERVAL_SECS)?.max(60),
            ),
        };

        let store_backend = match get(env_vars::STORE) {
            Some(v) => StoreBackend::from_str(&v)
                .map_err(|_| format!("Unknown {} '{}'. Use 'sqlite', 'redis' or 'memory'.", env_vars::STORE, v))?,
            None => StoreBackend::Sqlite,
        };

        let port = match get(env_vars::PORT) {
            Some(v) => v
                .parse()
                .map_err(|_| format!("{} must be a valid port number, got '{}'", env_vars::PORT, v))?,
            None => defaults::PORT,
        };

        Ok(Self {
            port,
            bind_address: get(env_vars::BIND_ADDRESS).unwrap_or_else(|| defaults::BIND_ADDRESS.to_string()),
            store_backend,
            database_url: get(env_vars::DATABASE_URL).unwrap_or_else(|| defaults::DATABASE_URL.to_string()),
            redis_url: get(env_vars::REDIS_URL).unwrap_or_else(|| defaults::REDIS_URL.to_string()),
            api_base: get(env_vars::X_API_BASE)
                .unwrap_or_else(|| defaults::X_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            credentials,
            echo,
            scheduler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        (env_vars::TARGET_USERNAME, "@gethen"),
        (env_vars::REPLY_MESSAGE, "Thanks for the mention!"),
        (env_vars::X_BEARER_TOKEN, "token"),
    ];

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_lookup(lookup(MINIMAL)).unwrap();
        assert_eq!(config.echo.target_username, "gethen");
        assert_eq!(config.echo.retention, days(7));
        assert_eq!(config.echo.lookback, Duration::from_secs(3600));
        assert_eq!(config.echo.id_ordering, IdOrdering::Lexicographic);
        assert!(config.echo.reservation);
        assert_eq!(config.store_backend, StoreBackend::Sqlite);
        assert_eq!(config.port, defaults::PORT);
        assert!(config.credentials.oauth1.is_none());
        assert!(config.scheduler.run_on_startup);
        match config.scheduler.trigger {
            Trigger::Interval(every) => assert_eq!(every.as_secs(), defaults::POLL_INTERVAL_SECS),
            Trigger::Cron(_) => panic!("expected interval trigger"),
        }
    }

    #[test]
    fn test_missing_required_values() {
        let err = Config::from_lookup(lookup(&[(env_vars::X_BEARER_TOKEN, "t")])).unwrap_err();
        assert!(err.contains(env_vars::TARGET_USERNAME));

        let err = Config::from_lookup(lookup(&[
            (env_vars::TARGET_USERNAME, "gethen"),
            (env_vars::REPLY_MESSAGE, "hi"),
        ]))
        .unwrap_err();
        assert!(err.contains("No X credentials"));
    }

    #[test]
    fn test_partial_oauth1_is_rejected() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push((env_vars::X_API_KEY, "ck"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.contains("Incomplete OAuth"));
    }

    #[test]
    fn test_full_config() {
        let mut pairs = MINIMAL.to_vec();
        pairs.extend_from_slice(&[
            (env_vars::X_API_KEY, "ck"),
            (env_vars::X_API_SECRET, "cs"),
            (env_vars::X_ACCESS_TOKEN, "at"),
            (env_vars::X_ACCESS_SECRET, "ats"),
            (env_vars::STORE, "Redis"),
            (env_vars::ID_ORDERING, "numeric"),
            (env_vars::RESERVATION, "false"),
            (env_vars::RETENTION_DAYS, "3"),
            (env_vars::POLL_INTERVAL_SECS, "5"),
            (env_vars::X_API_BASE, "http://localhost:9000/2/"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.credentials.oauth1.is_some());
        assert_eq!(config.store_backend, StoreBackend::Redis);
        assert_eq!(config.echo.id_ordering, IdOrdering::Numeric);
        assert!(!config.echo.reservation);
        assert_eq!(config.echo.retention, days(3));
        assert_eq!(config.api_base, "http://localhost:9000/2");
        // Clamped to the rate-limit floor
        match config.scheduler.trigger {
            Trigger::Interval(every) => assert_eq!(every.as_secs(), defaults::MIN_POLL_INTERVAL_SECS),
            Trigger::Cron(_) => panic!("expected interval trigger"),
        }
    }

    #[test]
    fn test_cron_trigger() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push((env_vars::CRON, "0 */5 * * * *"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert!(matches!(config.scheduler.trigger, Trigger::Cron(_)));
        assert!(config.scheduler.trigger.describe().starts_with("cron "));

        let mut pairs = MINIMAL.to_vec();
        pairs.push((env_vars::CRON, "every five minutes"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_invalid_values_are_errors() {
        for (key, value) in [
            (env_vars::STORE, "postgres"),
            (env_vars::ID_ORDERING, "time"),
            (env_vars::RETENTION_DAYS, "-1"),
            (env_vars::PORT, "http"),
            (env_vars::TARGET_USERNAME, "not a handle"),
        ] {
            let mut pairs = MINIMAL.to_vec();
            pairs.retain(|(k, _)| *k != key);
            pairs.push((key, value));
            assert!(Config::from_lookup(lookup(&pairs)).is_err(), "{}={} should fail", key, value);
        }
    }
}
