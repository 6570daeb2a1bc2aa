use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Tuning knobs for the broadcast dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Floor for the adaptive inter-task delay.
    pub base_delay: Duration,
    /// Ceiling for the adaptive inter-task delay.
    pub max_delay: Duration,
    /// Fixed backoff between attempts after a 429.
    pub retry_delay: Duration,
    /// Per-destination attempt budget (first try included).
    pub max_attempts: u32,
    /// Minimum spacing between two campaigns.
    pub cooldown: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            retry_delay: Duration::from_millis(5000),
            max_attempts: 3,
            cooldown: Duration::from_secs(5 * 60),
        }
    }
}

impl BroadcastConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_delay.is_zero() {
            return Err(Error::Config(
                "BROADCAST_BASE_DELAY_MS must be greater than zero".to_string(),
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(Error::Config(format!(
                "BROADCAST_MAX_DELAY_MS ({}ms) must not be below BROADCAST_BASE_DELAY_MS ({}ms)",
                self.max_delay.as_millis(),
                self.base_delay.as_millis()
            )));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "BROADCAST_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn from_env() -> Self {
        let d = Self::default();
        Self {
            base_delay: env_millis("BROADCAST_BASE_DELAY_MS").unwrap_or(d.base_delay),
            max_delay: env_millis("BROADCAST_MAX_DELAY_MS").unwrap_or(d.max_delay),
            retry_delay: env_millis("BROADCAST_RETRY_DELAY_MS").unwrap_or(d.retry_delay),
            max_attempts: env_u32("BROADCAST_MAX_ATTEMPTS").unwrap_or(d.max_attempts),
            cooldown: env_millis("BROADCAST_COOLDOWN_MS").unwrap_or(d.cooldown),
        }
    }
}

/// Typed configuration for the bot process.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_allowed_users: Vec<i64>,
    pub telegram_safe_limit: usize,

    // Storage
    pub store_path: PathBuf,

    // Dispatcher
    pub broadcast: BroadcastConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        // Optional: the store's allow list is the primary source.
        let telegram_allowed_users = parse_csv_i64(env_str("TELEGRAM_ALLOWED_USERS"));
        let telegram_safe_limit = env_usize("TELEGRAM_SAFE_LIMIT").unwrap_or(4000);

        let store_path = PathBuf::from(
            env_str("STORE_PATH").unwrap_or("/tmp/groupcast-store.json".to_string()),
        );
        if let Some(parent) = store_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let broadcast = BroadcastConfig::from_env();
        broadcast.validate()?;

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_users,
            telegram_safe_limit,
            store_path,
            broadcast,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_u64(key).map(Duration::from_millis)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_tuning() {
        let cfg = BroadcastConfig::default();
        assert_eq!(cfg.base_delay, Duration::from_secs(1));
        assert_eq!(cfg.max_delay, Duration::from_secs(30));
        assert_eq!(cfg.retry_delay, Duration::from_secs(5));
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.cooldown, Duration::from_secs(300));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_delay_bounds() {
        let cfg = BroadcastConfig {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(1),
            ..BroadcastConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_attempts_and_zero_base() {
        let cfg = BroadcastConfig {
            max_attempts: 0,
            ..BroadcastConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = BroadcastConfig {
            base_delay: Duration::ZERO,
            ..BroadcastConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn csv_ids_skip_garbage() {
        assert_eq!(
            parse_csv_i64(Some(" 1, x ,-42,,7".to_string())),
            vec![1, -42, 7]
        );
        assert!(parse_csv_i64(None).is_empty());
    }

    #[test]
    fn quotes_are_stripped_from_dotenv_values() {
        assert_eq!(strip_quotes("\"abc\""), "abc");
        assert_eq!(strip_quotes("'abc'"), "abc");
        assert_eq!(strip_quotes("\"abc"), "\"abc");
    }
}
