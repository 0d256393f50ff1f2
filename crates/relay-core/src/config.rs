use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::ChatId, domain::UserId, errors::Error, messaging::throttled::ThrottleConfig, Result};

pub const MIN_COOLDOWN: Duration = Duration::from_millis(100);
pub const MAX_COOLDOWN: Duration = Duration::from_secs(10);

/// Typed process configuration.
///
/// Only bootstrap values live here; settings changed at runtime by staff are
/// persisted in the store.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub creator_id: UserId,
    pub poll_channel_id: Option<ChatId>,
    pub database_path: PathBuf,

    // Admission
    pub send_cooldown: Duration,

    // Background
    pub autodel_sweep_interval: Duration,

    // Outbound pacing
    pub delivery_global_interval: Duration,
    pub delivery_per_chat_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let creator_id = env_i64("CREATOR_ID").map(UserId).ok_or_else(|| {
            Error::Config("CREATOR_ID environment variable is required".to_string())
        })?;

        let poll_channel_id = env_i64("POLL_CHANNEL_ID").map(ChatId);
        let database_path = PathBuf::from(
            env_str("DATABASE_PATH")
                .and_then(non_empty)
                .unwrap_or("data/relay.db".to_string()),
        );

        let send_cooldown =
            clamp_cooldown(Duration::from_millis(env_u64("SEND_COOLDOWN_MS").unwrap_or(1000)));

        let autodel_sweep_interval =
            Duration::from_secs(env_u64("AUTODEL_SWEEP_SECS").unwrap_or(60).max(1));

        let delivery_global_interval =
            Duration::from_millis(env_u64("DELIVERY_GLOBAL_INTERVAL_MS").unwrap_or(35));
        let delivery_per_chat_interval =
            Duration::from_millis(env_u64("DELIVERY_PER_CHAT_INTERVAL_MS").unwrap_or(0));

        Ok(Self {
            telegram_bot_token,
            creator_id,
            poll_channel_id,
            database_path,
            send_cooldown,
            autodel_sweep_interval,
            delivery_global_interval,
            delivery_per_chat_interval,
        })
    }

    pub fn throttle(&self) -> ThrottleConfig {
        ThrottleConfig {
            global_min_interval: self.delivery_global_interval,
            per_chat_min_interval: self.delivery_per_chat_interval,
        }
    }
}

pub fn clamp_cooldown(d: Duration) -> Duration {
    d.clamp(MIN_COOLDOWN, MAX_COOLDOWN)
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let Some((key, val)) = parse_dotenv_line(raw) else {
            continue;
        };
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv_line(raw: &str) -> Option<(String, String)> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (k, v) = line.split_once('=')?;
    let key = k.trim();
    if key.is_empty() {
        return None;
    }

    let mut val = v.trim().to_string();
    // Strip optional surrounding quotes.
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        val = val[1..val.len() - 1].to_string();
    }

    Some((key.to_string(), val))
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
