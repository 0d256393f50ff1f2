//! Policy gate run once per inbound message before fan-out.

use std::{collections::HashMap, fmt, sync::Arc, sync::Mutex, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::debug;

use crate::{
    config::{clamp_cooldown, MAX_COOLDOWN, MIN_COOLDOWN},
    domain::{Participant, UserId},
    errors::Error,
    messaging::types::{Content, ContentKind},
    similarity,
    store::{flag_setting, keys, Store},
    Result,
};

/// Messages more similar than this to the sender's previous one are rejected.
pub const SPAM_SIMILARITY_THRESHOLD: f64 = 0.8;

#[derive(Clone, Debug, PartialEq)]
pub enum Rejection {
    Paused,
    Banned,
    Muted { remaining_minutes: i64 },
    Cooldown { wait: Duration },
    Duplicate,
    MediaDisabled(ContentKind),
}

impl Rejection {
    /// Text shown to the sender.
    pub fn notice(&self) -> String {
        match self {
            Rejection::Paused => "⏸ The chat is paused right now. Try again later.".to_string(),
            Rejection::Banned => "⛔ You are banned.".to_string(),
            Rejection::Muted { remaining_minutes } => {
                format!("🔇 You are muted. Remaining: {remaining_minutes} min")
            }
            Rejection::Cooldown { wait } => format!(
                "⏳ Wait {:.1}s before sending the next message",
                wait.as_secs_f64()
            ),
            Rejection::Duplicate => "🔁 Come up with something new".to_string(),
            Rejection::MediaDisabled(kind) => {
                format!("🚫 Messages of type {kind} are disabled")
            }
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Paused => f.write_str("paused"),
            Rejection::Banned => f.write_str("banned"),
            Rejection::Muted { .. } => f.write_str("muted"),
            Rejection::Cooldown { .. } => f.write_str("cooldown"),
            Rejection::Duplicate => f.write_str("duplicate"),
            Rejection::MediaDisabled(_) => f.write_str("media_disabled"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Admitted,
    Rejected(Rejection),
}

/// Per-participant last-accepted timestamps. Process-local.
#[derive(Debug, Default)]
pub struct Cooldowns {
    last_accepted: HashMap<UserId, Instant>,
}

impl Cooldowns {
    /// Remaining wait for `user` at `now`, if any.
    pub fn check_at(&self, user: UserId, now: Instant, cooldown: Duration) -> Option<Duration> {
        let last = self.last_accepted.get(&user)?;
        let elapsed = now.saturating_duration_since(*last);
        if elapsed < cooldown {
            Some(cooldown - elapsed)
        } else {
            None
        }
    }

    pub fn commit(&mut self, user: UserId, now: Instant) {
        self.last_accepted.insert(user, now);
    }
}

pub struct AdmissionFilter {
    store: Arc<dyn Store>,
    default_cooldown: Duration,
    cooldowns: Mutex<Cooldowns>,
}

impl AdmissionFilter {
    pub fn new(store: Arc<dyn Store>, default_cooldown: Duration) -> Self {
        Self {
            store,
            default_cooldown: clamp_cooldown(default_cooldown),
            cooldowns: Mutex::new(Cooldowns::default()),
        }
    }

    /// Current cooldown: the persisted admin value, else the configured default.
    pub async fn cooldown(&self) -> Result<Duration> {
        let stored = self.store.get_setting(keys::COOLDOWN_MS).await?;
        Ok(stored
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|ms| clamp_cooldown(Duration::from_millis(ms)))
            .unwrap_or(self.default_cooldown))
    }

    /// Set the cooldown in seconds. Accepts 0.1 to 10.
    pub async fn set_cooldown(&self, secs: f64) -> Result<Duration> {
        if !secs.is_finite()
            || secs < MIN_COOLDOWN.as_secs_f64()
            || secs > MAX_COOLDOWN.as_secs_f64()
        {
            return Err(Error::Invalid(format!(
                "cooldown must be between {} and {} seconds",
                MIN_COOLDOWN.as_secs_f64(),
                MAX_COOLDOWN.as_secs_f64()
            )));
        }
        let d = Duration::from_secs_f64(secs);
        self.store
            .set_setting(keys::COOLDOWN_MS, &d.as_millis().to_string())
            .await?;
        Ok(d)
    }

    pub async fn admit(&self, participant: &Participant, content: &Content) -> Result<Verdict> {
        self.admit_at(participant, content, Utc::now(), Instant::now())
            .await
    }

    /// Checks run in a fixed order and stop at the first failure. Nothing is
    /// written unless the message is admitted.
    pub async fn admit_at(
        &self,
        participant: &Participant,
        content: &Content,
        now: DateTime<Utc>,
        clock: Instant,
    ) -> Result<Verdict> {
        if !participant.is_staff() && !flag_setting(&*self.store, keys::BOT_ENABLED, true).await? {
            return Ok(reject(participant.id, Rejection::Paused));
        }

        if participant.banned {
            return Ok(reject(participant.id, Rejection::Banned));
        }

        if let Some(until) = participant.muted_until {
            if until > now {
                let remaining_minutes = (until - now).num_minutes();
                return Ok(reject(
                    participant.id,
                    Rejection::Muted { remaining_minutes },
                ));
            }
        }

        let cooldown = self.cooldown().await?;
        let wait = self
            .cooldowns
            .lock()
            .map_err(|_| Error::External("cooldown state poisoned".to_string()))?
            .check_at(participant.id, clock, cooldown);
        if let Some(wait) = wait {
            return Ok(reject(participant.id, Rejection::Cooldown { wait }));
        }

        let text = content.text().unwrap_or_default();
        if let Some(previous) = participant.last_message_text.as_deref() {
            if !text.is_empty()
                && !previous.is_empty()
                && similarity::ratio(previous, text) > SPAM_SIMILARITY_THRESHOLD
            {
                return Ok(reject(participant.id, Rejection::Duplicate));
            }
        }

        let kind = content.kind();
        if !flag_setting(&*self.store, &keys::media_enabled(kind), true).await? {
            return Ok(reject(participant.id, Rejection::MediaDisabled(kind)));
        }

        self.cooldowns
            .lock()
            .map_err(|_| Error::External("cooldown state poisoned".to_string()))?
            .commit(participant.id, clock);
        self.store
            .record_activity(participant.id, text, now)
            .await?;

        Ok(Verdict::Admitted)
    }
}

fn reject(user: UserId, why: Rejection) -> Verdict {
    debug!(user = %user, reason = %why, "admission rejected");
    Verdict::Rejected(why)
}

/// Persist a media toggle.
pub async fn set_media_enabled(store: &dyn Store, kind: ContentKind, enabled: bool) -> Result<()> {
    store
        .set_setting(&keys::media_enabled(kind), if enabled { "1" } else { "0" })
        .await
}
