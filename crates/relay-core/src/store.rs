use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    domain::{
        DeliveredCopy, LogicalId, LogicalMessage, MessageId, PaidSale, Participant,
        ParticipantPatch, PurgeCounts, Role, Totals, UserId, WarningRecord,
    },
    Result,
};

/// Persistence port consumed by the relay.
///
/// Every call is a fresh read or write; callers keep no cache of what the
/// store owns.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // Participants

    async fn get_participant(&self, id: UserId) -> Result<Option<Participant>>;

    /// Insert a participant if missing; returns the stored row either way.
    async fn create_participant(&self, id: UserId, role: Role) -> Result<Participant>;

    async fn update_participant(&self, id: UserId, patch: &ParticipantPatch) -> Result<()>;

    /// Remove a participant with every row that belongs to them.
    async fn delete_participant(&self, id: UserId) -> Result<()>;

    /// Ids of captcha-passed, non-banned participants.
    async fn list_active_participants(&self) -> Result<Vec<UserId>>;

    async fn list_staff(&self) -> Result<Vec<Participant>>;

    /// Active participants with the most relayed messages, busiest first.
    async fn top_participants(&self, limit: usize) -> Result<Vec<Participant>>;

    // Ignore relation (directed: `by` ignores `target`)

    async fn is_ignored(&self, by: UserId, target: UserId) -> Result<bool>;
    async fn add_ignore(&self, by: UserId, target: UserId) -> Result<()>;
    async fn remove_ignore(&self, by: UserId, target: UserId) -> Result<bool>;
    async fn clear_ignores(&self, by: UserId) -> Result<usize>;

    // Logical messages and the correspondence map

    async fn record_logical_message(&self, msg: &LogicalMessage) -> Result<()>;
    async fn get_logical_message(&self, id: LogicalId) -> Result<Option<LogicalMessage>>;

    /// Persist one delivered copy (row keyed by recipient + delivered id).
    async fn record_copy(&self, copy: &DeliveredCopy) -> Result<()>;

    /// Idempotent map write; the last write for (logical, recipient) wins.
    async fn record(&self, logical: LogicalId, recipient: UserId, delivered: MessageId)
        -> Result<()>;

    async fn lookup(&self, logical: LogicalId, recipient: UserId) -> Result<Option<MessageId>>;

    /// Which logical message does `delivered`, as seen in `recipient`'s chat, stand for?
    ///
    /// Copies are checked first, then the recipient's own originals.
    async fn reverse_lookup(
        &self,
        delivered: MessageId,
        recipient: UserId,
    ) -> Result<Option<LogicalId>>;

    async fn list_copies(&self, logical: LogicalId) -> Result<Vec<DeliveredCopy>>;

    async fn update_copy_content(
        &self,
        recipient: UserId,
        delivered: MessageId,
        content: &str,
    ) -> Result<()>;

    async fn update_logical_content(
        &self,
        logical: LogicalId,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Drop copies and map entries of `logical`, except `except`'s. When
    /// nothing is kept the logical message row goes too. Returns rows removed.
    async fn delete_copies(&self, logical: LogicalId, except: Option<UserId>) -> Result<usize>;

    /// Logical messages older than their sender's auto-delete interval.
    async fn expired_messages(&self, now: DateTime<Utc>) -> Result<Vec<LogicalId>>;

    /// Drop logical messages, copies and map entries created before
    /// `cutoff`, and daily counters of earlier days.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeCounts>;

    // Bot settings

    async fn get_setting(&self, key: &str) -> Result<Option<String>>;
    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    // Stats

    /// Bumps lifetime + daily counters and remembers the last accepted text.
    async fn record_activity(&self, id: UserId, text: &str, at: DateTime<Utc>) -> Result<()>;
    async fn participant_daily_count(&self, id: UserId, day: NaiveDate) -> Result<u64>;
    async fn totals(&self, day: NaiveDate) -> Result<Totals>;

    // Paid media

    async fn record_sale(&self, sale: &PaidSale) -> Result<()>;

    /// Sales of offers sent by `owner`, oldest first.
    async fn sales_for(&self, owner: UserId) -> Result<Vec<PaidSale>>;

    // Warnings

    async fn add_warning(&self, record: &WarningRecord) -> Result<()>;
    async fn remove_last_warning(&self, id: UserId) -> Result<bool>;
}

/// Read a bot setting, falling back to `default` when unset.
pub async fn setting_or(store: &dyn Store, key: &str, default: &str) -> Result<String> {
    Ok(store
        .get_setting(key)
        .await?
        .unwrap_or_else(|| default.to_string()))
}

/// Boolean settings are stored as "1"/"0"; anything but "0" counts as on.
pub async fn flag_setting(store: &dyn Store, key: &str, default: bool) -> Result<bool> {
    let raw = setting_or(store, key, if default { "1" } else { "0" }).await?;
    Ok(raw.trim() != "0")
}

pub mod keys {
    use crate::messaging::types::ContentKind;

    pub const BOT_ENABLED: &str = "bot_enabled";
    pub const COOLDOWN_MS: &str = "cooldown_ms";
    pub const STARTED_AT: &str = "bot_start_time";

    pub fn media_enabled(kind: ContentKind) -> String {
        format!("media_{}_enabled", kind.as_str())
    }
}
