use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};

use crate::{errors::Error, messaging::types::ContentKind};

/// Telegram user id (numeric). In private chats it doubles as the chat id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric), only unique within one chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl UserId {
    pub fn chat(self) -> ChatId {
        ChatId(self.0)
    }

    pub fn message(self, message_id: MessageId) -> MessageRef {
        MessageRef {
            chat_id: self.chat(),
            message_id,
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a Logical Message: the id the sender's client assigned, scoped by sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalId {
    pub sender: UserId,
    pub message_id: MessageId,
}

impl LogicalId {
    pub fn new(sender: UserId, message_id: MessageId) -> Self {
        Self { sender, message_id }
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sender.0, self.message_id.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Role {
    #[default]
    Ordinary,
    Admin,
    CoOwner,
    Creator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Ordinary => "ordinary",
            Role::Admin => "admin",
            Role::CoOwner => "coowner",
            Role::Creator => "creator",
        }
    }

    pub fn is_staff(self) -> bool {
        !matches!(self, Role::Ordinary)
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ordinary" => Ok(Role::Ordinary),
            "admin" => Ok(Role::Admin),
            "coowner" => Ok(Role::CoOwner),
            "creator" => Ok(Role::Creator),
            other => Err(Error::Invalid(format!("unknown role: {other}"))),
        }
    }
}

/// How a participant's copies are decorated and protected.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Preferences {
    pub tag_enabled: bool,
    pub tag_text: Option<String>,
    pub custom_tag: Option<String>,
    pub custom_tag_enabled: bool,
    pub admin_tag_enabled: bool,
    pub creator_tag_enabled: bool,
    pub protect_content: bool,
    /// 0 disables auto-delete.
    pub autodelete_minutes: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Participant {
    pub id: UserId,
    pub role: Role,
    pub display_name: Option<String>,
    pub banned: bool,
    pub muted_until: Option<DateTime<Utc>>,
    pub warnings: u32,
    pub prefs: Preferences,
    pub message_count: u64,
    pub last_message_text: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub captcha_passed: bool,
    pub created_at: DateTime<Utc>,
}

impl Participant {
    /// A freshly registered participant: captcha pending, default preferences.
    pub fn new(id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            role: Role::Ordinary,
            display_name: None,
            banned: false,
            muted_until: None,
            warnings: 0,
            prefs: Preferences::default(),
            message_count: 0,
            last_message_text: None,
            last_message_at: None,
            captcha_passed: false,
            created_at,
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn is_active(&self) -> bool {
        self.captcha_passed && !self.banned
    }

    /// Apply a patch in memory; the store applies the same semantics on disk.
    pub fn apply(&mut self, patch: &ParticipantPatch) {
        if let Some(v) = patch.role {
            self.role = v;
        }
        if let Some(v) = &patch.display_name {
            self.display_name = v.clone();
        }
        if let Some(v) = patch.banned {
            self.banned = v;
        }
        if let Some(v) = patch.muted_until {
            self.muted_until = v;
        }
        if let Some(v) = patch.warnings {
            self.warnings = v;
        }
        if let Some(v) = patch.tag_enabled {
            self.prefs.tag_enabled = v;
        }
        if let Some(v) = &patch.tag_text {
            self.prefs.tag_text = v.clone();
        }
        if let Some(v) = &patch.custom_tag {
            self.prefs.custom_tag = v.clone();
        }
        if let Some(v) = patch.custom_tag_enabled {
            self.prefs.custom_tag_enabled = v;
        }
        if let Some(v) = patch.admin_tag_enabled {
            self.prefs.admin_tag_enabled = v;
        }
        if let Some(v) = patch.creator_tag_enabled {
            self.prefs.creator_tag_enabled = v;
        }
        if let Some(v) = patch.protect_content {
            self.prefs.protect_content = v;
        }
        if let Some(v) = patch.autodelete_minutes {
            self.prefs.autodelete_minutes = v;
        }
        if let Some(v) = patch.captcha_passed {
            self.captcha_passed = v;
        }
    }
}

/// Typed partial update of a participant. `None` leaves a field untouched;
/// nullable fields use `Some(None)` to clear.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParticipantPatch {
    pub role: Option<Role>,
    pub display_name: Option<Option<String>>,
    pub banned: Option<bool>,
    pub muted_until: Option<Option<DateTime<Utc>>>,
    pub warnings: Option<u32>,
    pub tag_enabled: Option<bool>,
    pub tag_text: Option<Option<String>>,
    pub custom_tag: Option<Option<String>>,
    pub custom_tag_enabled: Option<bool>,
    pub admin_tag_enabled: Option<bool>,
    pub creator_tag_enabled: Option<bool>,
    pub protect_content: Option<bool>,
    pub autodelete_minutes: Option<u32>,
    pub captcha_passed: Option<bool>,
}

impl ParticipantPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Paid-media terms parsed from a photo caption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaidTerms {
    pub stars: u32,
    pub description: String,
}

/// One inbound unit of content, as persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct LogicalMessage {
    pub id: LogicalId,
    pub kind: ContentKind,
    /// Text or caption; empty for kinds without either.
    pub content: String,
    pub reply_to: Option<LogicalId>,
    pub paid: Option<PaidTerms>,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One recipient's instance of a Logical Message.
#[derive(Clone, Debug, PartialEq)]
pub struct DeliveredCopy {
    pub recipient: UserId,
    pub delivered: MessageId,
    pub logical: LogicalId,
    pub kind: ContentKind,
    pub content: String,
    pub reply_to: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}

impl DeliveredCopy {
    pub fn message_ref(&self) -> MessageRef {
        self.recipient.message(self.delivered)
    }
}

/// Append-only moderation log entry.
#[derive(Clone, Debug, PartialEq)]
pub struct WarningRecord {
    pub participant: UserId,
    pub issued_by: UserId,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// A purchase of a paid offer. The owner is the sender of `logical`.
#[derive(Clone, Debug, PartialEq)]
pub struct PaidSale {
    pub logical: LogicalId,
    pub buyer: UserId,
    pub stars: u32,
    pub created_at: DateTime<Utc>,
}

/// Rows dropped by a retention purge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeCounts {
    pub messages: usize,
    pub copies: usize,
    pub map_entries: usize,
    pub stat_days: usize,
}

/// Aggregate counters shown by status commands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub active_participants: u64,
    pub logical_messages: u64,
    pub messages_today: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_storage_names() {
        for role in [Role::Ordinary, Role::Admin, Role::CoOwner, Role::Creator] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("owner".parse::<Role>().is_err());
        assert!(!Role::Ordinary.is_staff());
        assert!(Role::CoOwner.is_staff());
    }

    #[test]
    fn patch_clears_nullable_fields() {
        let mut p = Participant::new(UserId(7), Utc::now());
        p.muted_until = Some(Utc::now());
        p.prefs.tag_text = Some("old".to_string());

        p.apply(&ParticipantPatch {
            muted_until: Some(None),
            tag_text: Some(Some("new".to_string())),
            ..Default::default()
        });

        assert_eq!(p.muted_until, None);
        assert_eq!(p.prefs.tag_text.as_deref(), Some("new"));
        assert!(ParticipantPatch::default().is_empty());
    }
}
