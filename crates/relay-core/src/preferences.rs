//! Participant-owned settings: signature and custom tags, content
//! protection, auto-delete and the ignore list.

use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::{
    domain::{LogicalId, Participant, ParticipantPatch, UserId},
    errors::Error,
    presentation::{TagToggle, AUTODELETE_CHOICES},
    store::Store,
    Result,
};

pub const MAX_TAG_CHARS: usize = 50;

/// Labels a signature may not impersonate.
pub const RESERVED_SIGNATURES: &[&str] = &[
    "SYSTEM", "DELETED", "REPLY", "MENTION", "BLESSED", "ADMIN", "CREATOR", "OWNER", "CO-OWNER",
];

pub const RESERVED_CUSTOM_TAGS: &[&str] = &["SYSTEM", "DELETED", "REPLY", "MENTION"];

static TAG_CHARSET: OnceLock<Option<Regex>> = OnceLock::new();

/// Check a user-supplied tag against length, charset and reserved words.
pub fn validate_tag(text: &str, reserved: &[&str]) -> Result<String> {
    let tag = text.trim();
    if tag.is_empty() || text.chars().count() > MAX_TAG_CHARS {
        return Err(Error::Invalid(format!(
            "a tag must be 1 to {MAX_TAG_CHARS} characters"
        )));
    }
    let charset = TAG_CHARSET
        .get_or_init(|| {
            Regex::new(r#"^[a-zA-Zа-яА-ЯёЁ0-9\s\-_.,!?@#$%^&*()+=:;'"\[\]{}|<>/\\]+$"#).ok()
        })
        .as_ref()
        .ok_or_else(|| Error::External("tag pattern failed to compile".to_string()))?;
    if !charset.is_match(text) {
        return Err(Error::Invalid(
            "the tag contains characters that are not allowed".to_string(),
        ));
    }
    let upper = tag.to_uppercase();
    if reserved.iter().any(|w| *w == upper) {
        return Err(Error::Invalid(
            "system labels cannot be used as a tag".to_string(),
        ));
    }
    Ok(tag.to_string())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagOutcome {
    Set(String),
    /// Ordinary participants toggle the signature with a bare `/tag`.
    Toggled(bool),
    /// Staff get the settings keyboard instead.
    ShowSettings,
}

async fn patch(store: &dyn Store, user: UserId, patch: ParticipantPatch) -> Result<()> {
    store.update_participant(user, &patch).await
}

async fn participant(store: &dyn Store, user: UserId) -> Result<Participant> {
    store
        .get_participant(user)
        .await?
        .ok_or_else(|| Error::Invalid(format!("unknown participant {user}")))
}

/// `/tag [text]`.
pub async fn tag_command(store: &dyn Store, user: UserId, arg: Option<&str>) -> Result<TagOutcome> {
    let p = participant(store, user).await?;
    match arg.map(str::trim).filter(|a| !a.is_empty()) {
        Some(text) => {
            let tag = validate_tag(text, RESERVED_SIGNATURES)?;
            patch(
                store,
                user,
                ParticipantPatch {
                    tag_text: Some(Some(tag.clone())),
                    ..Default::default()
                },
            )
            .await?;
            info!(user = %user, "signature set");
            Ok(TagOutcome::Set(tag))
        }
        None if p.is_staff() => Ok(TagOutcome::ShowSettings),
        None => {
            let enabled = toggle(store, user, TagToggle::Signature).await?;
            Ok(TagOutcome::Toggled(enabled))
        }
    }
}

/// `/ctag [text]`: set and enable, or disable with no argument.
pub async fn custom_tag_command(
    store: &dyn Store,
    user: UserId,
    arg: Option<&str>,
) -> Result<Option<String>> {
    match arg.map(str::trim).filter(|a| !a.is_empty()) {
        Some(text) => {
            let tag = validate_tag(text, RESERVED_CUSTOM_TAGS)?;
            patch(
                store,
                user,
                ParticipantPatch {
                    custom_tag: Some(Some(tag.clone())),
                    custom_tag_enabled: Some(true),
                    ..Default::default()
                },
            )
            .await?;
            Ok(Some(tag))
        }
        None => {
            patch(
                store,
                user,
                ParticipantPatch {
                    custom_tag_enabled: Some(false),
                    ..Default::default()
                },
            )
            .await?;
            Ok(None)
        }
    }
}

/// Flip one label switch. Returns the new state.
pub async fn toggle(store: &dyn Store, user: UserId, which: TagToggle) -> Result<bool> {
    let p = participant(store, user).await?;
    let mut change = ParticipantPatch::default();
    let enabled = match which {
        TagToggle::Signature => {
            change.tag_enabled = Some(!p.prefs.tag_enabled);
            !p.prefs.tag_enabled
        }
        TagToggle::AdminBadge => {
            change.admin_tag_enabled = Some(!p.prefs.admin_tag_enabled);
            !p.prefs.admin_tag_enabled
        }
        TagToggle::CreatorBadge => {
            change.creator_tag_enabled = Some(!p.prefs.creator_tag_enabled);
            !p.prefs.creator_tag_enabled
        }
    };
    patch(store, user, change).await?;
    Ok(enabled)
}

pub async fn toggle_protect(store: &dyn Store, user: UserId) -> Result<bool> {
    let p = participant(store, user).await?;
    let enabled = !p.prefs.protect_content;
    patch(
        store,
        user,
        ParticipantPatch {
            protect_content: Some(enabled),
            ..Default::default()
        },
    )
    .await?;
    Ok(enabled)
}

/// Only the offered intervals are accepted; 0 turns auto-delete off.
pub async fn set_autodelete(store: &dyn Store, user: UserId, minutes: u32) -> Result<()> {
    if !AUTODELETE_CHOICES.iter().any(|(m, _)| *m == minutes) {
        return Err(Error::Invalid(format!(
            "unsupported auto-delete interval: {minutes} min"
        )));
    }
    patch(
        store,
        user,
        ParticipantPatch {
            autodelete_minutes: Some(minutes),
            ..Default::default()
        },
    )
    .await
}

/// Ignore the author of `about`.
pub async fn ignore(store: &dyn Store, user: UserId, about: LogicalId) -> Result<()> {
    if about.sender == user {
        return Err(Error::Invalid("you cannot ignore yourself".to_string()));
    }
    store.add_ignore(user, about.sender).await?;
    info!(user = %user, "ignore added");
    Ok(())
}

pub async fn unignore(store: &dyn Store, user: UserId, about: LogicalId) -> Result<bool> {
    store.remove_ignore(user, about.sender).await
}

pub async fn unignore_all(store: &dyn Store, user: UserId) -> Result<usize> {
    store.clear_ignores(user).await
}
