//! Buttons attached to delivered copies and to the bot's own prompts.
//!
//! Everything here is a pure function of participant state; callback payloads
//! built here are parsed back by [`CallbackAction::parse`].

use crate::{
    domain::{LogicalId, MessageId, Participant, Role, UserId},
    messaging::types::{InlineButton, InlineKeyboard},
};

pub const NOOP: &str = "none";
pub const DISMISS: &str = "delthis";

const DEFAULT_TAG: &str = "User";
const ANONYMOUS: &str = "Anonymous";
const CAPTCHA_CHOICES: [&str; 6] = ["🚗", "🚕", "🚙", "🚌", "🚎", "🏎️"];
pub const AUTODELETE_CHOICES: [(u32, &str); 6] = [
    (1, "1 minute"),
    (5, "5 minutes"),
    (30, "30 minutes"),
    (60, "1 hour"),
    (300, "5 hours"),
    (0, "Off"),
];

/// Per-copy rendering context.
#[derive(Clone, Copy, Debug)]
pub struct RenderContext {
    /// The copy is the sender's own echo.
    pub is_self: bool,
    pub paid: bool,
    pub logical: LogicalId,
}

/// Label set for one delivered copy, or `None` when there is nothing to show.
pub fn decorate(sender: &Participant, ctx: &RenderContext) -> Option<InlineKeyboard> {
    let prefs = &sender.prefs;
    let mut buttons = Vec::new();

    if prefs.tag_enabled && !ctx.paid {
        let label = prefs
            .tag_text
            .as_deref()
            .or(sender.display_name.as_deref())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_TAG);
        buttons.push(InlineButton::url(
            label,
            format!("tg://user?id={}", sender.id.0),
        ));
    }

    if prefs.custom_tag_enabled {
        if let Some(tag) = prefs.custom_tag.as_deref().filter(|t| !t.is_empty()) {
            buttons.push(InlineButton::callback(tag, NOOP));
        }
    }

    if prefs.admin_tag_enabled && matches!(sender.role, Role::Admin | Role::CoOwner) {
        buttons.push(InlineButton::callback("Administrator", NOOP));
    }

    if prefs.creator_tag_enabled && sender.role == Role::Creator {
        buttons.push(InlineButton::callback("Creator", NOOP));
    }

    if sender.role == Role::CoOwner {
        buttons.push(InlineButton::callback("Co-Owner", NOOP));
    }

    if ctx.is_self && !ctx.paid {
        buttons.push(InlineButton::callback(
            "Delete my message",
            delete_mine_data(ctx.logical),
        ));
    }

    if buttons.is_empty() {
        None
    } else {
        Some(InlineKeyboard::one_per_row(buttons))
    }
}

/// How a participant appears in public listings: their custom tag, else
/// their signature when it is on, else nothing identifying.
pub fn public_name(p: &Participant) -> &str {
    let prefs = &p.prefs;
    let custom = prefs
        .custom_tag
        .as_deref()
        .filter(|t| prefs.custom_tag_enabled && !t.is_empty());
    let signature = prefs
        .tag_text
        .as_deref()
        .or(p.display_name.as_deref())
        .filter(|s| prefs.tag_enabled && !s.trim().is_empty());
    custom.or(signature).unwrap_or(ANONYMOUS)
}

/// Shown on the sender's echo once the message is gone everywhere else.
pub fn deleted_keyboard() -> InlineKeyboard {
    InlineKeyboard::one_per_row(vec![InlineButton::callback("DELETED", DISMISS)])
}

pub fn delete_mine_data(logical: LogicalId) -> String {
    format!("delmy:{}:{}", logical.sender.0, logical.message_id.0)
}

/// Index of the correct captcha button for `user`.
pub fn captcha_answer(user: UserId) -> usize {
    user.0.rem_euclid(CAPTCHA_CHOICES.len() as i64) as usize
}

/// Prompt text and keyboard for the first-contact captcha.
pub fn captcha(user: UserId) -> (String, InlineKeyboard) {
    let target = CAPTCHA_CHOICES[captcha_answer(user)];
    let buttons = CAPTCHA_CHOICES
        .iter()
        .enumerate()
        .map(|(i, emoji)| InlineButton::callback(*emoji, format!("captcha:{}:{i}", user.0)))
        .collect();
    (
        format!("Prove you are not a bot!\n\nTap {target}"),
        InlineKeyboard::grid(buttons, 3),
    )
}

pub fn autodelete_keyboard() -> InlineKeyboard {
    let buttons = AUTODELETE_CHOICES
        .iter()
        .map(|(minutes, label)| InlineButton::callback(*label, format!("autodel:{minutes}")))
        .collect();
    InlineKeyboard::grid(buttons, 2)
}

/// Label toggles offered to staff by `/tag`.
pub fn tag_settings_keyboard(p: &Participant) -> InlineKeyboard {
    let mark = |on: bool| if on { "✅" } else { "❌" };
    let mut buttons = vec![InlineButton::callback(
        format!("{} Signature", mark(p.prefs.tag_enabled)),
        format!("tog:{}:{}", TagToggle::Signature.as_str(), p.id.0),
    )];
    if matches!(p.role, Role::Admin | Role::CoOwner) {
        buttons.push(InlineButton::callback(
            format!("{} Admin badge", mark(p.prefs.admin_tag_enabled)),
            format!("tog:{}:{}", TagToggle::AdminBadge.as_str(), p.id.0),
        ));
    }
    if p.role == Role::Creator {
        buttons.push(InlineButton::callback(
            format!("{} Creator badge", mark(p.prefs.creator_tag_enabled)),
            format!("tog:{}:{}", TagToggle::CreatorBadge.as_str(), p.id.0),
        ));
    }
    InlineKeyboard::one_per_row(buttons)
}

pub fn leave_keyboard(user: UserId) -> InlineKeyboard {
    InlineKeyboard::grid(
        vec![
            InlineButton::callback("Yes, delete", format!("leave:yes:{}", user.0)),
            InlineButton::callback("Cancel", "leave:no"),
        ],
        2,
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagToggle {
    Signature,
    AdminBadge,
    CreatorBadge,
}

impl TagToggle {
    fn as_str(self) -> &'static str {
        match self {
            TagToggle::Signature => "tag",
            TagToggle::AdminBadge => "admintag",
            TagToggle::CreatorBadge => "creatortag",
        }
    }
}

/// Parsed callback payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    DeleteMine(LogicalId),
    Dismiss,
    Noop,
    Captcha { user: UserId, choice: usize },
    Autodelete(u32),
    Toggle { toggle: TagToggle, user: UserId },
    Leave { user: Option<UserId> },
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let parts: Vec<&str> = data.split(':').collect();
        match parts.as_slice() {
            [NOOP] => Some(Self::Noop),
            [DISMISS] => Some(Self::Dismiss),
            ["delmy", sender, message] => Some(Self::DeleteMine(LogicalId::new(
                UserId(sender.parse().ok()?),
                MessageId(message.parse().ok()?),
            ))),
            ["captcha", user, choice] => Some(Self::Captcha {
                user: UserId(user.parse().ok()?),
                choice: choice.parse().ok()?,
            }),
            ["autodel", minutes] => Some(Self::Autodelete(minutes.parse().ok()?)),
            ["tog", which, user] => {
                let toggle = match *which {
                    "tag" => TagToggle::Signature,
                    "admintag" => TagToggle::AdminBadge,
                    "creatortag" => TagToggle::CreatorBadge,
                    _ => return None,
                };
                Some(Self::Toggle {
                    toggle,
                    user: UserId(user.parse().ok()?),
                })
            }
            ["leave", "yes", user] => Some(Self::Leave {
                user: Some(UserId(user.parse().ok()?)),
            }),
            ["leave", "no"] => Some(Self::Leave { user: None }),
            _ => None,
        }
    }
}
