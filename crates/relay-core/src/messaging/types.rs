use std::{fmt, str::FromStr};

use crate::{
    domain::{MessageId, UserId},
    errors::Error,
};

/// Content type tag. Also used as the storage name and the media-toggle key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Text,
    Photo,
    Video,
    Animation,
    Document,
    Voice,
    Sticker,
    Poll,
    Contact,
    Location,
    Venue,
}

/// How an already delivered copy can be changed in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutation {
    Text,
    Caption,
    Immutable,
}

impl ContentKind {
    pub const ALL: [ContentKind; 11] = [
        ContentKind::Text,
        ContentKind::Photo,
        ContentKind::Video,
        ContentKind::Animation,
        ContentKind::Document,
        ContentKind::Voice,
        ContentKind::Sticker,
        ContentKind::Poll,
        ContentKind::Contact,
        ContentKind::Location,
        ContentKind::Venue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Photo => "photo",
            ContentKind::Video => "video",
            ContentKind::Animation => "animation",
            ContentKind::Document => "document",
            ContentKind::Voice => "voice",
            ContentKind::Sticker => "sticker",
            ContentKind::Poll => "poll",
            ContentKind::Contact => "contact",
            ContentKind::Location => "location",
            ContentKind::Venue => "venue",
        }
    }

    pub fn mutation(self) -> Mutation {
        match self {
            ContentKind::Text => Mutation::Text,
            ContentKind::Photo
            | ContentKind::Video
            | ContentKind::Animation
            | ContentKind::Document
            | ContentKind::Voice => Mutation::Caption,
            ContentKind::Sticker
            | ContentKind::Poll
            | ContentKind::Contact
            | ContentKind::Location
            | ContentKind::Venue => Mutation::Immutable,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| Error::Invalid(format!("unknown content type: {s}")))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PollContent {
    pub question: String,
    pub options: Vec<String>,
    pub is_anonymous: bool,
    pub allows_multiple_answers: bool,
}

/// Inbound content, one variant per kind, each carrying what the transport
/// needs to re-send it.
#[derive(Clone, Debug, PartialEq)]
pub enum Content {
    Text {
        text: String,
    },
    Photo {
        file_id: String,
        caption: Option<String>,
    },
    Video {
        file_id: String,
        caption: Option<String>,
    },
    Animation {
        file_id: String,
        caption: Option<String>,
    },
    Document {
        file_id: String,
        caption: Option<String>,
    },
    Voice {
        file_id: String,
        caption: Option<String>,
    },
    Sticker {
        file_id: String,
    },
    Poll(PollContent),
    Contact {
        phone_number: String,
        first_name: String,
        last_name: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
    Venue {
        latitude: f64,
        longitude: f64,
        title: String,
        address: String,
    },
}

impl Content {
    pub fn kind(&self) -> ContentKind {
        match self {
            Content::Text { .. } => ContentKind::Text,
            Content::Photo { .. } => ContentKind::Photo,
            Content::Video { .. } => ContentKind::Video,
            Content::Animation { .. } => ContentKind::Animation,
            Content::Document { .. } => ContentKind::Document,
            Content::Voice { .. } => ContentKind::Voice,
            Content::Sticker { .. } => ContentKind::Sticker,
            Content::Poll(_) => ContentKind::Poll,
            Content::Contact { .. } => ContentKind::Contact,
            Content::Location { .. } => ContentKind::Location,
            Content::Venue { .. } => ContentKind::Venue,
        }
    }

    /// Text body or caption, if the kind carries one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Content::Text { text } => Some(text),
            Content::Photo { caption, .. }
            | Content::Video { caption, .. }
            | Content::Animation { caption, .. }
            | Content::Document { caption, .. }
            | Content::Voice { caption, .. } => caption.as_deref(),
            _ => None,
        }
    }

    /// Copy of this content with `prefix` prepended to its text or caption.
    /// Kinds without either are returned unchanged.
    pub fn with_prefix(&self, prefix: &str) -> Content {
        let mut out = self.clone();
        match &mut out {
            Content::Text { text } => text.insert_str(0, prefix),
            Content::Photo { caption, .. }
            | Content::Video { caption, .. }
            | Content::Animation { caption, .. }
            | Content::Document { caption, .. }
            | Content::Voice { caption, .. } => {
                let body = caption.take().unwrap_or_default();
                *caption = Some(format!("{prefix}{body}"));
            }
            _ => {}
        }
        out
    }
}

/// An inbound message as seen by the relay, transport details stripped.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    pub sender: UserId,
    /// Id in the sender's own chat.
    pub message_id: MessageId,
    pub content: Content,
    /// Id (in the sender's chat) of the message being replied to.
    pub reply_to: Option<MessageId>,
    pub sender_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ButtonAction {
    Callback(String),
    Url(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub action: ButtonAction,
}

impl InlineButton {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }
}

/// Inline keyboard (buttons), laid out in rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    /// Convenience for "one button per row" layouts.
    pub fn one_per_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    /// Lay buttons out `width` per row.
    pub fn grid(buttons: Vec<InlineButton>, width: usize) -> Self {
        let width = width.max(1);
        let mut rows = Vec::new();
        let mut row = Vec::with_capacity(width);
        for b in buttons {
            row.push(b);
            if row.len() == width {
                rows.push(std::mem::take(&mut row));
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.is_empty())
    }

    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.rows.iter().flatten()
    }
}

/// Per-copy options for a send.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SendOptions {
    pub reply_to: Option<MessageId>,
    pub protect_content: bool,
    pub keyboard: Option<InlineKeyboard>,
}

/// A purchase-gated photo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaidOffer {
    pub file_id: String,
    pub stars: u32,
    pub description: String,
    /// Opaque payload echoed back on purchase: `<sender>_<message>`.
    pub payload: String,
}

/// A reaction set on a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reaction {
    Emoji(String),
    CustomEmoji(String),
}

/// Capabilities / feature flags of a transport implementation.
#[derive(Clone, Copy, Debug)]
pub struct DeliveryCapabilities {
    pub supports_reactions: bool,
    pub supports_paid_media: bool,
    /// Longest text message, in chars.
    pub max_message_len: usize,
    /// Longest media caption, in chars.
    pub max_caption_len: usize,
}

impl DeliveryCapabilities {
    /// Whether `body` fits as the text or caption of a `kind` message.
    pub fn fits(&self, kind: ContentKind, body: &str) -> bool {
        let limit = match kind.mutation() {
            Mutation::Text => self.max_message_len,
            Mutation::Caption | Mutation::Immutable => self.max_caption_len,
        };
        body.chars().count() <= limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_exactly_one_mutation_strategy() {
        let editable: Vec<_> = ContentKind::ALL
            .into_iter()
            .filter(|k| k.mutation() != Mutation::Immutable)
            .map(|k| k.as_str())
            .collect();
        assert_eq!(
            editable,
            vec!["text", "photo", "video", "animation", "document", "voice"]
        );
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Photo".parse::<ContentKind>().unwrap(), ContentKind::Photo);
        assert_eq!(" venue ".parse::<ContentKind>().unwrap(), ContentKind::Venue);
        assert!("gif".parse::<ContentKind>().is_err());
    }

    #[test]
    fn prefix_applies_to_text_and_caption_only() {
        let text = Content::Text {
            text: "hi".to_string(),
        };
        assert_eq!(text.with_prefix("#REPLY\n").text(), Some("#REPLY\nhi"));

        let photo = Content::Photo {
            file_id: "f".to_string(),
            caption: None,
        };
        assert_eq!(photo.with_prefix("#REPLY\n").text(), Some("#REPLY\n"));

        let sticker = Content::Sticker {
            file_id: "s".to_string(),
        };
        assert_eq!(sticker.with_prefix("#REPLY\n"), sticker);
    }

    #[test]
    fn captions_have_their_own_limit() {
        let caps = DeliveryCapabilities {
            supports_reactions: true,
            supports_paid_media: true,
            max_message_len: 10,
            max_caption_len: 4,
        };
        assert!(caps.fits(ContentKind::Text, "ten chars!"));
        assert!(!caps.fits(ContentKind::Text, "eleven char"));
        assert!(!caps.fits(ContentKind::Photo, "five!"));
        // counted in chars, not bytes
        assert!(caps.fits(ContentKind::Photo, "тест"));
    }

    #[test]
    fn grid_layout_wraps_rows() {
        let buttons = (0..5)
            .map(|i| InlineButton::callback(i.to_string(), "x"))
            .collect();
        let kb = InlineKeyboard::grid(buttons, 3);
        assert_eq!(kb.rows.len(), 2);
        assert_eq!(kb.rows[1].len(), 2);
        assert_eq!(kb.buttons().count(), 5);
    }
}
