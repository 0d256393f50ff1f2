//! Telegram updates to relay types.

use teloxide::types::{self as tg, Chat, Message, ReactionType, User};

use relay_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    messaging::types::{Content, InboundMessage, PollContent, Reaction},
};

pub fn user_id(user: &User) -> UserId {
    UserId(user.id.0 as i64)
}

pub fn message_ref(chat: &Chat, id: tg::MessageId) -> MessageRef {
    MessageRef {
        chat_id: ChatId(chat.id.0),
        message_id: MessageId(id.0),
    }
}

/// Extract relayable content. Venue is checked before location because venue
/// messages carry both.
pub fn content_of(msg: &Message) -> Option<Content> {
    let caption = msg.caption().map(str::to_string);

    if let Some(text) = msg.text() {
        return Some(Content::Text {
            text: text.to_string(),
        });
    }
    if let Some(sizes) = msg.photo() {
        let largest = sizes.last()?;
        return Some(Content::Photo {
            file_id: largest.file.id.0.clone(),
            caption,
        });
    }
    if let Some(v) = msg.video() {
        return Some(Content::Video {
            file_id: v.file.id.0.clone(),
            caption,
        });
    }
    if let Some(a) = msg.animation() {
        return Some(Content::Animation {
            file_id: a.file.id.0.clone(),
            caption,
        });
    }
    if let Some(d) = msg.document() {
        return Some(Content::Document {
            file_id: d.file.id.0.clone(),
            caption,
        });
    }
    if let Some(v) = msg.voice() {
        return Some(Content::Voice {
            file_id: v.file.id.0.clone(),
            caption,
        });
    }
    if let Some(s) = msg.sticker() {
        return Some(Content::Sticker {
            file_id: s.file.id.0.clone(),
        });
    }
    if let Some(p) = msg.poll() {
        return Some(Content::Poll(PollContent {
            question: p.question.clone(),
            options: p.options.iter().map(|o| o.text.clone()).collect(),
            is_anonymous: p.is_anonymous,
            allows_multiple_answers: p.allows_multiple_answers,
        }));
    }
    if let Some(c) = msg.contact() {
        return Some(Content::Contact {
            phone_number: c.phone_number.clone(),
            first_name: c.first_name.clone(),
            last_name: c.last_name.clone(),
        });
    }
    if let Some(v) = msg.venue() {
        return Some(Content::Venue {
            latitude: v.location.latitude,
            longitude: v.location.longitude,
            title: v.title.clone(),
            address: v.address.clone(),
        });
    }
    if let Some(l) = msg.location() {
        return Some(Content::Location {
            latitude: l.latitude,
            longitude: l.longitude,
        });
    }
    None
}

pub fn inbound_message(msg: &Message) -> Option<InboundMessage> {
    let from = msg.from.as_ref()?;
    Some(InboundMessage {
        sender: user_id(from),
        message_id: MessageId(msg.id.0),
        content: content_of(msg)?,
        reply_to: msg.reply_to_message().map(|r| MessageId(r.id.0)),
        sender_name: Some(from.full_name()),
    })
}

pub fn reactions(raw: &[ReactionType]) -> Vec<Reaction> {
    raw.iter()
        .filter_map(|r| match r {
            ReactionType::Emoji { emoji } => Some(Reaction::Emoji(emoji.clone())),
            ReactionType::CustomEmoji { custom_emoji_id } => {
                Some(Reaction::CustomEmoji(custom_emoji_id.to_string()))
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emoji_reactions_keep_their_order() {
        let raw = vec![
            ReactionType::Emoji {
                emoji: "🔥".to_string(),
            },
            ReactionType::Emoji {
                emoji: "👍".to_string(),
            },
        ];
        assert_eq!(
            reactions(&raw),
            vec![
                Reaction::Emoji("🔥".to_string()),
                Reaction::Emoji("👍".to_string())
            ]
        );
    }
}
