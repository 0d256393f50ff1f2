//! Telegram adapter (teloxide).
//!
//! This crate implements the `relay-core` DeliveryPort over the Telegram Bot
//! API and routes incoming updates into the relay.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{
        FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputPaidMedia,
        InputPaidMediaPhoto, InputPollOption, ReactionType, ReplyParameters,
    },
    ApiError, RequestError,
};
use tracing::warn;

pub mod handlers;
pub mod inbound;
pub mod router;

use relay_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::{DeliveryFailure, Error},
    messaging::{
        port::DeliveryPort,
        types::{
            ButtonAction, Content, DeliveryCapabilities, InlineKeyboard, PaidOffer, PollContent,
            Reaction, SendOptions,
        },
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramDelivery {
    bot: Bot,
}

/// Apply per-copy options to any send request, then await it.
macro_rules! send_with {
    ($req:expr, $opts:expr) => {{
        let mut req = $req.protect_content($opts.protect_content);
        if let Some(id) = $opts.reply_to {
            req = req.reply_parameters(ReplyParameters::new(TelegramDelivery::tg_msg_id(id)));
        }
        if let Some(kb) = &$opts.keyboard {
            req = req.reply_markup(markup(kb));
        }
        req.await.map_err(TelegramDelivery::map_err)?
    }};
}

impl TelegramDelivery {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_user(user: UserId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(user.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn file(file_id: &str) -> InputFile {
        InputFile::file_id(FileId(file_id.to_string()))
    }

    fn map_err(e: RequestError) -> Error {
        Error::delivery(failure_kind(&e), format!("telegram error: {e}"))
    }
}

/// Classify a Bot API failure. Nothing here is retried.
pub fn failure_kind(e: &RequestError) -> DeliveryFailure {
    match e {
        RequestError::Api(api) => match api {
            ApiError::BotBlocked | ApiError::BotKicked => DeliveryFailure::Blocked,
            ApiError::ChatNotFound
            | ApiError::UserDeactivated
            | ApiError::MessageToEditNotFound
            | ApiError::MessageToDeleteNotFound => DeliveryFailure::Unreachable,
            ApiError::Unknown(_) => DeliveryFailure::Other,
            _ => DeliveryFailure::Rejected,
        },
        RequestError::RetryAfter(_) => DeliveryFailure::RateLimited,
        _ => DeliveryFailure::Other,
    }
}

/// Convert a transport-neutral keyboard. Buttons with an unparsable URL are
/// dropped.
pub fn markup(kb: &InlineKeyboard) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = kb
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .filter_map(|b| match &b.action {
                    ButtonAction::Callback(data) => {
                        Some(InlineKeyboardButton::callback(b.label.clone(), data.clone()))
                    }
                    ButtonAction::Url(raw) => match url::Url::parse(raw) {
                        Ok(u) => Some(InlineKeyboardButton::url(b.label.clone(), u)),
                        Err(e) => {
                            warn!("dropping button {:?} with bad url: {e}", b.label);
                            None
                        }
                    },
                })
                .collect()
        })
        .filter(|row: &Vec<InlineKeyboardButton>| !row.is_empty())
        .collect();
    InlineKeyboardMarkup::new(rows)
}

fn tg_reaction(r: &Reaction) -> ReactionType {
    match r {
        Reaction::Emoji(emoji) => ReactionType::Emoji {
            emoji: emoji.clone(),
        },
        Reaction::CustomEmoji(id) => ReactionType::CustomEmoji {
            custom_emoji_id: id.clone().into(),
        },
    }
}

#[async_trait]
impl DeliveryPort for TelegramDelivery {
    fn capabilities(&self) -> DeliveryCapabilities {
        DeliveryCapabilities {
            supports_reactions: true,
            supports_paid_media: true,
            max_message_len: 4096,
            max_caption_len: 1024,
        }
    }

    async fn send_copy(
        &self,
        to: UserId,
        content: &Content,
        opts: &SendOptions,
    ) -> Result<MessageId> {
        let chat = Self::tg_user(to);
        let bot = &self.bot;

        let sent = match content {
            Content::Text { text } => send_with!(bot.send_message(chat, text.clone()), opts),
            Content::Photo { file_id, caption } => {
                let mut req = bot.send_photo(chat, Self::file(file_id));
                if let Some(c) = caption {
                    req = req.caption(c.clone());
                }
                send_with!(req, opts)
            }
            Content::Video { file_id, caption } => {
                let mut req = bot.send_video(chat, Self::file(file_id));
                if let Some(c) = caption {
                    req = req.caption(c.clone());
                }
                send_with!(req, opts)
            }
            Content::Animation { file_id, caption } => {
                let mut req = bot.send_animation(chat, Self::file(file_id));
                if let Some(c) = caption {
                    req = req.caption(c.clone());
                }
                send_with!(req, opts)
            }
            Content::Document { file_id, caption } => {
                let mut req = bot.send_document(chat, Self::file(file_id));
                if let Some(c) = caption {
                    req = req.caption(c.clone());
                }
                send_with!(req, opts)
            }
            Content::Voice { file_id, caption } => {
                let mut req = bot.send_voice(chat, Self::file(file_id));
                if let Some(c) = caption {
                    req = req.caption(c.clone());
                }
                send_with!(req, opts)
            }
            Content::Sticker { file_id } => {
                send_with!(bot.send_sticker(chat, Self::file(file_id)), opts)
            }
            Content::Poll(poll) => {
                let options = poll.options.iter().cloned().map(InputPollOption::new);
                let req = bot
                    .send_poll(chat, poll.question.clone(), options)
                    .is_anonymous(poll.is_anonymous)
                    .allows_multiple_answers(poll.allows_multiple_answers);
                send_with!(req, opts)
            }
            Content::Contact {
                phone_number,
                first_name,
                last_name,
            } => {
                let mut req = bot.send_contact(chat, phone_number.clone(), first_name.clone());
                if let Some(l) = last_name {
                    req = req.last_name(l.clone());
                }
                send_with!(req, opts)
            }
            Content::Location {
                latitude,
                longitude,
            } => send_with!(bot.send_location(chat, *latitude, *longitude), opts),
            Content::Venue {
                latitude,
                longitude,
                title,
                address,
            } => send_with!(
                bot.send_venue(chat, *latitude, *longitude, title.clone(), address.clone()),
                opts
            ),
        };

        Ok(MessageId(sent.id.0))
    }

    async fn send_paid(
        &self,
        to: UserId,
        offer: &PaidOffer,
        opts: &SendOptions,
    ) -> Result<MessageId> {
        let media = vec![InputPaidMedia::Photo(InputPaidMediaPhoto::new(Self::file(
            &offer.file_id,
        )))];
        let mut req = self
            .bot
            .send_paid_media(Self::tg_user(to), offer.stars, media)
            .payload(offer.payload.clone());
        if !offer.description.is_empty() {
            req = req.caption(offer.description.clone());
        }
        let sent = send_with!(req, opts);
        Ok(MessageId(sent.id.0))
    }

    async fn post_poll(&self, chat: ChatId, poll: &PollContent) -> Result<MessageRef> {
        let options = poll.options.iter().cloned().map(InputPollOption::new);
        let sent = self
            .bot
            .send_poll(Self::tg_chat(chat), poll.question.clone(), options)
            .is_anonymous(poll.is_anonymous)
            .allows_multiple_answers(poll.allows_multiple_answers)
            .await
            .map_err(Self::map_err)?;
        Ok(MessageRef {
            chat_id: chat,
            message_id: MessageId(sent.id.0),
        })
    }

    async fn forward(&self, to: UserId, from: MessageRef) -> Result<MessageId> {
        let sent = self
            .bot
            .forward_message(
                Self::tg_user(to),
                Self::tg_chat(from.chat_id),
                Self::tg_msg_id(from.message_id),
            )
            .await
            .map_err(Self::map_err)?;
        Ok(MessageId(sent.id.0))
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.bot
            .edit_message_text(
                Self::tg_chat(msg.chat_id),
                Self::tg_msg_id(msg.message_id),
                text.to_string(),
            )
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn edit_caption(&self, msg: MessageRef, caption: &str) -> Result<()> {
        self.bot
            .edit_message_caption(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
            .caption(caption.to_string())
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn replace_keyboard(&self, msg: MessageRef, keyboard: &InlineKeyboard) -> Result<()> {
        self.bot
            .edit_message_reply_markup(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
            .reply_markup(markup(keyboard))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn set_reaction(&self, msg: MessageRef, reaction: &[Reaction]) -> Result<()> {
        self.bot
            .set_message_reaction(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
            .reaction(reaction.iter().map(tg_reaction).collect::<Vec<_>>())
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.bot
            .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn send_notice(
        &self,
        to: UserId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef> {
        let mut req = self.bot.send_message(Self::tg_user(to), text.to_string());
        if let Some(kb) = keyboard {
            req = req.reply_markup(markup(kb));
        }
        let sent = req.await.map_err(Self::map_err)?;
        Ok(to.message(MessageId(sent.id.0)))
    }
}
