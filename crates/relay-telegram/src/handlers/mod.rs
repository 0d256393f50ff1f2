//! Telegram update handlers.
//!
//! Each handler is a small adapter that:
//! - converts the update into relay types
//! - calls into the `relay-core` facade
//! - answers the user through the (throttled) delivery port
//!
//! Store failures are logged and swallowed so the dispatcher keeps running.

use std::sync::Arc;

use chrono::Utc;
use teloxide::{
    prelude::*,
    types::{
        CallbackQuery, ChatMemberUpdated, Message, MessageReactionUpdated, PaidMediaPurchased,
    },
};
use tracing::{debug, error, info};

use relay_core::{
    domain::UserId,
    errors::Error,
    messaging::types::InlineKeyboard,
    presentation::captcha,
    relay::InboundOutcome,
};

use crate::inbound::{content_of, inbound_message, message_ref, reactions, user_id};
use crate::router::AppState;

mod callback;
mod commands;

/// Text answer to the user, optionally with buttons.
pub(crate) struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

pub(crate) async fn notify(state: &AppState, to: UserId, reply: &Reply) {
    if let Err(e) = state
        .delivery()
        .send_notice(to, &reply.text, reply.keyboard.as_ref())
        .await
    {
        debug!(user = %to, "notice failed: {e}");
    }
}

/// User-facing text for a failed operation. Validation errors are shown as
/// is; anything else is logged and hidden.
pub(crate) fn failure_text(e: &Error) -> String {
    match e {
        Error::Invalid(msg) => format!("❌ {msg}"),
        other => {
            error!("request failed: {other}");
            "⚠️ Something went wrong, try again later.".to_string()
        }
    }
}

pub(crate) async fn send_captcha(state: &AppState, user: UserId) {
    let (text, keyboard) = captcha(user);
    notify(state, user, &Reply::with_keyboard(text, keyboard)).await;
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(&msg, state).await;
        }
    }

    let Some(inbound) = inbound_message(&msg) else {
        debug!(chat = msg.chat.id.0, "unsupported message kind");
        notify(&state, user_id(from), &Reply::text("This message type is not supported.")).await;
        return Ok(());
    };

    match state.relay.handle_inbound(&inbound).await {
        Ok(InboundOutcome::NeedsCaptcha) => {
            let name = from.full_name();
            match state.relay.register(inbound.sender, Some(&name)).await {
                Ok(_) => send_captcha(&state, inbound.sender).await,
                Err(e) => error!(user = %inbound.sender, "registration failed: {e}"),
            }
        }
        Ok(InboundOutcome::Rejected(why)) => {
            debug!(user = %inbound.sender, ?why, "message rejected");
        }
        Ok(InboundOutcome::Delivered(report)) => {
            debug!(
                logical = %report.logical,
                delivered = report.delivered,
                failed = report.failed,
                skipped = report.skipped_ignored,
                "message relayed"
            );
        }
        Err(e) => error!(user = %inbound.sender, "relay failed: {e}"),
    }
    Ok(())
}

pub async fn handle_edited(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let (Some(from), Some(content)) = (msg.from.as_ref(), content_of(&msg)) else {
        return Ok(());
    };
    let actor = user_id(from);
    match state
        .relay
        .propagate_edit(actor, message_ref(&msg.chat, msg.id), &content)
        .await
    {
        Ok(edited) => debug!(user = %actor, edited, "edit propagated"),
        Err(e) => error!(user = %actor, "edit propagation failed: {e}"),
    }
    Ok(())
}

pub async fn handle_reaction(
    upd: MessageReactionUpdated,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    if !upd.chat.is_private() {
        return Ok(());
    }
    let Some(user) = upd.user() else {
        return Ok(());
    };
    let actor = user_id(user);
    let reaction = reactions(&upd.new_reaction);
    match state
        .relay
        .propagate_reaction(actor, message_ref(&upd.chat, upd.message_id), &reaction)
        .await
    {
        Ok(mirrored) => debug!(user = %actor, mirrored, "reaction propagated"),
        Err(e) => error!(user = %actor, "reaction propagation failed: {e}"),
    }
    Ok(())
}

pub async fn handle_purchase(
    purchase: PaidMediaPurchased,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let buyer = user_id(&purchase.from);
    if let Err(e) = state
        .relay
        .record_purchase(buyer, &purchase.paid_media_payload, Utc::now())
        .await
    {
        error!(buyer = %buyer, "purchase bookkeeping failed: {e}");
    }
    Ok(())
}

/// A user blocking the bot is treated as leaving.
pub async fn handle_membership(
    upd: ChatMemberUpdated,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    if !upd.chat.is_private() || !upd.new_chat_member.is_banned() {
        return Ok(());
    }
    let user = user_id(&upd.from);
    match state.relay.leave(user).await {
        Ok(()) => info!(user = %user, "bot blocked, participant removed"),
        Err(e) => error!(user = %user, "removal after block failed: {e}"),
    }
    Ok(())
}
