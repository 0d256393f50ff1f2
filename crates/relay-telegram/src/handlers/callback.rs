use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{debug, info};

use relay_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    presentation::{captcha_answer, tag_settings_keyboard, CallbackAction, AUTODELETE_CHOICES},
    preferences, Result,
};

use crate::inbound::user_id;
use crate::router::AppState;

use super::{failure_text, notify, Reply};

/// What to tell the user after a button press.
enum Answer {
    Silent,
    Toast(String),
    Alert(String),
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let actor = user_id(&q.from);
    let source = q.regular_message().map(|m| MessageRef {
        chat_id: ChatId(m.chat.id.0),
        message_id: MessageId(m.id.0),
    });
    let action = q.data.as_deref().and_then(CallbackAction::parse);

    let answer = match action {
        Some(action) => match run(&state, actor, source, action).await {
            Ok(answer) => answer,
            Err(e) => Answer::Alert(failure_text(&e)),
        },
        None => {
            debug!(user = %actor, data = ?q.data, "unrecognised callback");
            Answer::Silent
        }
    };

    // Always answer so the client stops its spinner.
    let req = bot.answer_callback_query(q.id.clone());
    let res = match answer {
        Answer::Silent => req.await,
        Answer::Toast(text) => req.text(text).await,
        Answer::Alert(text) => req.text(text).show_alert(true).await,
    };
    if let Err(e) = res {
        debug!(user = %actor, "answer_callback_query failed: {e}");
    }
    Ok(())
}

async fn run(
    state: &AppState,
    actor: UserId,
    source: Option<MessageRef>,
    action: CallbackAction,
) -> Result<Answer> {
    let relay = &state.relay;
    let delivery = state.delivery();

    match action {
        CallbackAction::Noop => Ok(Answer::Silent),

        CallbackAction::Dismiss => {
            if let Some(msg) = source {
                if let Err(e) = delivery.delete_message(msg).await {
                    debug!(user = %actor, "dismiss failed: {e}");
                }
            }
            Ok(Answer::Silent)
        }

        CallbackAction::DeleteMine(logical) => {
            let tally = relay.delete_mine(actor, logical).await?;
            Ok(Answer::Toast(format!(
                "Deleted for {} participants",
                tally.succeeded
            )))
        }

        CallbackAction::Captcha { user, choice } => {
            if user != actor {
                return Ok(Answer::Alert("This captcha is not for you".to_string()));
            }
            if choice != captcha_answer(user) {
                return Ok(Answer::Alert("Wrong choice! Try again with /start".to_string()));
            }
            relay.pass_captcha(actor).await?;
            if let Some(msg) = source {
                if let Err(e) = delivery.delete_message(msg).await {
                    debug!(user = %actor, "captcha cleanup failed: {e}");
                }
            }
            notify(
                state,
                actor,
                &Reply::text("Welcome! Everything you send here is relayed anonymously."),
            )
            .await;
            Ok(Answer::Toast("Captcha passed!".to_string()))
        }

        CallbackAction::Autodelete(minutes) => {
            preferences::set_autodelete(state.store(), actor, minutes).await?;
            let label = AUTODELETE_CHOICES
                .iter()
                .find(|(m, _)| *m == minutes)
                .map(|(_, l)| *l)
                .unwrap_or("off");
            if let Some(msg) = source {
                let text = if minutes == 0 {
                    "Auto-delete disabled".to_string()
                } else {
                    format!("Your messages are deleted after {label}")
                };
                if let Err(e) = delivery.edit_text(msg, &text).await {
                    debug!(user = %actor, "autodelete confirmation failed: {e}");
                }
            }
            Ok(Answer::Silent)
        }

        CallbackAction::Toggle { toggle, user } => {
            if user != actor {
                return Ok(Answer::Alert("These are not your settings".to_string()));
            }
            let enabled = preferences::toggle(state.store(), actor, toggle).await?;
            if let (Some(msg), Some(p)) = (source, state.store().get_participant(actor).await?) {
                if let Err(e) = delivery
                    .replace_keyboard(msg, &tag_settings_keyboard(&p))
                    .await
                {
                    debug!(user = %actor, "settings refresh failed: {e}");
                }
            }
            Ok(Answer::Toast(
                if enabled { "Enabled" } else { "Disabled" }.to_string(),
            ))
        }

        CallbackAction::Leave { user: Some(user) } => {
            if user != actor {
                return Ok(Answer::Alert("This button is not for you".to_string()));
            }
            relay.leave(actor).await?;
            if let Some(msg) = source {
                if let Err(e) = delivery
                    .edit_text(msg, "Your data was deleted. Send /start to join again.")
                    .await
                {
                    debug!(user = %actor, "leave confirmation failed: {e}");
                }
            }
            info!(user = %actor, "participant left");
            Ok(Answer::Silent)
        }

        CallbackAction::Leave { user: None } => {
            if let Some(msg) = source {
                if let Err(e) = delivery.delete_message(msg).await {
                    debug!(user = %actor, "leave prompt cleanup failed: {e}");
                }
            }
            Ok(Answer::Toast("Cancelled".to_string()))
        }
    }
}
