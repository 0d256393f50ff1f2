use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;
use tracing::info;

use relay_core::{
    admission::set_media_enabled,
    domain::{LogicalId, MessageId, Participant, Role, UserId},
    errors::Error,
    messaging::types::ContentKind,
    moderation::WarnOutcome,
    preferences::{self, TagOutcome},
    presentation::{autodelete_keyboard, captcha, leave_keyboard, tag_settings_keyboard},
    Result,
};

use crate::inbound::user_id;
use crate::router::AppState;

use super::{failure_text, notify, Reply};

const TOP_LIMIT: usize = 5;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// Short spellings accepted for some commands.
fn canonical(cmd: &str) -> &str {
    match cmd {
        "del" => "delete",
        other => other,
    }
}

/// Who asked, about what.
struct Invocation<'a> {
    state: &'a AppState,
    actor: UserId,
    display_name: String,
    reply_to: Option<MessageId>,
    args: &'a str,
}

impl Invocation<'_> {
    fn arg(&self) -> Option<&str> {
        Some(self.args).filter(|a| !a.is_empty())
    }

    /// The active participant issuing the command.
    async fn participant(&self) -> Result<Participant> {
        self.state
            .store()
            .get_participant(self.actor)
            .await?
            .filter(|p| p.captcha_passed)
            .ok_or_else(|| Error::Invalid("send /start to join first".to_string()))
    }

    async fn staff(&self) -> Result<Participant> {
        let p = self.participant().await?;
        if !p.is_staff() {
            return Err(Error::Invalid("access denied".to_string()));
        }
        Ok(p)
    }

    async fn creator(&self) -> Result<Participant> {
        let p = self.participant().await?;
        if p.role != Role::Creator && p.id != self.state.cfg.creator_id {
            return Err(Error::Invalid("only the creator can do this".to_string()));
        }
        Ok(p)
    }

    /// The message the command replies to, resolved to its logical origin.
    async fn target(&self) -> Result<LogicalId> {
        let Some(reply_to) = self.reply_to else {
            return Err(Error::Invalid(
                "reply to a message to use this command".to_string(),
            ));
        };
        self.state
            .relay
            .resolve_original(reply_to, self.actor)
            .await?
            .ok_or_else(|| Error::Invalid("that message is no longer tracked".to_string()))
    }

    fn reason(&self) -> &str {
        self.arg().unwrap_or("not specified")
    }
}

pub async fn handle_command(msg: &Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let (cmd, rest) = parse_command(msg.text().unwrap_or_default());
    let inv = Invocation {
        state: &state,
        actor: user_id(from),
        display_name: from.full_name(),
        reply_to: msg.reply_to_message().map(|r| MessageId(r.id.0)),
        args: &rest,
    };

    let reply = match run(&inv, canonical(&cmd)).await {
        Ok(reply) => reply,
        Err(e) => Reply::text(failure_text(&e)),
    };
    notify(&state, inv.actor, &reply).await;
    Ok(())
}

async fn run(inv: &Invocation<'_>, cmd: &str) -> Result<Reply> {
    let relay = &inv.state.relay;
    let store = inv.state.store();
    let moderation = relay.moderation();

    match cmd {
        "start" => {
            let p = relay.register(inv.actor, Some(&inv.display_name)).await?;
            if p.captcha_passed {
                return Ok(Reply::text("You are already in the chat."));
            }
            let (text, keyboard) = captcha(inv.actor);
            Ok(Reply::with_keyboard(text, keyboard))
        }

        // Preferences
        "tag" => {
            inv.participant().await?;
            match preferences::tag_command(store, inv.actor, inv.arg()).await? {
                TagOutcome::Set(tag) => Ok(Reply::text(format!("✅ Signature set: {tag}"))),
                TagOutcome::Toggled(on) => Ok(Reply::text(format!(
                    "Signature {}",
                    if on { "enabled" } else { "disabled" }
                ))),
                TagOutcome::ShowSettings => {
                    let p = inv.participant().await?;
                    Ok(Reply::with_keyboard(
                        "Label settings",
                        tag_settings_keyboard(&p),
                    ))
                }
            }
        }
        "ctag" => {
            inv.participant().await?;
            match preferences::custom_tag_command(store, inv.actor, inv.arg()).await? {
                Some(tag) => Ok(Reply::text(format!("✅ Custom tag set: {tag}"))),
                None => Ok(Reply::text("Custom tag disabled")),
            }
        }
        "protect" => {
            inv.participant().await?;
            let on = preferences::toggle_protect(store, inv.actor).await?;
            Ok(Reply::text(format!(
                "Content protection {}",
                if on { "enabled" } else { "disabled" }
            )))
        }
        "autodel" => {
            inv.participant().await?;
            Ok(Reply::with_keyboard(
                "Delete your messages automatically after:",
                autodelete_keyboard(),
            ))
        }
        "ignore" => {
            inv.participant().await?;
            let about = inv.target().await?;
            preferences::ignore(store, inv.actor, about).await?;
            Ok(Reply::text("You will no longer receive messages from this sender."))
        }
        "unignore" => {
            inv.participant().await?;
            if inv.arg() == Some("all") {
                let n = preferences::unignore_all(store, inv.actor).await?;
                return Ok(Reply::text(format!("Ignore list cleared ({n} removed)")));
            }
            let about = inv.target().await?;
            if preferences::unignore(store, inv.actor, about).await? {
                Ok(Reply::text("This sender is no longer ignored."))
            } else {
                Ok(Reply::text("This sender was not ignored."))
            }
        }
        "leave" => {
            inv.participant().await?;
            Ok(Reply::with_keyboard(
                "Delete all your data and leave the chat?",
                leave_keyboard(inv.actor),
            ))
        }
        "info" => {
            inv.participant().await?;
            Ok(Reply::text(relay.info(inv.actor, Utc::now()).await?.to_string()))
        }
        "top" => {
            inv.participant().await?;
            Ok(Reply::text(relay.top(TOP_LIMIT).await?.to_string()))
        }
        "profile" => {
            inv.participant().await?;
            Ok(Reply::text(relay.profile(inv.actor).await?.to_string()))
        }
        "report" => {
            inv.participant().await?;
            let about = inv.target().await?;
            let tally = moderation.report(inv.actor, about, inv.reason()).await?;
            Ok(Reply::text(format!(
                "🚩 Report sent to {} staff members",
                tally.succeeded
            )))
        }

        // Staff
        "ban" => {
            inv.staff().await?;
            let about = inv.target().await?;
            moderation.ban(about.sender, inv.actor, inv.reason()).await?;
            Ok(Reply::text("⛔ Participant banned"))
        }
        "unban" => {
            inv.staff().await?;
            let about = inv.target().await?;
            moderation.unban(about.sender, inv.actor).await?;
            Ok(Reply::text("✅ Participant unbanned"))
        }
        "mute" => {
            inv.staff().await?;
            let about = inv.target().await?;
            let (minutes, reason) = parse_mute_args(inv.args)?;
            let until = moderation
                .mute(about.sender, inv.actor, minutes, reason, Utc::now())
                .await?;
            Ok(Reply::text(format!(
                "🔇 Participant muted until {}",
                until.format("%Y-%m-%d %H:%M UTC")
            )))
        }
        "unmute" => {
            inv.staff().await?;
            let about = inv.target().await?;
            moderation.unmute(about.sender, inv.actor).await?;
            Ok(Reply::text("🔊 Participant unmuted"))
        }
        "warn" => {
            inv.staff().await?;
            let about = inv.target().await?;
            Ok(
                match moderation.warn(about.sender, inv.actor, inv.reason()).await? {
                    WarnOutcome::Warned { count } => {
                        Reply::text(format!("⚠️ Warning issued ({count})"))
                    }
                    WarnOutcome::Banned => {
                        Reply::text("⛔ Warning limit reached, participant banned")
                    }
                    WarnOutcome::AlreadyBanned { count } => Reply::text(format!(
                        "Warning recorded ({count}), participant was already banned"
                    )),
                },
            )
        }
        "unwarn" => {
            inv.staff().await?;
            let about = inv.target().await?;
            let count = moderation.unwarn(about.sender, inv.actor).await?;
            Ok(Reply::text(format!("✅ Warning removed ({count} left)")))
        }
        "delete" => {
            inv.staff().await?;
            let Some(reply_to) = inv.reply_to else {
                return Err(Error::Invalid(
                    "reply to a message to use this command".to_string(),
                ));
            };
            match relay.moderator_delete(inv.actor, reply_to).await? {
                Some(tally) => Ok(Reply::text(format!(
                    "🗑 Deleted: {} copies removed, {} failed",
                    tally.succeeded, tally.failed
                ))),
                None => Err(Error::Invalid("that message is no longer tracked".to_string())),
            }
        }
        "status" => {
            inv.staff().await?;
            Ok(Reply::text(relay.status(Utc::now()).await?.to_string()))
        }
        "mediaoff" | "mediaon" => {
            inv.staff().await?;
            let kind: ContentKind = inv
                .arg()
                .ok_or_else(|| Error::Invalid(format!("usage: /{cmd} <type>")))?
                .parse()?;
            let enabled = cmd == "mediaon";
            set_media_enabled(store, kind, enabled).await?;
            info!(by = %inv.actor, %kind, enabled, "media toggle changed");
            Ok(Reply::text(format!(
                "{kind} messages {}",
                if enabled { "allowed" } else { "disabled" }
            )))
        }
        "calldown" => {
            inv.staff().await?;
            let secs: f64 = inv
                .arg()
                .and_then(|a| a.replace(',', ".").parse().ok())
                .ok_or_else(|| Error::Invalid("usage: /calldown <seconds>".to_string()))?;
            let cooldown = relay.admission().set_cooldown(secs).await?;
            info!(by = %inv.actor, ms = cooldown.as_millis() as u64, "cooldown changed");
            Ok(Reply::text(format!(
                "⏱ Cooldown set to {:.1}s",
                cooldown.as_secs_f64()
            )))
        }

        // Creator
        "botoff" | "boton" => {
            inv.creator().await?;
            relay.set_paused(cmd == "botoff").await?;
            Ok(Reply::text(if cmd == "botoff" {
                "⏸ Relay paused"
            } else {
                "▶️ Relay resumed"
            }))
        }
        "newadmin" | "banadmin" => {
            inv.creator().await?;
            let about = inv.target().await?;
            let role = if cmd == "newadmin" {
                Role::Admin
            } else {
                Role::Ordinary
            };
            moderation.set_role(about.sender, inv.actor, role).await?;
            Ok(Reply::text(if role == Role::Admin {
                "✅ Admin appointed"
            } else {
                "Admin rights removed"
            }))
        }
        "cleanup" => {
            inv.creator().await?;
            let counts = relay.cleanup(inv.actor, Utc::now()).await?;
            Ok(Reply::text(format!(
                "🧹 Cleaned {} old messages ({} copies)",
                counts.messages, counts.copies
            )))
        }

        _ => Ok(Reply::text("Unknown command")),
    }
}

/// `/mute <minutes> [reason]`.
fn parse_mute_args(args: &str) -> Result<(u32, &str)> {
    let mut parts = args.splitn(2, char::is_whitespace);
    let minutes = parts
        .next()
        .and_then(|m| m.parse::<u32>().ok())
        .ok_or_else(|| Error::Invalid("usage: /mute <minutes> [reason]".to_string()))?;
    let reason = parts
        .next()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("not specified");
    Ok((minutes, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_name_drops_bot_suffix_and_case() {
        assert_eq!(
            parse_command("/Ban@relay_bot  spamming links"),
            ("ban".to_string(), "spamming links".to_string())
        );
        assert_eq!(parse_command("/status"), ("status".to_string(), String::new()));
    }

    #[test]
    fn del_is_short_for_delete() {
        let (cmd, _) = parse_command("/del@relay_bot");
        assert_eq!(canonical(&cmd), "delete");
        assert_eq!(canonical("delete"), "delete");
        assert_eq!(canonical("delay"), "delay");
    }

    #[test]
    fn mute_needs_minutes_first() {
        assert_eq!(parse_mute_args("30 flooding").unwrap(), (30, "flooding"));
        assert_eq!(parse_mute_args("15").unwrap(), (15, "not specified"));
        assert!(parse_mute_args("soon").is_err());
        assert!(parse_mute_args("").is_err());
    }
}
