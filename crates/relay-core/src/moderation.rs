//! Staff actions on participants. Targets are resolved through the
//! correspondence map by the caller, so the real author is acted upon.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::{
    domain::{LogicalId, Participant, ParticipantPatch, Role, UserId, WarningRecord},
    errors::Error,
    messaging::{
        port::DeliveryPort,
        types::{Content, SendOptions},
    },
    propagate::Tally,
    store::Store,
    Result,
};

/// Warnings at which a participant is banned automatically.
pub const WARN_BAN_THRESHOLD: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarnOutcome {
    Warned { count: u32 },
    /// This warning crossed the threshold and banned the participant.
    Banned,
    /// The participant was already banned; only the record was added.
    AlreadyBanned { count: u32 },
}

pub struct Moderation {
    store: Arc<dyn Store>,
    delivery: Arc<dyn DeliveryPort>,
}

impl Moderation {
    pub fn new(store: Arc<dyn Store>, delivery: Arc<dyn DeliveryPort>) -> Self {
        Self { store, delivery }
    }

    async fn target(&self, id: UserId) -> Result<Participant> {
        self.store
            .get_participant(id)
            .await?
            .ok_or_else(|| Error::Invalid(format!("unknown participant {id}")))
    }

    async fn log(&self, target: UserId, by: UserId, reason: String) -> Result<()> {
        self.store
            .add_warning(&WarningRecord {
                participant: target,
                issued_by: by,
                reason,
                created_at: Utc::now(),
            })
            .await
    }

    async fn notify(&self, to: UserId, text: &str) {
        if let Err(e) = self.delivery.send_notice(to, text, None).await {
            debug!(user = %to, "moderation notice failed: {e}");
        }
    }

    pub async fn ban(&self, target: UserId, by: UserId, reason: &str) -> Result<()> {
        if target == by {
            return Err(Error::Invalid("you cannot ban yourself".to_string()));
        }
        self.target(target).await?;
        self.store
            .update_participant(
                target,
                &ParticipantPatch {
                    banned: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        self.log(target, by, format!("Ban: {reason}")).await?;
        info!(target = %target, by = %by, "participant banned");
        self.notify(
            target,
            &format!("⛔ You were banned by an administrator.\nReason: {reason}"),
        )
        .await;
        Ok(())
    }

    pub async fn unban(&self, target: UserId, by: UserId) -> Result<()> {
        self.target(target).await?;
        self.store
            .update_participant(
                target,
                &ParticipantPatch {
                    banned: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        info!(target = %target, by = %by, "participant unbanned");
        self.notify(target, "✅ Your ban was lifted by an administrator")
            .await;
        Ok(())
    }

    pub async fn mute(
        &self,
        target: UserId,
        by: UserId,
        minutes: u32,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        if target == by {
            return Err(Error::Invalid("you cannot mute yourself".to_string()));
        }
        if minutes == 0 {
            return Err(Error::Invalid("mute duration must be positive".to_string()));
        }
        self.target(target).await?;
        let until = now + Duration::minutes(i64::from(minutes));
        self.store
            .update_participant(
                target,
                &ParticipantPatch {
                    muted_until: Some(Some(until)),
                    ..Default::default()
                },
            )
            .await?;
        self.log(target, by, format!("Mute {minutes} min: {reason}"))
            .await?;
        info!(target = %target, by = %by, minutes, "participant muted");
        self.notify(
            target,
            &format!("🔇 You were muted for {minutes} minutes.\nReason: {reason}"),
        )
        .await;
        Ok(until)
    }

    pub async fn unmute(&self, target: UserId, by: UserId) -> Result<()> {
        self.target(target).await?;
        self.store
            .update_participant(
                target,
                &ParticipantPatch {
                    muted_until: Some(None),
                    ..Default::default()
                },
            )
            .await?;
        info!(target = %target, by = %by, "participant unmuted");
        self.notify(target, "🔊 Your mute was lifted by an administrator")
            .await;
        Ok(())
    }

    /// Add a warning. The warning that reaches the threshold bans the
    /// participant and sends the only ban notice.
    pub async fn warn(&self, target: UserId, by: UserId, reason: &str) -> Result<WarnOutcome> {
        let current = self.target(target).await?;
        self.log(target, by, reason.to_string()).await?;

        let count = current.warnings.saturating_add(1);
        let mut patch = ParticipantPatch {
            warnings: Some(count),
            ..Default::default()
        };

        if current.banned {
            self.store.update_participant(target, &patch).await?;
            return Ok(WarnOutcome::AlreadyBanned { count });
        }

        if count >= WARN_BAN_THRESHOLD {
            patch.banned = Some(true);
            self.store.update_participant(target, &patch).await?;
            info!(target = %target, by = %by, count, "warning threshold reached, participant banned");
            self.notify(
                target,
                &format!(
                    "⛔ You received warning #{count}. Your account is blocked for repeated violations."
                ),
            )
            .await;
            return Ok(WarnOutcome::Banned);
        }

        self.store.update_participant(target, &patch).await?;
        info!(target = %target, by = %by, count, "participant warned");
        self.notify(
            target,
            &format!(
                "⚠️ You received a warning from an administrator\nReason: {reason}\n\n\
                 {WARN_BAN_THRESHOLD} warnings lead to a ban."
            ),
        )
        .await;
        Ok(WarnOutcome::Warned { count })
    }

    /// Remove the latest warning. Returns the new count.
    pub async fn unwarn(&self, target: UserId, by: UserId) -> Result<u32> {
        let current = self.target(target).await?;
        let count = current.warnings.saturating_sub(1);
        self.store
            .update_participant(
                target,
                &ParticipantPatch {
                    warnings: Some(count),
                    ..Default::default()
                },
            )
            .await?;
        self.store.remove_last_warning(target).await?;
        info!(target = %target, by = %by, count, "warning removed");
        self.notify(target, "✅ Your latest warning was removed").await;
        Ok(count)
    }

    /// Send a complaint about `logical` to every active staff member, as a
    /// reply to their copy when they hold one.
    pub async fn report(&self, reporter: UserId, logical: LogicalId, reason: &str) -> Result<Tally> {
        let mut tally = Tally::default();
        let text = Content::Text {
            text: format!("🚩 Report\n\nReason: {reason}"),
        };

        for staff in self.store.list_staff().await? {
            if staff.id == reporter {
                continue;
            }
            let opts = SendOptions {
                reply_to: self.store.lookup(logical, staff.id).await?,
                ..Default::default()
            };
            match self.delivery.send_copy(staff.id, &text, &opts).await {
                Ok(_) => tally.succeeded += 1,
                Err(e) => {
                    debug!(staff = %staff.id, "report delivery failed: {e}");
                    tally.failed += 1;
                }
            }
        }

        info!(reporter = %reporter, logical = %logical, sent = tally.succeeded, "report filed");
        Ok(tally)
    }

    /// Grant or revoke a staff role. The creator cannot be demoted here.
    pub async fn set_role(&self, target: UserId, by: UserId, role: Role) -> Result<()> {
        if target == by {
            return Err(Error::Invalid("you cannot change your own role".to_string()));
        }
        if role == Role::Creator {
            return Err(Error::Invalid("the creator role is not assignable".to_string()));
        }
        let current = self.target(target).await?;
        if current.role == Role::Creator {
            return Err(Error::Invalid("the creator cannot be demoted".to_string()));
        }
        self.store
            .update_participant(
                target,
                &ParticipantPatch {
                    role: Some(role),
                    ..Default::default()
                },
            )
            .await?;
        info!(target = %target, by = %by, role = role.as_str(), "role changed");
        let text = if role.is_staff() {
            "🛡 You were appointed as an administrator"
        } else {
            "You were removed from the administrator role"
        };
        self.notify(target, text).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::MessageId,
        fanout::FanOut,
        messaging::types::InboundMessage,
        testing::{FakeDelivery, MemoryStore},
    };

    fn setup() -> (Arc<MemoryStore>, Arc<FakeDelivery>, Moderation) {
        let store = Arc::new(MemoryStore::new());
        let delivery = Arc::new(FakeDelivery::new());
        let moderation = Moderation::new(store.clone(), delivery.clone());
        (store, delivery, moderation)
    }

    #[tokio::test]
    async fn third_warning_bans_with_one_notice() {
        let (store, delivery, moderation) = setup();
        store.activate(UserId(1), Role::Admin).await;
        store.activate(UserId(2), Role::Ordinary).await;

        assert_eq!(
            moderation.warn(UserId(2), UserId(1), "spam").await.unwrap(),
            WarnOutcome::Warned { count: 1 }
        );
        assert_eq!(
            moderation.warn(UserId(2), UserId(1), "spam").await.unwrap(),
            WarnOutcome::Warned { count: 2 }
        );
        assert_eq!(
            moderation.warn(UserId(2), UserId(1), "spam").await.unwrap(),
            WarnOutcome::Banned
        );
        assert_eq!(
            moderation.warn(UserId(2), UserId(1), "again").await.unwrap(),
            WarnOutcome::AlreadyBanned { count: 4 }
        );

        let p = store.get_participant(UserId(2)).await.unwrap().unwrap();
        assert!(p.banned);
        assert_eq!(p.warnings, 4);
        assert_eq!(store.warnings().len(), 4);

        let ban_notices = delivery
            .notices()
            .into_iter()
            .filter(|(to, text)| *to == UserId(2) && text.contains("blocked"))
            .count();
        assert_eq!(ban_notices, 1);
    }

    #[tokio::test]
    async fn unwarn_floors_at_zero_and_drops_latest_record() {
        let (store, _delivery, moderation) = setup();
        store.activate(UserId(2), Role::Ordinary).await;

        moderation.warn(UserId(2), UserId(1), "first").await.unwrap();
        moderation.warn(UserId(2), UserId(1), "second").await.unwrap();
        assert_eq!(moderation.unwarn(UserId(2), UserId(1)).await.unwrap(), 1);
        assert_eq!(store.warnings()[0].reason, "first");
        assert_eq!(store.warnings().len(), 1);

        moderation.unwarn(UserId(2), UserId(1)).await.unwrap();
        assert_eq!(moderation.unwarn(UserId(2), UserId(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ban_and_mute_leave_records() {
        let (store, _delivery, moderation) = setup();
        store.activate(UserId(2), Role::Ordinary).await;
        let now = Utc::now();

        let until = moderation
            .mute(UserId(2), UserId(1), 15, "flood", now)
            .await
            .unwrap();
        assert_eq!(until, now + Duration::minutes(15));
        moderation.ban(UserId(2), UserId(1), "abuse").await.unwrap();

        let reasons: Vec<_> = store.warnings().into_iter().map(|w| w.reason).collect();
        assert_eq!(reasons, vec!["Mute 15 min: flood", "Ban: abuse"]);

        let p = store.get_participant(UserId(2)).await.unwrap().unwrap();
        assert!(p.banned);
        assert_eq!(p.muted_until, Some(until));

        assert!(moderation.ban(UserId(1), UserId(1), "x").await.is_err());
        assert!(moderation.ban(UserId(99), UserId(1), "x").await.is_err());
    }

    #[tokio::test]
    async fn report_replies_to_each_staff_copy() {
        let (store, delivery, moderation) = setup();
        let author = store.activate(UserId(1), Role::Ordinary).await;
        store.activate(UserId(2), Role::Admin).await;
        store.activate(UserId(3), Role::Ordinary).await;
        store.activate(UserId(4), Role::CoOwner).await;

        let fanout = FanOut::new(store.clone(), delivery.clone(), None);
        let report = fanout
            .distribute(
                &InboundMessage {
                    sender: UserId(1),
                    message_id: MessageId(10),
                    content: Content::Text {
                        text: "bad".to_string(),
                    },
                    reply_to: None,
                    sender_name: None,
                },
                &author,
            )
            .await
            .unwrap();
        delivery.fail_for(UserId(4));

        let tally = moderation
            .report(UserId(3), report.logical, "rude")
            .await
            .unwrap();
        assert_eq!(tally, Tally { succeeded: 1, failed: 1 });

        let admin_copy = store.lookup(report.logical, UserId(2)).await.unwrap();
        let to_admin = delivery.sent_to(UserId(2));
        assert_eq!(to_admin.last().unwrap().opts.reply_to, admin_copy);
    }

    #[tokio::test]
    async fn creator_role_is_protected() {
        let (store, _delivery, moderation) = setup();
        store.activate(UserId(1), Role::Creator).await;
        store.activate(UserId(2), Role::Ordinary).await;

        moderation
            .set_role(UserId(2), UserId(1), Role::Admin)
            .await
            .unwrap();
        assert_eq!(
            store.get_participant(UserId(2)).await.unwrap().unwrap().role,
            Role::Admin
        );
        assert!(moderation
            .set_role(UserId(1), UserId(2), Role::Ordinary)
            .await
            .is_err());
        assert!(moderation
            .set_role(UserId(2), UserId(1), Role::Creator)
            .await
            .is_err());
    }
}
