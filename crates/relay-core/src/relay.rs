//! The operations exposed to update routing, wired over one store and one
//! transport.

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    admission::{AdmissionFilter, Rejection, Verdict},
    domain::{
        ChatId, LogicalId, MessageId, MessageRef, PaidSale, Participant, ParticipantPatch,
        PurgeCounts, Role, Totals, UserId,
    },
    errors::Error,
    fanout::{parse_purchase_payload, DeliveryReport, FanOut},
    messaging::{
        port::DeliveryPort,
        types::{Content, InboundMessage, Reaction},
    },
    moderation::{Moderation, WARN_BAN_THRESHOLD},
    presentation::{deleted_keyboard, public_name},
    propagate::{Propagator, Tally},
    store::{flag_setting, keys, Store},
    Result,
};

/// `/cleanup` drops messages, copies and daily counters older than this.
pub const RETENTION_DAYS: i64 = 30;

#[derive(Clone, Debug)]
pub struct RelayOptions {
    pub default_cooldown: Duration,
    pub poll_channel: Option<ChatId>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InboundOutcome {
    /// Unknown sender or captcha not yet solved.
    NeedsCaptcha,
    Rejected(Rejection),
    Delivered(DeliveryReport),
}

pub struct Relay {
    store: Arc<dyn Store>,
    delivery: Arc<dyn DeliveryPort>,
    admission: AdmissionFilter,
    fanout: FanOut,
    propagator: Propagator,
    moderation: Moderation,
    // tokio's mutex queues waiters in arrival order
    gate: Mutex<()>,
}

impl Relay {
    pub fn new(store: Arc<dyn Store>, delivery: Arc<dyn DeliveryPort>, opts: RelayOptions) -> Self {
        Self {
            admission: AdmissionFilter::new(store.clone(), opts.default_cooldown),
            fanout: FanOut::new(store.clone(), delivery.clone(), opts.poll_channel),
            propagator: Propagator::new(store.clone(), delivery.clone()),
            moderation: Moderation::new(store.clone(), delivery.clone()),
            store,
            delivery,
            gate: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &dyn Store {
        &*self.store
    }

    pub fn delivery(&self) -> &dyn DeliveryPort {
        &*self.delivery
    }

    pub fn admission(&self) -> &AdmissionFilter {
        &self.admission
    }

    pub fn moderation(&self) -> &Moderation {
        &self.moderation
    }

    /// Seed or promote the creator and stamp the start time.
    pub async fn bootstrap(&self, creator: UserId) -> Result<()> {
        self.store.create_participant(creator, Role::Creator).await?;
        self.store
            .update_participant(
                creator,
                &ParticipantPatch {
                    role: Some(Role::Creator),
                    captcha_passed: Some(true),
                    banned: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        self.store
            .set_setting(keys::STARTED_AT, &Utc::now().to_rfc3339())
            .await?;
        info!(creator = %creator, "relay bootstrapped");
        Ok(())
    }

    /// First contact. Existing participants are returned unchanged.
    pub async fn register(&self, user: UserId, display_name: Option<&str>) -> Result<Participant> {
        let mut p = self.store.create_participant(user, Role::Ordinary).await?;
        if p.display_name.is_none() && display_name.is_some() {
            let patch = ParticipantPatch {
                display_name: Some(display_name.map(str::to_string)),
                ..Default::default()
            };
            self.store.update_participant(user, &patch).await?;
            p.apply(&patch);
        }
        Ok(p)
    }

    pub async fn pass_captcha(&self, user: UserId) -> Result<()> {
        self.store
            .update_participant(
                user,
                &ParticipantPatch {
                    captcha_passed: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        info!(user = %user, "captcha passed");
        Ok(())
    }

    /// Admission runs under the gate, one message at a time in arrival
    /// order; fan-out runs after the gate is released.
    pub async fn handle_inbound(&self, inbound: &InboundMessage) -> Result<InboundOutcome> {
        let (verdict, sender) = {
            let _turn = self.gate.lock().await;

            let Some(mut sender) = self.store.get_participant(inbound.sender).await? else {
                return Ok(InboundOutcome::NeedsCaptcha);
            };
            if !sender.captcha_passed {
                return Ok(InboundOutcome::NeedsCaptcha);
            }

            let verdict = self.admission.admit(&sender, &inbound.content).await?;
            if verdict == Verdict::Admitted
                && inbound.sender_name.is_some()
                && inbound.sender_name != sender.display_name
            {
                let patch = ParticipantPatch {
                    display_name: Some(inbound.sender_name.clone()),
                    ..Default::default()
                };
                self.store.update_participant(sender.id, &patch).await?;
                sender.apply(&patch);
            }
            (verdict, sender)
        };

        match verdict {
            Verdict::Rejected(why) => {
                if let Err(e) = self
                    .delivery
                    .send_notice(sender.id, &why.notice(), None)
                    .await
                {
                    debug!(user = %sender.id, "rejection notice failed: {e}");
                }
                Ok(InboundOutcome::Rejected(why))
            }
            Verdict::Admitted => {
                let report = self.fanout.distribute(inbound, &sender).await?;
                Ok(InboundOutcome::Delivered(report))
            }
        }
    }

    pub async fn resolve_original(
        &self,
        delivered: MessageId,
        actor: UserId,
    ) -> Result<Option<LogicalId>> {
        self.propagator.resolve_original(delivered, actor).await
    }

    /// Edit made by `actor` on a message at `at`. Only the actor's private
    /// chat with the bot is relayed; anything else is ignored.
    pub async fn propagate_edit(
        &self,
        actor: UserId,
        at: MessageRef,
        content: &Content,
    ) -> Result<usize> {
        if !in_own_chat(actor, at) {
            return Ok(0);
        }
        self.propagator
            .propagate_edit(actor, at.message_id, content)
            .await
    }

    pub async fn propagate_reaction(
        &self,
        actor: UserId,
        at: MessageRef,
        reaction: &[Reaction],
    ) -> Result<usize> {
        if !in_own_chat(actor, at) {
            return Ok(0);
        }
        self.propagator
            .propagate_reaction(actor, at.message_id, reaction)
            .await
    }

    /// Sender-initiated delete: every other copy goes, the echo stays and is
    /// relabelled.
    pub async fn delete_mine(&self, actor: UserId, logical: LogicalId) -> Result<Tally> {
        if logical.sender != actor {
            return Err(Error::Invalid("this is not your message".to_string()));
        }
        let echo = self.store.lookup(logical, actor).await?;
        let tally = self
            .propagator
            .delete_everywhere(logical, Some(actor))
            .await?;

        if let Some(echo) = echo {
            if let Err(e) = self
                .delivery
                .replace_keyboard(actor.message(echo), &deleted_keyboard())
                .await
            {
                debug!(user = %actor, "relabel of deleted echo failed: {e}");
            }
        }
        Ok(tally)
    }

    /// Staff delete of the message behind `message_id` in the actor's chat.
    pub async fn moderator_delete(
        &self,
        actor: UserId,
        message_id: MessageId,
    ) -> Result<Option<Tally>> {
        let Some(logical) = self.resolve_original(message_id, actor).await? else {
            return Ok(None);
        };
        let tally = self.propagator.delete_everywhere(logical, None).await?;
        info!(actor = %actor, logical = %logical, "message removed by staff");
        Ok(Some(tally))
    }

    /// Forget a participant entirely. Also used when they block the bot.
    pub async fn leave(&self, user: UserId) -> Result<()> {
        self.store.delete_participant(user).await?;
        info!(user = %user, "participant data removed");
        Ok(())
    }

    pub async fn set_paused(&self, paused: bool) -> Result<()> {
        self.store
            .set_setting(keys::BOT_ENABLED, if paused { "0" } else { "1" })
            .await?;
        warn!(paused, "relay pause flag changed");
        Ok(())
    }

    pub async fn status(&self, now: DateTime<Utc>) -> Result<StatusReport> {
        Ok(StatusReport {
            enabled: flag_setting(&*self.store, keys::BOT_ENABLED, true).await?,
            totals: self.store.totals(now.date_naive()).await?,
            cooldown: self.admission.cooldown().await?,
        })
    }

    pub async fn info(&self, user: UserId, now: DateTime<Utc>) -> Result<InfoReport> {
        let day = now.date_naive();
        let started = self
            .store
            .get_setting(keys::STARTED_AT)
            .await?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(now);
        Ok(InfoReport {
            totals: self.store.totals(day).await?,
            mine_today: self.store.participant_daily_count(user, day).await?,
            uptime: now - started,
        })
    }

    /// A paid offer was bought. The sale is kept and its owner told; a
    /// payload that names no message is logged and dropped.
    pub async fn record_purchase(
        &self,
        buyer: UserId,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PaidSale>> {
        let Some(logical) = parse_purchase_payload(payload) else {
            warn!(buyer = %buyer, payload, "unrecognised purchase payload");
            return Ok(None);
        };
        // the price is only known while the offer is still stored
        let stars = self
            .store
            .get_logical_message(logical)
            .await?
            .and_then(|m| m.paid)
            .map_or(0, |terms| terms.stars);

        let sale = PaidSale {
            logical,
            buyer,
            stars,
            created_at: now,
        };
        self.store.record_sale(&sale).await?;
        info!(owner = %logical.sender, buyer = %buyer, stars, "paid media purchased");

        if let Err(e) = self
            .delivery
            .send_notice(logical.sender, &purchase_notice(stars), None)
            .await
        {
            debug!(owner = %logical.sender, "purchase notice failed: {e}");
        }
        Ok(Some(sale))
    }

    pub async fn top(&self, limit: usize) -> Result<Leaderboard> {
        let rows = self
            .store
            .top_participants(limit)
            .await?
            .iter()
            .map(|p| (public_name(p).to_string(), p.message_count))
            .collect();
        Ok(Leaderboard { rows })
    }

    pub async fn profile(&self, user: UserId) -> Result<ProfileCard> {
        let participant = self
            .store
            .get_participant(user)
            .await?
            .ok_or_else(|| Error::Invalid("send /start to join first".to_string()))?;
        let sales = self.store.sales_for(user).await?;
        Ok(ProfileCard {
            stars_earned: sales.iter().map(|s| u64::from(s.stars)).sum(),
            sales: sales.len(),
            participant,
        })
    }

    /// Retention purge of everything older than [`RETENTION_DAYS`].
    pub async fn cleanup(&self, actor: UserId, now: DateTime<Utc>) -> Result<PurgeCounts> {
        let cutoff = now - chrono::Duration::days(RETENTION_DAYS);
        let counts = self.store.purge_before(cutoff).await?;
        info!(
            by = %actor,
            messages = counts.messages,
            copies = counts.copies,
            map_entries = counts.map_entries,
            stat_days = counts.stat_days,
            "old data purged"
        );
        Ok(counts)
    }
}

fn purchase_notice(stars: u32) -> String {
    if stars == 0 {
        "✅ Your paid media was purchased!".to_string()
    } else {
        format!("✅ Your paid media was purchased!\n\n⭐ Stars received: {stars}")
    }
}

/// Message ids only identify relayed messages inside the private chat
/// between a participant and the bot, whose chat id is the user id.
fn in_own_chat(actor: UserId, at: MessageRef) -> bool {
    if at.chat_id == actor.chat() {
        return true;
    }
    debug!(user = %actor, chat = at.chat_id.0, "update outside the private chat ignored");
    false
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusReport {
    pub enabled: bool,
    pub totals: Totals,
    pub cooldown: Duration,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "📊 Relay status\n")?;
        writeln!(f, "State: {}", if self.enabled { "running" } else { "paused" })?;
        writeln!(f, "Active participants: {}", self.totals.active_participants)?;
        writeln!(f, "Messages relayed: {}", self.totals.logical_messages)?;
        writeln!(f, "Messages today: {}", self.totals.messages_today)?;
        write!(f, "Cooldown: {:.1}s", self.cooldown.as_secs_f64())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InfoReport {
    pub totals: Totals,
    pub mine_today: u64,
    pub uptime: chrono::Duration,
}

impl fmt::Display for InfoReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Relay statistics\n")?;
        writeln!(f, "Participants: {}", self.totals.active_participants)?;
        writeln!(f, "Messages today: {}", self.totals.messages_today)?;
        writeln!(f, "Your messages today: {}", self.mine_today)?;
        write!(f, "Up for {}", format_uptime(self.uptime))
    }
}

/// Most active participants, busiest first.
#[derive(Clone, Debug, PartialEq)]
pub struct Leaderboard {
    pub rows: Vec<(String, u64)>,
}

impl fmt::Display for Leaderboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return write!(f, "Top is empty");
        }
        writeln!(f, "🏆 Most active participants")?;
        for (i, (name, count)) in self.rows.iter().enumerate() {
            write!(f, "\n{}. {name}: {count} msgs", i + 1)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProfileCard {
    pub participant: Participant,
    pub sales: usize,
    pub stars_earned: u64,
}

impl fmt::Display for ProfileCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.participant;
        let mark = |on: bool| if on { "✅" } else { "❌" };
        let role = match p.role {
            Role::Creator => "Creator",
            Role::CoOwner => "Co-Owner",
            Role::Admin => "Administrator",
            Role::Ordinary => "User",
        };

        writeln!(f, "👤 Your profile\n")?;
        writeln!(f, "ID: {}", p.id)?;
        writeln!(f, "Role: {role}")?;
        writeln!(f, "Signature: {}", mark(p.prefs.tag_enabled))?;
        match p.prefs.custom_tag.as_deref().filter(|_| p.prefs.custom_tag_enabled) {
            Some(tag) => writeln!(f, "Custom tag: {tag}")?,
            None => writeln!(f, "Custom tag: {}", mark(false))?,
        }
        writeln!(f, "Content protection: {}", mark(p.prefs.protect_content))?;
        match p.prefs.autodelete_minutes {
            0 => writeln!(f, "Auto-delete: off")?,
            m => writeln!(f, "Auto-delete: {m} min")?,
        }
        writeln!(f, "Warnings: {}/{WARN_BAN_THRESHOLD}", p.warnings)?;
        write!(f, "Messages: {}", p.message_count)?;
        if self.sales > 0 {
            write!(f, "\nPaid media sold: {} (⭐ {})", self.sales, self.stars_earned)?;
        }
        Ok(())
    }
}

pub fn format_uptime(uptime: chrono::Duration) -> String {
    let total_minutes = uptime.num_minutes().max(0);
    let weeks = total_minutes / (7 * 24 * 60);
    let days = total_minutes / (24 * 60) % 7;
    let hours = total_minutes / 60 % 24;
    let minutes = total_minutes % 60;

    let parts: Vec<String> = [(weeks, "w"), (days, "d"), (hours, "h"), (minutes, "min")]
        .into_iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{n}{unit}"))
        .collect();
    if parts.is_empty() {
        "less than a minute".to_string()
    } else {
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        presentation::DISMISS,
        messaging::types::ButtonAction,
        testing::{FakeDelivery, MemoryStore},
    };

    fn relay() -> (Arc<MemoryStore>, Arc<FakeDelivery>, Relay) {
        let store = Arc::new(MemoryStore::new());
        let delivery = Arc::new(FakeDelivery::new());
        let relay = Relay::new(
            store.clone(),
            delivery.clone(),
            RelayOptions {
                default_cooldown: Duration::from_secs(1),
                poll_channel: None,
            },
        );
        (store, delivery, relay)
    }

    fn inbound(sender: i64, id: i32, text: &str) -> InboundMessage {
        InboundMessage {
            sender: UserId(sender),
            message_id: MessageId(id),
            content: Content::Text {
                text: text.to_string(),
            },
            reply_to: None,
            sender_name: None,
        }
    }

    #[tokio::test]
    async fn captcha_gates_relaying() {
        let (store, _delivery, relay) = relay();
        assert_eq!(
            relay.handle_inbound(&inbound(1, 10, "hi")).await.unwrap(),
            InboundOutcome::NeedsCaptcha
        );

        relay.register(UserId(1), Some("Ann")).await.unwrap();
        assert_eq!(
            relay.handle_inbound(&inbound(1, 11, "hi")).await.unwrap(),
            InboundOutcome::NeedsCaptcha
        );

        relay.pass_captcha(UserId(1)).await.unwrap();
        let outcome = relay.handle_inbound(&inbound(1, 12, "hi")).await.unwrap();
        assert!(matches!(outcome, InboundOutcome::Delivered(r) if r.delivered == 1));
        let p = store.get_participant(UserId(1)).await.unwrap().unwrap();
        assert_eq!(p.display_name.as_deref(), Some("Ann"));
    }

    #[tokio::test]
    async fn rejection_notifies_only_the_sender() {
        let (store, delivery, relay) = relay();
        store.activate(UserId(1), Role::Ordinary).await;
        store.activate(UserId(2), Role::Ordinary).await;
        relay.set_paused(true).await.unwrap();

        let outcome = relay.handle_inbound(&inbound(1, 10, "hi")).await.unwrap();
        assert_eq!(outcome, InboundOutcome::Rejected(Rejection::Paused));
        assert!(delivery.sent().is_empty());
        assert_eq!(delivery.notices().len(), 1);
        assert_eq!(delivery.notices()[0].0, UserId(1));
    }

    #[tokio::test]
    async fn rejected_message_leaves_the_participant_untouched() {
        let (store, _delivery, relay) = relay();
        store.activate(UserId(1), Role::Ordinary).await;
        relay.set_paused(true).await.unwrap();

        let mut msg = inbound(1, 10, "hi");
        msg.sender_name = Some("Real Name".to_string());
        assert_eq!(
            relay.handle_inbound(&msg).await.unwrap(),
            InboundOutcome::Rejected(Rejection::Paused)
        );
        let p = store.get_participant(UserId(1)).await.unwrap().unwrap();
        assert_eq!(p.display_name, None);
        assert_eq!(p.message_count, 0);

        relay.set_paused(false).await.unwrap();
        relay.handle_inbound(&msg).await.unwrap();
        let p = store.get_participant(UserId(1)).await.unwrap().unwrap();
        assert_eq!(p.display_name.as_deref(), Some("Real Name"));
    }

    #[tokio::test(start_paused = true)]
    async fn store_failure_drops_one_message_and_the_next_goes_through() {
        let (store, _delivery, relay) = relay();
        store.activate(UserId(1), Role::Ordinary).await;
        store.activate(UserId(2), Role::Ordinary).await;

        store.fail_on("record_copy");
        assert!(matches!(
            relay.handle_inbound(&inbound(1, 10, "first")).await,
            Err(Error::Store(_))
        ));
        store.heal();

        tokio::time::advance(Duration::from_secs(2)).await;
        let outcome = relay
            .handle_inbound(&inbound(1, 11, "something else"))
            .await
            .unwrap();
        assert!(matches!(outcome, InboundOutcome::Delivered(r) if r.delivered == 2));
    }

    #[tokio::test]
    async fn updates_from_other_chats_do_not_touch_relayed_copies() {
        let (store, delivery, relay) = relay();
        store.activate(UserId(7), Role::Ordinary).await;
        store.activate(UserId(8), Role::Ordinary).await;
        relay.handle_inbound(&inbound(7, 42, "hello")).await.unwrap();

        // Same message id, but in a group the bot also sits in.
        let group = MessageRef {
            chat_id: ChatId(-1001),
            message_id: MessageId(42),
        };
        let edit = Content::Text {
            text: "group text".to_string(),
        };
        assert_eq!(relay.propagate_edit(UserId(7), group, &edit).await.unwrap(), 0);
        assert_eq!(
            relay
                .propagate_reaction(UserId(7), group, &[Reaction::Emoji("👍".to_string())])
                .await
                .unwrap(),
            0
        );
        assert!(delivery.edits().is_empty());
        assert!(delivery.reactions().is_empty());

        let own = UserId(7).message(MessageId(42));
        assert_eq!(relay.propagate_edit(UserId(7), own, &edit).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_messages_are_admitted_in_turn() {
        let (store, _delivery, relay) = relay();
        store.activate(UserId(1), Role::Ordinary).await;

        let first = inbound(1, 10, "first message");
        let second = inbound(1, 11, "something else entirely");
        let (a, b) = tokio::join!(relay.handle_inbound(&first), relay.handle_inbound(&second));

        let outcomes = [a.unwrap(), b.unwrap()];
        let delivered = outcomes
            .iter()
            .filter(|o| matches!(o, InboundOutcome::Delivered(_)))
            .count();
        assert_eq!(delivered, 1);
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, InboundOutcome::Rejected(Rejection::Cooldown { .. }))));
    }

    #[tokio::test]
    async fn delete_mine_keeps_and_relabels_echo() {
        let (store, delivery, relay) = relay();
        store.activate(UserId(1), Role::Ordinary).await;
        store.activate(UserId(2), Role::Ordinary).await;

        let InboundOutcome::Delivered(report) =
            relay.handle_inbound(&inbound(1, 10, "oops")).await.unwrap()
        else {
            panic!("message was not delivered");
        };
        let echo = store.lookup(report.logical, UserId(1)).await.unwrap().unwrap();

        assert!(relay.delete_mine(UserId(2), report.logical).await.is_err());
        let tally = relay.delete_mine(UserId(1), report.logical).await.unwrap();
        assert_eq!(tally, Tally { succeeded: 1, failed: 0 });

        let (at, kb) = delivery.keyboards().pop().unwrap();
        assert_eq!(at, UserId(1).message(echo));
        assert_eq!(
            kb.buttons().next().map(|b| b.action.clone()),
            Some(ButtonAction::Callback(DISMISS.to_string()))
        );
        assert_eq!(store.lookup(report.logical, UserId(2)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn moderator_delete_resolves_through_copy() {
        let (store, _delivery, relay) = relay();
        store.activate(UserId(1), Role::Ordinary).await;
        store.activate(UserId(2), Role::Admin).await;

        let InboundOutcome::Delivered(report) =
            relay.handle_inbound(&inbound(1, 10, "spam")).await.unwrap()
        else {
            panic!("message was not delivered");
        };
        let admin_copy = store.lookup(report.logical, UserId(2)).await.unwrap().unwrap();

        let tally = relay
            .moderator_delete(UserId(2), admin_copy)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tally.succeeded, 2);
        assert!(store.get_logical_message(report.logical).await.unwrap().is_none());
        assert_eq!(
            relay.moderator_delete(UserId(2), MessageId(1)).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn bootstrap_seeds_creator_and_info_reports() {
        let (store, _delivery, relay) = relay();
        relay.bootstrap(UserId(7)).await.unwrap();
        let creator = store.get_participant(UserId(7)).await.unwrap().unwrap();
        assert_eq!(creator.role, Role::Creator);
        assert!(creator.is_active());

        relay.handle_inbound(&inbound(7, 10, "hello")).await.unwrap();
        let info = relay.info(UserId(7), Utc::now()).await.unwrap();
        assert_eq!(info.mine_today, 1);
        assert_eq!(info.totals.active_participants, 1);
        assert!(info.to_string().contains("less than a minute"));

        let status = relay.status(Utc::now()).await.unwrap();
        assert!(status.enabled);
        assert_eq!(status.cooldown, Duration::from_secs(1));
    }

    fn paid_photo(sender: i64, id: i32) -> InboundMessage {
        InboundMessage {
            sender: UserId(sender),
            message_id: MessageId(id),
            content: Content::Photo {
                file_id: "f".to_string(),
                caption: Some("`25 sunset".to_string()),
            },
            reply_to: None,
            sender_name: None,
        }
    }

    #[tokio::test]
    async fn purchase_is_recorded_and_owner_told() {
        let (store, delivery, relay) = relay();
        store.activate(UserId(1), Role::Ordinary).await;
        store.activate(UserId(2), Role::Ordinary).await;
        relay.handle_inbound(&paid_photo(1, 10)).await.unwrap();
        let payload = delivery.paid_offers()[0].1.payload.clone();

        let sale = relay
            .record_purchase(UserId(2), &payload, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sale.logical, LogicalId::new(UserId(1), MessageId(10)));
        assert_eq!(sale.stars, 25);
        assert_eq!(store.sales_for(UserId(1)).await.unwrap(), vec![sale]);

        let (to, text) = delivery.notices().pop().unwrap();
        assert_eq!(to, UserId(1));
        assert!(text.contains("Stars received: 25"));

        let card = relay.profile(UserId(1)).await.unwrap();
        assert_eq!((card.sales, card.stars_earned), (1, 25));
        assert!(card.to_string().contains("Paid media sold: 1 (⭐ 25)"));
    }

    #[tokio::test]
    async fn malformed_purchase_payload_is_dropped() {
        let (store, delivery, relay) = relay();
        store.activate(UserId(1), Role::Ordinary).await;

        for payload in ["", "1", "1_2_3", "x_10"] {
            assert_eq!(
                relay.record_purchase(UserId(2), payload, Utc::now()).await.unwrap(),
                None
            );
        }
        assert!(store.sales_for(UserId(1)).await.unwrap().is_empty());
        assert!(delivery.notices().is_empty());
    }

    #[tokio::test]
    async fn top_lists_active_participants_by_volume() {
        let (store, _delivery, relay) = relay();
        assert_eq!(relay.top(5).await.unwrap().to_string(), "Top is empty");

        store.activate(UserId(1), Role::Ordinary).await;
        store.activate(UserId(2), Role::Ordinary).await;
        store
            .update_participant(
                UserId(2),
                &ParticipantPatch {
                    custom_tag: Some(Some("owl".to_string())),
                    custom_tag_enabled: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        for _ in 0..3 {
            store.record_activity(UserId(2), "", Utc::now()).await.unwrap();
        }
        store.record_activity(UserId(1), "", Utc::now()).await.unwrap();

        let top = relay.top(5).await.unwrap();
        assert_eq!(
            top.rows,
            vec![("owl".to_string(), 3), ("Anonymous".to_string(), 1)]
        );
        assert!(top.to_string().ends_with("1. owl: 3 msgs\n2. Anonymous: 1 msgs"));
    }

    #[tokio::test]
    async fn profile_shows_settings_and_needs_registration() {
        let (store, _delivery, relay) = relay();
        assert!(matches!(relay.profile(UserId(1)).await, Err(Error::Invalid(_))));

        store.activate(UserId(1), Role::Admin).await;
        store
            .update_participant(
                UserId(1),
                &ParticipantPatch {
                    autodelete_minutes: Some(30),
                    warnings: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let card = relay.profile(UserId(1)).await.unwrap().to_string();
        assert!(card.contains("Role: Administrator"));
        assert!(card.contains("Custom tag: ❌"));
        assert!(card.contains("Auto-delete: 30 min"));
        assert!(card.contains("Warnings: 1/3"));
        assert!(!card.contains("Paid media sold"));
    }

    #[tokio::test]
    async fn cleanup_drops_only_what_is_past_retention() {
        let (store, _delivery, relay) = relay();
        store.activate(UserId(1), Role::Ordinary).await;
        store.activate(UserId(2), Role::Ordinary).await;
        let InboundOutcome::Delivered(report) =
            relay.handle_inbound(&inbound(1, 10, "hello")).await.unwrap()
        else {
            panic!("message was not delivered");
        };

        let now = Utc::now();
        let counts = relay.cleanup(UserId(1), now).await.unwrap();
        assert_eq!(counts, PurgeCounts::default());
        assert!(store.get_logical_message(report.logical).await.unwrap().is_some());

        let later = now + chrono::Duration::days(RETENTION_DAYS + 1);
        let counts = relay.cleanup(UserId(1), later).await.unwrap();
        assert_eq!(counts.messages, 1);
        assert_eq!(counts.copies, 2);
        assert_eq!(counts.map_entries, 2);
        assert_eq!(counts.stat_days, 1);
        assert!(store.get_logical_message(report.logical).await.unwrap().is_none());
        assert_eq!(store.lookup(report.logical, UserId(2)).await.unwrap(), None);
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(chrono::Duration::seconds(30)), "less than a minute");
        assert_eq!(
            format_uptime(chrono::Duration::minutes(8 * 24 * 60 + 3 * 60 + 5)),
            "1w 1d 3h 5min"
        );
    }
}
