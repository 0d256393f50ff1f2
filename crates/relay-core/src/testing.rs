//! In-memory store and a recording transport for unit tests.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    domain::{
        ChatId, DeliveredCopy, LogicalId, LogicalMessage, MessageId, MessageRef, PaidSale,
        Participant, ParticipantPatch, PurgeCounts, Role, Totals, UserId, WarningRecord,
    },
    errors::{DeliveryFailure, Error},
    messaging::{
        port::DeliveryPort,
        types::{
            Content, DeliveryCapabilities, InlineKeyboard, PaidOffer, PollContent, Reaction,
            SendOptions,
        },
    },
    store::Store,
    Result,
};

#[derive(Default)]
struct Tables {
    participants: BTreeMap<UserId, Participant>,
    ignores: HashSet<(UserId, UserId)>,
    logical: HashMap<LogicalId, LogicalMessage>,
    copies: HashMap<(UserId, MessageId), DeliveredCopy>,
    map: HashMap<(LogicalId, UserId), MessageId>,
    settings: HashMap<String, String>,
    daily: HashMap<NaiveDate, u64>,
    user_daily: HashMap<(UserId, NaiveDate), u64>,
    warnings: Vec<WarningRecord>,
    sales: Vec<PaidSale>,
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    tables: Mutex<Tables>,
    // names of `Store` methods that currently fail
    failing: Mutex<HashSet<&'static str>>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Create a captcha-passed participant with `role`.
    pub(crate) async fn activate(&self, id: UserId, role: Role) -> Participant {
        self.create_participant(id, role).await.unwrap();
        self.update_participant(
            id,
            &ParticipantPatch {
                captcha_passed: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        self.get_participant(id).await.unwrap().unwrap()
    }

    pub(crate) fn warnings(&self) -> Vec<WarningRecord> {
        self.tables.lock().unwrap().warnings.clone()
    }

    /// Make the named `Store` method return `Error::Store` until `heal`.
    pub(crate) fn fail_on(&self, method: &'static str) {
        self.failing.lock().unwrap().insert(method);
    }

    pub(crate) fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn check(&self, method: &'static str) -> Result<()> {
        if self.failing.lock().unwrap().contains(method) {
            return Err(Error::Store(format!("{method}: disk I/O error")));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_participant(&self, id: UserId) -> Result<Option<Participant>> {
        Ok(self.tables.lock().unwrap().participants.get(&id).cloned())
    }

    async fn create_participant(&self, id: UserId, role: Role) -> Result<Participant> {
        let mut t = self.tables.lock().unwrap();
        let p = t.participants.entry(id).or_insert_with(|| {
            let mut p = Participant::new(id, Utc::now());
            p.role = role;
            p
        });
        Ok(p.clone())
    }

    async fn update_participant(&self, id: UserId, patch: &ParticipantPatch) -> Result<()> {
        if let Some(p) = self.tables.lock().unwrap().participants.get_mut(&id) {
            p.apply(patch);
        }
        Ok(())
    }

    async fn delete_participant(&self, id: UserId) -> Result<()> {
        let mut t = self.tables.lock().unwrap();
        t.participants.remove(&id);
        t.ignores.retain(|(by, target)| *by != id && *target != id);
        t.copies.retain(|(recipient, _), _| *recipient != id);
        t.map.retain(|(_, recipient), _| *recipient != id);
        t.user_daily.retain(|(user, _), _| *user != id);
        Ok(())
    }

    async fn list_active_participants(&self) -> Result<Vec<UserId>> {
        let t = self.tables.lock().unwrap();
        Ok(t.participants
            .values()
            .filter(|p| p.is_active())
            .map(|p| p.id)
            .collect())
    }

    async fn list_staff(&self) -> Result<Vec<Participant>> {
        let t = self.tables.lock().unwrap();
        Ok(t.participants
            .values()
            .filter(|p| p.is_active() && p.is_staff())
            .cloned()
            .collect())
    }

    async fn top_participants(&self, limit: usize) -> Result<Vec<Participant>> {
        let t = self.tables.lock().unwrap();
        let mut active: Vec<_> = t
            .participants
            .values()
            .filter(|p| p.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| b.message_count.cmp(&a.message_count).then(a.id.cmp(&b.id)));
        active.truncate(limit);
        Ok(active)
    }

    async fn is_ignored(&self, by: UserId, target: UserId) -> Result<bool> {
        Ok(self.tables.lock().unwrap().ignores.contains(&(by, target)))
    }

    async fn add_ignore(&self, by: UserId, target: UserId) -> Result<()> {
        self.tables.lock().unwrap().ignores.insert((by, target));
        Ok(())
    }

    async fn remove_ignore(&self, by: UserId, target: UserId) -> Result<bool> {
        Ok(self.tables.lock().unwrap().ignores.remove(&(by, target)))
    }

    async fn clear_ignores(&self, by: UserId) -> Result<usize> {
        let mut t = self.tables.lock().unwrap();
        let before = t.ignores.len();
        t.ignores.retain(|(b, _)| *b != by);
        Ok(before - t.ignores.len())
    }

    async fn record_logical_message(&self, msg: &LogicalMessage) -> Result<()> {
        self.check("record_logical_message")?;
        self.tables
            .lock()
            .unwrap()
            .logical
            .insert(msg.id, msg.clone());
        Ok(())
    }

    async fn get_logical_message(&self, id: LogicalId) -> Result<Option<LogicalMessage>> {
        Ok(self.tables.lock().unwrap().logical.get(&id).cloned())
    }

    async fn record_copy(&self, copy: &DeliveredCopy) -> Result<()> {
        self.check("record_copy")?;
        self.tables
            .lock()
            .unwrap()
            .copies
            .insert((copy.recipient, copy.delivered), copy.clone());
        Ok(())
    }

    async fn record(
        &self,
        logical: LogicalId,
        recipient: UserId,
        delivered: MessageId,
    ) -> Result<()> {
        self.check("record")?;
        self.tables
            .lock()
            .unwrap()
            .map
            .insert((logical, recipient), delivered);
        Ok(())
    }

    async fn lookup(&self, logical: LogicalId, recipient: UserId) -> Result<Option<MessageId>> {
        self.check("lookup")?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .map
            .get(&(logical, recipient))
            .copied())
    }

    async fn reverse_lookup(
        &self,
        delivered: MessageId,
        recipient: UserId,
    ) -> Result<Option<LogicalId>> {
        self.check("reverse_lookup")?;
        let t = self.tables.lock().unwrap();
        let mapped = t
            .map
            .iter()
            .find(|((_, r), d)| *r == recipient && **d == delivered)
            .map(|((logical, _), _)| *logical);
        if mapped.is_some() {
            return Ok(mapped);
        }
        let own = LogicalId::new(recipient, delivered);
        Ok(t.logical.contains_key(&own).then_some(own))
    }

    async fn list_copies(&self, logical: LogicalId) -> Result<Vec<DeliveredCopy>> {
        let t = self.tables.lock().unwrap();
        let mut out: Vec<_> = t
            .copies
            .values()
            .filter(|c| c.logical == logical)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.recipient);
        Ok(out)
    }

    async fn update_copy_content(
        &self,
        recipient: UserId,
        delivered: MessageId,
        content: &str,
    ) -> Result<()> {
        if let Some(c) = self
            .tables
            .lock()
            .unwrap()
            .copies
            .get_mut(&(recipient, delivered))
        {
            c.content = content.to_string();
        }
        Ok(())
    }

    async fn update_logical_content(
        &self,
        logical: LogicalId,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(m) = self.tables.lock().unwrap().logical.get_mut(&logical) {
            m.content = content.to_string();
            m.edited_at = Some(edited_at);
        }
        Ok(())
    }

    async fn delete_copies(&self, logical: LogicalId, except: Option<UserId>) -> Result<usize> {
        let mut t = self.tables.lock().unwrap();
        let keep = |r: &UserId| Some(*r) == except;
        let before = t.copies.len();
        t.copies
            .retain(|(r, _), c| c.logical != logical || keep(r));
        let removed = before - t.copies.len();
        t.map.retain(|(l, r), _| *l != logical || keep(r));
        if except.is_none() {
            t.logical.remove(&logical);
        }
        Ok(removed)
    }

    async fn expired_messages(&self, now: DateTime<Utc>) -> Result<Vec<LogicalId>> {
        let t = self.tables.lock().unwrap();
        let mut out: Vec<_> = t
            .logical
            .values()
            .filter(|m| {
                t.participants.get(&m.id.sender).is_some_and(|p| {
                    p.prefs.autodelete_minutes > 0
                        && m.created_at
                            + chrono::Duration::minutes(i64::from(p.prefs.autodelete_minutes))
                            <= now
                })
            })
            .map(|m| m.id)
            .collect();
        out.sort();
        Ok(out)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeCounts> {
        let mut t = self.tables.lock().unwrap();
        let day = cutoff.date_naive();
        let mut counts = PurgeCounts::default();

        let before = t.logical.len();
        t.logical.retain(|_, m| m.created_at >= cutoff);
        counts.messages = before - t.logical.len();

        let before = t.copies.len();
        t.copies.retain(|_, c| c.created_at >= cutoff);
        counts.copies = before - t.copies.len();

        // map rows carry no timestamp here; they follow their copies
        let Tables { map, copies, .. } = &mut *t;
        let before = map.len();
        map.retain(|(_, recipient), delivered| copies.contains_key(&(*recipient, *delivered)));
        counts.map_entries = before - map.len();

        let before = t.daily.len();
        t.daily.retain(|d, _| *d >= day);
        counts.stat_days = before - t.daily.len();
        t.user_daily.retain(|(_, d), _| *d >= day);
        Ok(counts)
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.tables.lock().unwrap().settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.tables
            .lock()
            .unwrap()
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn record_activity(&self, id: UserId, text: &str, at: DateTime<Utc>) -> Result<()> {
        let mut t = self.tables.lock().unwrap();
        let day = at.date_naive();
        *t.daily.entry(day).or_default() += 1;
        *t.user_daily.entry((id, day)).or_default() += 1;
        if let Some(p) = t.participants.get_mut(&id) {
            p.message_count += 1;
            if !text.is_empty() {
                p.last_message_text = Some(text.to_string());
                p.last_message_at = Some(at);
            }
        }
        Ok(())
    }

    async fn participant_daily_count(&self, id: UserId, day: NaiveDate) -> Result<u64> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .user_daily
            .get(&(id, day))
            .copied()
            .unwrap_or(0))
    }

    async fn totals(&self, day: NaiveDate) -> Result<Totals> {
        let t = self.tables.lock().unwrap();
        Ok(Totals {
            active_participants: t.participants.values().filter(|p| p.is_active()).count()
                as u64,
            logical_messages: t.logical.len() as u64,
            messages_today: t.daily.get(&day).copied().unwrap_or(0),
        })
    }

    async fn record_sale(&self, sale: &PaidSale) -> Result<()> {
        self.tables.lock().unwrap().sales.push(sale.clone());
        Ok(())
    }

    async fn sales_for(&self, owner: UserId) -> Result<Vec<PaidSale>> {
        let t = self.tables.lock().unwrap();
        Ok(t.sales
            .iter()
            .filter(|s| s.logical.sender == owner)
            .cloned()
            .collect())
    }

    async fn add_warning(&self, record: &WarningRecord) -> Result<()> {
        self.tables.lock().unwrap().warnings.push(record.clone());
        Ok(())
    }

    async fn remove_last_warning(&self, id: UserId) -> Result<bool> {
        let mut t = self.tables.lock().unwrap();
        match t.warnings.iter().rposition(|w| w.participant == id) {
            Some(pos) => {
                t.warnings.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SentKind {
    Copy,
    Paid,
    Poll,
    Forward,
}

#[derive(Clone, Debug)]
pub(crate) struct Sent {
    pub kind: SentKind,
    pub chat: ChatId,
    pub message_id: MessageId,
    pub content: Option<Content>,
    pub paid: Option<PaidOffer>,
    pub opts: SendOptions,
}

impl Sent {
    pub(crate) fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.text())
    }
}

/// Recording transport. Any call aimed at a chat in `fail_for` fails with
/// `DeliveryFailure::Blocked`.
#[derive(Default)]
pub(crate) struct FakeDelivery {
    next_id: Mutex<i32>,
    no_paid_media: Mutex<bool>,
    failing: Mutex<HashSet<i64>>,
    sent: Mutex<Vec<Sent>>,
    edits: Mutex<Vec<(MessageRef, String)>>,
    keyboards: Mutex<Vec<(MessageRef, InlineKeyboard)>>,
    reactions: Mutex<Vec<(MessageRef, Vec<Reaction>)>>,
    deletes: Mutex<Vec<MessageRef>>,
    notices: Mutex<Vec<(UserId, String)>>,
}

impl FakeDelivery {
    pub(crate) fn new() -> Self {
        Self {
            next_id: Mutex::new(1000),
            ..Default::default()
        }
    }

    pub(crate) fn without_paid_media(&self) {
        *self.no_paid_media.lock().unwrap() = true;
    }

    pub(crate) fn fail_for(&self, user: UserId) {
        self.failing.lock().unwrap().insert(user.0);
    }

    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Copies, paid offers and forwards that landed in `user`'s chat.
    pub(crate) fn sent_to(&self, user: UserId) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.chat == user.chat() && s.kind != SentKind::Poll)
            .collect()
    }

    pub(crate) fn paid_offers(&self) -> Vec<(UserId, PaidOffer)> {
        self.sent()
            .into_iter()
            .filter_map(|s| s.paid.map(|p| (UserId(s.chat.0), p)))
            .collect()
    }

    pub(crate) fn edits(&self) -> Vec<(MessageRef, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub(crate) fn keyboards(&self) -> Vec<(MessageRef, InlineKeyboard)> {
        self.keyboards.lock().unwrap().clone()
    }

    pub(crate) fn reactions(&self) -> Vec<(MessageRef, Vec<Reaction>)> {
        self.reactions.lock().unwrap().clone()
    }

    pub(crate) fn deletes(&self) -> Vec<MessageRef> {
        self.deletes.lock().unwrap().clone()
    }

    pub(crate) fn notices(&self) -> Vec<(UserId, String)> {
        self.notices.lock().unwrap().clone()
    }

    fn check(&self, chat: i64) -> Result<()> {
        if self.failing.lock().unwrap().contains(&chat) {
            return Err(Error::delivery(DeliveryFailure::Blocked, "bot was blocked"));
        }
        Ok(())
    }

    fn alloc(&self) -> MessageId {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageId(*guard)
    }

    fn push(
        &self,
        kind: SentKind,
        chat: ChatId,
        content: Option<Content>,
        paid: Option<PaidOffer>,
        opts: &SendOptions,
    ) -> Result<MessageId> {
        self.check(chat.0)?;
        let message_id = self.alloc();
        self.sent.lock().unwrap().push(Sent {
            kind,
            chat,
            message_id,
            content,
            paid,
            opts: opts.clone(),
        });
        Ok(message_id)
    }
}

#[async_trait]
impl DeliveryPort for FakeDelivery {
    fn capabilities(&self) -> DeliveryCapabilities {
        DeliveryCapabilities {
            supports_reactions: true,
            supports_paid_media: !*self.no_paid_media.lock().unwrap(),
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
        self.push(SentKind::Copy, to.chat(), Some(content.clone()), None, opts)
    }

    async fn send_paid(
        &self,
        to: UserId,
        offer: &PaidOffer,
        opts: &SendOptions,
    ) -> Result<MessageId> {
        self.push(SentKind::Paid, to.chat(), None, Some(offer.clone()), opts)
    }

    async fn post_poll(&self, chat: ChatId, poll: &PollContent) -> Result<MessageRef> {
        let message_id = self.push(
            SentKind::Poll,
            chat,
            Some(Content::Poll(poll.clone())),
            None,
            &SendOptions::default(),
        )?;
        Ok(MessageRef {
            chat_id: chat,
            message_id,
        })
    }

    async fn forward(&self, to: UserId, _from: MessageRef) -> Result<MessageId> {
        self.push(
            SentKind::Forward,
            to.chat(),
            None,
            None,
            &SendOptions::default(),
        )
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.check(msg.chat_id.0)?;
        self.edits.lock().unwrap().push((msg, text.to_string()));
        Ok(())
    }

    async fn edit_caption(&self, msg: MessageRef, caption: &str) -> Result<()> {
        self.check(msg.chat_id.0)?;
        self.edits.lock().unwrap().push((msg, caption.to_string()));
        Ok(())
    }

    async fn replace_keyboard(&self, msg: MessageRef, keyboard: &InlineKeyboard) -> Result<()> {
        self.check(msg.chat_id.0)?;
        self.keyboards
            .lock()
            .unwrap()
            .push((msg, keyboard.clone()));
        Ok(())
    }

    async fn set_reaction(&self, msg: MessageRef, reaction: &[Reaction]) -> Result<()> {
        self.check(msg.chat_id.0)?;
        self.reactions
            .lock()
            .unwrap()
            .push((msg, reaction.to_vec()));
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.check(msg.chat_id.0)?;
        self.deletes.lock().unwrap().push(msg);
        Ok(())
    }

    async fn send_notice(
        &self,
        to: UserId,
        text: &str,
        _keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef> {
        self.check(to.0)?;
        self.notices.lock().unwrap().push((to, text.to_string()));
        Ok(to.message(self.alloc()))
    }
}
