//! Fan-out engine: one admitted message in, one delivered copy per recipient out.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use futures::future::join_all;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::{
    domain::{
        ChatId, DeliveredCopy, LogicalId, LogicalMessage, MessageId, MessageRef, PaidTerms,
        Participant, UserId,
    },
    messaging::{
        port::DeliveryPort,
        types::{Content, ContentKind, InboundMessage, PaidOffer, SendOptions},
    },
    presentation::{decorate, RenderContext},
    store::Store,
    Error, Result,
};

/// Prepended to a copy when it replies to the recipient's own earlier message.
pub const REPLY_TAG: &str = "#REPLY\n";

static PAID_CAPTION: OnceLock<Option<Regex>> = OnceLock::new();

/// Parse "`<stars> <description>" from a photo caption.
pub fn parse_paid(content: &Content) -> Option<PaidTerms> {
    let Content::Photo {
        caption: Some(caption),
        ..
    } = content
    else {
        return None;
    };
    let re = PAID_CAPTION
        .get_or_init(|| Regex::new(r"^`(\d+)\s+(.+)$").ok())
        .as_ref()?;
    let caps = re.captures(caption)?;
    Some(PaidTerms {
        stars: caps.get(1)?.as_str().parse().ok()?,
        description: caps.get(2)?.as_str().to_string(),
    })
}

/// Payload attached to a paid copy and echoed back on purchase.
pub fn purchase_payload(logical: LogicalId) -> String {
    format!("{}_{}", logical.sender.0, logical.message_id.0)
}

/// Inverse of [`purchase_payload`].
pub fn parse_purchase_payload(payload: &str) -> Option<LogicalId> {
    let (sender, message) = payload.split_once('_')?;
    Some(LogicalId::new(
        UserId(sender.parse().ok()?),
        MessageId(message.parse().ok()?),
    ))
}

/// Outcome counts of one distribution. Not shown to the sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryReport {
    pub logical: LogicalId,
    pub delivered: usize,
    pub failed: usize,
    pub skipped_ignored: usize,
}

/// What one recipient gets.
#[derive(Clone, Debug)]
struct Plan {
    recipient: UserId,
    reply_to: Option<MessageId>,
    reply_tag: bool,
}

pub struct FanOut {
    store: Arc<dyn Store>,
    delivery: Arc<dyn DeliveryPort>,
    poll_channel: Option<ChatId>,
}

impl FanOut {
    pub fn new(
        store: Arc<dyn Store>,
        delivery: Arc<dyn DeliveryPort>,
        poll_channel: Option<ChatId>,
    ) -> Self {
        Self {
            store,
            delivery,
            poll_channel,
        }
    }

    /// Replicate an admitted message to every eligible recipient plus the
    /// sender's own echo, then record the correspondence of each copy.
    ///
    /// Store errors abort the operation; per-recipient send failures are
    /// only counted.
    pub async fn distribute(
        &self,
        inbound: &InboundMessage,
        sender: &Participant,
    ) -> Result<DeliveryReport> {
        let logical = LogicalId::new(sender.id, inbound.message_id);
        let paid = parse_paid(&inbound.content);

        let reply_logical = match inbound.reply_to {
            Some(mid) => self.store.reverse_lookup(mid, sender.id).await?,
            None => None,
        };

        self.store
            .record_logical_message(&LogicalMessage {
                id: logical,
                kind: inbound.content.kind(),
                content: inbound.content.text().unwrap_or_default().to_string(),
                reply_to: reply_logical,
                paid: paid.clone(),
                edited_at: None,
                created_at: Utc::now(),
            })
            .await?;

        let (recipients, skipped_ignored) = self.recipients(sender.id).await?;

        let mut plans = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let reply_to = match reply_logical {
                Some(target) => self.store.lookup(target, recipient).await?,
                None => None,
            };
            let reply_tag = reply_logical
                .is_some_and(|target| target.sender == recipient && recipient != sender.id);
            plans.push(Plan {
                recipient,
                reply_to,
                reply_tag,
            });
        }

        let outcomes = if let Content::Poll(_) = &inbound.content {
            self.dispatch_poll(inbound, logical, &plans).await?
        } else if paid.is_some() && !self.delivery.capabilities().supports_paid_media {
            warn!(logical = %logical, "paid photo dropped: transport cannot gate purchases");
            plans.iter().map(|_| Ok(false)).collect()
        } else {
            let sends = plans
                .iter()
                .map(|plan| self.deliver_one(inbound, sender, logical, paid.as_ref(), plan));
            join_all(sends).await
        };

        let mut report = DeliveryReport {
            logical,
            delivered: 0,
            failed: 0,
            skipped_ignored,
        };
        for outcome in outcomes {
            match outcome? {
                true => report.delivered += 1,
                false => report.failed += 1,
            }
        }

        info!(
            logical = %logical,
            kind = %inbound.content.kind(),
            delivered = report.delivered,
            failed = report.failed,
            ignored = report.skipped_ignored,
            "fan-out complete"
        );
        Ok(report)
    }

    /// Active participants other than the sender who do not ignore them,
    /// followed by the sender. Also returns how many were skipped.
    async fn recipients(&self, sender: UserId) -> Result<(Vec<UserId>, usize)> {
        let mut out = Vec::new();
        let mut skipped = 0;
        for id in self.store.list_active_participants().await? {
            if id == sender {
                continue;
            }
            if self.store.is_ignored(id, sender).await? {
                skipped += 1;
                continue;
            }
            out.push(id);
        }
        out.push(sender);
        Ok((out, skipped))
    }

    /// `Ok(true)` on delivery, `Ok(false)` on a swallowed send failure.
    async fn deliver_one(
        &self,
        inbound: &InboundMessage,
        sender: &Participant,
        logical: LogicalId,
        paid: Option<&PaidTerms>,
        plan: &Plan,
    ) -> Result<bool> {
        let ctx = RenderContext {
            is_self: plan.recipient == sender.id,
            paid: paid.is_some(),
            logical,
        };
        let opts = SendOptions {
            reply_to: plan.reply_to,
            protect_content: sender.prefs.protect_content,
            keyboard: decorate(sender, &ctx),
        };

        let sent = match (paid, &inbound.content) {
            (Some(terms), Content::Photo { file_id, .. }) => {
                let offer = PaidOffer {
                    file_id: file_id.clone(),
                    stars: terms.stars,
                    description: terms.description.clone(),
                    payload: purchase_payload(logical),
                };
                self.delivery.send_paid(plan.recipient, &offer, &opts).await
            }
            _ => {
                // the tag is dropped rather than pushing the body over the limit
                let caps = self.delivery.capabilities();
                let tagged = plan
                    .reply_tag
                    .then(|| inbound.content.with_prefix(REPLY_TAG))
                    .filter(|c| c.text().map_or(true, |t| caps.fits(c.kind(), t)));
                let content = tagged.as_ref().unwrap_or(&inbound.content);
                self.delivery.send_copy(plan.recipient, content, &opts).await
            }
        };

        let delivered = match sent {
            Ok(id) => id,
            Err(e) => {
                debug!(recipient = %plan.recipient, logical = %logical, "delivery failed: {e}");
                return Ok(false);
            }
        };

        let content = match paid {
            Some(terms) => terms.description.clone(),
            None => inbound.content.text().unwrap_or_default().to_string(),
        };
        self.remember(DeliveredCopy {
            recipient: plan.recipient,
            delivered,
            logical,
            kind: inbound.content.kind(),
            content,
            reply_to: plan.reply_to,
            created_at: Utc::now(),
        })
        .await?;
        Ok(true)
    }

    /// Polls are posted once to the shared channel and forwarded, so votes
    /// aggregate on a single poll.
    async fn dispatch_poll(
        &self,
        inbound: &InboundMessage,
        logical: LogicalId,
        plans: &[Plan],
    ) -> Result<Vec<Result<bool>>> {
        let Content::Poll(poll) = &inbound.content else {
            return Err(Error::Invalid("not a poll".to_string()));
        };

        let Some(channel) = self.poll_channel else {
            warn!(logical = %logical, "poll received but no poll channel is configured");
            return Ok(plans.iter().map(|_| Ok(false)).collect());
        };

        let posted: MessageRef = match self.delivery.post_poll(channel, poll).await {
            Ok(r) => r,
            Err(e) => {
                warn!(logical = %logical, "posting poll to channel failed: {e}");
                return Ok(plans.iter().map(|_| Ok(false)).collect());
            }
        };

        let forwards = plans
            .iter()
            .map(|plan| self.forward_one(plan.recipient, posted, logical, &poll.question));
        Ok(join_all(forwards).await)
    }

    async fn forward_one(
        &self,
        recipient: UserId,
        posted: MessageRef,
        logical: LogicalId,
        question: &str,
    ) -> Result<bool> {
        match self.delivery.forward(recipient, posted).await {
            Ok(delivered) => {
                self.remember(DeliveredCopy {
                    recipient,
                    delivered,
                    logical,
                    kind: ContentKind::Poll,
                    content: question.to_string(),
                    reply_to: None,
                    created_at: Utc::now(),
                })
                .await?;
                Ok(true)
            }
            Err(e) => {
                debug!(recipient = %recipient, logical = %logical, "poll forward failed: {e}");
                Ok(false)
            }
        }
    }

    async fn remember(&self, copy: DeliveredCopy) -> Result<()> {
        self.store.record_copy(&copy).await?;
        self.store
            .record(copy.logical, copy.recipient, copy.delivered)
            .await
    }
}
