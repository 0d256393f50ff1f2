//! Replays edits, reactions and deletions onto every delivered copy.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info};

use crate::{
    domain::{DeliveredCopy, LogicalId, LogicalMessage, MessageId, UserId},
    fanout::REPLY_TAG,
    messaging::{
        port::DeliveryPort,
        types::{Content, Mutation, Reaction},
    },
    store::Store,
    Result,
};

/// Appended to edited text and captions.
pub const EDITED_MARKER: &str = "\n\n✏️ (edited message)";

/// Success/failure counts of a best-effort operation over all copies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: usize,
    pub failed: usize,
}

pub struct Propagator {
    store: Arc<dyn Store>,
    delivery: Arc<dyn DeliveryPort>,
}

impl Propagator {
    pub fn new(store: Arc<dyn Store>, delivery: Arc<dyn DeliveryPort>) -> Self {
        Self { store, delivery }
    }

    /// The logical message behind `delivered` as seen in `actor`'s chat.
    pub async fn resolve_original(
        &self,
        delivered: MessageId,
        actor: UserId,
    ) -> Result<Option<LogicalId>> {
        self.store.reverse_lookup(delivered, actor).await
    }

    /// Edit made by `actor` on message `message_id` of their own chat.
    ///
    /// Unknown messages, edits by anyone but the author and edits without
    /// text are no-ops. Returns the number of copies updated.
    pub async fn propagate_edit(
        &self,
        actor: UserId,
        message_id: MessageId,
        content: &Content,
    ) -> Result<usize> {
        let Some(logical) = self.resolve_original(message_id, actor).await? else {
            return Ok(0);
        };
        if logical.sender != actor {
            return Ok(0);
        }
        self.edit_logical(logical, content).await
    }

    /// Stores the new content first, then edits each copy that supports it.
    pub async fn edit_logical(&self, logical: LogicalId, content: &Content) -> Result<usize> {
        let Some(text) = content.text().filter(|t| !t.is_empty()) else {
            return Ok(0);
        };
        let Some(original) = self.store.get_logical_message(logical).await? else {
            return Ok(0);
        };
        // the marker goes when the edited body is already at the limit
        let caps = self.delivery.capabilities();
        let marked = format!("{text}{EDITED_MARKER}");
        let full = if caps.fits(original.kind, &marked) {
            marked
        } else {
            text.to_string()
        };

        self.store
            .update_logical_content(logical, &full, Utc::now())
            .await?;

        if original.paid.is_some() {
            return Ok(0);
        }

        let copies = self.store.list_copies(logical).await?;
        let edits = copies
            .iter()
            .map(|copy| self.edit_copy(&original, copy, &full));
        let results = join_all(edits).await;

        let mut edited = 0;
        for (copy, ok) in copies.iter().zip(results) {
            if ok {
                self.store
                    .update_copy_content(copy.recipient, copy.delivered, &full)
                    .await?;
                edited += 1;
            }
        }

        info!(logical = %logical, edited, copies = copies.len(), "edit propagated");
        Ok(edited)
    }

    async fn edit_copy(&self, original: &LogicalMessage, copy: &DeliveredCopy, full: &str) -> bool {
        let tagged = format!("{REPLY_TAG}{full}");
        let body = if wants_reply_tag(original, copy.recipient)
            && self.delivery.capabilities().fits(copy.kind, &tagged)
        {
            tagged.as_str()
        } else {
            full
        };

        let res = match copy.kind.mutation() {
            Mutation::Text => self.delivery.edit_text(copy.message_ref(), body).await,
            Mutation::Caption => self.delivery.edit_caption(copy.message_ref(), body).await,
            Mutation::Immutable => return false,
        };
        match res {
            Ok(()) => true,
            Err(e) => {
                debug!(recipient = %copy.recipient, logical = %copy.logical, "edit failed: {e}");
                false
            }
        }
    }

    /// Mirror a reaction set by `actor` onto every copy. Nothing is stored.
    pub async fn propagate_reaction(
        &self,
        actor: UserId,
        message_id: MessageId,
        reaction: &[Reaction],
    ) -> Result<usize> {
        if !self.delivery.capabilities().supports_reactions {
            return Ok(0);
        }
        let Some(logical) = self.resolve_original(message_id, actor).await? else {
            return Ok(0);
        };

        let copies = self.store.list_copies(logical).await?;
        let sets = copies.iter().map(|copy| async move {
            match self.delivery.set_reaction(copy.message_ref(), reaction).await {
                Ok(()) => true,
                Err(e) => {
                    debug!(recipient = %copy.recipient, "reaction failed: {e}");
                    false
                }
            }
        });
        let applied = join_all(sets).await.into_iter().filter(|ok| *ok).count();
        debug!(logical = %logical, applied, "reaction propagated");
        Ok(applied)
    }

    /// Delete every copy of `logical` except `keep`'s, then forget them.
    pub async fn delete_everywhere(
        &self,
        logical: LogicalId,
        keep: Option<UserId>,
    ) -> Result<Tally> {
        let copies = self.store.list_copies(logical).await?;
        let deletes = copies
            .iter()
            .filter(|c| Some(c.recipient) != keep)
            .map(|copy| async move {
                match self.delivery.delete_message(copy.message_ref()).await {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(recipient = %copy.recipient, "delete failed: {e}");
                        false
                    }
                }
            });

        let mut tally = Tally::default();
        for ok in join_all(deletes).await {
            if ok {
                tally.succeeded += 1;
            } else {
                tally.failed += 1;
            }
        }

        self.store.delete_copies(logical, keep).await?;
        info!(
            logical = %logical,
            deleted = tally.succeeded,
            failed = tally.failed,
            "message deleted"
        );
        Ok(tally)
    }
}

/// A copy replying to the recipient's own earlier message carries the reply tag.
fn wants_reply_tag(original: &LogicalMessage, recipient: UserId) -> bool {
    original
        .reply_to
        .is_some_and(|target| target.sender == recipient && recipient != original.id.sender)
}
