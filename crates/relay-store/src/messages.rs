//! Logical messages, delivered copies and the correspondence map between them.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};

use relay_core::domain::{
    DeliveredCopy, LogicalId, LogicalMessage, MessageId, PaidTerms, PurgeCounts, UserId,
};
use relay_core::messaging::types::ContentKind;

use crate::convert::{conversion_err, parse_opt_ts, parse_ts, ts};
use crate::database::Database;
use crate::error::Result;

impl Database {
    pub fn record_logical_message(&self, msg: &LogicalMessage) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO logical_messages
                (sender_id, message_id, kind, content, reply_sender_id, reply_message_id,
                 paid_stars, paid_description, edited_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                msg.id.sender.0,
                msg.id.message_id.0,
                msg.kind.as_str(),
                msg.content,
                msg.reply_to.map(|r| r.sender.0),
                msg.reply_to.map(|r| r.message_id.0),
                msg.paid.as_ref().map(|p| p.stars),
                msg.paid.as_ref().map(|p| p.description.as_str()),
                msg.edited_at.as_ref().map(ts),
                ts(&msg.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_logical_message(&self, id: LogicalId) -> Result<Option<LogicalMessage>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT sender_id, message_id, kind, content, reply_sender_id, reply_message_id,
                        paid_stars, paid_description, edited_at, created_at
                 FROM logical_messages WHERE sender_id = ?1 AND message_id = ?2",
                params![id.sender.0, id.message_id.0],
                row_to_logical,
            )
            .optional()?)
    }

    pub fn update_logical_content(
        &self,
        id: LogicalId,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE logical_messages SET content = ?1, edited_at = ?2
             WHERE sender_id = ?3 AND message_id = ?4",
            params![content, ts(&edited_at), id.sender.0, id.message_id.0],
        )?;
        Ok(())
    }

    pub fn record_copy(&self, copy: &DeliveredCopy) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO copies
                (recipient_id, delivered_id, sender_id, message_id, kind, content,
                 reply_to_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                copy.recipient.0,
                copy.delivered.0,
                copy.logical.sender.0,
                copy.logical.message_id.0,
                copy.kind.as_str(),
                copy.content,
                copy.reply_to.map(|m| m.0),
                ts(&copy.created_at),
            ],
        )?;
        Ok(())
    }

    /// Idempotent: the last write for (logical, recipient) wins.
    pub fn record_mapping(
        &self,
        logical: LogicalId,
        recipient: UserId,
        delivered: MessageId,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO message_map (sender_id, message_id, recipient_id, delivered_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (sender_id, message_id, recipient_id)
             DO UPDATE SET delivered_id = excluded.delivered_id",
            params![
                logical.sender.0,
                logical.message_id.0,
                recipient.0,
                delivered.0,
                ts(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn lookup(&self, logical: LogicalId, recipient: UserId) -> Result<Option<MessageId>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT delivered_id FROM message_map
                 WHERE sender_id = ?1 AND message_id = ?2 AND recipient_id = ?3",
                params![logical.sender.0, logical.message_id.0, recipient.0],
                |row| row.get(0).map(MessageId),
            )
            .optional()?)
    }

    /// Copy in `recipient`'s chat first, then `recipient`'s own original.
    pub fn reverse_lookup(
        &self,
        delivered: MessageId,
        recipient: UserId,
    ) -> Result<Option<LogicalId>> {
        let mapped = self
            .conn()
            .query_row(
                "SELECT sender_id, message_id FROM message_map
                 WHERE recipient_id = ?1 AND delivered_id = ?2",
                params![recipient.0, delivered.0],
                |row| Ok(LogicalId::new(UserId(row.get(0)?), MessageId(row.get(1)?))),
            )
            .optional()?;
        if mapped.is_some() {
            return Ok(mapped);
        }

        let own = LogicalId::new(recipient, delivered);
        let exists = self
            .conn()
            .query_row(
                "SELECT 1 FROM logical_messages WHERE sender_id = ?1 AND message_id = ?2",
                params![recipient.0, delivered.0],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.map(|()| own))
    }

    pub fn list_copies(&self, logical: LogicalId) -> Result<Vec<DeliveredCopy>> {
        let mut stmt = self.conn().prepare(
            "SELECT recipient_id, delivered_id, sender_id, message_id, kind, content,
                    reply_to_id, created_at
             FROM copies WHERE sender_id = ?1 AND message_id = ?2
             ORDER BY recipient_id",
        )?;
        let rows = stmt.query_map(
            params![logical.sender.0, logical.message_id.0],
            row_to_copy,
        )?;

        let mut copies = Vec::new();
        for row in rows {
            copies.push(row?);
        }
        Ok(copies)
    }

    pub fn update_copy_content(
        &self,
        recipient: UserId,
        delivered: MessageId,
        content: &str,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE copies SET content = ?1 WHERE recipient_id = ?2 AND delivered_id = ?3",
            params![content, recipient.0, delivered.0],
        )?;
        Ok(())
    }

    /// Drop copies and map entries of `logical` except `except`'s; with no
    /// exception the logical row goes too. Returns the copies removed.
    pub fn delete_copies(&mut self, logical: LogicalId, except: Option<UserId>) -> Result<usize> {
        let keep = except.map(|u| u.0);
        let tx = self.conn_mut().transaction()?;
        let removed = tx.execute(
            "DELETE FROM copies
             WHERE sender_id = ?1 AND message_id = ?2
               AND (?3 IS NULL OR recipient_id != ?3)",
            params![logical.sender.0, logical.message_id.0, keep],
        )?;
        tx.execute(
            "DELETE FROM message_map
             WHERE sender_id = ?1 AND message_id = ?2
               AND (?3 IS NULL OR recipient_id != ?3)",
            params![logical.sender.0, logical.message_id.0, keep],
        )?;
        if except.is_none() {
            tx.execute(
                "DELETE FROM logical_messages WHERE sender_id = ?1 AND message_id = ?2",
                params![logical.sender.0, logical.message_id.0],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Messages whose sender's auto-delete interval has elapsed at `now`.
    pub fn expired_messages(&self, now: DateTime<Utc>) -> Result<Vec<LogicalId>> {
        let mut stmt = self.conn().prepare(
            "SELECT l.sender_id, l.message_id, l.created_at, p.autodelete_minutes
             FROM logical_messages l
             JOIN participants p ON p.user_id = l.sender_id
             WHERE p.autodelete_minutes > 0
             ORDER BY l.sender_id, l.message_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let raw: String = row.get(2)?;
            Ok((
                LogicalId::new(UserId(row.get(0)?), MessageId(row.get(1)?)),
                parse_ts(2, &raw)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut expired = Vec::new();
        for row in rows {
            let (id, created_at, minutes) = row?;
            if created_at + Duration::minutes(minutes) <= now {
                expired.push(id);
            }
        }
        Ok(expired)
    }

    /// Retention purge. RFC-3339 UTC text sorts chronologically, so the
    /// cutoff is compared as text.
    pub fn purge_before(&mut self, cutoff: DateTime<Utc>) -> Result<PurgeCounts> {
        let at = ts(&cutoff);
        let day = cutoff.date_naive().format("%Y-%m-%d").to_string();
        let tx = self.conn_mut().transaction()?;
        let messages = tx.execute(
            "DELETE FROM logical_messages WHERE created_at < ?1",
            params![at],
        )?;
        let copies = tx.execute("DELETE FROM copies WHERE created_at < ?1", params![at])?;
        let map_entries = tx.execute(
            "DELETE FROM message_map WHERE created_at < ?1",
            params![at],
        )?;
        let stat_days = tx.execute("DELETE FROM stats WHERE date < ?1", params![day])?;
        tx.execute("DELETE FROM user_stats WHERE date < ?1", params![day])?;
        tx.commit()?;
        Ok(PurgeCounts {
            messages,
            copies,
            map_entries,
            stat_days,
        })
    }
}

fn row_to_logical(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogicalMessage> {
    let kind_str: String = row.get(2)?;
    let kind = kind_str
        .parse::<ContentKind>()
        .map_err(|e| conversion_err(2, e))?;
    let reply_sender: Option<i64> = row.get(4)?;
    let reply_message: Option<i32> = row.get(5)?;
    let paid_stars: Option<u32> = row.get(6)?;
    let paid_description: Option<String> = row.get(7)?;
    let created_raw: String = row.get(9)?;

    Ok(LogicalMessage {
        id: LogicalId::new(UserId(row.get(0)?), MessageId(row.get(1)?)),
        kind,
        content: row.get(3)?,
        reply_to: reply_sender
            .zip(reply_message)
            .map(|(s, m)| LogicalId::new(UserId(s), MessageId(m))),
        paid: paid_stars.map(|stars| PaidTerms {
            stars,
            description: paid_description.unwrap_or_default(),
        }),
        edited_at: parse_opt_ts(8, row.get(8)?)?,
        created_at: parse_ts(9, &created_raw)?,
    })
}

fn row_to_copy(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeliveredCopy> {
    let kind_str: String = row.get(4)?;
    let kind = kind_str
        .parse::<ContentKind>()
        .map_err(|e| conversion_err(4, e))?;
    let created_raw: String = row.get(7)?;

    Ok(DeliveredCopy {
        recipient: UserId(row.get(0)?),
        delivered: MessageId(row.get(1)?),
        logical: LogicalId::new(UserId(row.get(2)?), MessageId(row.get(3)?)),
        kind,
        content: row.get(5)?,
        reply_to: row.get::<_, Option<i32>>(6)?.map(MessageId),
        created_at: parse_ts(7, &created_raw)?,
    })
}
