use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};

use relay_core::domain::{Totals, UserId};

use crate::convert::ts;
use crate::database::Database;
use crate::error::Result;

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

impl Database {
    /// Bump the global and per-participant daily counters and the lifetime
    /// count; non-empty text becomes the participant's last message.
    pub fn record_activity(&mut self, id: UserId, text: &str, at: DateTime<Utc>) -> Result<()> {
        let day = day_key(at.date_naive());
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO stats (date, message_count) VALUES (?1, 1)
             ON CONFLICT (date) DO UPDATE SET message_count = message_count + 1",
            params![day],
        )?;
        tx.execute(
            "INSERT INTO user_stats (user_id, date, message_count) VALUES (?1, ?2, 1)
             ON CONFLICT (user_id, date) DO UPDATE SET message_count = message_count + 1",
            params![id.0, day],
        )?;
        if text.is_empty() {
            tx.execute(
                "UPDATE participants SET message_count = message_count + 1 WHERE user_id = ?1",
                params![id.0],
            )?;
        } else {
            tx.execute(
                "UPDATE participants
                 SET message_count = message_count + 1, last_message_text = ?1, last_message_at = ?2
                 WHERE user_id = ?3",
                params![text, ts(&at), id.0],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn daily_message_count(&self, day: NaiveDate) -> Result<u64> {
        let count: Option<i64> = self
            .conn()
            .query_row(
                "SELECT message_count FROM stats WHERE date = ?1",
                params![day_key(day)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }

    pub fn participant_daily_count(&self, id: UserId, day: NaiveDate) -> Result<u64> {
        let count: Option<i64> = self
            .conn()
            .query_row(
                "SELECT message_count FROM user_stats WHERE user_id = ?1 AND date = ?2",
                params![id.0, day_key(day)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }

    pub fn totals(&self, day: NaiveDate) -> Result<Totals> {
        let active: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM participants WHERE captcha_passed = 1 AND banned = 0",
            [],
            |row| row.get(0),
        )?;
        let logical: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM logical_messages", [], |row| row.get(0))?;

        Ok(Totals {
            active_participants: active.max(0) as u64,
            logical_messages: logical.max(0) as u64,
            messages_today: self.daily_message_count(day)?,
        })
    }
}
