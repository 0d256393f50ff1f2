use chrono::Utc;
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension};

use relay_core::domain::{Participant, ParticipantPatch, Preferences, Role, UserId};

use crate::convert::{conversion_err, parse_opt_ts, parse_ts, ts};
use crate::database::Database;
use crate::error::Result;

const COLUMNS: &str = "user_id, role, display_name, banned, muted_until, warnings,
    tag_enabled, tag_text, custom_tag, custom_tag_enabled, admin_tag_enabled,
    creator_tag_enabled, protect_content, autodelete_minutes, message_count,
    last_message_text, last_message_at, captcha_passed, created_at";

impl Database {
    pub fn get_participant(&self, id: UserId) -> Result<Option<Participant>> {
        let sql = format!("SELECT {COLUMNS} FROM participants WHERE user_id = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![id.0], row_to_participant)
            .optional()?)
    }

    /// Insert if missing, then return the stored row.
    pub fn create_participant(&self, id: UserId, role: Role) -> Result<Participant> {
        let now = Utc::now();
        self.conn().execute(
            "INSERT OR IGNORE INTO participants (user_id, role, created_at) VALUES (?1, ?2, ?3)",
            params![id.0, role.as_str(), ts(&now)],
        )?;
        let sql = format!("SELECT {COLUMNS} FROM participants WHERE user_id = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![id.0], row_to_participant)?)
    }

    pub fn update_participant(&self, id: UserId, patch: &ParticipantPatch) -> Result<()> {
        let sets = patch_columns(patch);
        if sets.is_empty() {
            return Ok(());
        }

        let assignments = sets
            .iter()
            .enumerate()
            .map(|(i, (col, _))| format!("{col} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE participants SET {assignments} WHERE user_id = ?{}",
            sets.len() + 1
        );

        let values = sets
            .into_iter()
            .map(|(_, v)| v)
            .chain(std::iter::once(Value::Integer(id.0)));
        self.conn().execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    /// Remove a participant with their copies, map entries, ignores and
    /// daily stats in one transaction.
    pub fn delete_participant(&mut self, id: UserId) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        tx.execute("DELETE FROM participants WHERE user_id = ?1", params![id.0])?;
        tx.execute(
            "DELETE FROM ignores WHERE user_id = ?1 OR ignored_id = ?1",
            params![id.0],
        )?;
        tx.execute("DELETE FROM copies WHERE recipient_id = ?1", params![id.0])?;
        tx.execute(
            "DELETE FROM message_map WHERE recipient_id = ?1",
            params![id.0],
        )?;
        tx.execute("DELETE FROM user_stats WHERE user_id = ?1", params![id.0])?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_active_participants(&self) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM participants
             WHERE captcha_passed = 1 AND banned = 0
             ORDER BY user_id",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(UserId(row?));
        }
        Ok(ids)
    }

    pub fn list_staff(&self) -> Result<Vec<Participant>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM participants
             WHERE role != 'ordinary' AND captcha_passed = 1 AND banned = 0
             ORDER BY user_id"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], row_to_participant)?;

        let mut staff = Vec::new();
        for row in rows {
            staff.push(row?);
        }
        Ok(staff)
    }

    pub fn top_participants(&self, limit: usize) -> Result<Vec<Participant>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM participants
             WHERE captcha_passed = 1 AND banned = 0
             ORDER BY message_count DESC, user_id
             LIMIT ?1"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], row_to_participant)?;

        let mut top = Vec::new();
        for row in rows {
            top.push(row?);
        }
        Ok(top)
    }
}

fn flag(v: bool) -> Value {
    Value::Integer(i64::from(v))
}

fn text(v: &Option<String>) -> Value {
    v.clone().map(Value::Text).unwrap_or(Value::Null)
}

fn patch_columns(p: &ParticipantPatch) -> Vec<(&'static str, Value)> {
    let mut sets = Vec::new();
    if let Some(v) = p.role {
        sets.push(("role", Value::Text(v.as_str().to_string())));
    }
    if let Some(v) = &p.display_name {
        sets.push(("display_name", text(v)));
    }
    if let Some(v) = p.banned {
        sets.push(("banned", flag(v)));
    }
    if let Some(v) = p.muted_until {
        sets.push((
            "muted_until",
            v.map(|t| Value::Text(ts(&t))).unwrap_or(Value::Null),
        ));
    }
    if let Some(v) = p.warnings {
        sets.push(("warnings", Value::Integer(i64::from(v))));
    }
    if let Some(v) = p.tag_enabled {
        sets.push(("tag_enabled", flag(v)));
    }
    if let Some(v) = &p.tag_text {
        sets.push(("tag_text", text(v)));
    }
    if let Some(v) = &p.custom_tag {
        sets.push(("custom_tag", text(v)));
    }
    if let Some(v) = p.custom_tag_enabled {
        sets.push(("custom_tag_enabled", flag(v)));
    }
    if let Some(v) = p.admin_tag_enabled {
        sets.push(("admin_tag_enabled", flag(v)));
    }
    if let Some(v) = p.creator_tag_enabled {
        sets.push(("creator_tag_enabled", flag(v)));
    }
    if let Some(v) = p.protect_content {
        sets.push(("protect_content", flag(v)));
    }
    if let Some(v) = p.autodelete_minutes {
        sets.push(("autodelete_minutes", Value::Integer(i64::from(v))));
    }
    if let Some(v) = p.captcha_passed {
        sets.push(("captcha_passed", flag(v)));
    }
    sets
}

fn row_to_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    let role_str: String = row.get(1)?;
    let role = role_str.parse::<Role>().map_err(|e| conversion_err(1, e))?;
    let created_raw: String = row.get(18)?;

    Ok(Participant {
        id: UserId(row.get(0)?),
        role,
        display_name: row.get(2)?,
        banned: row.get(3)?,
        muted_until: parse_opt_ts(4, row.get(4)?)?,
        warnings: row.get(5)?,
        prefs: Preferences {
            tag_enabled: row.get(6)?,
            tag_text: row.get(7)?,
            custom_tag: row.get(8)?,
            custom_tag_enabled: row.get(9)?,
            admin_tag_enabled: row.get(10)?,
            creator_tag_enabled: row.get(11)?,
            protect_content: row.get(12)?,
            autodelete_minutes: row.get(13)?,
        },
        message_count: row.get::<_, i64>(14)?.max(0) as u64,
        last_message_text: row.get(15)?,
        last_message_at: parse_opt_ts(16, row.get(16)?)?,
        captcha_passed: row.get(17)?,
        created_at: parse_ts(18, &created_raw)?,
    })
}
