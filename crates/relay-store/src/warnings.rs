use rusqlite::params;

use relay_core::domain::{UserId, WarningRecord};

use crate::convert::{parse_ts, ts};
use crate::database::Database;
use crate::error::Result;

impl Database {
    pub fn add_warning(&self, record: &WarningRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO warnings (user_id, issued_by, reason, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.participant.0,
                record.issued_by.0,
                record.reason,
                ts(&record.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn remove_last_warning(&self, id: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM warnings
             WHERE id = (SELECT MAX(id) FROM warnings WHERE user_id = ?1)",
            params![id.0],
        )?;
        Ok(affected > 0)
    }

    pub fn warnings_for(&self, id: UserId) -> Result<Vec<WarningRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, issued_by, reason, created_at
             FROM warnings WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![id.0], |row| {
            let raw: String = row.get(3)?;
            Ok(WarningRecord {
                participant: UserId(row.get(0)?),
                issued_by: UserId(row.get(1)?),
                reason: row.get(2)?,
                created_at: parse_ts(3, &raw)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}
