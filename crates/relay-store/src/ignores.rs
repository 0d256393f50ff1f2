use rusqlite::{params, OptionalExtension};

use relay_core::domain::UserId;

use crate::database::Database;
use crate::error::Result;

impl Database {
    pub fn is_ignored(&self, by: UserId, target: UserId) -> Result<bool> {
        Ok(self
            .conn()
            .query_row(
                "SELECT 1 FROM ignores WHERE user_id = ?1 AND ignored_id = ?2",
                params![by.0, target.0],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    pub fn add_ignore(&self, by: UserId, target: UserId) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO ignores (user_id, ignored_id) VALUES (?1, ?2)",
            params![by.0, target.0],
        )?;
        Ok(())
    }

    pub fn remove_ignore(&self, by: UserId, target: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM ignores WHERE user_id = ?1 AND ignored_id = ?2",
            params![by.0, target.0],
        )?;
        Ok(affected > 0)
    }

    pub fn clear_ignores(&self, by: UserId) -> Result<usize> {
        Ok(self
            .conn()
            .execute("DELETE FROM ignores WHERE user_id = ?1", params![by.0])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_is_directed() {
        let db = Database::open_in_memory().unwrap();
        db.add_ignore(UserId(1), UserId(2)).unwrap();
        db.add_ignore(UserId(1), UserId(2)).unwrap();

        assert!(db.is_ignored(UserId(1), UserId(2)).unwrap());
        assert!(!db.is_ignored(UserId(2), UserId(1)).unwrap());

        db.add_ignore(UserId(1), UserId(3)).unwrap();
        assert!(db.remove_ignore(UserId(1), UserId(3)).unwrap());
        assert!(!db.remove_ignore(UserId(1), UserId(3)).unwrap());
        assert_eq!(db.clear_ignores(UserId(1)).unwrap(), 1);
    }
}
