//! [`Store`] port over one shared SQLite connection.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use relay_core::domain::{
    DeliveredCopy, LogicalId, LogicalMessage, MessageId, PaidSale, Participant, ParticipantPatch,
    PurgeCounts, Role, Totals, UserId, WarningRecord,
};
use relay_core::store::Store;

use crate::database::Database;
use crate::error::StoreError;

/// Each call holds the connection only for its own statements; nothing is
/// held across an await.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> crate::Result<Self> {
        Ok(Self::from_database(Database::open_at(path)?))
    }

    pub fn in_memory() -> crate::Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>, StoreError> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn warnings_for(&self, id: UserId) -> relay_core::Result<Vec<WarningRecord>> {
        Ok(self.db()?.warnings_for(id)?)
    }
}

type CoreResult<T> = relay_core::Result<T>;

#[async_trait]
impl Store for SqliteStore {
    async fn get_participant(&self, id: UserId) -> CoreResult<Option<Participant>> {
        Ok(self.db()?.get_participant(id)?)
    }

    async fn create_participant(&self, id: UserId, role: Role) -> CoreResult<Participant> {
        Ok(self.db()?.create_participant(id, role)?)
    }

    async fn update_participant(&self, id: UserId, patch: &ParticipantPatch) -> CoreResult<()> {
        Ok(self.db()?.update_participant(id, patch)?)
    }

    async fn delete_participant(&self, id: UserId) -> CoreResult<()> {
        Ok(self.db()?.delete_participant(id)?)
    }

    async fn list_active_participants(&self) -> CoreResult<Vec<UserId>> {
        Ok(self.db()?.list_active_participants()?)
    }

    async fn list_staff(&self) -> CoreResult<Vec<Participant>> {
        Ok(self.db()?.list_staff()?)
    }

    async fn top_participants(&self, limit: usize) -> CoreResult<Vec<Participant>> {
        Ok(self.db()?.top_participants(limit)?)
    }

    async fn is_ignored(&self, by: UserId, target: UserId) -> CoreResult<bool> {
        Ok(self.db()?.is_ignored(by, target)?)
    }

    async fn add_ignore(&self, by: UserId, target: UserId) -> CoreResult<()> {
        Ok(self.db()?.add_ignore(by, target)?)
    }

    async fn remove_ignore(&self, by: UserId, target: UserId) -> CoreResult<bool> {
        Ok(self.db()?.remove_ignore(by, target)?)
    }

    async fn clear_ignores(&self, by: UserId) -> CoreResult<usize> {
        Ok(self.db()?.clear_ignores(by)?)
    }

    async fn record_logical_message(&self, msg: &LogicalMessage) -> CoreResult<()> {
        Ok(self.db()?.record_logical_message(msg)?)
    }

    async fn get_logical_message(&self, id: LogicalId) -> CoreResult<Option<LogicalMessage>> {
        Ok(self.db()?.get_logical_message(id)?)
    }

    async fn record_copy(&self, copy: &DeliveredCopy) -> CoreResult<()> {
        Ok(self.db()?.record_copy(copy)?)
    }

    async fn record(
        &self,
        logical: LogicalId,
        recipient: UserId,
        delivered: MessageId,
    ) -> CoreResult<()> {
        Ok(self.db()?.record_mapping(logical, recipient, delivered)?)
    }

    async fn lookup(&self, logical: LogicalId, recipient: UserId) -> CoreResult<Option<MessageId>> {
        Ok(self.db()?.lookup(logical, recipient)?)
    }

    async fn reverse_lookup(
        &self,
        delivered: MessageId,
        recipient: UserId,
    ) -> CoreResult<Option<LogicalId>> {
        Ok(self.db()?.reverse_lookup(delivered, recipient)?)
    }

    async fn list_copies(&self, logical: LogicalId) -> CoreResult<Vec<DeliveredCopy>> {
        Ok(self.db()?.list_copies(logical)?)
    }

    async fn update_copy_content(
        &self,
        recipient: UserId,
        delivered: MessageId,
        content: &str,
    ) -> CoreResult<()> {
        Ok(self.db()?.update_copy_content(recipient, delivered, content)?)
    }

    async fn update_logical_content(
        &self,
        logical: LogicalId,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        Ok(self
            .db()?
            .update_logical_content(logical, content, edited_at)?)
    }

    async fn delete_copies(&self, logical: LogicalId, except: Option<UserId>) -> CoreResult<usize> {
        Ok(self.db()?.delete_copies(logical, except)?)
    }

    async fn expired_messages(&self, now: DateTime<Utc>) -> CoreResult<Vec<LogicalId>> {
        Ok(self.db()?.expired_messages(now)?)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> CoreResult<PurgeCounts> {
        Ok(self.db()?.purge_before(cutoff)?)
    }

    async fn get_setting(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.db()?.get_setting(key)?)
    }

    async fn set_setting(&self, key: &str, value: &str) -> CoreResult<()> {
        Ok(self.db()?.set_setting(key, value)?)
    }

    async fn record_activity(&self, id: UserId, text: &str, at: DateTime<Utc>) -> CoreResult<()> {
        Ok(self.db()?.record_activity(id, text, at)?)
    }

    async fn participant_daily_count(&self, id: UserId, day: NaiveDate) -> CoreResult<u64> {
        Ok(self.db()?.participant_daily_count(id, day)?)
    }

    async fn totals(&self, day: NaiveDate) -> CoreResult<Totals> {
        Ok(self.db()?.totals(day)?)
    }

    async fn record_sale(&self, sale: &PaidSale) -> CoreResult<()> {
        Ok(self.db()?.record_sale(sale)?)
    }

    async fn sales_for(&self, owner: UserId) -> CoreResult<Vec<PaidSale>> {
        Ok(self.db()?.sales_for(owner)?)
    }

    async fn add_warning(&self, record: &WarningRecord) -> CoreResult<()> {
        Ok(self.db()?.add_warning(record)?)
    }

    async fn remove_last_warning(&self, id: UserId) -> CoreResult<bool> {
        Ok(self.db()?.remove_last_warning(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.create_participant(UserId(9), Role::Creator).await.unwrap();
            store.set_setting("cooldown_ms", "1500").await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let p = store.get_participant(UserId(9)).await.unwrap().unwrap();
        assert_eq!(p.role, Role::Creator);
        assert_eq!(
            store.get_setting("cooldown_ms").await.unwrap().as_deref(),
            Some("1500")
        );
    }
}
