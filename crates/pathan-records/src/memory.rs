//! 内存记录存储，用于测试与演示

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::error::RecordStoreError;
use crate::models::{AnalysisFields, StoredRow, UserFields};
use crate::store::RecordStore;

#[derive(Default)]
struct Tables {
    sequence: u64,
    last_created: Option<DateTime<Utc>>,
    users: Vec<StoredRow<UserFields>>,
    analyses: Vec<StoredRow<AnalysisFields>>,
}

impl Tables {
    /// 生成递增的记录ID与创建时间
    fn next_meta(&mut self) -> (String, DateTime<Utc>) {
        self.sequence += 1;
        let now = Utc::now();
        let created = match self.last_created {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_created = Some(created);
        (format!("rec{:014}", self.sequence), created)
    }
}

/// 进程内记录存储
///
/// `set_unavailable(true)` 后所有写操作失败，用于模拟外部存储故障。
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), RecordStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RecordStoreError::Unavailable("memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }

    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }

    pub async fn analysis_count(&self) -> usize {
        self.tables.read().await.analyses.len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_users_by_name(&self, name: &str) -> Result<Vec<StoredRow<UserFields>>, RecordStoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .filter(|row| row.fields.name == name)
            .cloned()
            .collect())
    }

    async fn create_user(&self, fields: &UserFields) -> Result<StoredRow<UserFields>, RecordStoreError> {
        self.ensure_available()?;
        let mut tables = self.tables.write().await;
        let (id, created_time) = tables.next_meta();
        let row = StoredRow {
            id,
            created_time,
            fields: fields.clone(),
        };
        tables.users.push(row.clone());
        Ok(row)
    }

    async fn delete_user(&self, id: &str) -> Result<(), RecordStoreError> {
        self.ensure_available()?;
        let mut tables = self.tables.write().await;
        let before = tables.users.len();
        tables.users.retain(|row| row.id != id);
        if tables.users.len() == before {
            return Err(RecordStoreError::Api {
                status: 404,
                body: format!("record {} not found", id),
            });
        }
        Ok(())
    }

    async fn create_analysis(
        &self,
        fields: &AnalysisFields,
    ) -> Result<StoredRow<AnalysisFields>, RecordStoreError> {
        self.ensure_available()?;
        let mut tables = self.tables.write().await;
        let (id, created_time) = tables.next_meta();
        let row = StoredRow {
            id,
            created_time,
            fields: fields.clone(),
        };
        tables.analyses.push(row.clone());
        Ok(row)
    }

    async fn list_analyses(&self) -> Result<Vec<StoredRow<AnalysisFields>>, RecordStoreError> {
        Ok(self.tables.read().await.analyses.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_created_times_strictly_increase() {
        let store = MemoryRecordStore::new();
        let a = store.create_analysis(&AnalysisFields::default()).await.unwrap();
        let b = store.create_analysis(&AnalysisFields::default()).await.unwrap();
        assert!(b.created_time > a.created_time);
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_unavailable_store_rejects_writes() {
        let store = MemoryRecordStore::new();
        store.set_unavailable(true);
        let err = store.create_analysis(&AnalysisFields::default()).await.unwrap_err();
        assert!(matches!(err, RecordStoreError::Unavailable(_)));
        assert_eq!(store.analysis_count().await, 0);
    }
}
