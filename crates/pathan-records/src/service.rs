//! 记录服务：鉴权、注册、保存与查询

use pathan_core::{AnalysisRecord, AnalysisResult, PatientRecord, User};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::RecordStoreError;
use crate::models::{AnalysisFields, StoredRow, UserFields};
use crate::store::RecordStore;

/// 记录服务
pub struct RecordService {
    store: Arc<dyn RecordStore>,
    /// 串行化本进程内的注册
    registration: Mutex<()>,
}

impl RecordService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            registration: Mutex::new(()),
        }
    }

    /// 校验姓名与密码，返回第一条匹配的用户
    pub async fn authenticate(&self, name: &str, password: &str) -> Result<Option<User>, RecordStoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        let rows = self.store.find_users_by_name(name).await?;
        let user = rows
            .into_iter()
            .find(|row| row.fields.password == password)
            .map(User::from);

        match &user {
            Some(u) => info!("User {} authenticated", u.id),
            None => warn!("Authentication failed for a login attempt"),
        }
        Ok(user)
    }

    /// 注册新用户；姓名已存在时返回 `false`
    ///
    /// 本进程内注册串行执行；创建后再次查询，若存在更早创建的同名行，
    /// 则删除自己创建的行，以处理其他进程的并发注册。
    pub async fn register(&self, name: &str, password: &str, email: &str) -> Result<bool, RecordStoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RecordStoreError::Validation("用户名不能为空".to_string()));
        }
        if password.is_empty() {
            return Err(RecordStoreError::Validation("密码不能为空".to_string()));
        }

        let _guard = self.registration.lock().await;

        if !self.store.find_users_by_name(name).await?.is_empty() {
            info!("Registration rejected: name already taken");
            return Ok(false);
        }

        let created = self
            .store
            .create_user(&UserFields::new_doctor(name, password, email.trim()))
            .await?;

        let same_name = self.store.find_users_by_name(name).await?;
        let earliest = same_name
            .iter()
            .min_by(|a, b| (a.created_time, &a.id).cmp(&(b.created_time, &b.id)));

        match earliest {
            Some(first) if first.id != created.id => {
                warn!(
                    "Concurrent registration detected, removing duplicate row {}",
                    created.id
                );
                self.store.delete_user(&created.id).await?;
                Ok(false)
            }
            _ => {
                info!("Registered user {}", created.id);
                Ok(true)
            }
        }
    }

    /// 保存分析结果，返回记录ID
    pub async fn persist(
        &self,
        owner_id: &str,
        patient: &PatientRecord,
        result: &AnalysisResult,
    ) -> Result<String, RecordStoreError> {
        let fields = AnalysisFields::from_analysis(owner_id, patient, result);
        let row = self.store.create_analysis(&fields).await?;
        info!("Persisted analysis {} for owner {}", row.id, owner_id);
        Ok(row.id)
    }

    /// 指定医生的记录，按创建时间倒序
    pub async fn list_for_owner(&self, user_id: &str) -> Result<Vec<AnalysisRecord>, RecordStoreError> {
        let rows = self.store.list_analyses().await?;
        Ok(newest_first(
            rows.into_iter()
                .filter(|row| row.fields.doctor.iter().any(|id| id == user_id)),
        ))
    }

    /// 全部记录，按创建时间倒序
    pub async fn list_all(&self) -> Result<Vec<AnalysisRecord>, RecordStoreError> {
        let rows = self.store.list_analyses().await?;
        Ok(newest_first(rows.into_iter()))
    }
}

fn newest_first(rows: impl Iterator<Item = StoredRow<AnalysisFields>>) -> Vec<AnalysisRecord> {
    let mut records: Vec<AnalysisRecord> = rows.map(AnalysisRecord::from).collect();
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    records
}
