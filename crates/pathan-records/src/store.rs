//! 记录存储接口

use async_trait::async_trait;

use crate::error::RecordStoreError;
use crate::models::{AnalysisFields, StoredRow, UserFields};

/// 用户表与分析记录表的底层操作
///
/// 实现只负责数据存取；唯一性、鉴权与排序等策略在 [`crate::RecordService`] 中实现。
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 按姓名精确查找用户
    async fn find_users_by_name(&self, name: &str) -> Result<Vec<StoredRow<UserFields>>, RecordStoreError>;

    async fn create_user(&self, fields: &UserFields) -> Result<StoredRow<UserFields>, RecordStoreError>;

    async fn delete_user(&self, id: &str) -> Result<(), RecordStoreError>;

    async fn create_analysis(
        &self,
        fields: &AnalysisFields,
    ) -> Result<StoredRow<AnalysisFields>, RecordStoreError>;

    /// 读取全部分析记录（所有分页）
    async fn list_analyses(&self) -> Result<Vec<StoredRow<AnalysisFields>>, RecordStoreError>;
}
