//! # PathanAI 记录存储模块
//!
//! 负责用户与分析记录的持久化。外部存储为表格型数据库（Airtable），
//! 字段通过类型化结构映射；测试与演示使用内存实现。

pub mod airtable;
pub mod error;
pub mod memory;
pub mod models;
pub mod service;
pub mod store;

// 重新导出主要类型
pub use airtable::AirtableStore;
pub use error::RecordStoreError;
pub use memory::MemoryRecordStore;
pub use models::{AnalysisFields, StoredRow, UserFields};
pub use service::RecordService;
pub use store::RecordStore;
