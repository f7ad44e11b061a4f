//! 错误定义模块

use thiserror::Error;

/// PathanAI系统统一错误类型
#[derive(Error, Debug)]
pub enum PathanError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("认证错误: {0}")]
    Authentication(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("没有可用的模型: {0}")]
    ModelUnavailable(String),

    #[error("生成错误: {0}")]
    Generation(String),

    #[error("记录存储错误: {0}")]
    RecordStore(String),

    #[error("报告生成错误: {0}")]
    Report(String),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("系统内部错误: {0}")]
    Internal(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

/// PathanAI系统统一结果类型
pub type Result<T> = std::result::Result<T, PathanError>;
