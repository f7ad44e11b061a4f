//! 记录存储错误定义

use pathan_core::PathanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordStoreError {
    #[error("HTTP请求失败: {0}")]
    Http(String),

    #[error("记录存储返回错误 {status}: {body}")]
    Api { status: u16, body: String },

    #[error("记录解析失败: {0}")]
    Decode(String),

    #[error("无效的存储地址: {0}")]
    InvalidUrl(String),

    #[error("记录存储不可用: {0}")]
    Unavailable(String),

    #[error("数据验证失败: {0}")]
    Validation(String),
}

impl From<reqwest::Error> for RecordStoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RecordStoreError::Decode(e.to_string())
        } else {
            RecordStoreError::Http(e.to_string())
        }
    }
}

impl From<url::ParseError> for RecordStoreError {
    fn from(e: url::ParseError) -> Self {
        RecordStoreError::InvalidUrl(e.to_string())
    }
}

impl From<RecordStoreError> for PathanError {
    fn from(e: RecordStoreError) -> Self {
        match e {
            RecordStoreError::Validation(msg) => PathanError::Validation(msg),
            other => PathanError::RecordStore(other.to_string()),
        }
    }
}
