//! 生成模型错误定义

use pathan_core::PathanError;
use thiserror::Error;

/// 生成模型调用错误
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP请求失败: {0}")]
    Http(String),

    #[error("模型服务返回错误 {status}: {body}")]
    Api { status: u16, body: String },

    #[error("响应解析失败: {0}")]
    ResponseParsing(String),

    #[error("模型未返回内容: {0}")]
    EmptyResponse(String),

    #[error("模型列表获取失败: {0}")]
    Discovery(Box<LlmError>),

    #[error("没有可用的候选模型")]
    NoCandidates,

    #[error("全部 {attempts} 个候选模型均失败，最后错误: {last}")]
    AllCandidatesFailed { attempts: usize, last: Box<LlmError> },
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LlmError::ResponseParsing(e.to_string())
        } else {
            LlmError::Http(e.to_string())
        }
    }
}

impl From<LlmError> for PathanError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::NoCandidates | LlmError::Discovery(_) => {
                PathanError::ModelUnavailable(e.to_string())
            }
            other => PathanError::Generation(other.to_string()),
        }
    }
}
