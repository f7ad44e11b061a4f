//! 候选模型降级调用
//!
//! 按顺序逐个尝试候选模型：成功立即返回，失败则记录错误并尝试下一个。
//! 调用严格串行，同一个候选不会重试。

use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::{GenerationRequest, GenerativeBackend};
use crate::error::LlmError;
use crate::selector::{prefer_model, ModelSelector};

/// 单个候选的失败记录
#[derive(Debug)]
pub struct CandidateFailure {
    pub model: String,
    pub error: LlmError,
}

/// 降级调用结果
#[derive(Debug)]
pub enum FallbackOutcome<T> {
    /// 某个候选成功；`failures` 为此前失败的候选
    Success {
        model: String,
        value: T,
        failures: Vec<CandidateFailure>,
    },
    /// 所有候选均失败
    Exhausted { failures: Vec<CandidateFailure> },
    /// 候选列表为空
    NoCandidates,
}

/// 成功生成的值及其来源模型
#[derive(Debug, Clone, PartialEq)]
pub struct Generated<T> {
    pub model: String,
    pub value: T,
    /// 包括成功那次在内的尝试次数
    pub attempts: usize,
}

impl<T> FallbackOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, FallbackOutcome::Success { .. })
    }

    /// 转换为 `Result`：全部失败时携带最后一个错误
    pub fn into_result(self) -> Result<Generated<T>, LlmError> {
        match self {
            FallbackOutcome::Success {
                model,
                value,
                failures,
            } => Ok(Generated {
                model,
                value,
                attempts: failures.len() + 1,
            }),
            FallbackOutcome::Exhausted { mut failures } => {
                let attempts = failures.len();
                match failures.pop() {
                    Some(last) => Err(LlmError::AllCandidatesFailed {
                        attempts,
                        last: Box::new(last.error),
                    }),
                    None => Err(LlmError::NoCandidates),
                }
            }
            FallbackOutcome::NoCandidates => Err(LlmError::NoCandidates),
        }
    }
}

/// 依次尝试候选，返回第一个成功的结果
pub async fn try_in_order<T, F, Fut>(candidates: &[String], mut attempt: F) -> FallbackOutcome<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    if candidates.is_empty() {
        return FallbackOutcome::NoCandidates;
    }

    let mut failures = Vec::new();
    for model in candidates {
        match attempt(model.clone()).await {
            Ok(value) => {
                if !failures.is_empty() {
                    info!(
                        "Candidate {} succeeded after {} failed candidates",
                        model,
                        failures.len()
                    );
                }
                return FallbackOutcome::Success {
                    model: model.clone(),
                    value,
                    failures,
                };
            }
            Err(error) => {
                warn!("Candidate {} failed: {}", model, error);
                failures.push(CandidateFailure {
                    model: model.clone(),
                    error,
                });
            }
        }
    }

    FallbackOutcome::Exhausted { failures }
}

/// 带候选选择与降级的生成服务
pub struct FallbackInvoker {
    backend: Arc<dyn GenerativeBackend>,
    selector: ModelSelector,
}

impl FallbackInvoker {
    pub fn new(backend: Arc<dyn GenerativeBackend>, selector: ModelSelector) -> Self {
        Self { backend, selector }
    }

    pub fn backend(&self) -> &Arc<dyn GenerativeBackend> {
        &self.backend
    }

    /// 解析候选并依次调用
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Generated<String>, LlmError> {
        let candidates = self.selector.candidates(self.backend.as_ref()).await?;
        self.generate_with(&candidates, request).await
    }

    /// 优先使用指定模型（例如对话的原始模型），失败后按常规候选降级
    pub async fn generate_preferring(
        &self,
        preferred: &str,
        request: &GenerationRequest,
    ) -> Result<Generated<String>, LlmError> {
        let candidates = match self.selector.candidates(self.backend.as_ref()).await {
            Ok(candidates) => prefer_model(preferred, candidates),
            Err(e) => {
                warn!("Falling back to {} only: {}", preferred, e);
                vec![preferred.to_string()]
            }
        };
        self.generate_with(&candidates, request).await
    }

    async fn generate_with(
        &self,
        candidates: &[String],
        request: &GenerationRequest,
    ) -> Result<Generated<String>, LlmError> {
        let backend = self.backend.clone();
        try_in_order(candidates, |model| {
            let backend = backend.clone();
            async move { backend.generate(&model, request).await }
        })
        .await
        .into_result()
    }
}
