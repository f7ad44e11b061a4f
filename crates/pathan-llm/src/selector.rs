//! 候选模型选择
//!
//! 候选列表有两种来源：
//! - 配置中的固定优先级列表
//! - 服务端枚举：只保留声明了 `generateContent` 的模型，按名称排序为
//!   flash 优先、pro 其次、其余按原顺序

use tracing::{info, warn};

use crate::backend::{GenerativeBackend, ModelDescriptor};
use crate::error::LlmError;

/// 名称匹配优先级（从高到低）
const PREFERRED_FAMILIES: &[&str] = &["flash", "pro"];

/// 候选来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateSource {
    Fixed(Vec<String>),
    Discovered,
}

/// 候选模型选择器
#[derive(Debug, Clone)]
pub struct ModelSelector {
    source: CandidateSource,
}

impl ModelSelector {
    pub fn new(source: CandidateSource) -> Self {
        Self { source }
    }

    /// 配置列表为空时使用服务端枚举
    pub fn from_configured(models: &[String]) -> Self {
        let models: Vec<String> = models
            .iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if models.is_empty() {
            Self::new(CandidateSource::Discovered)
        } else {
            Self::new(CandidateSource::Fixed(models))
        }
    }

    pub fn source(&self) -> &CandidateSource {
        &self.source
    }

    /// 解析出按优先级排列的候选模型
    pub async fn candidates(&self, backend: &dyn GenerativeBackend) -> Result<Vec<String>, LlmError> {
        let candidates = match &self.source {
            CandidateSource::Fixed(models) => models.clone(),
            CandidateSource::Discovered => {
                let models = backend.list_models().await.map_err(|e| {
                    warn!("Model discovery on {} failed: {}", backend.name(), e);
                    LlmError::Discovery(Box::new(e))
                })?;
                rank_candidates(models)
            }
        };

        if candidates.is_empty() {
            return Err(LlmError::NoCandidates);
        }

        info!("Resolved {} candidate models, first: {}", candidates.len(), candidates[0]);
        Ok(candidates)
    }
}

/// 过滤并排序服务端枚举的模型
pub fn rank_candidates(models: Vec<ModelDescriptor>) -> Vec<String> {
    let names: Vec<String> = models
        .into_iter()
        .filter(|m| m.supports_generate_content())
        .map(|m| m.name)
        .collect();

    let rank = |name: &str| {
        PREFERRED_FAMILIES
            .iter()
            .position(|family| name.contains(family))
            .unwrap_or(PREFERRED_FAMILIES.len())
    };

    let mut ranked = names;
    // 稳定排序保证同组内保持服务端顺序
    ranked.sort_by_key(|name| rank(name.as_str()));
    ranked
}

/// 将首选模型放在候选列表最前面（去重）
pub fn prefer_model(preferred: &str, candidates: Vec<String>) -> Vec<String> {
    let mut ordered = vec![preferred.to_string()];
    ordered.extend(candidates.into_iter().filter(|c| c != preferred));
    ordered
}
