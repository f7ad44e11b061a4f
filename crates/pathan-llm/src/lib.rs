//! # PathanAI 生成模型模块
//!
//! 负责与多模态生成模型交互，包括：
//! - 生成后端抽象与 Gemini REST 客户端
//! - 候选模型选择（固定列表或服务端枚举）
//! - 逐个候选降级调用，首个成功即返回
//! - 分析提示词构造与简要结论提取

pub mod backend;
pub mod error;
pub mod fallback;
pub mod gemini;
pub mod mock;
pub mod prompt;
pub mod selector;
pub mod service;

pub use backend::{GenerationRequest, GenerativeBackend, ImagePart, Message, ModelDescriptor};
pub use error::LlmError;
pub use fallback::{try_in_order, CandidateFailure, FallbackInvoker, FallbackOutcome, Generated};
pub use gemini::GeminiClient;
pub use mock::ScriptedBackend;
pub use selector::{CandidateSource, ModelSelector};
pub use service::{AnalysisOutput, GenerationService};
