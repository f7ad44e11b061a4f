//! # PathanAI 工作流模块
//!
//! 管理一次组织切片分析的完整流程：
//! - 会话状态机：上传、就绪、运行、完成的生命周期
//! - 会话上下文：每个登录会话独立的表单、图像、结果与对话
//! - 分析引擎：生成、保存、导出报告与追问

pub mod engine;
pub mod session;
pub mod state_machine;

// 重新导出主要类型
pub use engine::{AnalysisEngine, RunOutcome};
pub use session::{
    validate_image, AnalysisSession, ImageInfo, PersistenceStatus, RunInput, SessionView,
};
pub use state_machine::{AnalysisEvent, AnalysisState, AnalysisStateMachine};
