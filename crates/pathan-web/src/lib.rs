//! # PathanAI Web服务模块
//!
//! 提供基于axum的HTTP接口：
//! - 注册、登录与会话令牌
//! - 每个会话独立的分析流程（表单、上传、运行、追问、报告）
//! - 历史分析记录查询

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;
pub mod static_files;

pub use auth::{AuthService, UserSession};
pub use error::{ApiError, ApiResult};
pub use server::{build_router, WebServer};
pub use state::AppState;
