//! # PathanAI Core
//!
//! PathanAI系统的核心模块，提供基础数据结构、错误定义、配置加载和通用工具。

pub mod config;
pub mod error;
pub mod models;
pub mod utils;

pub use config::AppConfig;
pub use error::{PathanError, Result};
pub use models::*;
