//! # PathanAI
//!
//! 组织病理图像AI辅助诊断系统的统一入口，重新导出各子模块。

pub use pathan_core as core;
pub use pathan_llm as llm;
pub use pathan_records as records;
pub use pathan_report as report;
pub use pathan_workflow as workflow;
