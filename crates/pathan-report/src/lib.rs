//! # PathanAI 报告模块
//!
//! 将患者数据、切片图像和AI结论导出为固定版式的 PDF 医学报告。

pub mod error;
pub mod layout;
pub mod markdown;
pub mod render;

pub use error::ReportError;
pub use layout::{Block, ReportInput, ReportLayout};
pub use markdown::clean_markdown;
pub use render::{ReportDocument, ReportExporter, PDF_CONTENT_TYPE};
