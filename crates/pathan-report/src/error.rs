//! 报告生成错误定义

use pathan_core::PathanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("字体加载失败: {0}")]
    Font(String),

    #[error("图像处理失败: {0}")]
    Image(String),

    #[error("PDF渲染失败: {0}")]
    Render(String),
}

impl From<printpdf::Error> for ReportError {
    fn from(e: printpdf::Error) -> Self {
        ReportError::Render(e.to_string())
    }
}

impl From<image::ImageError> for ReportError {
    fn from(e: image::ImageError) -> Self {
        ReportError::Image(e.to_string())
    }
}

impl From<ReportError> for PathanError {
    fn from(e: ReportError) -> Self {
        PathanError::Report(e.to_string())
    }
}
