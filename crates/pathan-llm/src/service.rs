//! 分析生成服务
//!
//! 将提示词构造、候选降级和结论拆分组合为面向业务的两个操作：
//! 初次分析与追问。

use pathan_core::{ChatTurn, PatientRecord, UploadedImage};
use std::sync::Arc;
use tracing::info;

use crate::backend::{GenerationRequest, GenerativeBackend, ImagePart};
use crate::error::LlmError;
use crate::fallback::FallbackInvoker;
use crate::prompt::{analysis_prompt, split_summary};
use crate::selector::ModelSelector;

/// 初次分析的输出
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutput {
    /// 产生结果的模型
    pub model: String,
    /// 发送给模型的提示词（对话记录的第一轮）
    pub prompt: String,
    /// 模型原始回答
    pub raw_text: String,
    pub full_text: String,
    pub short_summary: String,
    pub attempts: usize,
}

/// 分析生成服务
pub struct GenerationService {
    invoker: FallbackInvoker,
}

impl GenerationService {
    pub fn new(backend: Arc<dyn GenerativeBackend>, selector: ModelSelector) -> Self {
        Self {
            invoker: FallbackInvoker::new(backend, selector),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.invoker.backend().name()
    }

    /// 对图像与患者数据执行初次分析
    pub async fn analyze(
        &self,
        patient: &PatientRecord,
        image: &UploadedImage,
    ) -> Result<AnalysisOutput, LlmError> {
        let prompt = analysis_prompt(patient);
        let request = GenerationRequest::single(prompt.clone(), Some(ImagePart::from(image)));
        let generated = self.invoker.generate(&request).await?;
        let split = split_summary(&generated.value);

        info!(
            "Analysis generated by {} after {} attempt(s), {} chars",
            generated.model,
            generated.attempts,
            split.full_text.chars().count()
        );

        Ok(AnalysisOutput {
            model: generated.model,
            prompt,
            raw_text: generated.value,
            full_text: split.full_text,
            short_summary: split.short_summary,
            attempts: generated.attempts,
        })
    }

    /// 基于完整对话记录追问；优先使用产生初次结果的模型
    ///
    /// `transcript` 的最后一轮应为医生的新问题。
    pub async fn follow_up(
        &self,
        model: &str,
        transcript: &[ChatTurn],
        image: &UploadedImage,
    ) -> Result<(String, String), LlmError> {
        let request = GenerationRequest::conversation(transcript, Some(ImagePart::from(image)));
        let generated = self.invoker.generate_preferring(model, &request).await?;
        info!(
            "Follow-up answered by {} ({} turns in transcript)",
            generated.model,
            transcript.len()
        );
        Ok((generated.model, generated.value.trim().to_string()))
    }
}
