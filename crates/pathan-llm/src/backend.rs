//! 生成模型后端接口
//!
//! 后端只负责“用指定模型完成一次请求”，候选模型的选择与降级由
//! [`crate::selector`] 和 [`crate::fallback`] 负责。

use async_trait::async_trait;
use pathan_core::{ChatRole, ChatTurn, UploadedImage};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// 生成能力名称：支持多模态内容生成的模型会声明此方法
pub const GENERATE_CONTENT: &str = "generateContent";

/// 模型描述（服务端枚举结果）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelDescriptor {
    pub fn new(name: &str, methods: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            supported_generation_methods: methods.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn supports_generate_content(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == GENERATE_CONTENT)
    }
}

/// 内联图像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl From<&UploadedImage> for ImagePart {
    fn from(image: &UploadedImage) -> Self {
        Self {
            mime_type: image.content_type.clone(),
            data: image.bytes.clone(),
        }
    }
}

/// 一条消息
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: ChatRole,
    pub text: String,
    pub image: Option<ImagePart>,
}

/// 生成请求（单轮或多轮）
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
}

impl GenerationRequest {
    /// 单轮请求：文本提示 + 可选图像
    pub fn single(prompt: impl Into<String>, image: Option<ImagePart>) -> Self {
        Self {
            messages: vec![Message {
                role: ChatRole::User,
                text: prompt.into(),
                image,
            }],
        }
    }

    /// 多轮对话请求：图像附加在第一条用户消息上
    pub fn conversation(history: &[ChatTurn], image: Option<ImagePart>) -> Self {
        let mut image = image;
        let messages = history
            .iter()
            .map(|turn| Message {
                role: turn.role,
                text: turn.text.clone(),
                image: if turn.role == ChatRole::User {
                    image.take()
                } else {
                    None
                },
            })
            .collect();
        Self { messages }
    }

    pub fn has_image(&self) -> bool {
        self.messages.iter().any(|m| m.image.is_some())
    }
}

/// 生成模型后端
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// 后端名称（用于日志）
    fn name(&self) -> &str;

    /// 枚举服务端可用模型
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, LlmError>;

    /// 使用指定模型完成一次生成
    async fn generate(&self, model: &str, request: &GenerationRequest) -> Result<String, LlmError>;
}
