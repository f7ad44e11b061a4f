//! 可编排的模拟后端，用于测试和演示

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::backend::{GenerationRequest, GenerativeBackend, ModelDescriptor, GENERATE_CONTENT};
use crate::error::LlmError;

#[derive(Debug, Clone)]
enum Behavior {
    Reply(String),
    Fail(String),
    Stall,
}

/// 按模型名预设响应的后端
///
/// 未预设的模型返回 404 错误；每次调用都会被记录，便于断言调用顺序。
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    models: Vec<ModelDescriptor>,
    discovery_fails: bool,
    behaviors: HashMap<String, Behavior>,
    calls: Mutex<Vec<String>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定模型返回固定文本，并将其加入可枚举列表
    pub fn succeed(mut self, model: &str, text: &str) -> Self {
        self.register(model);
        self.behaviors
            .insert(model.to_string(), Behavior::Reply(text.to_string()));
        self
    }

    /// 指定模型总是失败
    pub fn fail(mut self, model: &str, message: &str) -> Self {
        self.register(model);
        self.behaviors
            .insert(model.to_string(), Behavior::Fail(message.to_string()));
        self
    }

    pub fn with_models(mut self, models: Vec<ModelDescriptor>) -> Self {
        self.models = models;
        self
    }

    pub fn failing_discovery(mut self) -> Self {
        self.discovery_fails = true;
        self
    }

    fn register(&mut self, model: &str) {
        if !self.models.iter().any(|m| m.name == model) {
            self.models
                .push(ModelDescriptor::new(model, &[GENERATE_CONTENT]));
        }
    }

    /// 指定模型永不返回，用于模拟请求被取消
    pub fn stall(mut self, model: &str) -> Self {
        self.register(model);
        self.behaviors.insert(model.to_string(), Behavior::Stall);
        self
    }

    /// 按顺序返回被调用过的模型
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// 最近一次生成请求
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, LlmError> {
        if self.discovery_fails {
            return Err(LlmError::Http("connection refused".to_string()));
        }
        Ok(self.models.clone())
    }

    async fn generate(&self, model: &str, request: &GenerationRequest) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(model.to_string());
        }
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        match self.behaviors.get(model) {
            Some(Behavior::Reply(text)) => Ok(text.clone()),
            Some(Behavior::Fail(message)) => Err(LlmError::Api {
                status: 503,
                body: message.clone(),
            }),
            Some(Behavior::Stall) => std::future::pending().await,
            None => Err(LlmError::Api {
                status: 404,
                body: format!("model {} not found", model),
            }),
        }
    }
}
