//! Gemini REST客户端
//!
//! 对接 `generativelanguage` v1beta 接口：
//! - `GET  {base}/models`：枚举模型（分页）
//! - `POST {base}/{model}:generateContent`：多模态生成
//!
//! API密钥通过 `x-goog-api-key` 请求头传递，不会出现在URL或日志中。

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pathan_core::config::GeminiConfig;
use pathan_core::ChatRole;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{GenerationRequest, GenerativeBackend, ModelDescriptor};
use crate::error::LlmError;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini HTTP客户端
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self, LlmError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/{}:generateContent", self.base_url, qualified_model_name(model))
    }

    async fn error_from_response(response: reqwest::Response) -> LlmError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        LlmError::Api { status, body }
    }
}

/// 模型名统一为 `models/<id>` 形式
pub fn qualified_model_name(model: &str) -> String {
    let model = model.trim();
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

// ---- 请求体 ----

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Inline { inline_data: Blob },
}

#[derive(Serialize)]
struct Blob {
    mime_type: String,
    data: String,
}

impl From<&GenerationRequest> for GenerateContentRequest {
    fn from(request: &GenerationRequest) -> Self {
        let contents = request
            .messages
            .iter()
            .map(|message| {
                let mut parts = vec![Part::Text {
                    text: message.text.clone(),
                }];
                if let Some(image) = &message.image {
                    parts.push(Part::Inline {
                        inline_data: Blob {
                            mime_type: image.mime_type.clone(),
                            data: BASE64.encode(&image.data),
                        },
                    });
                }
                Content {
                    role: match message.role {
                        ChatRole::User => "user",
                        ChatRole::Model => "model",
                    },
                    parts,
                }
            })
            .collect();
        Self { contents }
    }
}

// ---- 响应体 ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelDescriptor>,
    next_page_token: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, LlmError> {
        let block_reason = self.prompt_feedback.and_then(|f| f.block_reason);
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(LlmError::EmptyResponse(
                block_reason.unwrap_or_else(|| "no candidates".to_string()),
            ));
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse(
                candidate
                    .finish_reason
                    .unwrap_or_else(|| "empty text".to_string()),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, LlmError> {
        let url = format!("{}/models", self.base_url);
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .query(&[("pageSize", "1000")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(Self::error_from_response(response).await);
            }

            let page: ListModelsResponse = response.json().await?;
            models.extend(page.models);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!("Discovered {} models from provider", models.len());
        Ok(models)
    }

    async fn generate(&self, model: &str, request: &GenerationRequest) -> Result<String, LlmError> {
        let url = self.model_url(model);
        debug!(
            "Sending generateContent to {} ({} messages, image: {})",
            qualified_model_name(model),
            request.messages.len(),
            request.has_image()
        );

        let body = GenerateContentRequest::from(request);
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let parsed: GenerateContentResponse = response.json().await?;
        parsed.into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ImagePart;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GeminiClient {
        let config = GeminiConfig {
            api_key: "test-key".to_string(),
            base_url: format!("{}/v1beta", server.uri()),
            ..Default::default()
        };
        GeminiClient::new(&config).unwrap()
    }

    #[test]
    fn test_qualified_model_name() {
        assert_eq!(qualified_model_name("gemini-1.5-flash"), "models/gemini-1.5-flash");
        assert_eq!(qualified_model_name("models/gemini-pro"), "models/gemini-pro");
    }

    #[tokio::test]
    async fn test_list_models_follows_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .and(query_param("pageToken", "next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{"name": "models/gemini-pro", "supportedGenerationMethods": ["generateContent"]}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{"name": "models/gemini-1.5-flash", "supportedGenerationMethods": ["generateContent"]}],
                "nextPageToken": "next"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let models = client_for(&server).list_models().await.unwrap();
        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["models/gemini-1.5-flash", "models/gemini-pro"]);
    }

    #[tokio::test]
    async fn test_generate_sends_inline_image() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        {"text": "опиши"},
                        {"inline_data": {"mime_type": "image/png", "data": "AQID"}}
                    ]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "Микроскопия: "}, {"text": "норма"}]},
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let request = GenerationRequest::single(
            "опиши",
            Some(ImagePart {
                mime_type: "image/png".to_string(),
                data: vec![1, 2, 3],
            }),
        );
        let text = client_for(&server)
            .generate("gemini-1.5-flash", &request)
            .await
            .unwrap();
        assert_eq!(text, "Микроскопия: норма");
    }

    #[tokio::test]
    async fn test_generate_maps_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .generate("models/gemini-pro", &GenerationRequest::single("x", None))
            .await
            .unwrap_err();
        match err {
            LlmError::Api { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "quota exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_blocked_prompt_is_empty_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .generate("models/gemini-pro", &GenerationRequest::single("x", None))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse(reason) if reason == "SAFETY"));
    }
}
