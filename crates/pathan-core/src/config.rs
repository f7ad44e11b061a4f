//! 配置管理
//!
//! 按以下顺序分层加载配置（后者覆盖前者）：
//! 1. 配置文件（默认 `pathan.toml`，可选）
//! 2. `PATHAN_` 前缀的环境变量，嵌套键用 `__` 分隔，例如 `PATHAN_GEMINI__API_KEY`
//! 3. 兼容旧部署的密钥变量：`GEMINI_API_KEY`、`AIRTABLE_API_TOKEN`、
//!    `AIRTABLE_BASE_ID`、`AIRTABLE_USERS_TABLE`、`AIRTABLE_RECORDS_TABLE`
//!
//! 缺少任何密钥都会返回 [`PathanError::Config`]，调用方应当中止启动。

use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::info;

use crate::error::{PathanError, Result};

/// 旧版密钥变量与配置键的对应关系
const LEGACY_SECRETS: &[(&str, &str)] = &[
    ("gemini.api_key", "GEMINI_API_KEY"),
    ("record_store.api_token", "AIRTABLE_API_TOKEN"),
    ("record_store.base_id", "AIRTABLE_BASE_ID"),
    ("record_store.users_table", "AIRTABLE_USERS_TABLE"),
    ("record_store.records_table", "AIRTABLE_RECORDS_TABLE"),
];

/// 系统完整配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 生成模型配置
    #[serde(default)]
    pub gemini: GeminiConfig,
    /// 记录存储配置
    #[serde(default)]
    pub record_store: RecordStoreConfig,
    /// 报告配置
    #[serde(default)]
    pub report: ReportConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8501,
        }
    }
}

/// 生成模型配置
#[derive(Clone, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    /// 固定的候选模型优先级列表；为空时从服务端枚举
    #[serde(default)]
    pub models: Vec<String>,
    /// 单次请求超时（秒），缺省不限制
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_gemini_base_url(),
            models: Vec::new(),
            request_timeout_secs: None,
        }
    }
}

impl GeminiConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

/// 记录存储配置
#[derive(Clone, Deserialize)]
pub struct RecordStoreConfig {
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub base_id: String,
    #[serde(default)]
    pub users_table: String,
    #[serde(default)]
    pub records_table: String,
    #[serde(default = "default_record_store_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for RecordStoreConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_id: String::new(),
            users_table: String::new(),
            records_table: String::new(),
            base_url: default_record_store_base_url(),
            request_timeout_secs: None,
        }
    }
}

impl RecordStoreConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl fmt::Debug for RecordStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStoreConfig")
            .field("api_token", &redact(&self.api_token))
            .field("base_id", &self.base_id)
            .field("users_table", &self.users_table)
            .field("records_table", &self.records_table)
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn default_record_store_base_url() -> String {
    "https://api.airtable.com/v0".to_string()
}

/// 报告配置
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// 支持西里尔字母的TTF字体；加载失败时退回内置Helvetica
    #[serde(default = "default_font_path")]
    pub font_path: Option<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            font_path: default_font_path(),
        }
    }
}

fn default_font_path() -> Option<String> {
    Some("DejaVuSans.ttf".to_string())
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<missing>"
    } else {
        "<redacted>"
    }
}

impl AppConfig {
    /// 从配置文件、环境变量和旧版密钥变量加载配置
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let file = match config_path {
            Some(path) => File::with_name(path),
            None => File::with_name("pathan").required(false),
        };
        let builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix("PATHAN")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("gemini.models")
                .try_parsing(true),
        );

        let config = Self::build(builder, |name| std::env::var(name).ok())?;
        info!(
            "Configuration loaded (config file: {})",
            config_path.unwrap_or("pathan.toml, optional")
        );
        Ok(config)
    }

    /// 从TOML文本加载配置，旧版密钥由 `lookup` 提供
    pub fn from_toml_str<F>(toml: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let builder = Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        Self::build(builder, lookup)
    }

    fn build<F>(mut builder: ConfigBuilder<DefaultState>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        for &(key, variable) in LEGACY_SECRETS {
            let value = lookup(variable).filter(|v| !v.trim().is_empty());
            builder = builder
                .set_override_option(key, value)
                .map_err(|e| PathanError::Config(e.to_string()))?;
        }

        let settings = builder
            .build()
            .map_err(|e| PathanError::Config(format!("无法读取配置: {}", e)))?;
        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| PathanError::Config(format!("配置格式错误: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// 校验密钥是否齐全
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("gemini.api_key", "GEMINI_API_KEY", &self.gemini.api_key),
            ("record_store.api_token", "AIRTABLE_API_TOKEN", &self.record_store.api_token),
            ("record_store.base_id", "AIRTABLE_BASE_ID", &self.record_store.base_id),
            ("record_store.users_table", "AIRTABLE_USERS_TABLE", &self.record_store.users_table),
            ("record_store.records_table", "AIRTABLE_RECORDS_TABLE", &self.record_store.records_table),
        ];

        let missing: Vec<String> = required
            .iter()
            .filter(|(_, _, value)| value.trim().is_empty())
            .map(|(key, variable, _)| format!("{} ({})", variable, key))
            .collect();

        if !missing.is_empty() {
            return Err(PathanError::Config(format!(
                "缺少密钥配置: {}",
                missing.join(", ")
            )));
        }

        if self.gemini.models.iter().any(|m| m.trim().is_empty()) {
            return Err(PathanError::Config("候选模型名称不能为空".to_string()));
        }

        Ok(())
    }
}
