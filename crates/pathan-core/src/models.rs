//! 核心数据模型定义

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PathanError, Result};

/// 性别
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[default]
    Unspecified, // 未指定
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Gender; 3] = [Gender::Unspecified, Gender::Male, Gender::Female];

    /// 表单与报告中使用的俄语标签
    pub fn label(&self) -> &'static str {
        match self {
            Gender::Unspecified => "Не указан",
            Gender::Male => "Мужской",
            Gender::Female => "Женский",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.label() == label.trim())
    }
}

/// 吸烟状态
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SmokingStatus {
    #[default]
    NonSmoker,
    Current,
    Former,
    Unknown,
}

impl SmokingStatus {
    pub const ALL: [SmokingStatus; 4] = [
        SmokingStatus::NonSmoker,
        SmokingStatus::Current,
        SmokingStatus::Former,
        SmokingStatus::Unknown,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SmokingStatus::NonSmoker => "Не курит",
            SmokingStatus::Current => "Курит сейчас",
            SmokingStatus::Former => "В прошлом",
            SmokingStatus::Unknown => "Неизвестно",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label.trim())
    }
}

/// 活检方法
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BiopsyMethod {
    #[default]
    Unknown,
    Excisional, // 切除活检
    Puncture,   // 穿刺
    Smear,      // 涂片
    Surgery,    // 手术
}

impl BiopsyMethod {
    pub const ALL: [BiopsyMethod; 5] = [
        BiopsyMethod::Unknown,
        BiopsyMethod::Excisional,
        BiopsyMethod::Puncture,
        BiopsyMethod::Smear,
        BiopsyMethod::Surgery,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            BiopsyMethod::Unknown => "Неизвестно",
            BiopsyMethod::Excisional => "Эксцизионная",
            BiopsyMethod::Puncture => "Пункция",
            BiopsyMethod::Smear => "Мазок",
            BiopsyMethod::Surgery => "Операция",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.label() == label.trim())
    }
}

/// 组织类型
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TissueType {
    #[default]
    Unknown,
    Skin,
    Mucosa,
    LymphNode,
    Breast,
    Liver,
    Lung,
    Other,
}

impl TissueType {
    pub const ALL: [TissueType; 8] = [
        TissueType::Unknown,
        TissueType::Skin,
        TissueType::Mucosa,
        TissueType::LymphNode,
        TissueType::Breast,
        TissueType::Liver,
        TissueType::Lung,
        TissueType::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TissueType::Unknown => "Неизвестно",
            TissueType::Skin => "Кожа",
            TissueType::Mucosa => "Слизистая",
            TissueType::LymphNode => "Лимфоузел",
            TissueType::Breast => "Молочная железа",
            TissueType::Liver => "Печень",
            TissueType::Lung => "Легкое",
            TissueType::Other => "Другое",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == label.trim())
    }
}

macro_rules! display_by_label {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        })*
    };
}

display_by_label!(Gender, SmokingStatus, BiopsyMethod, TissueType);

/// 患者基本信息（每个会话由表单创建）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatientRecord {
    pub name: String,
    pub gender: Gender,
    pub weight_kg: f64,
    pub birth_date: NaiveDate,
    pub smoking: SmokingStatus,
    pub biopsy_method: BiopsyMethod,
    pub tissue_type: TissueType,
    pub anamnesis: String,
}

impl Default for PatientRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            gender: Gender::default(),
            weight_kg: 0.0,
            birth_date: default_birth_date(),
            smoking: SmokingStatus::default(),
            biopsy_method: BiopsyMethod::default(),
            tissue_type: TissueType::default(),
            anamnesis: String::new(),
        }
    }
}

/// 表单默认出生日期
pub fn default_birth_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1980, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// 表单允许的最早出生日期
pub fn earliest_birth_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

impl PatientRecord {
    /// 去除首尾空白后的患者姓名
    pub fn display_name(&self) -> &str {
        self.name.trim()
    }

    pub fn has_name(&self) -> bool {
        !self.display_name().is_empty()
    }

    /// 体重统一保留一位小数
    pub fn weight_label(&self) -> String {
        format!("{:.1}", self.weight_kg)
    }

    /// 校验表单数据
    pub fn validate(&self) -> Result<()> {
        if !self.has_name() {
            return Err(PathanError::Validation("患者姓名不能为空".to_string()));
        }
        if !self.weight_kg.is_finite() || self.weight_kg < 0.0 {
            return Err(PathanError::Validation(format!(
                "体重无效: {}",
                self.weight_kg
            )));
        }
        let today = Local::now().date_naive();
        if self.birth_date < earliest_birth_date() || self.birth_date > today {
            return Err(PathanError::Validation(format!(
                "出生日期超出范围: {}",
                self.birth_date
            )));
        }
        Ok(())
    }
}

/// 上传的组织切片图像
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for UploadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedImage")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// AI分析结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub full_text: String,
    pub short_summary: String,
    /// 实际生成结果的候选模型
    pub model: String,
    /// 源图像文件名
    pub source_image: String,
    pub created_at: DateTime<Utc>,
}

/// 对话角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// 对话记录中的一轮
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}

/// 用户角色
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Doctor,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Doctor => "doctor",
            UserRole::Admin => "admin",
        }
    }

    /// 未知角色按医生处理
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => UserRole::Admin,
            _ => UserRole::Doctor,
        }
    }
}

/// 用户信息（不包含密码）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// 记录存储中的行ID
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

/// 已保存的分析记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRecord {
    pub id: String,
    pub patient_name: String,
    pub gender: Gender,
    pub weight_kg: Option<f64>,
    pub birth_date: Option<NaiveDate>,
    pub anamnesis: String,
    pub biopsy_method: BiopsyMethod,
    pub ai_conclusion: String,
    pub short_summary: String,
    /// 作者用户ID列表
    pub doctor_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.doctor_ids.iter().any(|id| id == user_id)
    }
}
