//! 记录存储表模型
//!
//! 字段名与外部表结构一一对应，通过 serde 重命名完成映射。
//! 外部接口会省略空字段，因此所有字段都带默认值。

use chrono::{DateTime, NaiveDate, Utc};
use pathan_core::models::*;
use serde::{Deserialize, Serialize};

/// 表中的一行：记录ID + 创建时间 + 字段
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRow<F> {
    pub id: String,
    #[serde(rename = "createdTime")]
    pub created_time: DateTime<Utc>,
    pub fields: F,
}

/// 用户表字段
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserFields {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Password", default)]
    pub password: String,
    #[serde(rename = "Email", default)]
    pub email: String,
    #[serde(rename = "Role", default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl UserFields {
    pub fn new_doctor(name: &str, password: &str, email: &str) -> Self {
        Self {
            name: name.to_string(),
            password: password.to_string(),
            email: email.to_string(),
            role: Some(UserRole::Doctor.as_str().to_string()),
        }
    }
}

impl From<StoredRow<UserFields>> for User {
    fn from(row: StoredRow<UserFields>) -> Self {
        User {
            id: row.id,
            name: row.fields.name,
            email: row.fields.email,
            role: row
                .fields
                .role
                .as_deref()
                .map(UserRole::parse)
                .unwrap_or_default(),
        }
    }
}

/// 分析记录表字段
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalysisFields {
    #[serde(rename = "Patient Name", default)]
    pub patient_name: String,
    #[serde(rename = "Gender", default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(rename = "Weight", default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(rename = "Birth Date", default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(rename = "Anamnesis", default)]
    pub anamnesis: String,
    #[serde(rename = "Biopsy Method", default, skip_serializing_if = "Option::is_none")]
    pub biopsy_method: Option<String>,
    #[serde(rename = "AI Conclusion", default)]
    pub ai_conclusion: String,
    #[serde(rename = "Short Summary", default)]
    pub short_summary: String,
    /// 关联的医生（用户表记录ID）
    #[serde(rename = "Doctor", default)]
    pub doctor: Vec<String>,
}

impl AnalysisFields {
    /// 由表单数据与分析结果构造一行，枚举值以俄语标签保存
    pub fn from_analysis(owner_id: &str, patient: &PatientRecord, result: &AnalysisResult) -> Self {
        Self {
            patient_name: patient.display_name().to_string(),
            gender: Some(patient.gender.label().to_string()),
            weight: Some(patient.weight_kg),
            birth_date: Some(patient.birth_date),
            anamnesis: patient.anamnesis.clone(),
            biopsy_method: Some(patient.biopsy_method.label().to_string()),
            ai_conclusion: result.full_text.clone(),
            short_summary: result.short_summary.clone(),
            doctor: vec![owner_id.to_string()],
        }
    }
}

impl From<StoredRow<AnalysisFields>> for AnalysisRecord {
    fn from(row: StoredRow<AnalysisFields>) -> Self {
        let fields = row.fields;
        AnalysisRecord {
            id: row.id,
            patient_name: fields.patient_name,
            gender: fields
                .gender
                .as_deref()
                .and_then(Gender::from_label)
                .unwrap_or_default(),
            weight_kg: fields.weight,
            birth_date: fields.birth_date,
            anamnesis: fields.anamnesis,
            biopsy_method: fields
                .biopsy_method
                .as_deref()
                .and_then(BiopsyMethod::from_label)
                .unwrap_or_default(),
            ai_conclusion: fields.ai_conclusion,
            short_summary: fields.short_summary,
            doctor_ids: fields.doctor,
            created_at: row.created_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_analysis_fields_use_external_column_names() {
        let patient = PatientRecord {
            name: " Иванов И.И. ".to_string(),
            weight_kg: 70.0,
            biopsy_method: BiopsyMethod::Smear,
            ..Default::default()
        };
        let result = AnalysisResult {
            full_text: "Полный текст".to_string(),
            short_summary: "Кратко".to_string(),
            model: "models/gemini-1.5-flash".to_string(),
            source_image: "slide.png".to_string(),
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(AnalysisFields::from_analysis("recUSER", &patient, &result)).unwrap();
        assert_eq!(value["Patient Name"], "Иванов И.И.");
        assert_eq!(value["Weight"], 70.0);
        assert_eq!(value["Birth Date"], "1980-01-01");
        assert_eq!(value["Biopsy Method"], "Мазок");
        assert_eq!(value["AI Conclusion"], "Полный текст");
        assert_eq!(value["Doctor"], json!(["recUSER"]));
    }

    #[test]
    fn test_sparse_row_decodes_with_defaults() {
        let row: StoredRow<AnalysisFields> = serde_json::from_value(json!({
            "id": "rec1",
            "createdTime": "2024-03-05T10:00:00.000Z",
            "fields": {"Patient Name": "Петров", "Gender": "Женский"}
        }))
        .unwrap();
        let record = AnalysisRecord::from(row);
        assert_eq!(record.gender, Gender::Female);
        assert_eq!(record.biopsy_method, BiopsyMethod::Unknown);
        assert!(record.doctor_ids.is_empty());
        assert!(record.weight_kg.is_none());
    }

    #[test]
    fn test_user_role_defaults_to_doctor() {
        let row: StoredRow<UserFields> = serde_json::from_value(json!({
            "id": "recU",
            "createdTime": "2024-03-05T10:00:00.000Z",
            "fields": {"Name": "Dr. A", "Role": "chief"}
        }))
        .unwrap();
        let user = User::from(row);
        assert_eq!(user.role, UserRole::Doctor);
        assert_eq!(user.email, "");
    }
}
