//! 分析提示词与简要结论提取
//!
//! 提示词要求模型在回答末尾给出 `<<<SUMMARY>>> ... <<<END>>>` 块。
//! 若模型未遵守约定，则依次尝试 `ВЫВОД` / `ЗАКЛЮЧЕНИЕ` / `SUMMARY` 标记，
//! 最后退化为截取正文前 200 个字符。

use pathan_core::utils::truncate_chars;
use pathan_core::PatientRecord;
use regex::Regex;
use std::sync::OnceLock;

pub const SUMMARY_START: &str = "<<<SUMMARY>>>";
pub const SUMMARY_END: &str = "<<<END>>>";

/// 无标记时简要结论的最大长度（字符）
pub const SUMMARY_FALLBACK_CHARS: usize = 200;

/// 构造初次分析提示词
pub fn analysis_prompt(patient: &PatientRecord) -> String {
    let anamnesis = patient.anamnesis.trim();
    format!(
        "Ты эксперт-патологоанатом. Проанализируй этот снимок.\n\
         Данные пациента: Пол {gender}, Вес {weight} кг, Д.Р. {dob}, Курение: {smoking}.\n\
         Тип ткани: {tissue}, Метод: {method}.\n\
         Анамнез: {anamnesis}.\n\
         Дай подробное описание: микроскопия, патология, заключение.\n\
         В самом конце ответа кратко (1-2 предложения) сформулируй вывод между маркерами \
         {start} и {end}.\n\
         Будь готов отвечать на уточняющие вопросы врача.",
        gender = patient.gender.label(),
        weight = patient.weight_label(),
        dob = patient.birth_date.format("%d.%m.%Y"),
        smoking = patient.smoking.label(),
        tissue = patient.tissue_type.label(),
        method = patient.biopsy_method.label(),
        anamnesis = if anamnesis.is_empty() { "нет данных" } else { anamnesis },
        start = SUMMARY_START,
        end = SUMMARY_END,
    )
}

/// 模型回答拆分结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitResponse {
    /// 去掉结论块后的完整正文
    pub full_text: String,
    pub short_summary: String,
}

fn marker_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^[\s#*]*(ВЫВОД|ЗАКЛЮЧЕНИЕ|SUMMARY)\b[\s*:]*(.*)$").ok())
        .as_ref()
}

/// 从模型回答中拆出正文与简要结论
pub fn split_summary(response: &str) -> SplitResponse {
    if let Some(start) = response.find(SUMMARY_START) {
        let after = &response[start + SUMMARY_START.len()..];
        let (summary, rest) = match after.find(SUMMARY_END) {
            Some(end) => (&after[..end], &after[end + SUMMARY_END.len()..]),
            None => (after, ""),
        };
        let summary = summary.trim();
        if !summary.is_empty() {
            let full_text = format!("{}{}", &response[..start], rest).trim().to_string();
            return SplitResponse {
                full_text,
                short_summary: summary.to_string(),
            };
        }
    }

    let full_text = response.trim().to_string();
    let short_summary = marker_summary(&full_text)
        .unwrap_or_else(|| truncate_chars(&full_text, SUMMARY_FALLBACK_CHARS));
    SplitResponse {
        full_text,
        short_summary,
    }
}

/// 取最后一个结论标记之后的内容：同行文本，或下一段非空文本
fn marker_summary(text: &str) -> Option<String> {
    let captures = marker_regex()?.captures_iter(text).last()?;
    let inline = captures.get(2).map(|m| m.as_str().trim()).unwrap_or("");
    let candidate = if inline.is_empty() {
        let end = captures.get(0)?.end();
        text[end..]
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())?
            .to_string()
    } else {
        inline.to_string()
    };
    let candidate = candidate.trim_matches(|c| c == '*' || c == ' ').to_string();
    if candidate.is_empty() {
        None
    } else {
        Some(truncate_chars(&candidate, SUMMARY_FALLBACK_CHARS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathan_core::{BiopsyMethod, Gender, TissueType};

    #[test]
    fn test_prompt_contains_russian_labels() {
        let patient = PatientRecord {
            name: "Иванов И.И.".to_string(),
            gender: Gender::Male,
            weight_kg: 70.0,
            biopsy_method: BiopsyMethod::Smear,
            tissue_type: TissueType::Skin,
            anamnesis: "Жалобы на образование кожи".to_string(),
            ..Default::default()
        };
        let prompt = analysis_prompt(&patient);
        assert!(prompt.contains("Пол Мужской"));
        assert!(prompt.contains("Вес 70.0 кг"));
        assert!(prompt.contains("Д.Р. 01.01.1980"));
        assert!(prompt.contains("Метод: Мазок"));
        assert!(prompt.contains("Тип ткани: Кожа"));
        assert!(prompt.contains(SUMMARY_START));
        // 姓名不发送给模型
        assert!(!prompt.contains("Иванов"));
    }

    #[test]
    fn test_split_with_delimited_block() {
        let response = "Микроскопия: ...\nПатология: ...\n<<<SUMMARY>>>\nБазальноклеточная карцинома.\n<<<END>>>";
        let split = split_summary(response);
        assert_eq!(split.short_summary, "Базальноклеточная карцинома.");
        assert_eq!(split.full_text, "Микроскопия: ...\nПатология: ...");
    }

    #[test]
    fn test_split_with_unterminated_block() {
        let split = split_summary("Текст\n<<<SUMMARY>>> Норма");
        assert_eq!(split.short_summary, "Норма");
        assert_eq!(split.full_text, "Текст");
    }

    #[test]
    fn test_split_falls_back_to_heading_marker() {
        let response = "## Микроскопия\nклетки\n\n## ЗАКЛЮЧЕНИЕ:\n**Доброкачественный невус.**\n";
        let split = split_summary(response);
        assert_eq!(split.short_summary, "Доброкачественный невус.");
        assert_eq!(split.full_text, response.trim());
    }

    #[test]
    fn test_split_inline_marker() {
        let split = split_summary("описание\nВЫВОД: воспаление");
        assert_eq!(split.short_summary, "воспаление");
    }

    #[test]
    fn test_split_truncates_without_markers() {
        let response = "а".repeat(500);
        let split = split_summary(&response);
        assert_eq!(split.short_summary.chars().count(), SUMMARY_FALLBACK_CHARS + 1);
        assert!(split.short_summary.ends_with('…'));
        assert_eq!(split.full_text, response);
    }
}
