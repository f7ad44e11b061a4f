//! 通用工具函数

use chrono::NaiveDate;

/// 将任意文本转换为可用作文件名的片段
///
/// 保留字母（包括西里尔字母）、数字以及 `.`、`-`、`_`，其余字符替换为 `_`，
/// 连续的 `_` 合并为一个。
pub fn sanitize_file_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.trim().chars() {
        let mapped = if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
            c
        } else {
            '_'
        };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
    }
    let trimmed = out.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        "patient".to_string()
    } else {
        trimmed.to_string()
    }
}

/// 报告文件名：`<患者姓名>_<YYYY-MM-DD>.pdf`
pub fn report_file_name(patient_name: &str, date: NaiveDate) -> String {
    format!(
        "{}_{}.pdf",
        sanitize_file_component(patient_name),
        date.format("%Y-%m-%d")
    )
}

/// 按字符截断（不会切断多字节字符），超出时追加省略号
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}…", head.trim_end())
    } else {
        head
    }
}
