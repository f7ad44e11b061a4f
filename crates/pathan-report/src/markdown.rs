//! 模型输出的 markdown 清理
//!
//! PDF 中不渲染 markdown：去掉加粗与标题标记，列表符号统一为 `- `。

use regex::Regex;
use std::sync::OnceLock;

fn heading_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*#{1,6}\s*").ok()).as_ref()
}

fn bullet_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\s*)[*+]\s+").ok()).as_ref()
}

/// 清理单行
fn clean_line(line: &str) -> String {
    let mut line = line.replace("**", "").replace("__", "");
    if let Some(re) = heading_regex() {
        line = re.replace(&line, "").into_owned();
    }
    if let Some(re) = bullet_regex() {
        line = re.replace(&line, "${1}- ").into_owned();
    }
    line.trim_end().to_string()
}

/// 清理整段文本，连续空行合并为一个
pub fn clean_markdown(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in text.lines() {
        let cleaned = clean_line(line);
        if cleaned.is_empty() && out.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        out.push(cleaned);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
