//! 报告版式
//!
//! 先将报告内容组织为与渲染无关的块序列，再由 [`crate::render`] 绘制。
//! 这样报告中出现的文本可以直接在测试中检查。

use chrono::NaiveDate;
use pathan_core::PatientRecord;

use crate::markdown::clean_markdown;

pub const REPORT_TITLE: &str = "PathanAI: Медицинское заключение";
pub const REPORT_SUBTITLE: &str = "Система поддержки принятия врачебных решений";
pub const PATIENT_HEADING: &str = "ДАННЫЕ ПАЦИЕНТА:";
pub const CONCLUSION_HEADING: &str = "ЗАКЛЮЧЕНИЕ ИИ:";
pub const DISCLAIMER: &str =
    "Дисклеймер: Данный отчет создан ИИ-прототипом PathanAI. Требует верификации врачом.";

/// 版式块
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    Subtitle(String),
    /// 带底色的小节标题
    Heading(String),
    /// 正文段落（渲染时自动换行）
    Paragraph(String),
    /// 切片图像占位
    Image,
    /// 垂直间距（毫米）
    Gap(f32),
    /// 页脚说明
    Footer(String),
}

/// 报告输入
#[derive(Debug, Clone, Copy)]
pub struct ReportInput<'a> {
    pub patient: &'a PatientRecord,
    /// 模型给出的完整结论（可能包含 markdown）
    pub conclusion: &'a str,
    pub has_image: bool,
    pub report_date: NaiveDate,
}

/// 报告版式
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLayout {
    pub blocks: Vec<Block>,
}

impl ReportLayout {
    pub fn build(input: &ReportInput<'_>) -> Self {
        let patient = input.patient;
        let mut blocks = vec![
            Block::Title(REPORT_TITLE.to_string()),
            Block::Subtitle(REPORT_SUBTITLE.to_string()),
            Block::Gap(5.0),
            Block::Heading(PATIENT_HEADING.to_string()),
        ];

        blocks.extend(patient_lines(patient, input.report_date).into_iter().map(Block::Paragraph));
        blocks.push(Block::Gap(5.0));

        if input.has_image {
            blocks.push(Block::Image);
            blocks.push(Block::Gap(5.0));
        }

        blocks.push(Block::Heading(CONCLUSION_HEADING.to_string()));
        blocks.push(Block::Gap(2.0));
        let conclusion = clean_markdown(input.conclusion);
        blocks.extend(conclusion.lines().map(|line| Block::Paragraph(line.to_string())));

        blocks.push(Block::Gap(10.0));
        blocks.push(Block::Footer(DISCLAIMER.to_string()));

        Self { blocks }
    }

    /// 全部文本行（不含图像与间距）
    pub fn text_lines(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                Block::Title(t)
                | Block::Subtitle(t)
                | Block::Heading(t)
                | Block::Paragraph(t)
                | Block::Footer(t) => Some(t.as_str()),
                Block::Image | Block::Gap(_) => None,
            })
            .collect()
    }

    /// 患者数据小节中的文本行
    pub fn patient_block(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .skip_while(|b| !matches!(b, Block::Heading(h) if h == PATIENT_HEADING))
            .skip(1)
            .take_while(|b| !matches!(b, Block::Heading(_)))
            .filter_map(|b| match b {
                Block::Paragraph(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_image(&self) -> bool {
        self.blocks.contains(&Block::Image)
    }
}

fn patient_lines(patient: &PatientRecord, report_date: NaiveDate) -> Vec<String> {
    let anamnesis = patient.anamnesis.trim();
    vec![
        format!("Пациент: {}", patient.display_name()),
        format!(
            "Пол: {} | Вес: {} кг | Д.Р.: {}",
            patient.gender.label(),
            patient.weight_label(),
            patient.birth_date.format("%d.%m.%Y")
        ),
        format!("Курение: {}", patient.smoking.label()),
        format!(
            "Биопсия: {} | Ткань: {}",
            patient.biopsy_method.label(),
            patient.tissue_type.label()
        ),
        format!(
            "Анамнез: {}",
            if anamnesis.is_empty() { "нет данных" } else { anamnesis }
        ),
        format!("Дата отчета: {}", report_date.format("%d.%m.%Y")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathan_core::{BiopsyMethod, Gender};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    // 在排版层断言：嵌入TTF字体后PDF内容流按字形ID编码，无法直接搜索原文
    #[test]
    fn test_patient_block_contains_form_values_verbatim() {
        let patient = PatientRecord {
            name: "Иванов И.И.".to_string(),
            gender: Gender::Male,
            weight_kg: 70.0,
            biopsy_method: BiopsyMethod::Smear,
            ..Default::default()
        };
        let layout = ReportLayout::build(&ReportInput {
            patient: &patient,
            conclusion: "Норма",
            has_image: false,
            report_date: date(),
        });

        let block = layout.patient_block().join("\n");
        assert!(block.contains("Иванов И.И."));
        assert!(block.contains("70.0"));
        assert!(block.contains("Мазок"));
        assert!(block.contains("Мужской"));
        assert!(!block.contains("Норма"));
    }

    #[test]
    fn test_sections_in_order_with_cleaned_conclusion() {
        let patient = PatientRecord::default();
        let layout = ReportLayout::build(&ReportInput {
            patient: &patient,
            conclusion: "## Микроскопия\n* **Атипия** отсутствует",
            has_image: true,
            report_date: date(),
        });

        let lines = layout.text_lines();
        assert_eq!(lines[0], REPORT_TITLE);
        assert_eq!(lines[1], REPORT_SUBTITLE);
        assert_eq!(lines.last().copied(), Some(DISCLAIMER));

        let conclusion_at = lines.iter().position(|l| *l == CONCLUSION_HEADING).unwrap();
        assert_eq!(lines[conclusion_at + 1], "Микроскопия");
        assert_eq!(lines[conclusion_at + 2], "- Атипия отсутствует");
        assert!(layout.has_image());
    }

    #[test]
    fn test_image_block_omitted_without_image() {
        let patient = PatientRecord::default();
        let layout = ReportLayout::build(&ReportInput {
            patient: &patient,
            conclusion: "",
            has_image: false,
            report_date: date(),
        });
        assert!(!layout.has_image());
    }
}
