//! 报告导出演示程序
//!
//! 不调用任何模型，直接把一段Markdown结论排版为PDF。

use chrono::Local;
use pathan::core::{BiopsyMethod, Gender, PatientRecord, TissueType};
use pathan::report::{clean_markdown, ReportExporter, ReportInput, ReportLayout};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let patient = PatientRecord {
        name: "Петрова А.С.".to_string(),
        gender: Gender::Female,
        weight_kg: 58.5,
        biopsy_method: BiopsyMethod::Excisional,
        tissue_type: TissueType::Skin,
        ..Default::default()
    };
    let conclusion = "# Заключение\n\n**Пигментный невус**, пограничный тип.\n\n\n* Атипии нет\n+ Края резекции чистые";

    println!("清理后的结论:\n{}\n", clean_markdown(conclusion));

    let today = Local::now().date_naive();
    let layout = ReportLayout::build(&ReportInput {
        patient: &patient,
        conclusion,
        has_image: false,
        report_date: today,
    });
    for line in layout.text_lines() {
        println!("  {}", line);
    }

    let exporter = ReportExporter::new(std::env::var("PATHAN_REPORT__FONT_PATH").ok().map(Into::into));
    let document = exporter.export(&patient, conclusion, None, today)?;
    std::fs::write(&document.file_name, &document.bytes)?;
    println!("\n📄 {} ({}, {} 字节)", document.file_name, document.content_type(), document.bytes.len());
    Ok(())
}
