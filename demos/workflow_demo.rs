//! 分析流程演示程序
//!
//! 使用模拟模型后端和内存记录存储，完整走一遍：
//! 注册登录 → 填写表单 → 上传切片 → 运行分析（含模型回退）→ 追问 → 导出报告

use chrono::NaiveDate;
use image::{ImageOutputFormat, Rgb, RgbImage};
use pathan_core::{default_birth_date, BiopsyMethod, Gender, PatientRecord, SmokingStatus, TissueType};
use pathan_llm::{CandidateSource, GenerationService, ModelSelector, ScriptedBackend};
use pathan_records::{MemoryRecordStore, RecordService};
use pathan_report::ReportExporter;
use pathan_workflow::{validate_image, AnalysisEngine, AnalysisSession};
use std::io::Cursor;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🔬 PathanAI 分析流程演示\n");

    // 第一个候选模型配额耗尽，第二个返回结论
    let backend = ScriptedBackend::new()
        .fail("gemini-1.5-flash", "429 quota exceeded")
        .succeed(
            "gemini-1.5-pro",
            "## Микроскопическое описание\n\
             **Эпителий** сохранён, атипии не выявлено.\n\
             * Воспалительная инфильтрация умеренная\n\n\
             <<<SUMMARY>>>Хронический воспалительный процесс без признаков малигнизации.<<<END>>>",
        );
    let backend = Arc::new(backend);
    let selector = ModelSelector::new(CandidateSource::Fixed(vec![
        "gemini-1.5-flash".to_string(),
        "gemini-1.5-pro".to_string(),
    ]));

    let store = Arc::new(MemoryRecordStore::new());
    let records = Arc::new(RecordService::new(store.clone()));
    let engine = AnalysisEngine::new(
        GenerationService::new(backend.clone(), selector),
        records.clone(),
        ReportExporter::default(),
    );

    // 1. 注册与登录
    records.register("Dr. A", "secret", "dr.a@example.org").await?;
    let user = records
        .authenticate("Dr. A", "secret")
        .await?
        .ok_or_else(|| anyhow::anyhow!("login failed"))?;
    println!("✅ 已登录: {} ({})", user.name, user.id);

    // 2. 表单与图像
    let mut session = AnalysisSession::new();
    session.update_patient(PatientRecord {
        name: "Иванов И.И.".to_string(),
        gender: Gender::Male,
        weight_kg: 70.0,
        birth_date: NaiveDate::from_ymd_opt(1968, 4, 12).unwrap_or_else(default_birth_date),
        smoking: SmokingStatus::Former,
        biopsy_method: BiopsyMethod::Smear,
        tissue_type: TissueType::Mucosa,
        anamnesis: "Жалобы на боли в эпигастрии".to_string(),
    })?;
    session.accept_image(validate_image("slide.png", sample_slide()?)?)?;
    println!("📋 会话状态: {:?}", session.state());

    // 3. 运行分析
    let outcome = engine.run(&mut session, Some(&user)).await?;
    println!(
        "🤖 模型 {} 在第 {} 次尝试成功, 保存状态: {:?}",
        outcome.model, outcome.attempts, outcome.persistence
    );
    if let Some(result) = session.result() {
        println!("\n📝 简要结论: {}", result.short_summary);
    }

    // 4. 追问
    let answer = engine.ask(&mut session, "Есть ли признаки дисплазии?").await?;
    println!("\n💬 追问回答: {}", answer);

    // 5. 报告
    let report = engine.report(&mut session)?;
    std::fs::write(&report.file_name, &report.bytes)?;
    println!("\n📄 报告已写入 {} ({} 字节)", report.file_name, report.bytes.len());

    // 6. 历史记录
    for record in records.list_for_owner(&user.id).await? {
        println!("🗂  {} | {} | {}", record.created_at, record.patient_name, record.short_summary);
    }

    println!("\n会话视图:\n{}", serde_json::to_string_pretty(&session.view())?);
    println!("模型调用顺序: {:?}", backend.calls());
    Ok(())
}

/// 生成一张模拟的粉色染色切片
fn sample_slide() -> anyhow::Result<Vec<u8>> {
    let img = RgbImage::from_fn(64, 48, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            Rgb([232, 170, 200])
        } else {
            Rgb([120, 60, 140])
        }
    });
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)?;
    Ok(bytes)
}
