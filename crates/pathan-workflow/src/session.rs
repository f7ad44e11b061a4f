//! 分析会话上下文
//!
//! 每个登录会话拥有一个独立的 `AnalysisSession`，保存表单、图像、
//! 结果、对话记录和报告。所有状态变化都经过状态机。

use chrono::Utc;
use image::ImageFormat;
use pathan_core::{
    AnalysisResult, ChatTurn, PathanError, PatientRecord, Result, UploadedImage,
};
use pathan_report::ReportDocument;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::state_machine::{AnalysisEvent, AnalysisState, AnalysisStateMachine};

/// 结果保存状态
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PersistenceStatus {
    #[default]
    NotAttempted,
    Saved {
        record_id: String,
    },
    Failed {
        message: String,
    },
    /// 会话没有关联的医生
    Skipped,
}

/// 会话快照（用于展示）
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: String,
    pub state: AnalysisState,
    pub patient: PatientRecord,
    pub image: Option<ImageInfo>,
    pub result: Option<AnalysisResult>,
    pub chat: Vec<ChatTurn>,
    pub persistence: PersistenceStatus,
    pub report_available: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub file_name: String,
    pub content_type: String,
    pub size: usize,
}

/// 开始运行时交给引擎的数据
#[derive(Debug, Clone)]
pub struct RunInput {
    pub patient: PatientRecord,
    pub image: UploadedImage,
}

/// 分析会话
#[derive(Debug)]
pub struct AnalysisSession {
    id: String,
    machine: AnalysisStateMachine,
    state: AnalysisState,
    patient: PatientRecord,
    image: Option<UploadedImage>,
    result: Option<AnalysisResult>,
    /// 对话记录：第一轮为分析提示词，第二轮为模型结论
    transcript: Vec<ChatTurn>,
    persistence: PersistenceStatus,
    report: Option<ReportDocument>,
    last_error: Option<String>,
}

/// 校验上传内容确为 JPEG 或 PNG 并可解码
pub fn validate_image(file_name: &str, bytes: Vec<u8>) -> Result<UploadedImage> {
    if bytes.is_empty() {
        return Err(PathanError::Validation("上传的文件为空".to_string()));
    }

    let format = image::guess_format(&bytes)
        .map_err(|e| PathanError::Validation(format!("无法识别的图像格式: {}", e)))?;
    let content_type = match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        other => {
            return Err(PathanError::Validation(format!(
                "仅支持 JPEG 或 PNG 图像，收到 {:?}",
                other
            )))
        }
    };

    image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| PathanError::Validation(format!("图像无法解码: {}", e)))?;

    Ok(UploadedImage {
        file_name: file_name.trim().to_string(),
        content_type: content_type.to_string(),
        bytes,
    })
}

impl AnalysisSession {
    /// 创建会话并进入等待上传状态
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        let machine = AnalysisStateMachine::new();
        let state = machine
            .transition(AnalysisState::Empty, AnalysisEvent::SessionStarted)
            .unwrap_or(AnalysisState::AwaitingUpload);
        Self {
            id: id.into(),
            machine,
            state,
            patient: PatientRecord::default(),
            image: None,
            result: None,
            transcript: Vec::new(),
            persistence: PersistenceStatus::default(),
            report: None,
            last_error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> AnalysisState {
        self.state
    }

    pub fn patient(&self) -> &PatientRecord {
        &self.patient
    }

    pub fn image(&self) -> Option<&UploadedImage> {
        self.image.as_ref()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    /// 展示用的对话（跳过第一轮提示词）
    pub fn chat(&self) -> &[ChatTurn] {
        self.transcript.get(1..).unwrap_or(&[])
    }

    pub fn persistence(&self) -> &PersistenceStatus {
        &self.persistence
    }

    pub fn report(&self) -> Option<&ReportDocument> {
        self.report.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn fire(&mut self, event: AnalysisEvent) -> Result<()> {
        let next = self.machine.transition(self.state, event)?;
        debug!("Session {}: {:?} --{:?}--> {:?}", self.id, self.state, event, next);
        self.state = next;
        Ok(())
    }

    /// 根据表单与图像是否齐备补发条件事件
    fn rearm(&mut self) -> Result<()> {
        let event = if self.patient.has_name() && self.image.is_some() {
            AnalysisEvent::FormCompleted
        } else {
            AnalysisEvent::FormIncomplete
        };
        self.fire(event)
    }

    fn clear_outputs(&mut self) {
        self.result = None;
        self.transcript.clear();
        self.persistence = PersistenceStatus::NotAttempted;
        self.report = None;
        self.last_error = None;
    }

    /// 更新患者表单
    pub fn update_patient(&mut self, patient: PatientRecord) -> Result<()> {
        if self.state == AnalysisState::Running {
            return Err(PathanError::InvalidStateTransition {
                from: format!("{:?}", self.state),
                event: "FormEdited".to_string(),
            });
        }
        self.patient = patient;
        self.rearm()
    }

    /// 接收上传的图像；已完成状态下会清空原有结果
    pub fn accept_image(&mut self, image: UploadedImage) -> Result<()> {
        if self.state == AnalysisState::Completed {
            self.fire(AnalysisEvent::ImageReplaced)?;
            self.clear_outputs();
            self.fire(AnalysisEvent::SessionStarted)?;
            info!("Session {}: image replaced, previous result discarded", self.id);
        }

        self.fire(AnalysisEvent::ImageAccepted)?;
        debug!("Session {}: accepted {:?}", self.id, image);
        self.image = Some(image);
        self.last_error = None;
        self.rearm()
    }

    /// 开始运行，返回本次运行使用的数据
    pub fn begin_run(&mut self) -> Result<RunInput> {
        if self.state == AnalysisState::ReadyToRun {
            self.patient.validate()?;
        }
        let image = self.image.clone();
        self.fire(AnalysisEvent::RunRequested)?;
        self.last_error = None;

        match image {
            Some(image) => Ok(RunInput {
                patient: self.patient.clone(),
                image,
            }),
            None => {
                self.fire(AnalysisEvent::GenerationFailed)?;
                Err(PathanError::Validation("尚未上传图像".to_string()))
            }
        }
    }

    /// 生成成功：保存结果与对话起点
    pub fn complete_run(&mut self, result: AnalysisResult, prompt: String, raw_answer: String) -> Result<()> {
        self.fire(AnalysisEvent::GenerationSucceeded)?;
        self.transcript = vec![ChatTurn::user(prompt), ChatTurn::model(raw_answer)];
        self.result = Some(result);
        self.persistence = PersistenceStatus::NotAttempted;
        self.report = None;
        Ok(())
    }

    /// 生成失败：回到可运行状态并记录错误
    pub fn fail_run(&mut self, message: impl Into<String>) -> Result<()> {
        self.fire(AnalysisEvent::GenerationFailed)?;
        self.last_error = Some(message.into());
        Ok(())
    }

    pub fn set_persistence(&mut self, status: PersistenceStatus) {
        self.persistence = status;
    }

    pub fn set_report(&mut self, report: Option<ReportDocument>) {
        self.report = report;
    }

    /// 追加一轮对话（仅在已完成状态下）
    pub fn push_turn(&mut self, turn: ChatTurn) -> Result<()> {
        if self.state != AnalysisState::Completed {
            return Err(PathanError::InvalidStateTransition {
                from: format!("{:?}", self.state),
                event: "ChatTurn".to_string(),
            });
        }
        self.transcript.push(turn);
        Ok(())
    }

    /// 撤销最后一轮对话（追问失败时使用）
    pub fn pop_turn(&mut self) -> Option<ChatTurn> {
        if self.transcript.len() > 2 {
            self.transcript.pop()
        } else {
            None
        }
    }

    /// 重置会话：清空表单、图像与结果，重新等待上传
    pub fn reset(&mut self) -> Result<()> {
        self.fire(AnalysisEvent::Reset)?;
        self.patient = PatientRecord::default();
        self.image = None;
        self.clear_outputs();
        self.fire(AnalysisEvent::SessionStarted)?;
        info!("Session {} reset", self.id);
        Ok(())
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id.clone(),
            state: self.state,
            patient: self.patient.clone(),
            image: self.image.as_ref().map(|i| ImageInfo {
                file_name: i.file_name.clone(),
                content_type: i.content_type.clone(),
                size: i.bytes.len(),
            }),
            result: self.result.clone(),
            chat: self.chat().to_vec(),
            persistence: self.persistence.clone(),
            report_available: self.report.is_some()
                || self.state == AnalysisState::Completed,
            last_error: self.last_error.clone(),
        }
    }
}

impl Default for AnalysisSession {
    fn default() -> Self {
        Self::new()
    }
}

/// 构造分析结果
pub fn analysis_result(full_text: String, short_summary: String, model: String, source_image: &str) -> AnalysisResult {
    AnalysisResult {
        full_text,
        short_summary,
        model,
        source_image: source_image.to_string(),
        created_at: Utc::now(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;

    pub(crate) fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(4, 4, Rgb([240, 200, 210]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    pub(crate) fn upload(name: &str) -> UploadedImage {
        validate_image(name, png_bytes()).unwrap()
    }

    fn named(name: &str) -> PatientRecord {
        PatientRecord {
            name: name.to_string(),
            weight_kg: 70.0,
            ..Default::default()
        }
    }

    fn completed_session() -> AnalysisSession {
        let mut session = AnalysisSession::new();
        session.update_patient(named("Иванов")).unwrap();
        session.accept_image(upload("a.png")).unwrap();
        session.begin_run().unwrap();
        session
            .complete_run(
                analysis_result("текст".into(), "кратко".into(), "m".into(), "a.png"),
                "prompt".into(),
                "текст".into(),
            )
            .unwrap();
        session
    }

    #[test]
    fn test_validate_image_accepts_png_and_rejects_garbage() {
        let image = upload("slide.png");
        assert_eq!(image.content_type, "image/png");

        let err = validate_image("notes.txt", b"hello world".to_vec()).unwrap_err();
        assert!(matches!(err, PathanError::Validation(_)));
        assert!(validate_image("empty.png", Vec::new()).is_err());
    }

    #[test]
    fn test_image_without_name_waits_for_form() {
        let mut session = AnalysisSession::new();
        assert_eq!(session.state(), AnalysisState::AwaitingUpload);

        session.accept_image(upload("a.png")).unwrap();
        assert_eq!(session.state(), AnalysisState::AwaitingUpload);
        assert!(session.image().is_some());

        session.update_patient(named("Иванов")).unwrap();
        assert_eq!(session.state(), AnalysisState::ReadyToRun);

        session.update_patient(named("  ")).unwrap();
        assert_eq!(session.state(), AnalysisState::AwaitingUpload);
    }

    #[test]
    fn test_run_requires_ready_state() {
        let mut session = AnalysisSession::new();
        session.update_patient(named("Иванов")).unwrap();
        let err = session.begin_run().unwrap_err();
        assert!(matches!(err, PathanError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_failed_run_reverts_and_records_error() {
        let mut session = AnalysisSession::new();
        session.update_patient(named("Иванов")).unwrap();
        session.accept_image(upload("a.png")).unwrap();
        session.begin_run().unwrap();
        assert_eq!(session.state(), AnalysisState::Running);

        session.fail_run("all candidates failed").unwrap();
        assert_eq!(session.state(), AnalysisState::ReadyToRun);
        assert_eq!(session.last_error(), Some("all candidates failed"));
        assert!(session.result().is_none());
    }

    #[test]
    fn test_replacing_image_after_completion_clears_result_idempotently() {
        let mut session = completed_session();
        assert_eq!(session.state(), AnalysisState::Completed);
        assert_eq!(session.transcript().len(), 2);

        session.accept_image(upload("b.png")).unwrap();
        assert_eq!(session.state(), AnalysisState::ReadyToRun);
        assert!(session.result().is_none());
        assert!(session.transcript().is_empty());
        assert_eq!(session.persistence(), &PersistenceStatus::NotAttempted);

        session.accept_image(upload("c.png")).unwrap();
        assert_eq!(session.state(), AnalysisState::ReadyToRun);
        assert!(session.result().is_none());
        assert_eq!(session.image().map(|i| i.file_name.as_str()), Some("c.png"));
    }

    #[test]
    fn test_replacing_image_without_name_goes_to_awaiting_upload() {
        let mut session = completed_session();
        session.update_patient(named("")).unwrap();
        assert_eq!(session.state(), AnalysisState::Completed);

        session.accept_image(upload("b.png")).unwrap();
        assert_eq!(session.state(), AnalysisState::AwaitingUpload);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut session = completed_session();
        session.reset().unwrap();
        assert_eq!(session.state(), AnalysisState::AwaitingUpload);
        assert!(session.image().is_none());
        assert!(session.result().is_none());
        assert_eq!(session.patient(), &PatientRecord::default());
    }

    #[test]
    fn test_chat_only_when_completed() {
        let mut session = AnalysisSession::new();
        assert!(session.push_turn(ChatTurn::user("?")).is_err());

        let mut session = completed_session();
        session.push_turn(ChatTurn::user("Есть ли атипия?")).unwrap();
        assert_eq!(session.chat().len(), 2);
        assert!(session.pop_turn().is_some());
        assert!(session.pop_turn().is_none());
    }
}
