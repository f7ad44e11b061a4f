//! 分析引擎
//!
//! 协调会话状态机、生成服务、记录存储和报告导出：
//! 运行分析 → 保存结果 → 生成报告，以及基于结果的追问。

use chrono::Local;
use pathan_core::{ChatTurn, PathanError, PatientRecord, Result, UploadedImage, User};
use pathan_llm::GenerationService;
use pathan_records::RecordService;
use pathan_report::{ReportDocument, ReportExporter};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::session::{analysis_result, AnalysisSession, PersistenceStatus};
use crate::state_machine::AnalysisState;

/// 一次运行的结果摘要
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub model: String,
    pub attempts: usize,
    pub persistence: PersistenceStatus,
    pub report_ready: bool,
}

/// 分析引擎
pub struct AnalysisEngine {
    generation: GenerationService,
    records: Arc<RecordService>,
    exporter: ReportExporter,
}

impl AnalysisEngine {
    pub fn new(generation: GenerationService, records: Arc<RecordService>, exporter: ReportExporter) -> Self {
        Self {
            generation,
            records,
            exporter,
        }
    }

    pub fn records(&self) -> &Arc<RecordService> {
        &self.records
    }

    /// 运行分析
    ///
    /// 生成失败时会话回到可运行状态且不保存任何记录；保存或报告失败
    /// 只记录在会话中，不影响结果展示。
    pub async fn run(&self, session: &mut AnalysisSession, owner: Option<&User>) -> Result<RunOutcome> {
        let input = session.begin_run()?;
        let mut session = Rollback::new(session, abandon_run);
        info!(
            "Session {}: running analysis on {} via {}",
            session.id(),
            input.image.file_name,
            self.generation.backend_name()
        );

        let output = match self.generation.analyze(&input.patient, &input.image).await {
            Ok(output) => output,
            Err(e) => {
                error!("Session {}: analysis failed: {}", session.id(), e);
                let err = PathanError::from(e);
                session.fail_run(err.to_string())?;
                session.commit();
                return Err(err);
            }
        };

        let result = analysis_result(
            output.full_text,
            output.short_summary,
            output.model.clone(),
            &input.image.file_name,
        );
        session.complete_run(result.clone(), output.prompt, output.raw_text)?;
        session.commit();

        let persistence = match owner {
            None => PersistenceStatus::Skipped,
            Some(user) => match self.records.persist(&user.id, &input.patient, &result).await {
                Ok(record_id) => PersistenceStatus::Saved { record_id },
                Err(e) => {
                    warn!("Session {}: saving result failed: {}", session.id(), e);
                    PersistenceStatus::Failed {
                        message: e.to_string(),
                    }
                }
            },
        };
        session.set_persistence(persistence.clone());

        let report = match self.render(&input.patient, &result.full_text, Some(&input.image)) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Session {}: report export failed: {}", session.id(), e);
                None
            }
        };
        let report_ready = report.is_some();
        session.set_report(report);

        Ok(RunOutcome {
            model: output.model,
            attempts: output.attempts,
            persistence,
            report_ready,
        })
    }

    /// 基于已完成的分析追问
    pub async fn ask(&self, session: &mut AnalysisSession, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PathanError::Validation("问题不能为空".to_string()));
        }

        let (model, image) = match (session.result(), session.image()) {
            (Some(result), Some(image)) => (result.model.clone(), image.clone()),
            _ => {
                return Err(PathanError::InvalidStateTransition {
                    from: format!("{:?}", session.state()),
                    event: "ChatTurn".to_string(),
                })
            }
        };

        session.push_turn(ChatTurn::user(question))?;
        let mut session = Rollback::new(session, abandon_turn);
        let reply = self.generation.follow_up(&model, session.transcript(), &image).await;
        match reply {
            Ok((_, answer)) => {
                session.push_turn(ChatTurn::model(answer.clone()))?;
                session.commit();
                Ok(answer)
            }
            Err(e) => {
                warn!("Session {}: follow-up failed: {}", session.id(), e);
                Err(e.into())
            }
        }
    }

    /// 获取报告；运行时未能生成的报告在此重新生成
    pub fn report(&self, session: &mut AnalysisSession) -> Result<ReportDocument> {
        if session.state() != AnalysisState::Completed {
            return Err(PathanError::NotFound("当前会话没有可下载的报告".to_string()));
        }
        if let Some(report) = session.report() {
            return Ok(report.clone());
        }

        let full_text = session
            .result()
            .map(|r| r.full_text.clone())
            .ok_or_else(|| PathanError::NotFound("当前会话没有分析结果".to_string()))?;
        let report = self.render(session.patient(), &full_text, session.image())?;
        session.set_report(Some(report.clone()));
        Ok(report)
    }

    fn render(
        &self,
        patient: &PatientRecord,
        conclusion: &str,
        image: Option<&UploadedImage>,
    ) -> Result<ReportDocument> {
        Ok(self
            .exporter
            .export(patient, conclusion, image, Local::now().date_naive())?)
    }
}

/// 会话回滚守卫
///
/// 请求的 future 在 await 处被丢弃（客户端断开、超时）时，由 `Drop`
/// 执行回滚，避免会话停留在中间状态。调用 `commit` 后不再回滚。
struct Rollback<'a> {
    session: &'a mut AnalysisSession,
    undo: Option<fn(&mut AnalysisSession)>,
}

impl<'a> Rollback<'a> {
    fn new(session: &'a mut AnalysisSession, undo: fn(&mut AnalysisSession)) -> Self {
        Self {
            session,
            undo: Some(undo),
        }
    }

    fn commit(&mut self) {
        self.undo = None;
    }
}

impl Deref for Rollback<'_> {
    type Target = AnalysisSession;

    fn deref(&self) -> &AnalysisSession {
        self.session
    }
}

impl DerefMut for Rollback<'_> {
    fn deref_mut(&mut self) -> &mut AnalysisSession {
        self.session
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if let Some(undo) = self.undo.take() {
            undo(self.session);
        }
    }
}

fn abandon_run(session: &mut AnalysisSession) {
    if session.state() == AnalysisState::Running {
        warn!("Session {}: analysis interrupted, returning to ready state", session.id());
        if let Err(e) = session.fail_run("分析被中断") {
            error!("Session {}: rollback failed: {}", session.id(), e);
        }
    }
}

fn abandon_turn(session: &mut AnalysisSession) {
    if session.pop_turn().is_some() {
        warn!("Session {}: follow-up interrupted, question discarded", session.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::upload;
    use pathan_core::UserRole;
    use pathan_llm::{CandidateSource, ModelSelector, ScriptedBackend};
    use pathan_records::MemoryRecordStore;
    use std::time::Duration;

    struct Fixture {
        backend: Arc<ScriptedBackend>,
        store: Arc<MemoryRecordStore>,
        engine: AnalysisEngine,
    }

    fn fixture(backend: ScriptedBackend, candidates: &[&str]) -> Fixture {
        let backend = Arc::new(backend);
        let store = Arc::new(MemoryRecordStore::new());
        let generation = GenerationService::new(
            backend.clone(),
            ModelSelector::new(CandidateSource::Fixed(
                candidates.iter().map(|c| c.to_string()).collect(),
            )),
        );
        let engine = AnalysisEngine::new(
            generation,
            Arc::new(RecordService::new(store.clone())),
            ReportExporter::default(),
        );
        Fixture {
            backend,
            store,
            engine,
        }
    }

    fn doctor() -> User {
        User {
            id: "recDOC".to_string(),
            name: "Dr. A".to_string(),
            email: String::new(),
            role: UserRole::Doctor,
        }
    }

    fn ready_session() -> AnalysisSession {
        let mut session = AnalysisSession::new();
        session
            .update_patient(PatientRecord {
                name: "Иванов И.И.".to_string(),
                weight_kg: 70.0,
                ..Default::default()
            })
            .unwrap();
        session.accept_image(upload("slide.png")).unwrap();
        session
    }

    #[tokio::test]
    async fn test_run_completes_persists_and_exports() {
        let f = fixture(
            ScriptedBackend::new()
                .fail("flash", "quota")
                .succeed("pro", "Описание.\n<<<SUMMARY>>>Норма.<<<END>>>"),
            &["flash", "pro"],
        );
        let mut session = ready_session();

        let outcome = f.engine.run(&mut session, Some(&doctor())).await.unwrap();
        assert_eq!(outcome.model, "pro");
        assert_eq!(outcome.attempts, 2);
        assert!(outcome.report_ready);
        assert!(matches!(outcome.persistence, PersistenceStatus::Saved { .. }));

        assert_eq!(session.state(), AnalysisState::Completed);
        let result = session.result().unwrap();
        assert_eq!(result.short_summary, "Норма.");
        assert_eq!(result.source_image, "slide.png");
        assert_eq!(f.store.analysis_count().await, 1);
        assert_eq!(f.backend.calls(), vec!["flash", "pro"]);
    }

    #[tokio::test]
    async fn test_all_candidates_failing_persists_nothing() {
        let f = fixture(
            ScriptedBackend::new().fail("flash", "quota").fail("pro", "down"),
            &["flash", "pro"],
        );
        let mut session = ready_session();

        let err = f.engine.run(&mut session, Some(&doctor())).await.unwrap_err();
        assert!(matches!(err, PathanError::Generation(_)));
        assert_eq!(session.state(), AnalysisState::ReadyToRun);
        assert!(session.result().is_none());
        assert!(session.last_error().is_some());
        assert_eq!(f.store.analysis_count().await, 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_result_and_report() {
        let f = fixture(ScriptedBackend::new().succeed("flash", "Текст заключения"), &["flash"]);
        f.store.set_unavailable(true);
        let mut session = ready_session();

        let outcome = f.engine.run(&mut session, Some(&doctor())).await.unwrap();
        assert!(matches!(outcome.persistence, PersistenceStatus::Failed { .. }));
        assert_eq!(session.state(), AnalysisState::Completed);
        assert!(session.result().is_some());

        let report = f.engine.report(&mut session).unwrap();
        assert!(report.bytes.starts_with(b"%PDF"));
        assert!(report.file_name.ends_with(".pdf"));
    }

    #[tokio::test]
    async fn test_anonymous_run_skips_persistence() {
        let f = fixture(ScriptedBackend::new().succeed("flash", "Текст"), &["flash"]);
        let mut session = ready_session();
        let outcome = f.engine.run(&mut session, None).await.unwrap();
        assert_eq!(outcome.persistence, PersistenceStatus::Skipped);
        assert_eq!(f.store.analysis_count().await, 0);
    }

    #[tokio::test]
    async fn test_follow_up_uses_transcript() {
        let f = fixture(
            ScriptedBackend::new()
                .succeed("flash", "Первичное описание")
                .succeed("pro", "не должен вызываться"),
            &["flash", "pro"],
        );
        let mut session = ready_session();
        f.engine.run(&mut session, None).await.unwrap();

        let answer = f.engine.ask(&mut session, "Есть ли митозы?").await.unwrap();
        assert_eq!(answer, "Первичное описание");
        assert_eq!(session.chat().len(), 3);

        let request = f.backend.last_request().unwrap();
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[2].text, "Есть ли митозы?");
        assert_eq!(f.backend.calls(), vec!["flash", "flash"]);
    }

    #[tokio::test]
    async fn test_follow_up_before_completion_is_rejected() {
        let f = fixture(ScriptedBackend::new().succeed("flash", "x"), &["flash"]);
        let mut session = ready_session();
        let err = f.engine.ask(&mut session, "вопрос").await.unwrap_err();
        assert!(matches!(err, PathanError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_interrupted_run_returns_session_to_ready() {
        let f = fixture(ScriptedBackend::new().stall("slow"), &["slow"]);
        let mut session = ready_session();

        let interrupted =
            tokio::time::timeout(Duration::from_millis(50), f.engine.run(&mut session, None)).await;
        assert!(interrupted.is_err());

        assert_eq!(session.state(), AnalysisState::ReadyToRun);
        assert!(session.last_error().is_some());
        session.accept_image(upload("second.png")).unwrap();
        assert_eq!(session.state(), AnalysisState::ReadyToRun);
        session.reset().unwrap();
        assert_eq!(session.state(), AnalysisState::AwaitingUpload);
    }

    #[tokio::test]
    async fn test_interrupted_follow_up_discards_question() {
        let f = fixture(ScriptedBackend::new().stall("slow"), &["slow"]);
        let mut session = ready_session();
        session.begin_run().unwrap();
        session
            .complete_run(
                analysis_result("Описание".into(), "Кратко".into(), "slow".into(), "slide.png"),
                "prompt".into(),
                "Описание".into(),
            )
            .unwrap();

        let interrupted = tokio::time::timeout(
            Duration::from_millis(50),
            f.engine.ask(&mut session, "Есть ли митозы?"),
        )
        .await;
        assert!(interrupted.is_err());
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.state(), AnalysisState::Completed);
    }

    #[tokio::test]
    async fn test_failed_follow_up_discards_question() {
        let f = fixture(ScriptedBackend::new().succeed("flash", "Описание"), &["flash"]);
        let mut session = ready_session();
        f.engine.run(&mut session, None).await.unwrap();
        // 追问时模型已不可用
        let f = fixture(ScriptedBackend::new().fail("flash", "down"), &["flash"]);
        assert!(f.engine.ask(&mut session, "вопрос").await.is_err());
        assert_eq!(session.chat().len(), 1);
    }

    #[tokio::test]
    async fn test_report_unavailable_before_completion() {
        let f = fixture(ScriptedBackend::new(), &["flash"]);
        let mut session = ready_session();
        assert!(matches!(f.engine.report(&mut session), Err(PathanError::NotFound(_))));
    }
}
