//! HTTP处理器

use axum::{
    extract::{Multipart, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Json, Response},
    Extension,
};
use pathan_core::{PathanError, PatientRecord, UserRole};
use pathan_workflow::validate_image;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::UserSession;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// 上传表单中的文件字段名
pub const UPLOAD_FIELD: &str = "file";

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "PathanAI API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "auth": "/auth",
            "session": "/api/v1/session",
            "records": "/api/v1/records"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 当前会话视图
pub async fn get_session(Extension(session): Extension<Arc<UserSession>>) -> impl IntoResponse {
    let analysis = session.analysis.lock().await;
    Json(analysis.view())
}

/// 更新患者表单
pub async fn update_patient(
    Extension(session): Extension<Arc<UserSession>>,
    Json(patient): Json<PatientRecord>,
) -> ApiResult<impl IntoResponse> {
    let mut analysis = session.analysis.lock().await;
    analysis.update_patient(patient)?;
    debug!("Session {}: patient form updated", analysis.id());
    Ok(Json(analysis.view()))
}

/// 上传切片图像（multipart，字段名 `file`）
pub async fn upload_image(
    Extension(session): Extension<Arc<UserSession>>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut upload = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| PathanError::Validation(format!("读取上传文件失败: {}", e)))?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }

    let (file_name, bytes) = upload
        .ok_or_else(|| PathanError::Validation(format!("缺少上传字段 `{}`", UPLOAD_FIELD)))?;
    let image = validate_image(&file_name, bytes)?;

    let mut analysis = session.analysis.lock().await;
    analysis.accept_image(image)?;
    info!("Session {}: image {} uploaded", analysis.id(), file_name);
    Ok(Json(analysis.view()))
}

/// 运行分析
pub async fn run_analysis(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<UserSession>>,
) -> ApiResult<impl IntoResponse> {
    let mut analysis = session.analysis.lock().await;
    let outcome = state.engine.run(&mut analysis, Some(&session.user)).await?;
    Ok(Json(json!({
        "model": outcome.model,
        "attempts": outcome.attempts,
        "persistence": outcome.persistence,
        "report_ready": outcome.report_ready,
        "session": analysis.view(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

/// 基于结果的追问
pub async fn chat(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<UserSession>>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut analysis = session.analysis.lock().await;
    let answer = state.engine.ask(&mut analysis, &request.question).await?;
    Ok(Json(json!({
        "answer": answer,
        "chat": analysis.chat(),
    })))
}

/// 下载PDF报告
pub async fn download_report(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<UserSession>>,
) -> ApiResult<Response> {
    let mut analysis = session.analysis.lock().await;
    let report = state.engine.report(&mut analysis)?;
    info!("Session {}: report {} downloaded", analysis.id(), report.file_name);

    let disposition = HeaderValue::from_str(&content_disposition(&report.file_name))
        .map_err(|e| PathanError::Internal(format!("无效的文件名头: {}", e)))?;
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(report.content_type())),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        report.bytes,
    )
        .into_response())
}

/// 重置会话
pub async fn reset_session(Extension(session): Extension<Arc<UserSession>>) -> ApiResult<impl IntoResponse> {
    let mut analysis = session.analysis.lock().await;
    analysis.reset()?;
    Ok(Json(analysis.view()))
}

/// 记录查询范围
#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordScope {
    #[default]
    Mine,
    All,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordQueryParams {
    #[serde(default)]
    pub scope: RecordScope,
}

/// 历史分析记录
pub async fn list_records(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<UserSession>>,
    Query(params): Query<RecordQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let records = state.engine.records();
    let items = match params.scope {
        RecordScope::Mine => records.list_for_owner(&session.user.id).await?,
        RecordScope::All if session.user.role == UserRole::Admin => records.list_all().await?,
        RecordScope::All => {
            return Err(ApiError::Forbidden("仅管理员可以查看全部记录".to_string()));
        }
    };

    Ok(Json(json!({
        "records": items,
        "total": items.len(),
    })))
}

/// 构造 `Content-Disposition`，同时给出ASCII回退名与RFC 5987编码名
pub fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => c,
            _ => '_',
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}
