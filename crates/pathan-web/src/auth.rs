//! 用户认证与会话管理
//!
//! 登录成功后签发不透明的会话令牌；每个令牌拥有独立的分析会话，
//! 由各自的异步互斥锁保护。

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use pathan_core::{PathanError, User};
use pathan_records::RecordService;
use pathan_workflow::AnalysisSession;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// 登录请求
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

/// 注册请求
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
}

/// 登录响应
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// 一个已登录会话
#[derive(Debug)]
pub struct UserSession {
    pub token: String,
    pub user: User,
    pub created_at: DateTime<Utc>,
    /// 会话私有的分析上下文
    pub analysis: Mutex<AnalysisSession>,
}

/// 认证服务
pub struct AuthService {
    records: Arc<RecordService>,
    sessions: RwLock<HashMap<String, Arc<UserSession>>>,
}

impl AuthService {
    pub fn new(records: Arc<RecordService>) -> Self {
        Self {
            records,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// 用户登录
    ///
    /// 每个用户只保留一个会话：重新登录会关闭之前的会话及其分析上下文。
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, ApiError> {
        let user = self
            .records
            .authenticate(&request.name, &request.password)
            .await?
            .ok_or_else(|| PathanError::Authentication("用户名或密码错误".to_string()))?;

        let token = Uuid::new_v4().simple().to_string();
        let session = Arc::new(UserSession {
            token: token.clone(),
            user: user.clone(),
            created_at: Utc::now(),
            analysis: Mutex::new(AnalysisSession::new()),
        });
        {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, existing| existing.user.id != user.id);
            if sessions.len() < before {
                info!("User {} logged in again, previous session closed", user.id);
            }
            sessions.insert(token.clone(), session);
        }

        info!("User {} logged in", user.id);
        Ok(LoginResponse { token, user })
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<bool, ApiError> {
        Ok(self
            .records
            .register(&request.name, &request.password, &request.email)
            .await?)
    }

    /// 按令牌查找会话
    pub async fn session(&self, token: &str) -> Option<Arc<UserSession>> {
        self.sessions.read().await.get(token).cloned()
    }

    pub async fn logout(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// 认证中间件：将会话放入请求扩展
pub async fn auth_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = bearer_token(&request)
        .ok_or_else(|| PathanError::Authentication("缺少访问令牌".to_string()))?
        .to_string();

    match auth_service.session(&token).await {
        Some(session) => {
            request.extensions_mut().insert(session);
            Ok(next.run(request).await)
        }
        None => {
            warn!("Rejected request with unknown session token");
            Err(PathanError::Authentication("会话无效或已过期".to_string()).into())
        }
    }
}

/// 登录处理器
pub async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.auth.login(request).await?))
}

/// 注册处理器
pub async fn register_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = request.name.trim().to_string();
    if state.auth.register(request).await? {
        Ok(Json(json!({ "registered": true, "name": name })))
    } else {
        Err(PathanError::Validation(format!("用户名已存在: {}", name)).into())
    }
}

/// 注销
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<UserSession>>,
) -> impl IntoResponse {
    state.auth.logout(&session.token).await;
    info!("User {} logged out", session.user.id);
    Json(json!({ "logged_out": true }))
}

/// 获取当前用户信息
pub async fn me_handler(Extension(session): Extension<Arc<UserSession>>) -> impl IntoResponse {
    Json(json!({
        "user": session.user,
        "session_started": session.created_at.to_rfc3339(),
    }))
}
