//! Web服务器

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use pathan_core::{PathanError, Result};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::auth::{auth_middleware, login_handler, logout_handler, me_handler, register_handler};
use crate::handlers::{
    api_root, chat, download_report, get_session, health, list_records, reset_session, run_analysis,
    update_patient, upload_image,
};
use crate::state::AppState;
use crate::static_files::index;

/// 上传图像的请求体上限
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            addr,
            app: build_router(state),
        }
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| PathanError::Internal(format!("Failed to start web server: {}", e)))?;

        Ok(())
    }
}

/// 构建完整路由
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(logout_handler))
        .route("/auth/me", get(me_handler))
        .nest("/api/v1", api_routes())
        .route_layer(middleware::from_fn_with_state(state.auth.clone(), auth_middleware));

    Router::new()
        .route("/", get(index))
        .route("/api", get(api_root))
        .route("/health", get(health))
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

/// API v1 路由
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/session", get(get_session))
        .route("/session/patient", put(update_patient))
        .route("/session/image", post(upload_image))
        .route("/session/analysis", post(run_analysis))
        .route("/session/chat", post(chat))
        .route("/session/report", get(download_report))
        .route("/session/reset", post(reset_session))
        .route("/records", get(list_records))
}
