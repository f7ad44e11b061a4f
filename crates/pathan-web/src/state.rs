//! 路由共享状态

use pathan_workflow::AnalysisEngine;
use std::sync::Arc;

use crate::auth::AuthService;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub engine: Arc<AnalysisEngine>,
}

impl AppState {
    pub fn new(engine: AnalysisEngine) -> Self {
        let engine = Arc::new(engine);
        Self {
            auth: Arc::new(AuthService::new(engine.records().clone())),
            engine,
        }
    }
}
