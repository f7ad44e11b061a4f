//! PathanAI服务器主程序

use anyhow::Context;
use clap::Parser;
use pathan_core::AppConfig;
use pathan_llm::{GeminiClient, GenerationService, ModelSelector};
use pathan_records::{AirtableStore, RecordService};
use pathan_report::ReportExporter;
use pathan_web::{AppState, WebServer};
use pathan_workflow::AnalysisEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// PathanAI服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "pathan-server")]
#[command(about = "PathanAI 组织病理图像AI辅助诊断服务器")]
struct Args {
    /// 监听地址，覆盖配置文件
    #[arg(long)]
    host: Option<String>,

    /// 服务器端口，覆盖配置文件
    #[arg(short, long)]
    port: Option<u16>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("Starting PathanAI server...");

    // 缺少密钥时直接退出
    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("配置错误: {}", e);
            std::process::exit(1);
        }
    };

    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", host, port))?;

    let backend = Arc::new(GeminiClient::new(&config.gemini)?);
    let selector = ModelSelector::from_configured(&config.gemini.models);
    let store = Arc::new(AirtableStore::new(&config.record_store)?);
    let engine = AnalysisEngine::new(
        GenerationService::new(backend, selector),
        Arc::new(RecordService::new(store)),
        ReportExporter::from_config(&config.report),
    );

    info!("Server configuration:");
    info!("  listen address: {}", addr);
    info!("  record store: {}", config.record_store.base_url);
    info!("  fixed candidate models: {}", config.gemini.models.len());

    let server = WebServer::new(addr, AppState::new(engine));
    if let Err(e) = server.run().await {
        error!("Server failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}
