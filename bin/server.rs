// Baby Naming - Web Server
// REST API for the mini-program with Axum

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use baby_naming::api::{self, AppState};
use baby_naming::{open_database, DeepSeekClient, ServerArgs, WeChatClient};

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let args = ServerArgs::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("baby_naming={},naming_server={},info", args.log_level, args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("🌐 Baby Naming - Web Server v{}", baby_naming::VERSION);

    let conn = open_database(&args.db_path)?;
    info!(path = ?args.db_path, "database opened");

    if args.deepseek_api_key.is_none() {
        warn!("DEEPSEEK_API_KEY not set: /api/naming and /api/analysis will return 503");
    }
    if args.wx_appid.is_none() {
        warn!("WX_APPID not set: /api/auth/login will return 503");
    }

    let generator = DeepSeekClient::new(args.llm_config()).context("Failed to build text-generation client")?;
    let wechat = WeChatClient::new(args.wx_appid.clone(), args.wx_appsecret.clone())
        .context("Failed to build WeChat client")?;

    let state = AppState::new(conn, Box::new(generator), wechat)?;
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", args.listen))?;

    info!("🚀 Server running on http://{}", args.listen);
    info!("   API: http://{}/api/health", args.listen);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
