//! Server configuration
//!
//! CLI arguments with environment fallbacks. `.env` is loaded by the
//! server binary before parsing.

use crate::llm::{LlmConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Naming server - bazi charts, name generation and user records over HTTP
#[derive(Parser, Debug, Clone)]
#[command(name = "naming-server")]
#[command(about = "HTTP backend for the baby-naming mini-program")]
pub struct ServerArgs {
    /// SQLite database file
    #[arg(long, env = "NAMING_DB_PATH", default_value = "naming.db")]
    pub db_path: PathBuf,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// API key for the text-generation service (naming and analysis are
    /// unavailable without it)
    #[arg(long, env = "DEEPSEEK_API_KEY", hide_env_values = true)]
    pub deepseek_api_key: Option<String>,

    #[arg(long, env = "DEEPSEEK_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub deepseek_base_url: String,

    #[arg(long, env = "DEEPSEEK_MODEL", default_value = DEFAULT_MODEL)]
    pub deepseek_model: String,

    /// Text-generation request timeout in seconds
    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value = "60")]
    pub llm_timeout_secs: u64,

    /// Mini-program app id (login is disabled without it)
    #[arg(long, env = "WX_APPID")]
    pub wx_appid: Option<String>,

    #[arg(long, env = "WX_APPSECRET", hide_env_values = true)]
    pub wx_appsecret: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl ServerArgs {
    pub fn validate(&self) -> Result<(), String> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(format!(
                "LOG_LEVEL must be one of {}, got {:?}",
                LOG_LEVELS.join(", "),
                self.log_level
            ));
        }

        if self.llm_timeout_secs == 0 {
            return Err("LLM_TIMEOUT_SECS must be greater than 0".to_string());
        }

        if self.wx_appid.is_some() != self.wx_appsecret.is_some() {
            return Err("WX_APPID and WX_APPSECRET must be set together".to_string());
        }

        Ok(())
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            api_key: self.deepseek_api_key.clone(),
            base_url: self.deepseek_base_url.clone(),
            model: self.deepseek_model.clone(),
            timeout: Duration::from_secs(self.llm_timeout_secs),
        }
    }
}
