// 🔑 WeChat Login - Exchange a mini-program login code for an openid

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_WECHAT_BASE_URL: &str = "https://api.weixin.qq.com";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("WX_APPID / WX_APPSECRET are not configured")]
    NotConfigured,

    #[error("login code is required")]
    MissingCode,

    #[error("request to WeChat failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("WeChat rejected login ({code}): {message}")]
    WeChat { code: i64, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WxSession {
    pub openid: String,
    pub session_key: String,
}

/// jscode2session body: either the session or an errcode
#[derive(Debug, Default, Deserialize)]
struct SessionReply {
    openid: Option<String>,
    session_key: Option<String>,
    #[serde(default)]
    errcode: i64,
    errmsg: Option<String>,
}

impl SessionReply {
    fn into_session(self) -> Result<WxSession, AuthError> {
        if self.errcode != 0 {
            return Err(AuthError::WeChat {
                code: self.errcode,
                message: self.errmsg.unwrap_or_default(),
            });
        }

        match self.openid.filter(|o| !o.is_empty()) {
            Some(openid) => Ok(WxSession {
                openid,
                session_key: self.session_key.unwrap_or_default(),
            }),
            None => Err(AuthError::WeChat {
                code: -1,
                message: "reply carried no openid".to_string(),
            }),
        }
    }
}

pub struct WeChatClient {
    app_id: Option<String>,
    secret: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl WeChatClient {
    pub fn new(app_id: Option<String>, secret: Option<String>) -> Result<Self, AuthError> {
        Self::with_base_url(app_id, secret, DEFAULT_WECHAT_BASE_URL)
    }

    pub fn with_base_url(
        app_id: Option<String>,
        secret: Option<String>,
        base_url: &str,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(WeChatClient {
            app_id: app_id.filter(|s| !s.is_empty()),
            secret: secret.filter(|s| !s.is_empty()),
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.app_id.is_some() && self.secret.is_some()
    }

    fn session_url(&self, code: &str) -> Result<String, AuthError> {
        let (app_id, secret) = match (&self.app_id, &self.secret) {
            (Some(app_id), Some(secret)) => (app_id, secret),
            _ => return Err(AuthError::NotConfigured),
        };

        Ok(format!(
            "{}/sns/jscode2session?appid={}&secret={}&js_code={}&grant_type=authorization_code",
            self.base_url,
            urlencoding::encode(app_id),
            urlencoding::encode(secret),
            urlencoding::encode(code),
        ))
    }

    pub async fn exchange_code(&self, code: &str) -> Result<WxSession, AuthError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::MissingCode);
        }
        let url = self.session_url(code)?;

        // WeChat answers 200 with an errcode body on failure
        let reply: SessionReply = self.http.get(url).send().await?.json().await?;
        reply.into_session().map_err(|e| {
            warn!(error = %e, "jscode2session failed");
            e
        })
    }
}
