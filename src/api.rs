// 🌐 HTTP API - JSON endpoints for the mini-program
// Every response uses the { success, data?, error? } envelope.

use crate::auth::{AuthError, WeChatClient};
use crate::bazi::{self, BaziError};
use crate::db::{self, FavoriteKind};
use crate::expert::{ExpertError, NamingExpert};
use crate::library::{CharacterLibrary, LibraryQuery};
use crate::llm::{LlmError, TextGenerator};
use crate::naming::{NamingRequest, ValidationError};
use crate::page;
use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use rusqlite::Connection;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::error;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub expert: Arc<NamingExpert<Box<dyn TextGenerator>>>,
    pub wechat: Arc<WeChatClient>,
    pub library: &'static CharacterLibrary,
}

impl AppState {
    pub fn new(
        conn: Connection,
        generator: Box<dyn TextGenerator>,
        wechat: WeChatClient,
    ) -> anyhow::Result<Self> {
        let library = CharacterLibrary::builtin()?;
        Ok(AppState {
            db: Arc::new(Mutex::new(conn)),
            expert: Arc::new(NamingExpert::new(generator, library)),
            wechat: Arc::new(wechat),
            library,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".to_string()))
    }
}

// ============================================================================
// Envelope + errors
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// Text-generation or WeChat failed
    Upstream(String),
    /// Feature needs configuration the server does not have
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(detail) => {
                error!(%detail, "request failed");
                "internal server error".to_string()
            }
            ApiError::BadRequest(m)
            | ApiError::NotFound(m)
            | ApiError::Upstream(m)
            | ApiError::Unavailable(m) => m,
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", e))
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<BaziError> for ApiError {
    fn from(e: BaziError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::MissingApiKey => ApiError::Unavailable(e.to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<ExpertError> for ApiError {
    fn from(e: ExpertError) -> Self {
        match e {
            ExpertError::Validation(e) => e.into(),
            ExpertError::InvalidDate(e) => e.into(),
            ExpertError::Llm(e) => e.into(),
            ExpertError::Storage(e) => e.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MissingCode => ApiError::BadRequest(e.to_string()),
            AuthError::NotConfigured => ApiError::Unavailable(e.to_string()),
            AuthError::Transport(_) | AuthError::WeChat { .. } => ApiError::Upstream(e.to_string()),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Extractors
// ============================================================================

/// `Json` whose rejection is a 400 inside the envelope
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(ApiJson(value))
    }
}

/// `Query` whose rejection is a 400 inside the envelope
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: QueryRejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(ApiQuery(value))
    }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaziRequest {
    pub birthday: String,
    pub birth_hour: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub full_name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub code: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub openid: String,
    pub user: db::User,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(rename = "type")]
    pub kind: Option<FavoriteKind>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Deserialize)]
pub struct AddFavoriteRequest {
    #[serde(rename = "type")]
    pub kind: FavoriteKind,
    pub content: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckFavoriteRequest {
    #[serde(rename = "type")]
    pub kind: FavoriteKind,
    pub full_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckFavoriteResponse {
    pub is_favorited: bool,
    pub favorite_id: Option<String>,
}

#[derive(Serialize)]
pub struct Deleted {
    pub deleted: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
    })))
}

/// POST /api/bazi - Chart for a birth date (and optional hour)
async fn compute_bazi(ApiJson(body): ApiJson<BaziRequest>) -> ApiResult<bazi::BaziResult> {
    if let Some(hour) = body.birth_hour {
        if hour > 23 {
            return Err(ValidationError::HourOutOfRange(hour).into());
        }
    }
    let result = bazi::compute_from_str(&body.birthday, body.birth_hour)?;
    Ok(Json(ApiResponse::ok(result)))
}

/// POST /api/naming - Generate candidates
async fn generate_names(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NamingRequest>,
) -> ApiResult<crate::expert::NamingOutcome> {
    let outcome = state.expert.generate_names(Some(state.db.as_ref()), &request).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// POST /api/analysis - Analyse an existing name
async fn analyze_name(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AnalysisRequest>,
) -> ApiResult<crate::naming::NameAnalysis> {
    let analysis = state.expert.analyze_name(&body.full_name).await?;
    Ok(Json(ApiResponse::ok(analysis)))
}

/// GET /api/characters - Search the character library
async fn search_characters(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LibraryQuery>,
) -> ApiResult<page::Page<crate::library::CharacterEntry>> {
    Ok(Json(ApiResponse::ok(state.library.search(&query))))
}

/// POST /api/auth/login - Exchange a login code, create the user on first login
async fn login(State(state): State<AppState>, ApiJson(body): ApiJson<LoginRequest>) -> ApiResult<LoginResponse> {
    let session = state.wechat.exchange_code(&body.code).await?;

    let conn = state.conn()?;
    let user = db::find_or_create_user(&conn, &session.openid)?;
    Ok(Json(ApiResponse::ok(LoginResponse {
        openid: session.openid,
        user,
    })))
}

fn require_user(conn: &Connection, openid: &str) -> Result<db::User, ApiError> {
    db::get_user(conn, openid)?.ok_or_else(|| ApiError::NotFound(format!("user {} not found", openid)))
}

/// GET /api/users/:openid
async fn get_user(State(state): State<AppState>, Path(openid): Path<String>) -> ApiResult<db::User> {
    let conn = state.conn()?;
    Ok(Json(ApiResponse::ok(require_user(&conn, &openid)?)))
}

/// PUT /api/users/:openid - Update nickname / avatar
async fn update_user(
    State(state): State<AppState>,
    Path(openid): Path<String>,
    ApiJson(body): ApiJson<UpdateUserRequest>,
) -> ApiResult<db::User> {
    let conn = state.conn()?;
    let user = db::update_user(&conn, &openid, body.nickname.as_deref(), body.avatar_url.as_deref())?
        .ok_or_else(|| ApiError::NotFound(format!("user {} not found", openid)))?;
    Ok(Json(ApiResponse::ok(user)))
}

/// GET /api/history/:openid - Newest first
async fn list_history(
    State(state): State<AppState>,
    Path(openid): Path<String>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<page::Page<db::HistoryEntry>> {
    let (page_no, size) = page::normalize(query.page, query.page_size, page::DEFAULT_PAGE_SIZE);
    let conn = state.conn()?;
    let records = db::list_history(&conn, &openid, page_no, size, Utc::now())?;
    Ok(Json(ApiResponse::ok(records)))
}

/// GET /api/history/:openid/:id
async fn get_history(
    State(state): State<AppState>,
    Path((openid, id)): Path<(String, String)>,
) -> ApiResult<db::HistoryRecord> {
    let conn = state.conn()?;
    let record = db::get_history(&conn, &openid, &id)?
        .ok_or_else(|| ApiError::NotFound(format!("history record {} not found", id)))?;
    Ok(Json(ApiResponse::ok(record)))
}

/// DELETE /api/history/:openid/:id
async fn delete_history(
    State(state): State<AppState>,
    Path((openid, id)): Path<(String, String)>,
) -> ApiResult<Deleted> {
    let conn = state.conn()?;
    if !db::delete_history(&conn, &openid, &id)? {
        return Err(ApiError::NotFound(format!("history record {} not found", id)));
    }
    Ok(Json(ApiResponse::ok(Deleted { deleted: true })))
}

/// GET /api/favorites/:openid?type=naming
async fn list_favorites(
    State(state): State<AppState>,
    Path(openid): Path<String>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<page::Page<db::Favorite>> {
    let (page_no, size) = page::normalize(query.page, query.page_size, page::DEFAULT_PAGE_SIZE);
    let conn = state.conn()?;
    let user = require_user(&conn, &openid)?;
    let favorites = db::list_favorites(&conn, &user.id, query.kind, page_no, size)?;
    Ok(Json(ApiResponse::ok(favorites)))
}

/// POST /api/favorites/:openid - Idempotent add
async fn add_favorite(
    State(state): State<AppState>,
    Path(openid): Path<String>,
    ApiJson(body): ApiJson<AddFavoriteRequest>,
) -> ApiResult<db::Favorite> {
    let conn = state.conn()?;
    let user = require_user(&conn, &openid)?;
    let favorite = db::add_favorite(&conn, &user.id, body.kind, &body.content)?;
    Ok(Json(ApiResponse::ok(favorite)))
}

/// POST /api/favorites/:openid/check
async fn check_favorite(
    State(state): State<AppState>,
    Path(openid): Path<String>,
    ApiJson(body): ApiJson<CheckFavoriteRequest>,
) -> ApiResult<CheckFavoriteResponse> {
    let conn = state.conn()?;
    let user = require_user(&conn, &openid)?;
    let favorite_id = db::check_favorite(&conn, &user.id, body.kind, body.full_name.trim())?;
    Ok(Json(ApiResponse::ok(CheckFavoriteResponse {
        is_favorited: favorite_id.is_some(),
        favorite_id,
    })))
}

/// DELETE /api/favorites/:openid/:id
async fn remove_favorite(
    State(state): State<AppState>,
    Path((openid, id)): Path<(String, String)>,
) -> ApiResult<Deleted> {
    let conn = state.conn()?;
    let user = require_user(&conn, &openid)?;
    if !db::remove_favorite(&conn, &user.id, &id)? {
        return Err(ApiError::NotFound(format!("favorite {} not found", id)));
    }
    Ok(Json(ApiResponse::ok(Deleted { deleted: true })))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/bazi", post(compute_bazi))
        .route("/naming", post(generate_names))
        .route("/analysis", post(analyze_name))
        .route("/characters", get(search_characters))
        .route("/auth/login", post(login))
        .route("/users/:openid", get(get_user).put(update_user))
        .route("/history/:openid", get(list_history))
        .route("/history/:openid/:id", get(get_history).delete(delete_history))
        .route("/favorites/:openid", get(list_favorites).post(add_favorite))
        .route("/favorites/:openid/check", post(check_favorite))
        .route("/favorites/:openid/:id", delete(remove_favorite))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}
