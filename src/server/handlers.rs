use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::LicenseEngine;
use crate::logging::redact_hwid;
use crate::model::{
    Application, ApplicationUpdate, License, LicenseFilter, LicenseStatus, NewApplication,
    ValidatedLicense,
};
use crate::server::api_error::ApiError;
use crate::server::logging::HealthResponse;
use crate::server::validation::{
    validate_identifier, validate_length, validate_license_key, validate_not_empty,
    validate_optional_length, MAX_HWID_LEN, MAX_TEXT_LEN,
};

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LicenseEngine>,
}

impl AppState {
    pub fn new(engine: LicenseEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListKeysQuery {
    pub app_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationRequest {
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateKeysRequest {
    #[serde(default)]
    pub app_id: String,
    pub count: Option<i64>,
    pub expiry_days: Option<i64>,
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub hwid: Option<String>,
    #[serde(default)]
    pub app_secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApplicationsResponse {
    pub success: bool,
    pub apps: Vec<Application>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApplicationResponse {
    pub success: bool,
    pub app: Application,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteApplicationResponse {
    pub success: bool,
    pub message: String,
    pub deleted_keys: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeysResponse {
    pub success: bool,
    pub keys: Vec<License>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyResponse {
    pub success: bool,
    pub license: License,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateKeysResponse {
    pub success: bool,
    pub message: String,
    pub keys: Vec<License>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub success: bool,
    pub message: String,
    pub data: ValidatedLicense,
}

// ============================================================================
// Applications
// ============================================================================

/// `GET /api/apps?userId=`
pub async fn list_applications_handler(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<ApplicationsResponse>, ApiError> {
    let owner_id = query
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::missing_field("userId"))?;
    validate_identifier(&owner_id, "userId")?;

    let apps = state.engine.list_applications(&owner_id)?;
    Ok(Json(ApplicationsResponse {
        success: true,
        apps,
    }))
}

/// `POST /api/apps`
pub async fn create_application_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateApplicationRequest>,
) -> Result<(StatusCode, Json<ApplicationResponse>), ApiError> {
    if req.owner_id.is_empty() {
        return Err(ApiError::missing_field("ownerId"));
    }
    validate_identifier(&req.owner_id, "ownerId")?;
    validate_not_empty(&req.name, "name")?;
    validate_length(&req.name, 1, MAX_TEXT_LEN, "name")?;
    validate_length(&req.version, 0, MAX_TEXT_LEN, "version")?;
    validate_length(&req.language, 0, MAX_TEXT_LEN, "language")?;

    info!("Creating application name={} owner={}", req.name, req.owner_id);

    let app = state.engine.create_application(NewApplication {
        owner_id: req.owner_id,
        name: req.name,
        version: req.version,
        language: req.language,
    })?;

    Ok((
        StatusCode::CREATED,
        Json(ApplicationResponse { success: true, app }),
    ))
}

/// `GET /api/apps/:id`
pub async fn get_application_handler(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
) -> Result<Json<ApplicationResponse>, ApiError> {
    validate_identifier(&app_id, "id")?;

    let app = state.engine.get_application(&app_id)?;
    Ok(Json(ApplicationResponse { success: true, app }))
}

/// `PUT /api/apps/:id`
pub async fn update_application_handler(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    Json(update): Json<ApplicationUpdate>,
) -> Result<Json<ApplicationResponse>, ApiError> {
    validate_identifier(&app_id, "id")?;
    if let Some(name) = update.name.as_deref() {
        validate_not_empty(name, "name")?;
    }
    validate_optional_length(update.name.as_deref(), MAX_TEXT_LEN, "name")?;
    validate_optional_length(update.version.as_deref(), MAX_TEXT_LEN, "version")?;
    validate_optional_length(update.language.as_deref(), MAX_TEXT_LEN, "language")?;

    info!("Updating application app_id={}", app_id);

    let app = state.engine.update_application(&app_id, &update)?;
    Ok(Json(ApplicationResponse { success: true, app }))
}

/// `DELETE /api/apps/:id`
///
/// Removes the application and every license it owns.
pub async fn delete_application_handler(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
) -> Result<Json<DeleteApplicationResponse>, ApiError> {
    validate_identifier(&app_id, "id")?;

    info!("Deleting application app_id={}", app_id);

    let deleted_keys = state.engine.delete_application(&app_id)?;
    Ok(Json(DeleteApplicationResponse {
        success: true,
        message: "Application deleted".to_string(),
        deleted_keys,
    }))
}

// ============================================================================
// Keys
// ============================================================================

/// `GET /api/keys?appId=&status=`
pub async fn list_keys_handler(
    State(state): State<AppState>,
    Query(query): Query<ListKeysQuery>,
) -> Result<Json<KeysResponse>, ApiError> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<LicenseStatus>()?),
        None => None,
    };

    let filter = LicenseFilter {
        app_id: query.app_id.filter(|id| !id.is_empty()),
        status,
    };

    let keys = state.engine.list(&filter)?;
    Ok(Json(KeysResponse {
        success: true,
        keys,
    }))
}

/// `POST /api/keys/generate`
pub async fn generate_keys_handler(
    State(state): State<AppState>,
    Json(req): Json<GenerateKeysRequest>,
) -> Result<(StatusCode, Json<GenerateKeysResponse>), ApiError> {
    if req.app_id.is_empty() {
        return Err(ApiError::missing_field("appId"));
    }
    let count = req.count.ok_or_else(|| ApiError::missing_field("count"))?;
    let expiry_days = req
        .expiry_days
        .ok_or_else(|| ApiError::missing_field("expiryDays"))?;

    let keys = state.engine.generate_batch(
        &req.app_id,
        count,
        expiry_days,
        req.prefix.as_deref(),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(GenerateKeysResponse {
            success: true,
            message: format!("Generated {} keys", keys.len()),
            keys,
        }),
    ))
}

/// `GET /api/keys/:key`
pub async fn get_key_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<KeyResponse>, ApiError> {
    validate_license_key(&key, "key")?;

    let license = state.engine.get(&key)?;
    Ok(Json(KeyResponse {
        success: true,
        license,
    }))
}

/// `POST /api/keys/:key/revoke`
pub async fn revoke_key_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<KeyResponse>, ApiError> {
    validate_license_key(&key, "key")?;

    info!("Revoking license key={}", key);

    let license = state.engine.revoke(&key)?;
    Ok(Json(KeyResponse {
        success: true,
        license,
    }))
}

/// `DELETE /api/keys/:key`
pub async fn delete_key_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_license_key(&key, "key")?;

    info!("Deleting license key={}", key);

    state.engine.delete(&key)?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Key deleted".to_string(),
    }))
}

// ============================================================================
// Validation
// ============================================================================

/// `POST /api/validate`
///
/// The key itself is not format-checked here; unknown or malformed keys are
/// reported as `INVALID_KEY` by the engine like any other miss.
pub async fn validate_handler(
    State(state): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, ApiError> {
    if let Some(hwid) = req.hwid.as_deref() {
        validate_length(hwid, 0, MAX_HWID_LEN, "hwid")?;
    }

    info!(
        "Validating license key={} hwid={}",
        req.key,
        req.hwid.as_deref().map(redact_hwid).unwrap_or_default()
    );

    let data = state
        .engine
        .validate(&req.key, req.hwid.as_deref(), &req.app_secret)?;

    Ok(Json(ValidateResponse {
        success: true,
        message: "License key is valid".to_string(),
        data,
    }))
}

/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
