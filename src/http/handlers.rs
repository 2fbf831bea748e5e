use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::segments::{AudienceSegmenter, SegmentCount};
use crate::app::tokens::disable_token as disable_stored_token;
use crate::domain::dispatch::{BroadcastRequest, DispatchHistoryEntry};
use crate::domain::recipient::Recipient;
use crate::domain::segment::SegmentFilter;
use crate::domain::template::{MessageTemplate, TemplateView};
use crate::domain::token::{DeviceToken, Platform, TokenState};
use crate::http::{AdminToken, AppError};
use crate::AppState;

const MAX_HISTORY_DAYS: u32 = 365;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.health.ping().await {
        Ok(()) => "ok",
        Err(err) => {
            tracing::warn!(error = ?err, "store health check failed");
            "degraded"
        }
    };

    Json(HealthResponse { status })
}

#[derive(Serialize)]
pub struct PushConfigResponse {
    pub vapid_public_key: Option<String>,
    pub agent_scope: String,
}

pub async fn push_config(State(state): State<AppState>) -> Json<PushConfigResponse> {
    Json(PushConfigResponse {
        vapid_public_key: state.vapid_public_key.clone(),
        agent_scope: state.agent_scope.to_string(),
    })
}

pub async fn list_templates(_admin: AdminToken) -> Json<ListResponse<TemplateView>> {
    Json(ListResponse {
        items: MessageTemplate::ALL.iter().map(MessageTemplate::view).collect(),
    })
}

#[derive(Deserialize)]
pub struct AudienceRequest {
    pub filter: SegmentFilter,
}

#[derive(Serialize)]
pub struct AudienceResponse {
    pub items: Vec<Recipient>,
    pub count: usize,
}

pub async fn evaluate_audience(
    State(state): State<AppState>,
    _admin: AdminToken,
    Json(payload): Json<AudienceRequest>,
) -> Result<Json<AudienceResponse>, AppError> {
    let recipients = list_recipients(&state).await?;
    let items = AudienceSegmenter::evaluate(&payload.filter, &recipients);

    Ok(Json(AudienceResponse {
        count: items.len(),
        items,
    }))
}

pub async fn audience_summary(
    State(state): State<AppState>,
    _admin: AdminToken,
) -> Result<Json<ListResponse<SegmentCount>>, AppError> {
    let recipients = list_recipients(&state).await?;
    let items = AudienceSegmenter::summarize_at(
        &AudienceSegmenter::preset_filters(),
        &recipients,
        OffsetDateTime::now_utc(),
    );

    Ok(Json(ListResponse { items }))
}

pub async fn create_broadcast(
    State(state): State<AppState>,
    _admin: AdminToken,
    Json(payload): Json<BroadcastRequest>,
) -> Result<(StatusCode, Json<DispatchHistoryEntry>), AppError> {
    let entry = state.dispatcher().broadcast(payload).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub days: Option<u32>,
}

pub async fn list_broadcasts(
    State(state): State<AppState>,
    _admin: AdminToken,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ListResponse<DispatchHistoryEntry>>, AppError> {
    let days = query.days.unwrap_or(state.history_window_days);
    if !(1..=MAX_HISTORY_DAYS).contains(&days) {
        return Err(AppError::bad_request("days must be between 1 and 365"));
    }

    let items = state.dispatcher().history(days).await?;
    Ok(Json(ListResponse { items }))
}

/// Token status without the token value itself.
#[derive(Serialize)]
pub struct TokenStatusResponse {
    pub recipient_id: Uuid,
    pub state: TokenState,
    pub platform: Option<Platform>,
    pub installed_as_standalone_app: Option<bool>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub disabled_at: Option<OffsetDateTime>,
}

impl TokenStatusResponse {
    fn new(recipient_id: Uuid, token: Option<&DeviceToken>) -> Self {
        Self {
            recipient_id,
            state: TokenState::of(token),
            platform: token.map(|token| token.platform),
            installed_as_standalone_app: token.map(|token| token.installed_as_standalone_app),
            updated_at: token.map(|token| token.updated_at),
            disabled_at: token.and_then(|token| token.disabled_at),
        }
    }
}

pub async fn get_token(
    State(state): State<AppState>,
    _admin: AdminToken,
    Path(recipient_id): Path<Uuid>,
) -> Result<Json<TokenStatusResponse>, AppError> {
    let token = state.tokens.get(recipient_id).await.map_err(|err| {
        tracing::error!(error = ?err, recipient_id = %recipient_id, "failed to load device token");
        AppError::internal("failed to load device token")
    })?;

    Ok(Json(TokenStatusResponse::new(recipient_id, token.as_ref())))
}

pub async fn disable_token(
    State(state): State<AppState>,
    _admin: AdminToken,
    Path(recipient_id): Path<Uuid>,
) -> Result<Json<TokenStatusResponse>, AppError> {
    let token = disable_stored_token(state.tokens.as_ref(), recipient_id)
        .await?
        .ok_or_else(|| AppError::not_found("no device token for recipient"))?;

    Ok(Json(TokenStatusResponse::new(recipient_id, Some(&token))))
}

async fn list_recipients(state: &AppState) -> Result<Vec<Recipient>, AppError> {
    state.directory.list().await.map_err(|err| {
        tracing::error!(error = ?err, "failed to list recipients");
        AppError::internal("failed to list recipients")
    })
}
