//! REST API endpoint handlers.
//!
//! Every handler locks the studio only for synchronous work. Remote calls run
//! on a spawned task between a `begin_*` and a `finish_*`, so a dropped
//! connection never leaves the studio busy.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vellum::error::{Notice, ServiceErrorKind, StudioError};
use vellum::overlay::{
    EditAction, EditPrompt, EditResponse, OverlayMode, OverlayOutcome, Panel, PointerEvent,
    PreviewView, Wiring,
};
use vellum::store::Artifact;
use vellum::studio::Studio;
use vellum::synthesis::{GenerateRequest, ImagePayload, StylePreset, SynthesisGateway};
use vellum::transfer::{ExportFormat, suggested_file_name};

/// Policy for the rendered document: an opaque sandboxed origin with no
/// access to the host's storage or credentials, no network fetches, and no
/// form submissions leaving the document.
pub const PREVIEW_CSP: &str = "sandbox allow-scripts allow-forms allow-modals allow-popups; \
     default-src 'none'; script-src 'unsafe-inline'; style-src 'unsafe-inline'; \
     img-src data: blob:; font-src data:; media-src data: blob:; form-action 'none'";

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub studio: Arc<Mutex<Studio>>,
    pub gateway: Arc<SynthesisGateway>,
}

impl AppState {
    fn studio(&self) -> MutexGuard<'_, Studio> {
        lock(&self.studio)
    }
}

fn lock(studio: &Mutex<Studio>) -> MutexGuard<'_, Studio> {
    studio.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Errors ─────────────────────────────────────────────────────────

pub enum ApiError {
    Studio(StudioError),
    BadRequest(String),
    /// Refused before reaching a handler.
    Rejected(StatusCode, String),
    Internal(String),
}

impl From<StudioError> for ApiError {
    fn from(e: StudioError) -> Self {
        ApiError::Studio(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    category: String,
    message: String,
    detail: String,
}

fn status_for(e: &StudioError) -> StatusCode {
    match e {
        StudioError::Service(e) => match e.kind {
            ServiceErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ServiceErrorKind::Server | ServiceErrorKind::EmptyResponse => StatusCode::BAD_GATEWAY,
            ServiceErrorKind::Client => StatusCode::BAD_REQUEST,
            ServiceErrorKind::ContentSafety => StatusCode::UNPROCESSABLE_ENTITY,
        },
        StudioError::Store(_) => StatusCode::INSUFFICIENT_STORAGE,
        StudioError::Import(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StudioError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        StudioError::Overlay(_) => StatusCode::BAD_REQUEST,
        StudioError::Busy | StudioError::ActiveChanged => StatusCode::CONFLICT,
        StudioError::NoActiveArtifact | StudioError::UnknownArtifact(_) => StatusCode::NOT_FOUND,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Studio(e) => {
                let Notice { category, message } = e.notice();
                let message = match &e {
                    StudioError::Overlay(_)
                    | StudioError::NoActiveArtifact
                    | StudioError::UnknownArtifact(_)
                    | StudioError::ActiveChanged => e.to_string(),
                    _ => message,
                };
                let category = serde_json::to_value(category)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                (
                    status_for(&e),
                    ErrorBody {
                        category,
                        message,
                        detail: e.to_string(),
                    },
                )
            }
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    category: "invalid_request".into(),
                    detail: message.clone(),
                    message,
                },
            ),
            ApiError::Rejected(status, message) => (
                status,
                ErrorBody {
                    category: "invalid_request".into(),
                    detail: message.clone(),
                    message,
                },
            ),
            ApiError::Internal(detail) => {
                warn!("Internal error: {detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        category: "generic".into(),
                        message: "Something went wrong. Please try again.".into(),
                        detail,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

// ── Request guard ──────────────────────────────────────────────────

/// Middleware refusing state changes that a document could forge.
///
/// The preview runs in an opaque origin, so anything it submits carries
/// `Origin: null`, and a plain form can only send form or text bodies.
/// Mutations must therefore come with a JSON content type from a real origin.
pub async fn guard_mutations(request: Request, next: Next) -> Result<Response, ApiError> {
    let method = request.method().clone();
    if matches!(method, Method::GET | Method::HEAD | Method::OPTIONS) {
        return Ok(next.run(request).await);
    }
    check_mutation(&method, request.headers())?;
    Ok(next.run(request).await)
}

fn check_mutation(method: &Method, headers: &HeaderMap) -> Result<(), ApiError> {
    if headers
        .get(header::ORIGIN)
        .is_some_and(|origin| origin.as_bytes().eq_ignore_ascii_case(b"null"))
    {
        warn!("Refused {method} from an opaque origin");
        return Err(ApiError::Rejected(
            StatusCode::FORBIDDEN,
            "requests from sandboxed documents may not modify the studio".into(),
        ));
    }
    if *method == Method::POST {
        let is_json = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"));
        if !is_json {
            return Err(ApiError::Rejected(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "expected an application/json request body".into(),
            ));
        }
    }
    Ok(())
}

// ── Snapshots ──────────────────────────────────────────────────────

/// Session state for the front end.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub busy: bool,
    pub active_id: Option<String>,
    pub history_len: usize,
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_depth: usize,
    pub redo_depth: usize,
    pub mode: OverlayMode,
    pub view: PreviewView,
    pub wiring: Wiring,
    pub panel: Option<Panel>,
}

impl StateSnapshot {
    fn from_studio(studio: &Studio) -> Self {
        let versions = studio.versions();
        let overlay = studio.overlay();
        Self {
            busy: studio.is_busy(),
            active_id: studio.active().map(|a| a.id.clone()),
            history_len: studio.history().len(),
            can_undo: versions.can_undo(),
            can_redo: versions.can_redo(),
            undo_depth: versions.undo_depth(),
            redo_depth: versions.redo_depth(),
            mode: overlay.mode(),
            view: overlay.view(),
            wiring: overlay.wiring(),
            panel: overlay.panel().cloned(),
        }
    }
}

/// One row of the history list; bodies are fetched separately.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub bytes: usize,
    pub has_source_image: bool,
    pub active: bool,
}

/// GET /api/state
pub async fn get_state(State(app): State<AppState>) -> Json<StateSnapshot> {
    let snapshot = {
        let studio = app.studio();
        StateSnapshot::from_studio(&studio)
    };
    Json(snapshot)
}

/// GET /api/history: most recent first.
pub async fn get_history(State(app): State<AppState>) -> Json<Vec<HistoryEntry>> {
    let studio = app.studio();
    let active = studio.active().map(|a| a.id.clone());
    let entries = studio
        .history()
        .iter()
        .map(|a| HistoryEntry {
            id: a.id.clone(),
            name: a.name.clone(),
            created_at: a.created_at.to_rfc3339(),
            bytes: a.body.len(),
            has_source_image: a.source_image.is_some(),
            active: active.as_deref() == Some(a.id.as_str()),
        })
        .collect();
    Json(entries)
}

/// GET /api/active: the active artifact, 404 if none.
pub async fn get_active(State(app): State<AppState>) -> Result<Json<Artifact>, ApiError> {
    let studio = app.studio();
    let active = studio.active().ok_or(StudioError::NoActiveArtifact)?;
    Ok(Json(active.clone()))
}

/// GET /api/notices: drain queued notices.
pub async fn get_notices(State(app): State<AppState>) -> Json<Vec<Notice>> {
    Json(app.studio().take_notices())
}

/// GET /preview: the active document, served into a sandboxed origin.
pub async fn get_preview(State(app): State<AppState>) -> Response {
    let body = app.studio().active().map(|a| a.body.clone());
    let Some(body) = body else {
        return (StatusCode::NOT_FOUND, "no artifact is active").into_response();
    };
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8")),
            (
                header::CONTENT_SECURITY_POLICY,
                HeaderValue::from_static(PREVIEW_CSP),
            ),
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        body,
    )
        .into_response()
}

// ── Generation and refinement ──────────────────────────────────────

/// Request body for POST /api/generate.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    #[serde(default)]
    pub prompt: String,
    /// `data:<mime>;base64,<payload>`
    pub image: Option<String>,
    /// Uploaded file name, used as the artifact name.
    pub source_name: Option<String>,
    pub style: Option<String>,
    pub custom_css: Option<String>,
}

impl GenerateBody {
    fn into_request(self) -> Result<GenerateRequest, ApiError> {
        let mut request = match self.image {
            Some(uri) => {
                let image = ImagePayload::from_data_uri(&uri).ok_or_else(|| {
                    ApiError::BadRequest("image must be a base64 data URI".into())
                })?;
                GenerateRequest::image(image)
            }
            None => GenerateRequest::prompt(self.prompt),
        };
        if let Some(name) = self.source_name {
            request = request.with_source_name(name);
        }
        if let Some(style) = self.style {
            request = request.with_style(StylePreset::new(style));
        }
        if let Some(css) = self.custom_css {
            request = request.with_custom_css(css);
        }
        Ok(request)
    }
}

/// POST /api/generate: 201 with the new (active) artifact.
pub async fn post_generate(
    State(app): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> Result<(StatusCode, Json<Artifact>), ApiError> {
    let request = body.into_request()?;
    let ticket = {
        let mut studio = app.studio();
        studio.begin_generate(request)?
    };

    let studio = app.studio.clone();
    let gateway = app.gateway.clone();
    let artifact = tokio::spawn(async move {
        let result = ticket.run(&gateway).await;
        let mut studio = lock(&studio);
        studio.finish_generation(ticket, result)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("generation task failed: {e}")))??;

    Ok((StatusCode::CREATED, Json(artifact)))
}

/// Request body for POST /api/refine.
#[derive(Deserialize)]
pub struct RefineBody {
    pub instruction: String,
}

/// POST /api/refine: refine the active artifact.
pub async fn post_refine(
    State(app): State<AppState>,
    Json(body): Json<RefineBody>,
) -> Result<Json<Artifact>, ApiError> {
    if body.instruction.trim().is_empty() {
        return Err(ApiError::BadRequest("instruction must not be empty".into()));
    }
    Ok(Json(run_refinement(&app, body.instruction).await?))
}

async fn run_refinement(app: &AppState, instruction: String) -> Result<Artifact, ApiError> {
    let ticket = {
        let mut studio = app.studio();
        studio.begin_refine(instruction)?
    };
    debug!("Refinement of {} dispatched", ticket.artifact_id());

    let studio = app.studio.clone();
    let gateway = app.gateway.clone();
    let artifact = tokio::spawn(async move {
        let result = ticket.run(&gateway).await;
        let mut studio = lock(&studio);
        studio.finish_refinement(ticket, result)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("refinement task failed: {e}")))??;
    Ok(artifact)
}

// ── Versions and history ───────────────────────────────────────────

/// Response for POST /api/undo and /api/redo.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResponse {
    /// `false` when the stack was empty.
    pub changed: bool,
    pub can_undo: bool,
    pub can_redo: bool,
}

pub async fn post_undo(State(app): State<AppState>) -> Result<Json<StepResponse>, ApiError> {
    let mut studio = app.studio();
    let changed = studio.undo()?;
    Ok(Json(StepResponse {
        changed,
        can_undo: studio.can_undo(),
        can_redo: studio.can_redo(),
    }))
}

pub async fn post_redo(State(app): State<AppState>) -> Result<Json<StepResponse>, ApiError> {
    let mut studio = app.studio();
    let changed = studio.redo()?;
    Ok(Json(StepResponse {
        changed,
        can_undo: studio.can_undo(),
        can_redo: studio.can_redo(),
    }))
}

#[derive(Deserialize)]
pub struct ActivateBody {
    pub id: String,
}

/// POST /api/activate: switch the active artifact (clears undo/redo).
pub async fn post_activate(
    State(app): State<AppState>,
    Json(body): Json<ActivateBody>,
) -> Result<Json<Artifact>, ApiError> {
    let mut studio = app.studio();
    let artifact = studio.activate(&body.id)?.clone();
    Ok(Json(artifact))
}

#[derive(Deserialize)]
pub struct RenameBody {
    pub id: String,
    pub name: String,
}

pub async fn post_rename(
    State(app): State<AppState>,
    Json(body): Json<RenameBody>,
) -> Result<StatusCode, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }
    app.studio().rename(&body.id, body.name.trim())?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/artifacts/{id}
pub async fn delete_artifact(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Artifact>, ApiError> {
    let removed = app.studio().remove(&id)?;
    Ok(Json(removed))
}

// ── Export / import ────────────────────────────────────────────────

/// POST /api/import: body is an exported snapshot, sent as JSON. 422 if
/// rejected.
pub async fn post_import(
    State(app): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<Artifact>), ApiError> {
    let artifact = app.studio().import(&body)?;
    Ok((StatusCode::CREATED, Json(artifact)))
}

#[derive(Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

/// GET /api/export/{id}?format=snapshot|document: download an artifact.
pub async fn get_export(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let format: ExportFormat = query
        .format
        .as_deref()
        .unwrap_or("snapshot")
        .parse()
        .map_err(ApiError::BadRequest)?;

    let (text, file_name) = {
        let studio = app.studio();
        let text = studio.export(Some(id.as_str()), format)?;
        let file_name = studio
            .get(&id)
            .map(|a| suggested_file_name(a, format))
            .unwrap_or_default();
        (text, file_name)
    };

    let content_type = match format {
        ExportFormat::Snapshot => "application/json",
        ExportFormat::Document => "text/html; charset=utf-8",
    };
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        text,
    )
        .into_response())
}

// ── Overlay ────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ModeBody {
    pub mode: OverlayMode,
}

pub async fn post_mode(
    State(app): State<AppState>,
    Json(body): Json<ModeBody>,
) -> Json<StateSnapshot> {
    let mut studio = app.studio();
    studio.set_mode(body.mode);
    Json(StateSnapshot::from_studio(&studio))
}

#[derive(Deserialize)]
pub struct ViewBody {
    pub view: PreviewView,
}

pub async fn post_view(
    State(app): State<AppState>,
    Json(body): Json<ViewBody>,
) -> Json<StateSnapshot> {
    let mut studio = app.studio();
    studio.set_view(body.view);
    Json(StateSnapshot::from_studio(&studio))
}

/// POST /api/overlay/pointer: feed a hover/leave/click from the preview.
pub async fn post_pointer(
    State(app): State<AppState>,
    Json(event): Json<PointerEvent>,
) -> Json<OverlayOutcome> {
    Json(app.studio().pointer(event))
}

#[derive(Deserialize)]
pub struct ActionBody {
    pub action: String,
}

/// POST /api/overlay/action: choose an action from the open context menu.
pub async fn post_action(
    State(app): State<AppState>,
    Json(body): Json<ActionBody>,
) -> Result<Json<EditPrompt>, ApiError> {
    let action: EditAction = body.action.parse().map_err(ApiError::BadRequest)?;
    let prompt = app.studio().choose_action(action)?;
    Ok(Json(prompt))
}

/// Request body for POST /api/overlay/answer. Exactly one of the fields is
/// expected; `cancel` wins, then `confirm`, then `value`.
#[derive(Deserialize, Default)]
pub struct AnswerBody {
    pub value: Option<String>,
    #[serde(default)]
    pub confirm: bool,
    #[serde(default)]
    pub cancel: bool,
}

impl AnswerBody {
    fn into_response(self) -> EditResponse {
        if self.cancel {
            EditResponse::Cancel
        } else if self.confirm {
            EditResponse::Confirm
        } else {
            EditResponse::Value(self.value.unwrap_or_default())
        }
    }
}

#[derive(Serialize)]
pub struct AnswerResponse {
    /// The dispatched refinement instruction; `None` if cancelled.
    pub instruction: Option<String>,
    pub artifact: Option<Artifact>,
}

/// POST /api/overlay/answer: answer the pending edit prompt and dispatch the
/// resulting refinement.
pub async fn post_answer(
    State(app): State<AppState>,
    Json(body): Json<AnswerBody>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let instruction = {
        let mut studio = app.studio();
        studio.submit_edit(body.into_response())?
    };
    let Some(instruction) = instruction else {
        return Ok(Json(AnswerResponse {
            instruction: None,
            artifact: None,
        }));
    };
    let artifact = run_refinement(&app, instruction.clone()).await?;
    Ok(Json(AnswerResponse {
        instruction: Some(instruction),
        artifact: Some(artifact),
    }))
}

pub async fn post_dismiss(State(app): State<AppState>) -> StatusCode {
    app.studio().dismiss_panel();
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum::error::{OverlayError, ServiceError};

    #[test]
    fn generate_body_deserializes_camel_case() {
        let json = r#"{"prompt":"todo app","customCss":"body{}","style":"Retro"}"#;
        let body: GenerateBody = serde_json::from_str(json).unwrap();
        let request = body.into_request().ok().unwrap();
        assert_eq!(request.prompt, "todo app");
        assert_eq!(request.custom_css.as_deref(), Some("body{}"));
        assert_eq!(request.style.name(), "Retro");
    }

    #[test]
    fn generate_body_rejects_non_data_uri_images() {
        let body = GenerateBody {
            image: Some("https://example.com/cat.png".into()),
            ..Default::default()
        };
        assert!(matches!(body.into_request(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn answer_body_precedence() {
        let cancel: AnswerBody = serde_json::from_str(r#"{"value":"x","cancel":true}"#).unwrap();
        assert_eq!(cancel.into_response(), EditResponse::Cancel);
        let confirm: AnswerBody = serde_json::from_str(r#"{"confirm":true}"#).unwrap();
        assert_eq!(confirm.into_response(), EditResponse::Confirm);
        let value: AnswerBody = serde_json::from_str(r#"{"value":"Hi"}"#).unwrap();
        assert_eq!(value.into_response(), EditResponse::Value("Hi".into()));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(&StudioError::Busy), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&StudioError::Service(ServiceError::from_status(429, ""))),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&StudioError::Service(ServiceError::from_status(503, ""))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&StudioError::Overlay(OverlayError::NoMenu)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&StudioError::UnknownArtifact("x".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn mutations_need_json_from_a_real_origin() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert!(check_mutation(&Method::POST, &headers).is_ok());

        headers.insert(header::ORIGIN, HeaderValue::from_static("null"));
        assert!(matches!(
            check_mutation(&Method::POST, &headers),
            Err(ApiError::Rejected(StatusCode::FORBIDDEN, _))
        ));
        assert!(matches!(
            check_mutation(&Method::DELETE, &headers),
            Err(ApiError::Rejected(StatusCode::FORBIDDEN, _))
        ));

        let mut form = HeaderMap::new();
        form.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        assert!(matches!(
            check_mutation(&Method::POST, &form),
            Err(ApiError::Rejected(StatusCode::UNSUPPORTED_MEDIA_TYPE, _))
        ));
        assert!(check_mutation(&Method::DELETE, &HeaderMap::new()).is_ok());
    }

    #[test]
    fn preview_policy_blocks_form_submission() {
        assert!(PREVIEW_CSP.starts_with("sandbox "));
        assert!(!PREVIEW_CSP.contains("allow-same-origin"));
        assert!(PREVIEW_CSP.contains("form-action 'none'"));
    }

    #[test]
    fn pointer_events_deserialize_tagged() {
        let event: PointerEvent =
            serde_json::from_str(r#"{"type":"click","path":"/1/0","x":3.0,"y":4.5}"#).unwrap();
        assert!(matches!(event, PointerEvent::Click { x, .. } if x == 3.0));
    }
}
