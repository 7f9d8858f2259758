//! Passport Extractor - upload a passport photo, pick a template, and get the
//! fields read back by a vision-language model.

mod config;
mod display;
mod prompt;
mod schema;
mod session;
mod template;
mod vision;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use config::{Settings, TemplateStore};
use schema::{ExtractionView, UploadedImage};
use serde::{Deserialize, Serialize};
use session::{Action, Failure, Outcome, SessionStore, SessionView};
use std::sync::Arc;
use template::PassportTemplate;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vision::VisionClient;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    templates: Arc<TemplateStore>,
    sessions: SessionStore,
    vision: Arc<dyn VisionClient>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "passport_extractor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    let templates = TemplateStore::load_or_builtin(&settings.template_dir)?;
    let templates = match &settings.default_template {
        Some(name) => templates.with_default(name)?,
        None => templates,
    };
    info!(
        "Loaded {} templates: {:?} (default: {})",
        templates.list().len(),
        templates.names(),
        templates.default_name()
    );

    let vision = vision::from_settings(&settings)?;
    info!(
        "Vision backend: {} (model: {})",
        vision.provider(),
        vision.model()
    );

    let state = AppState {
        templates: Arc::new(templates),
        sessions: SessionStore::new(),
        vision,
    };

    let listener = tokio::net::TcpListener::bind(settings.bind_addr.as_str()).await?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/templates", get(list_templates))
        .route("/templates/:name", get(get_template))
        .route("/templates/:name/prompt", get(get_prompt))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/template", put(select_template))
        .route("/sessions/:id/image", post(upload_image).get(get_image))
        .route("/sessions/:id/extract", post(extract_session))
        .route("/extract", post(extract_once))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024)) // 100MB
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
            trace: None,
        }),
    )
}

fn outcome_error(outcome: Outcome) -> Option<ApiError> {
    match outcome {
        Outcome::Updated | Outcome::Extracted { .. } => None,
        Outcome::Rejected { message } => Some(api_error(StatusCode::BAD_REQUEST, message)),
        Outcome::Failed(failure) => Some(failure_error(failure)),
    }
}

fn failure_error(failure: Failure) -> ApiError {
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorBody {
            error: failure.message,
            trace: Some(failure.trace),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct TemplateSummary {
    name: String,
    label: String,
    fields: Vec<String>,
    default: bool,
}

/// List templates in registration order.
async fn list_templates(State(state): State<AppState>) -> Json<Vec<TemplateSummary>> {
    let default_name = state.templates.default_name();
    Json(
        state
            .templates
            .list()
            .iter()
            .map(|t| TemplateSummary {
                name: t.name.clone(),
                label: t.display_label(),
                fields: t.fields.clone(),
                default: t.name == default_name,
            })
            .collect(),
    )
}

async fn get_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<PassportTemplate>, ApiError> {
    state
        .templates
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| unknown_template(&state, &name))
}

/// Preview the prompt a template produces.
async fn get_prompt(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<prompt::PromptText>, ApiError> {
    let template = state
        .templates
        .get(&name)
        .ok_or_else(|| unknown_template(&state, &name))?;

    prompt::build_prompt(template)
        .map(Json)
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
}

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let session = state.sessions.create(state.templates.default_name());
    info!("Created session {}", session.id);
    (StatusCode::CREATED, Json(session.view()))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    state
        .sessions
        .get(&id)
        .map(|s| Json(s.view()))
        .ok_or_else(|| unknown_session(&id))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(unknown_session(&id))
    }
}

#[derive(Deserialize)]
struct SelectTemplateBody {
    template: String,
}

async fn select_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SelectTemplateBody>,
) -> Result<Json<SessionView>, ApiError> {
    apply(&state, &id, Action::SelectTemplate(body.template)).await
}

async fn upload_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<SessionView>, ApiError> {
    // Fail fast on unknown sessions before reading the body.
    if state.sessions.get(&id).is_none() {
        return Err(unknown_session(&id));
    }
    let image = read_image(multipart).await?;
    apply(&state, &id, Action::Upload(image)).await
}

/// Serve the uploaded image back for preview.
async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let current = state.sessions.get(&id).ok_or_else(|| unknown_session(&id))?;
    let image = current
        .image
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, session::NO_IMAGE_MESSAGE))?;

    Ok(([(header::CONTENT_TYPE, image.media_type)], image.data))
}

async fn extract_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    apply(&state, &id, Action::Extract).await
}

#[derive(Deserialize)]
struct ExtractQuery {
    template: Option<String>,
}

/// One-shot extraction without a session.
async fn extract_once(
    State(state): State<AppState>,
    Query(query): Query<ExtractQuery>,
    multipart: Multipart,
) -> Result<Json<ExtractionView>, ApiError> {
    let name = query
        .template
        .unwrap_or_else(|| state.templates.default_name().to_string());
    let template = state
        .templates
        .get(&name)
        .ok_or_else(|| unknown_template(&state, &name))?;

    let image = read_image(multipart).await?;

    let result = session::extract(template, &image, state.vision.as_ref())
        .await
        .map_err(|e| {
            error!("Extraction failed: {:#}", e);
            failure_error(Failure::from_error(&e))
        })?;

    info!("Extraction complete: {}", result.id);
    Ok(Json(result.view()))
}

// ============================================================================
// Helper functions
// ============================================================================

/// Run one action through the session handler and write back the part of the
/// session it owns. A session deleted while the action ran stays deleted.
async fn apply(state: &AppState, id: &str, action: Action) -> Result<Json<SessionView>, ApiError> {
    let current = state.sessions.get(id).ok_or_else(|| unknown_session(id))?;
    let scope = action.scope();

    let (next, outcome) =
        session::handle(current, action, &state.templates, state.vision.as_ref()).await;

    if let Some(err) = outcome_error(outcome) {
        return Err(err);
    }

    state
        .sessions
        .update(id, |stored| {
            next.commit_into(stored, scope);
            stored.view()
        })
        .map(Json)
        .ok_or_else(|| unknown_session(id))
}

/// Read the `file` field of a multipart upload.
async fn read_image(mut multipart: Multipart) -> Result<UploadedImage, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("passport").to_string();
            let data = field.bytes().await.map_err(|e| {
                api_error(
                    StatusCode::BAD_REQUEST,
                    format!("Failed to read file: {}", e),
                )
            })?;

            if data.is_empty() {
                return Err(api_error(StatusCode::BAD_REQUEST, "Uploaded file is empty"));
            }
            return Ok(UploadedImage::new(filename, data.to_vec()));
        }
    }

    Err(api_error(StatusCode::BAD_REQUEST, "No file uploaded"))
}

fn unknown_session(id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("Unknown session: {}", id))
}

fn unknown_template(state: &AppState, name: &str) -> ApiError {
    api_error(
        StatusCode::NOT_FOUND,
        format!(
            "Unknown passport type: {}. Available: {:?}",
            name,
            state.templates.names()
        ),
    )
}
