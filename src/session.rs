//! Per-user extraction session.
//!
//! A [`Session`] is a plain value. Every user action goes through [`handle`],
//! which takes the current session and returns the next one together with an
//! [`Outcome`]. The store writes back only the part of the session the action
//! owns (see [`Scope`]), so a slow extraction cannot undo a template switch or
//! upload made while it was running.

use crate::config::TemplateStore;
use crate::prompt::build_prompt;
use crate::schema::{ExtractionResult, ExtractionView, ImageInfo, UploadedImage};
use crate::template::PassportTemplate;
use crate::vision::VisionClient;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

pub const NO_IMAGE_MESSAGE: &str = "Upload an image to extract passport data.";

/// State for one user: selected template, last upload, last successful result.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub template: String,
    pub image: Option<UploadedImage>,
    pub result: Option<ExtractionResult>,
}

impl Session {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            id: format!("ses_{}", Uuid::new_v4().simple()),
            template: template.into(),
            image: None,
            result: None,
        }
    }

    pub fn view(&self) -> SessionView {
        let result_is_current = match (&self.image, &self.result) {
            (Some(image), Some(result)) => image.sha256 == result.image_sha256,
            _ => false,
        };
        SessionView {
            id: self.id.clone(),
            template: self.template.clone(),
            image: self.image.as_ref().map(UploadedImage::info),
            result: self.result.as_ref().map(ExtractionResult::view),
            result_is_current,
        }
    }

    /// Move the part of `self` covered by `scope` into `stored`.
    pub fn commit_into(self, stored: &mut Session, scope: Scope) {
        match scope {
            Scope::Template => stored.template = self.template,
            Scope::Image => stored.image = self.image,
            Scope::Result => stored.result = self.result,
        }
    }
}

/// Serializable snapshot of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: String,
    pub template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExtractionView>,
    /// True when the result was extracted from the image currently uploaded.
    pub result_is_current: bool,
}

/// A user action against a session.
#[derive(Debug, Clone)]
pub enum Action {
    SelectTemplate(String),
    Upload(UploadedImage),
    Extract,
}

/// The part of a session an action writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Template,
    Image,
    Result,
}

impl Action {
    pub fn scope(&self) -> Scope {
        match self {
            Action::SelectTemplate(_) => Scope::Template,
            Action::Upload(_) => Scope::Image,
            Action::Extract => Scope::Result,
        }
    }
}

/// What happened when an action was handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Updated,
    Extracted { result_id: String },
    /// The action was not applicable; the session is unchanged.
    Rejected { message: String },
    /// The extraction failed; the session is unchanged.
    Failed(Failure),
}

/// A failed extraction as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub message: String,
    /// Full error chain, for diagnostics.
    pub trace: String,
}

impl Failure {
    pub fn from_error(err: &anyhow::Error) -> Self {
        Self {
            message: format!("Error processing image: {:#}", err),
            trace: format!("{:?}", err),
        }
    }
}

/// Apply `action` to `session`, returning the next session state.
///
/// A failed or rejected action returns the session exactly as it was given,
/// so a previous result survives a failed extraction.
pub async fn handle(
    mut session: Session,
    action: Action,
    templates: &TemplateStore,
    vision: &dyn VisionClient,
) -> (Session, Outcome) {
    match action {
        Action::SelectTemplate(name) => {
            if !templates.contains(&name) {
                let message = format!(
                    "Unknown passport type: {}. Available: {:?}",
                    name,
                    templates.names()
                );
                return (session, Outcome::Rejected { message });
            }
            info!("Session {}: passport type set to {}", session.id, name);
            session.template = name;
            (session, Outcome::Updated)
        }
        Action::Upload(image) => {
            info!(
                "Session {}: received {} ({} bytes, {})",
                session.id,
                image.filename,
                image.data.len(),
                image.media_type
            );
            session.image = Some(image);
            (session, Outcome::Updated)
        }
        Action::Extract => match run_extraction(&session, templates, vision).await {
            Ok(result) => {
                let result_id = result.id.clone();
                session.result = Some(result);
                (session, Outcome::Extracted { result_id })
            }
            Err(outcome) => (session, outcome),
        },
    }
}

async fn run_extraction(
    session: &Session,
    templates: &TemplateStore,
    vision: &dyn VisionClient,
) -> std::result::Result<ExtractionResult, Outcome> {
    let Some(image) = session.image.as_ref() else {
        return Err(Outcome::Rejected {
            message: NO_IMAGE_MESSAGE.to_string(),
        });
    };

    let attempt = match templates.get(&session.template) {
        Some(template) => extract(template, image, vision).await,
        None => Err(anyhow::anyhow!(
            "Passport type '{}' is not registered",
            session.template
        )),
    };

    attempt.map_err(|e| {
        error!("Session {}: extraction failed: {:#}", session.id, e);
        Outcome::Failed(Failure::from_error(&e))
    })
}

/// Build the prompt for `template` and send it with `image` to the model once.
pub async fn extract(
    template: &PassportTemplate,
    image: &UploadedImage,
    vision: &dyn VisionClient,
) -> Result<ExtractionResult> {
    let prompt = build_prompt(template)?;
    debug!(
        "Prompt for {} ({} fields, {} chars)",
        template.name,
        template.fields.len(),
        prompt.text.len()
    );

    let raw = vision
        .complete(&prompt.text, &image.data)
        .await
        .with_context(|| format!("{} model call failed", vision.provider()))?;

    info!(
        "Extraction for {} complete: {} chars from {}/{}",
        template.name,
        raw.len(),
        vision.provider(),
        vision.model()
    );

    Ok(ExtractionResult::new(
        &template.name,
        vision.provider(),
        vision.model(),
        image,
        raw,
    ))
}

/// In-memory session store.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a fresh session using `template`.
    pub fn create(&self, template: &str) -> Session {
        let session = Session::new(template);
        self.put(session.clone());
        debug!("SessionStore: created {}", session.id);
        session
    }

    /// Snapshot of a session.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Run `f` on the stored session under the write lock.
    /// Returns `None` if the session no longer exists.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(id)
            .map(f)
    }

    pub fn put(&self, session: Session) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id.clone(), session);
    }

    /// Returns true if the session existed.
    pub fn remove(&self, id: &str) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }
}
