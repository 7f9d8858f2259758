//! Runtime configuration: process settings and the passport template registry.
//!
//! Templates are loaded from `configs/templates/*.json` (or built-ins when the
//! directory is absent) and never change afterwards.

use crate::template::PassportTemplate;
use crate::vision::VisionProviderKind;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_TEMPLATE_DIR: &str = "configs/templates";

/// Process settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub template_dir: PathBuf,
    /// Template selected for new sessions; the first registered one when unset.
    pub default_template: Option<String>,
    pub provider: VisionProviderKind,
    /// Overrides the provider's default model when set.
    pub model: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let provider_name = env::var("VISION_PROVIDER").unwrap_or_else(|_| "ollama".to_string());
        let provider = VisionProviderKind::from_str(&provider_name).with_context(|| {
            format!(
                "Unknown VISION_PROVIDER '{}'. Expected 'ollama' or 'openrouter'",
                provider_name
            )
        })?;

        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            template_dir: env::var("TEMPLATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_TEMPLATE_DIR)),
            default_template: env::var("DEFAULT_TEMPLATE")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            provider,
            model: env::var("VISION_MODEL").ok().filter(|m| !m.trim().is_empty()),
        })
    }
}

/// Read-only registry of passport templates, in registration order.
#[derive(Debug)]
pub struct TemplateStore {
    templates: Vec<PassportTemplate>,
    index: HashMap<String, usize>,
    default_name: String,
}

impl TemplateStore {
    /// Load every `*.json` template in `dir`, ordered by file path.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            anyhow::bail!("Template directory does not exist: {:?}", dir);
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut templates = Vec::new();
        for path in paths {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template: {:?}", path))?;
            let template: PassportTemplate = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse template: {:?}", path))?;

            info!(
                "Loaded template: {} ({} fields) from {:?}",
                template.name,
                template.fields.len(),
                path
            );
            templates.push(template);
        }

        if templates.is_empty() {
            anyhow::bail!("No templates found in {:?}", dir);
        }

        Self::from_templates(templates)
    }

    /// Load from `dir` when it exists, otherwise fall back to [`TemplateStore::builtin`].
    pub fn load_or_builtin(dir: &Path) -> Result<Self> {
        if dir.exists() {
            Self::load_from_dir(dir)
        } else {
            warn!("Template directory {:?} not found, using built-in templates", dir);
            Ok(Self::builtin())
        }
    }

    /// Build a store from templates, validating each and rejecting duplicate names.
    pub fn from_templates(templates: Vec<PassportTemplate>) -> Result<Self> {
        if templates.is_empty() {
            anyhow::bail!("No templates provided");
        }

        let mut index = HashMap::new();
        for (i, template) in templates.iter().enumerate() {
            template.validate()?;
            if index.insert(template.name.clone(), i).is_some() {
                anyhow::bail!("Template '{}' is defined more than once", template.name);
            }
        }

        let default_name = templates[0].name.clone();
        Ok(Self {
            templates,
            index,
            default_name,
        })
    }

    /// The Romanian and Pakistani templates shipped with the binary.
    pub fn builtin() -> Self {
        let templates = vec![
            PassportTemplate::new(
                "Romanian",
                &[
                    "Seria",
                    "NR",
                    "CNP",
                    "Nume Familie/Last name",
                    "Prenume/First name",
                    "Sex",
                    "Loc nastere",
                    "Domiciliu",
                    "Emis de",
                    "Valabilitate",
                ],
            )
            .with_label("Romanian Passport"),
            PassportTemplate::new(
                "Pakistani",
                &[
                    "country code",
                    "Passport Number",
                    "SurName",
                    "Name",
                    "Date of Birth",
                    "Citizenship Number",
                    "Sex",
                    "Place of Birth",
                    "Father's Name",
                    "Date of Issue",
                    "Date of Expiry",
                    "Issuing Authority",
                    "Tracking Number",
                    "Booklet Number",
                ],
            )
            .with_label("Pakistani Passport"),
        ];

        Self::from_templates(templates).expect("built-in templates are valid")
    }

    /// Use `name` as the default selection. Fails if it is not registered.
    pub fn with_default(mut self, name: &str) -> Result<Self> {
        if !self.contains(name) {
            anyhow::bail!(
                "Default template '{}' is not registered. Available: {:?}",
                name,
                self.names()
            );
        }
        self.default_name = name.to_string();
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&PassportTemplate> {
        self.index.get(name).map(|&i| &self.templates[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All templates in registration order.
    pub fn list(&self) -> &[PassportTemplate] {
        &self.templates
    }

    pub fn names(&self) -> Vec<String> {
        self.templates.iter().map(|t| t.name.clone()).collect()
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }
}
