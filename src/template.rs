//! Passport templates: a named, ordered list of field labels for one passport type.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A passport type and the fields the model is asked to extract, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassportTemplate {
    /// Identifier used for selection and inside the prompt (e.g. "Romanian").
    pub name: String,
    /// Button/heading label (e.g. "Romanian Passport").
    #[serde(default)]
    pub label: Option<String>,
    pub fields: Vec<String>,
}

/// A template that cannot be turned into a prompt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("template '{template}' has no fields")]
    EmptyFields { template: String },

    #[error("template '{template}' has a blank field name at position {index}")]
    EmptyFieldName { template: String, index: usize },

    #[error("template '{template}' field at position {index} spans multiple lines")]
    MultiLineFieldName { template: String, index: usize },

    #[error("template '{template}' field at position {index} has leading or trailing whitespace")]
    PaddedFieldName { template: String, index: usize },

    #[error("template '{template}' lists field '{field}' more than once")]
    DuplicateField { template: String, field: String },

    #[error("template name must not be blank")]
    EmptyTemplateName,
}

impl PassportTemplate {
    pub fn new(name: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            label: None,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label shown to the user, falling back to "<name> Passport".
    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("{} Passport", self.name))
    }

    /// Check the field list can be rendered one line per field, each exactly once.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::EmptyTemplateName);
        }
        if self.fields.is_empty() {
            return Err(ConfigurationError::EmptyFields {
                template: self.name.clone(),
            });
        }

        let mut seen = HashSet::new();
        for (index, field) in self.fields.iter().enumerate() {
            if field.trim().is_empty() {
                return Err(ConfigurationError::EmptyFieldName {
                    template: self.name.clone(),
                    index,
                });
            }
            if field.contains('\n') || field.contains('\r') {
                return Err(ConfigurationError::MultiLineFieldName {
                    template: self.name.clone(),
                    index,
                });
            }
            if field.trim() != field {
                return Err(ConfigurationError::PaddedFieldName {
                    template: self.name.clone(),
                    index,
                });
            }
            if !seen.insert(field.as_str()) {
                return Err(ConfigurationError::DuplicateField {
                    template: self.name.clone(),
                    field: field.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_template() {
        let template = PassportTemplate::new("Romanian", &["Seria", "NR", "CNP"]);
        assert!(template.validate().is_ok());
        assert_eq!(template.display_label(), "Romanian Passport");
    }

    #[test]
    fn test_empty_fields_rejected() {
        let template = PassportTemplate::new("Empty", &[]);
        assert_eq!(
            template.validate(),
            Err(ConfigurationError::EmptyFields {
                template: "Empty".to_string()
            })
        );
    }

    #[test]
    fn test_blank_and_multiline_fields_rejected() {
        let blank = PassportTemplate::new("T", &["Seria", "  "]);
        assert!(matches!(
            blank.validate(),
            Err(ConfigurationError::EmptyFieldName { index: 1, .. })
        ));

        let multi = PassportTemplate::new("T", &["Seria\nNR"]);
        assert!(matches!(
            multi.validate(),
            Err(ConfigurationError::MultiLineFieldName { index: 0, .. })
        ));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let template = PassportTemplate::new("T", &["Sex", "NR", "Sex"]);
        assert!(matches!(
            template.validate(),
            Err(ConfigurationError::DuplicateField { ref field, .. }) if field == "Sex"
        ));
    }

    #[test]
    fn test_padded_field_rejected() {
        let template = PassportTemplate::new("Pakistani", &["country code ", "Sex"]);
        assert!(matches!(
            template.validate(),
            Err(ConfigurationError::PaddedFieldName { index: 0, .. })
        ));

        let near_duplicate = PassportTemplate::new("T", &["Sex", "Sex "]);
        assert!(matches!(
            near_duplicate.validate(),
            Err(ConfigurationError::PaddedFieldName { index: 1, .. })
        ));
    }

    #[test]
    fn test_deserialize_without_label() {
        let template: PassportTemplate =
            serde_json::from_str(r#"{"name": "X", "fields": ["A", "B"]}"#).unwrap();
        assert_eq!(template.label, None);
        assert_eq!(template.fields, vec!["A", "B"]);
    }
}
