//! Prompt construction for passport field extraction.
//!
//! Pure string building: the same template always yields the same bytes.

use crate::template::{ConfigurationError, PassportTemplate};
use serde::Serialize;

/// Placeholder the model is asked to replace with the field value.
pub const VALUE_PLACEHOLDER: &str = "[Value]";

/// Token the model must write for a field it cannot read.
pub const NOT_FOUND: &str = "Not Found";

/// Text sent to the vision model for one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptText {
    pub template: String,
    /// Comma-joined field names, as emphasised in the instructions.
    pub field_list: String,
    /// Markdown skeleton: one `- **<field>**: [Value]` line per field.
    pub skeleton: String,
    /// The full prompt, embedding `field_list` and `skeleton`.
    pub text: String,
}

/// Build the extraction prompt for `template`.
///
/// Fails before producing any text if the field list is empty or malformed,
/// so the caller never sends a prompt without fields to the model.
pub fn build_prompt(template: &PassportTemplate) -> Result<PromptText, ConfigurationError> {
    template.validate()?;

    let field_list = template.fields.join(", ");
    let skeleton = skeleton_lines(&template.fields).join("\n");

    let text = format!(
        "Extract all available text from the provided {name} passport image.\n\
         Focus on the following fields but include all readable text exactly as it appears. \
         Make sure you read all the given fields accurately because this is passport data:\n\
         \n\
         {field_list}\n\
         \n\
         Return the results in the following structured Markdown format:\n\
         \n\
         ```markdown\n\
         {skeleton}\n\
         ```\n\
         \n\
         Do not omit or filter any data. If a field is not found, write `{NOT_FOUND}`.\n",
        name = template.name,
    );

    Ok(PromptText {
        template: template.name.clone(),
        field_list,
        skeleton,
        text,
    })
}

fn skeleton_lines(fields: &[String]) -> Vec<String> {
    fields
        .iter()
        .map(|field| format!("- **{}**: {}", field, VALUE_PLACEHOLDER))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateStore;

    fn romanian() -> PassportTemplate {
        PassportTemplate::new("Romanian", &["Seria", "NR", "CNP"])
    }

    /// Extract the lines of the fenced markdown block from a prompt.
    fn fenced_block(text: &str) -> Vec<&str> {
        text.lines()
            .skip_while(|l| *l != "```markdown")
            .skip(1)
            .take_while(|l| *l != "```")
            .collect()
    }

    #[test]
    fn test_romanian_skeleton_lines() {
        let prompt = build_prompt(&romanian()).unwrap();
        assert_eq!(
            fenced_block(&prompt.text),
            vec![
                "- **Seria**: [Value]",
                "- **NR**: [Value]",
                "- **CNP**: [Value]",
            ]
        );
        assert_eq!(prompt.skeleton, fenced_block(&prompt.text).join("\n"));
    }

    #[test]
    fn test_every_field_once_in_order() {
        let store = TemplateStore::builtin();
        for template in store.list() {
            let prompt = build_prompt(template).unwrap();

            let expected: Vec<String> = template
                .fields
                .iter()
                .map(|f| format!("- **{}**: [Value]", f))
                .collect();
            let block: Vec<String> = fenced_block(&prompt.text)
                .into_iter()
                .map(str::to_string)
                .collect();
            assert_eq!(block, expected, "skeleton mismatch for {}", template.name);

            let listed: Vec<&str> = prompt.field_list.split(", ").collect();
            assert_eq!(listed, template.fields, "field list mismatch for {}", template.name);
        }
    }

    #[test]
    fn test_instruction_structure() {
        let prompt = build_prompt(&romanian()).unwrap();
        let text = &prompt.text;

        let task = text
            .find("Extract all available text from the provided Romanian passport image.")
            .unwrap();
        let list = text.find("\nSeria, NR, CNP\n").unwrap();
        let block = text.find("```markdown").unwrap();
        let directive = text
            .find("If a field is not found, write `Not Found`.")
            .unwrap();

        assert!(task < list && list < block && block < directive);
    }

    #[test]
    fn test_deterministic() {
        let template = romanian();
        assert_eq!(build_prompt(&template), build_prompt(&template));
    }

    #[test]
    fn test_template_name_only_difference() {
        let a = build_prompt(&PassportTemplate::new("Romanian", &["Seria", "NR"])).unwrap();
        let b = build_prompt(&PassportTemplate::new("Moldovan", &["Seria", "NR"])).unwrap();
        assert_eq!(a.skeleton, b.skeleton);
        assert_eq!(a.text.replace("Romanian", "Moldovan"), b.text);
    }

    #[test]
    fn test_empty_fields_is_configuration_error() {
        let err = build_prompt(&PassportTemplate::new("Romanian", &[])).unwrap_err();
        assert!(matches!(err, ConfigurationError::EmptyFields { .. }));
    }

    #[test]
    fn test_overlapping_field_names_stay_distinct() {
        let prompt = build_prompt(&PassportTemplate::new("P", &["SurName", "Name"])).unwrap();
        assert_eq!(prompt.skeleton, "- **SurName**: [Value]\n- **Name**: [Value]");
    }
}
