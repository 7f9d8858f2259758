//! Display helpers for model output.

/// Split a model response into lines for Markdown rendering.
///
/// Handles `\n`, `\r\n` and bare `\r`. Empty lines are kept so the rendered
/// output matches the response line for line.
pub fn display_lines(raw: &str) -> Vec<String> {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(str::to_string)
        .collect()
}

pub fn heading(template: &str) -> String {
    format!("Extracted {} Passport Data", template)
}
