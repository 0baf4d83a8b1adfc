//! Note template model.
//!
//! # Invariants
//! - Template ids are lowercase slugs derived from the name.
//! - Built-in templates carry `is_default == true` and are read-only.

use serde::{Deserialize, Serialize};

/// Reusable note body with placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub is_default: bool,
    pub content: String,
}

/// Caller-supplied fields for saving or updating a custom template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub content: String,
}

impl TemplateInput {
    pub fn into_template(self, id: String) -> Template {
        Template {
            id,
            name: self.name.trim().to_string(),
            description: self.description,
            icon: self.icon,
            is_default: false,
            content: self.content,
        }
    }
}

/// Slug of `name`: lowercase alphanumerics joined by single dashes.
///
/// Returns an empty string when `name` has no alphanumeric characters.
pub fn generate_template_id(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::generate_template_id;

    #[test]
    fn template_id_collapses_separators() {
        assert_eq!(generate_template_id("Meeting Notes"), "meeting-notes");
        assert_eq!(generate_template_id("  Weekly / Review!! "), "weekly-review");
        assert_eq!(generate_template_id("Q3 2024 plan"), "q3-2024-plan");
    }

    #[test]
    fn template_id_of_symbols_only_is_empty() {
        assert_eq!(generate_template_id("--- !!"), "");
    }
}
