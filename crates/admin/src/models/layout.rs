//! Metafield editor layout.
//!
//! A [`Category`] groups [`Section`]s; each section edits a set of keys in
//! one metafield namespace.

use serde::{Deserialize, Serialize};
use storekeep_core::{CategoryId, SectionId};

/// Top-level grouping shown as a tab in the editor.
#[derive(Debug, Clone)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub position: i32,
    pub sections: Vec<Section>,
}

/// A block of fields sharing one namespace.
#[derive(Debug, Clone)]
pub struct Section {
    pub id: SectionId,
    pub category_id: CategoryId,
    pub title: String,
    pub namespace: String,
    pub fields: Vec<SectionField>,
    pub position: i32,
}

/// One editable metafield key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionField {
    pub key: String,
    /// Metafield type name (e.g., `number_integer`).
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl SectionField {
    /// Label for the form input, falling back to the key.
    #[must_use]
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_section_field_json_shape() {
        let fields: Vec<SectionField> = serde_json::from_str(
            r#"[{"key":"material","type":"single_line_text_field","label":"Material"},
                {"key":"weight_g","type":"number_integer"}]"#,
        )
        .unwrap();
        assert_eq!(fields[0].display_label(), "Material");
        assert_eq!(fields[1].field_type, "number_integer");
        assert_eq!(fields[1].display_label(), "weight_g");
    }
}
