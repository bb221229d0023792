//! Metafield editor: value validation and form handling.
//!
//! The editor shows the layout's categories and sections for one product.
//! Each input is named `namespace.key`; on save every value is validated
//! against its metafield type before anything is written.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{Category, SectionField};
use crate::shopify::{Metafield, MetafieldWrite, ProductMetafields};

/// Why a submitted value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetafieldValueError {
    #[error("must be a whole number")]
    Integer,
    #[error("must be a decimal number")]
    Decimal,
    #[error("must be true or false")]
    Boolean,
    #[error("must be valid JSON: {0}")]
    Json(String),
    #[error("must fit on a single line")]
    Multiline,
    #[error("must be a date (YYYY-MM-DD)")]
    Date,
    #[error("must be an http or https URL")]
    Url,
}

/// Validate `raw` for a metafield of `field_type`, returning the value to store.
///
/// Values are trimmed except for multi-line text. JSON is re-serialised
/// compactly. Types without a specific rule are stored as entered.
///
/// # Errors
///
/// Returns the rule the value breaks.
pub fn validate_value(field_type: &str, raw: &str) -> Result<String, MetafieldValueError> {
    let trimmed = raw.trim();
    match field_type {
        "number_integer" => trimmed
            .parse::<i64>()
            .map(|n| n.to_string())
            .map_err(|_| MetafieldValueError::Integer),
        "number_decimal" => Decimal::from_str(trimmed)
            .map(|d| d.normalize().to_string())
            .map_err(|_| MetafieldValueError::Decimal),
        "boolean" => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "on" | "1" => Ok("true".to_string()),
            "false" | "off" | "0" => Ok("false".to_string()),
            _ => Err(MetafieldValueError::Boolean),
        },
        "json" => serde_json::from_str::<serde_json::Value>(trimmed)
            .map(|v| v.to_string())
            .map_err(|e| MetafieldValueError::Json(e.to_string())),
        "single_line_text_field" => {
            if trimmed.contains(['\n', '\r']) {
                Err(MetafieldValueError::Multiline)
            } else {
                Ok(trimmed.to_string())
            }
        }
        "multi_line_text_field" => Ok(raw.replace("\r\n", "\n")),
        "date" => chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(|d| d.format("%Y-%m-%d").to_string())
            .map_err(|_| MetafieldValueError::Date),
        "url" => match url::Url::parse(trimmed) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(trimmed.to_string()),
            _ => Err(MetafieldValueError::Url),
        },
        _ => Ok(trimmed.to_string()),
    }
}

/// Form input name for a field.
#[must_use]
pub fn input_name(namespace: &str, key: &str) -> String {
    format!("{namespace}.{key}")
}

/// One editable field with its current value.
#[derive(Debug, Clone)]
pub struct EditorField {
    pub name: String,
    pub label: String,
    pub key: String,
    pub field_type: String,
    pub value: String,
    pub metafield_id: Option<String>,
    pub error: Option<String>,
}

impl EditorField {
    #[must_use]
    pub fn is_boolean(&self) -> bool {
        self.field_type == "boolean"
    }

    #[must_use]
    pub fn is_multiline(&self) -> bool {
        matches!(self.field_type.as_str(), "multi_line_text_field" | "json")
    }
}

#[derive(Debug, Clone)]
pub struct EditorSection {
    pub title: String,
    pub namespace: String,
    pub fields: Vec<EditorField>,
}

#[derive(Debug, Clone)]
pub struct EditorCategory {
    pub name: String,
    pub sections: Vec<EditorSection>,
}

/// Metafields of the product that no section covers.
#[must_use]
pub fn unmanaged_metafields<'a>(
    layout: &[Category],
    product: &'a ProductMetafields,
) -> Vec<&'a Metafield> {
    product
        .metafields
        .iter()
        .filter(|m| {
            !layout.iter().flat_map(|c| &c.sections).any(|s| {
                s.namespace == m.namespace && s.fields.iter().any(|f| f.key == m.key)
            })
        })
        .collect()
}

/// Lay out the product's metafields by category and section.
///
/// `submitted` and `errors` re-fill the form after a rejected save, keyed by
/// input name.
#[must_use]
pub fn build_editor(
    layout: &[Category],
    product: &ProductMetafields,
    submitted: Option<&HashMap<String, String>>,
    errors: &HashMap<String, String>,
) -> Vec<EditorCategory> {
    layout
        .iter()
        .map(|category| EditorCategory {
            name: category.name.clone(),
            sections: category
                .sections
                .iter()
                .map(|section| EditorSection {
                    title: section.title.clone(),
                    namespace: section.namespace.clone(),
                    fields: section
                        .fields
                        .iter()
                        .map(|field| {
                            editor_field(&section.namespace, field, product, submitted, errors)
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect()
}

fn editor_field(
    namespace: &str,
    field: &SectionField,
    product: &ProductMetafields,
    submitted: Option<&HashMap<String, String>>,
    errors: &HashMap<String, String>,
) -> EditorField {
    let name = input_name(namespace, &field.key);
    let existing = product.get(namespace, &field.key);
    let value = submitted
        .and_then(|form| form.get(&name).cloned())
        .or_else(|| existing.map(|m| m.value.clone()))
        .unwrap_or_default();

    EditorField {
        label: field.display_label().to_string(),
        key: field.key.clone(),
        field_type: field.field_type.clone(),
        value,
        metafield_id: existing.map(|m| m.id.clone()),
        error: errors.get(&name).cloned(),
        name,
    }
}

/// Changes derived from a submitted editor form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetafieldChanges {
    pub writes: Vec<MetafieldWrite>,
    /// `(namespace, key)` of cleared fields that currently have a value.
    pub deletes: Vec<(String, String)>,
    /// Validation errors keyed by input name.
    pub errors: HashMap<String, String>,
}

impl MetafieldChanges {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.deletes.is_empty()
    }
}

/// Compare the submitted form with the product's metafields.
///
/// Unchanged values are skipped. Booleans missing from the form are treated
/// as unchecked checkboxes.
#[must_use]
pub fn collect_changes(
    layout: &[Category],
    product: &ProductMetafields,
    form: &HashMap<String, String>,
) -> MetafieldChanges {
    let mut changes = MetafieldChanges::default();

    for section in layout.iter().flat_map(|c| &c.sections) {
        for field in &section.fields {
            let name = input_name(&section.namespace, &field.key);
            let existing = product.get(&section.namespace, &field.key);

            let raw = match form.get(&name) {
                Some(raw) => raw.as_str(),
                None if field.field_type == "boolean" => "false",
                None => continue,
            };

            if raw.trim().is_empty() {
                if existing.is_some() {
                    changes
                        .deletes
                        .push((section.namespace.clone(), field.key.clone()));
                }
                continue;
            }

            match validate_value(&field.field_type, raw) {
                Ok(value) => {
                    if existing.is_some_and(|m| m.value == value) {
                        continue;
                    }
                    changes.writes.push(MetafieldWrite {
                        namespace: section.namespace.clone(),
                        key: field.key.clone(),
                        field_type: field.field_type.clone(),
                        value,
                    });
                }
                Err(e) => {
                    changes
                        .errors
                        .insert(name, format!("{} {e}", field.display_label()));
                }
            }
        }
    }

    changes
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use storekeep_core::{CategoryId, SectionId};

    use super::*;
    use crate::models::Section;

    fn layout() -> Vec<Category> {
        vec![Category {
            id: CategoryId::new(1),
            name: "Specs".to_string(),
            position: 0,
            sections: vec![Section {
                id: SectionId::new(1),
                category_id: CategoryId::new(1),
                title: "Physical".to_string(),
                namespace: "specs".to_string(),
                fields: vec![
                    SectionField {
                        key: "weight_g".to_string(),
                        field_type: "number_integer".to_string(),
                        label: Some("Weight".to_string()),
                    },
                    SectionField {
                        key: "material".to_string(),
                        field_type: "single_line_text_field".to_string(),
                        label: None,
                    },
                    SectionField {
                        key: "fragile".to_string(),
                        field_type: "boolean".to_string(),
                        label: None,
                    },
                ],
                position: 0,
            }],
        }]
    }

    fn product() -> ProductMetafields {
        ProductMetafields {
            id: "gid://shopify/Product/1".to_string(),
            title: "Mug".to_string(),
            handle: "mug".to_string(),
            metafields: vec![
                Metafield {
                    id: "gid://shopify/Metafield/10".to_string(),
                    namespace: "specs".to_string(),
                    key: "material".to_string(),
                    field_type: "single_line_text_field".to_string(),
                    value: "Ceramic".to_string(),
                    updated_at: None,
                },
                Metafield {
                    id: "gid://shopify/Metafield/11".to_string(),
                    namespace: "custom".to_string(),
                    key: "legacy".to_string(),
                    field_type: "single_line_text_field".to_string(),
                    value: "x".to_string(),
                    updated_at: None,
                },
            ],
        }
    }

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_validate_value_rules() {
        assert_eq!(validate_value("number_integer", " 42 ").unwrap(), "42");
        assert_eq!(
            validate_value("number_integer", "4.2"),
            Err(MetafieldValueError::Integer)
        );
        assert_eq!(validate_value("number_decimal", "1.50").unwrap(), "1.5");
        assert_eq!(validate_value("boolean", "on").unwrap(), "true");
        assert_eq!(validate_value("boolean", "yes"), Err(MetafieldValueError::Boolean));
        assert_eq!(validate_value("json", "{ \"a\": 1 }").unwrap(), "{\"a\":1}");
        assert!(matches!(validate_value("json", "{"), Err(MetafieldValueError::Json(_))));
        assert_eq!(
            validate_value("single_line_text_field", "a\nb"),
            Err(MetafieldValueError::Multiline)
        );
        assert_eq!(
            validate_value("multi_line_text_field", "a\r\nb").unwrap(),
            "a\nb"
        );
        assert_eq!(validate_value("date", "2026-02-30"), Err(MetafieldValueError::Date));
        assert_eq!(validate_value("url", "ftp://x"), Err(MetafieldValueError::Url));
        assert_eq!(validate_value("color", " #fff ").unwrap(), "#fff");
    }

    #[test]
    fn test_collect_changes() {
        let changes = collect_changes(
            &layout(),
            &product(),
            &form(&[("specs.weight_g", "350"), ("specs.material", "")]),
        );
        assert!(changes.is_valid());
        assert_eq!(
            changes.deletes,
            vec![("specs".to_string(), "material".to_string())]
        );
        assert_eq!(changes.writes.len(), 2);
        assert_eq!(changes.writes[0].value, "350");
        // unchecked checkbox
        assert_eq!(changes.writes[1].key, "fragile");
        assert_eq!(changes.writes[1].value, "false");
    }

    #[test]
    fn test_unchanged_values_are_skipped() {
        let changes = collect_changes(
            &layout(),
            &product(),
            &form(&[("specs.material", "Ceramic"), ("specs.fragile", "true")]),
        );
        assert_eq!(changes.writes.len(), 1);
        assert_eq!(changes.writes[0].key, "fragile");
    }

    #[test]
    fn test_collect_changes_reports_errors() {
        let changes = collect_changes(&layout(), &product(), &form(&[("specs.weight_g", "heavy")]));
        assert!(!changes.is_valid());
        assert_eq!(
            changes.errors.get("specs.weight_g").unwrap(),
            "Weight must be a whole number"
        );
    }

    #[test]
    fn test_build_editor_prefers_submitted_values() {
        let submitted = form(&[("specs.material", "Stoneware")]);
        let errors = form(&[("specs.material", "bad")]);
        let editor = build_editor(&layout(), &product(), Some(&submitted), &errors);
        let fields = &editor[0].sections[0].fields;
        assert_eq!(fields[1].value, "Stoneware");
        assert_eq!(fields[1].error.as_deref(), Some("bad"));
        assert_eq!(fields[1].metafield_id.as_deref(), Some("gid://shopify/Metafield/10"));
        assert_eq!(fields[0].value, "");
        assert!(fields[2].is_boolean());
    }

    #[test]
    fn test_unmanaged_metafields() {
        let layout = layout();
        let product = product();
        let extra = unmanaged_metafields(&layout, &product);
        assert_eq!(extra.len(), 1);
        assert_eq!(extra[0].key, "legacy");
    }
}
