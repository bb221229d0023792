//! Metafield editor layout commands.
//!
//! The layout file groups metafield keys into categories and sections:
//!
//! ```yaml
//! categories:
//!   - name: Details
//!     sections:
//!       - title: Specs
//!         namespace: specs
//!         fields:
//!           - { key: weight_grams, type: number_integer, label: Weight (g) }
//! ```
//!
//! Loading replaces the whole layout; metafield values on products are
//! untouched.

use std::collections::HashSet;

use serde::Deserialize;
use sqlx::PgPool;
use storekeep_admin::db::{CategoryInput, LayoutRepository};

use super::{CliError, read_file};

/// Metafield types the editor renders inputs for.
const SUPPORTED_TYPES: &[&str] = &[
    "single_line_text_field",
    "multi_line_text_field",
    "number_integer",
    "number_decimal",
    "boolean",
    "json",
    "date",
    "url",
];

#[derive(Debug, Deserialize)]
struct LayoutFile {
    categories: Vec<CategoryInput>,
}

/// Parse and check a layout file.
///
/// # Errors
///
/// Returns an error for invalid YAML, an unsupported field type, or a
/// namespace/key pair that appears twice.
pub fn parse_layout(yaml: &str) -> Result<Vec<CategoryInput>, CliError> {
    let file: LayoutFile = serde_yaml::from_str(yaml)?;

    let mut seen = HashSet::new();
    for category in &file.categories {
        if category.name.trim().is_empty() {
            return Err(CliError::Invalid("category name cannot be empty".into()));
        }
        for section in &category.sections {
            if section.namespace.len() < 2 || section.namespace.contains(char::is_whitespace) {
                return Err(CliError::Invalid(format!(
                    "section {}: invalid namespace {:?}",
                    section.title, section.namespace
                )));
            }
            for field in &section.fields {
                if !SUPPORTED_TYPES.contains(&field.field_type.as_str()) {
                    return Err(CliError::Invalid(format!(
                        "{}.{}: unsupported type {}",
                        section.namespace, field.key, field.field_type
                    )));
                }
                if !seen.insert((section.namespace.as_str(), field.key.as_str())) {
                    return Err(CliError::Invalid(format!(
                        "{}.{} appears more than once",
                        section.namespace, field.key
                    )));
                }
            }
        }
    }

    Ok(file.categories)
}

/// Replace the layout with the contents of `path`.
///
/// # Errors
///
/// Returns an error if the file is invalid or the transaction fails.
pub async fn load(pool: &PgPool, path: &str) -> Result<(), CliError> {
    let categories = parse_layout(&read_file(path).await?)?;
    let sections = LayoutRepository::new(pool).replace(&categories).await?;
    tracing::info!(
        "Loaded {} categories with {sections} sections",
        categories.len()
    );
    Ok(())
}

/// Print the current layout.
///
/// # Errors
///
/// Returns an error if the query fails.
pub async fn show(pool: &PgPool) -> Result<(), CliError> {
    let categories = LayoutRepository::new(pool).list().await?;
    if categories.is_empty() {
        tracing::info!("No layout. Run `storekeep layout load <file>` first.");
        return Ok(());
    }

    for category in categories {
        tracing::info!("{}", category.name);
        for section in category.sections {
            tracing::info!("  {} ({})", section.title, section.namespace);
            for field in section.fields {
                tracing::info!(
                    "    {:<24} {:<24} {}",
                    field.key,
                    field.field_type,
                    field.display_label()
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layout() {
        let yaml = r"
categories:
  - name: Details
    sections:
      - title: Specs
        namespace: specs
        fields:
          - { key: weight_grams, type: number_integer, label: Weight (g) }
          - { key: organic, type: boolean }
  - name: Empty
";
        let categories = parse_layout(yaml).unwrap();
        assert_eq!(categories.len(), 2);
        let section = categories.first().unwrap().sections.first().unwrap();
        assert_eq!(section.fields.len(), 2);
        assert_eq!(
            section.fields.first().unwrap().label.as_deref(),
            Some("Weight (g)")
        );
        assert!(categories.get(1).unwrap().sections.is_empty());
    }

    #[test]
    fn test_unsupported_type_rejected() {
        let yaml = r"
categories:
  - name: Media
    sections:
      - title: Images
        namespace: media
        fields:
          - { key: hero, type: file_reference }
";
        let err = parse_layout(yaml).unwrap_err();
        assert!(err.to_string().contains("unsupported type file_reference"));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let yaml = r"
categories:
  - name: A
    sections:
      - { title: One, namespace: specs, fields: [{ key: size, type: single_line_text_field }] }
  - name: B
    sections:
      - { title: Two, namespace: specs, fields: [{ key: size, type: number_integer }] }
";
        let err = parse_layout(yaml).unwrap_err();
        assert!(err.to_string().contains("specs.size appears more than once"));
    }
}
