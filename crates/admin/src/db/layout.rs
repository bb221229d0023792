//! Metafield editor layout repository.

use serde::Deserialize;
use sqlx::PgPool;
use storekeep_core::{CategoryId, SectionId};

use super::RepositoryError;
use crate::models::{Category, Section, SectionField};

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i32,
    name: String,
    position: i32,
}

#[derive(sqlx::FromRow)]
struct SectionRow {
    id: i32,
    category_id: i32,
    title: String,
    namespace: String,
    fields: serde_json::Value,
    position: i32,
}

impl TryFrom<SectionRow> for Section {
    type Error = RepositoryError;

    fn try_from(row: SectionRow) -> Result<Self, Self::Error> {
        let fields: Vec<SectionField> = serde_json::from_value(row.fields).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid section fields in database: {e}"))
        })?;
        Ok(Self {
            id: SectionId::new(row.id),
            category_id: CategoryId::new(row.category_id),
            title: row.title,
            namespace: row.namespace,
            fields,
            position: row.position,
        })
    }
}

/// A category as written in the layout file imported by the CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub sections: Vec<SectionInput>,
}

/// A section as written in the layout file.
#[derive(Debug, Clone, Deserialize)]
pub struct SectionInput {
    pub title: String,
    pub namespace: String,
    pub fields: Vec<SectionField>,
}

/// Repository for the metafield editor layout.
pub struct LayoutRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> LayoutRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All categories with their sections, both in `position` order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DataCorruption` if a section's field list is malformed.
    pub async fn list(&self) -> Result<Vec<Category>, RepositoryError> {
        let categories = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, position FROM app.category ORDER BY position, id",
        )
        .fetch_all(self.pool)
        .await?;

        let sections = sqlx::query_as::<_, SectionRow>(
            r"
            SELECT id, category_id, title, namespace, fields, position
            FROM app.section
            ORDER BY position, id
            ",
        )
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(Section::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(categories
            .into_iter()
            .map(|c| {
                let id = CategoryId::new(c.id);
                Category {
                    id,
                    name: c.name,
                    position: c.position,
                    sections: sections
                        .iter()
                        .filter(|s| s.category_id == id)
                        .cloned()
                        .collect(),
                }
            })
            .collect())
    }

    /// Replace the whole layout in one transaction.
    ///
    /// Positions follow the order of the input.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any statement fails; nothing is
    /// changed in that case.
    pub async fn replace(&self, categories: &[CategoryInput]) -> Result<usize, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM app.category").execute(&mut *tx).await?;

        let mut sections_written = 0;
        for (position, category) in (0_i32..).zip(categories) {
            let category_id: i32 = sqlx::query_scalar(
                "INSERT INTO app.category (name, position) VALUES ($1, $2) RETURNING id",
            )
            .bind(&category.name)
            .bind(position)
            .fetch_one(&mut *tx)
            .await?;

            for (section_position, section) in (0_i32..).zip(&category.sections) {
                let fields = serde_json::to_value(&section.fields).map_err(|e| {
                    RepositoryError::DataCorruption(format!("invalid section fields: {e}"))
                })?;
                sqlx::query(
                    r"
                    INSERT INTO app.section (category_id, title, namespace, fields, position)
                    VALUES ($1, $2, $3, $4, $5)
                    ",
                )
                .bind(category_id)
                .bind(&section.title)
                .bind(&section.namespace)
                .bind(fields)
                .bind(section_position)
                .execute(&mut *tx)
                .await?;
                sections_written += 1;
            }
        }

        tx.commit().await?;
        Ok(sections_written)
    }
}
