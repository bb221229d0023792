//! Metafield types.

use chrono::{DateTime, Utc};

use super::common::PageInfo;

/// A metafield value attached to a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metafield {
    pub id: String,
    pub namespace: String,
    pub key: String,
    /// Metafield type name (e.g., `number_integer`).
    pub field_type: String,
    pub value: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A product row on the metafield overview page.
#[derive(Debug, Clone)]
pub struct ProductSummary {
    pub id: String,
    pub title: String,
    pub handle: String,
    pub status: String,
    pub image_url: Option<String>,
    pub metafield_count: usize,
}

/// A page of products.
#[derive(Debug, Clone, Default)]
pub struct ProductSummaryConnection {
    pub products: Vec<ProductSummary>,
    pub page_info: PageInfo,
}

/// A product with its metafields, for the editor.
#[derive(Debug, Clone)]
pub struct ProductMetafields {
    pub id: String,
    pub title: String,
    pub handle: String,
    pub metafields: Vec<Metafield>,
}

impl ProductMetafields {
    /// Find the metafield stored under `namespace.key`.
    #[must_use]
    pub fn get(&self, namespace: &str, key: &str) -> Option<&Metafield> {
        self.metafields
            .iter()
            .find(|m| m.namespace == namespace && m.key == key)
    }
}

/// A value to write with `metafieldsSet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetafieldWrite {
    pub namespace: String,
    pub key: String,
    pub field_type: String,
    pub value: String,
}

/// A metafield definition configured in the shop.
#[derive(Debug, Clone)]
pub struct MetafieldDefinition {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub key: String,
    pub field_type: String,
    pub description: Option<String>,
}
