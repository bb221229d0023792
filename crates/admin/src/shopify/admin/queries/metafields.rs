//! Product metafield operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{IdVariables, Nodes, operation};
use crate::shopify::types::{PageInfo, UserError};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafieldNode {
    pub id: String,
    pub namespace: String,
    pub key: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub value: String,
    pub updated_at: Option<DateTime<Utc>>,
}

// -----------------------------------------------------------------------------
// Product list
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaPreview {
    pub image: Option<ImageUrl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeaturedMedia {
    pub preview: Option<MediaPreview>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetafieldStub {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListNode {
    pub id: String,
    pub title: String,
    pub handle: String,
    pub status: String,
    pub featured_media: Option<FeaturedMedia>,
    pub metafields: Nodes<MetafieldStub>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GetProductsVariables {
    pub first: i64,
    pub after: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductConnection {
    pub nodes: Vec<ProductListNode>,
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetProductsData {
    pub products: ProductConnection,
}

operation!(
    GetProducts,
    "GetProducts",
    GetProductsVariables,
    GetProductsData,
    r"query GetProducts($first: Int!, $after: String, $query: String) {
  products(first: $first, after: $after, query: $query, sortKey: TITLE) {
    nodes {
      id
      title
      handle
      status
      featuredMedia { preview { image { url } } }
      metafields(first: 100) { nodes { id } }
    }
    pageInfo { hasNextPage endCursor }
  }
}"
);

// -----------------------------------------------------------------------------
// One product's metafields
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ProductMetafieldsNode {
    pub id: String,
    pub title: String,
    pub handle: String,
    pub metafields: Nodes<MetafieldNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetProductMetafieldsData {
    pub product: Option<ProductMetafieldsNode>,
}

operation!(
    GetProductMetafields,
    "GetProductMetafields",
    IdVariables,
    GetProductMetafieldsData,
    r"query GetProductMetafields($id: ID!) {
  product(id: $id) {
    id
    title
    handle
    metafields(first: 250) {
      nodes { id namespace key type value updatedAt }
    }
  }
}"
);

// -----------------------------------------------------------------------------
// metafieldsSet / metafieldsDelete
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafieldsSetInput {
    pub owner_id: String,
    pub namespace: String,
    pub key: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetafieldsSetVariables {
    pub metafields: Vec<MetafieldsSetInput>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafieldsSetPayload {
    #[serde(default)]
    pub metafields: Option<Vec<MetafieldNode>>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafieldsSetData {
    pub metafields_set: Option<MetafieldsSetPayload>,
}

operation!(
    MetafieldsSet,
    "MetafieldsSet",
    MetafieldsSetVariables,
    MetafieldsSetData,
    r"mutation MetafieldsSet($metafields: [MetafieldsSetInput!]!) {
  metafieldsSet(metafields: $metafields) {
    metafields { id namespace key type value updatedAt }
    userErrors { field message code }
  }
}"
);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafieldIdentifierInput {
    pub owner_id: String,
    pub namespace: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetafieldsDeleteVariables {
    pub metafields: Vec<MetafieldIdentifierInput>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMetafield {
    pub key: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafieldsDeletePayload {
    #[serde(default)]
    pub deleted_metafields: Option<Vec<Option<DeletedMetafield>>>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafieldsDeleteData {
    pub metafields_delete: Option<MetafieldsDeletePayload>,
}

operation!(
    MetafieldsDelete,
    "MetafieldsDelete",
    MetafieldsDeleteVariables,
    MetafieldsDeleteData,
    r"mutation MetafieldsDelete($metafields: [MetafieldIdentifierInput!]!) {
  metafieldsDelete(metafields: $metafields) {
    deletedMetafields { key namespace }
    userErrors { field message }
  }
}"
);

// -----------------------------------------------------------------------------
// Definitions
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DefinitionType {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetafieldDefinitionNode {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub key: String,
    #[serde(rename = "type")]
    pub field_type: DefinitionType,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafieldDefinitionsVariables {
    pub owner_type: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafieldDefinitionsData {
    pub metafield_definitions: Nodes<MetafieldDefinitionNode>,
}

operation!(
    MetafieldDefinitions,
    "MetafieldDefinitions",
    MetafieldDefinitionsVariables,
    MetafieldDefinitionsData,
    r"query MetafieldDefinitions($ownerType: MetafieldOwnerType!) {
  metafieldDefinitions(ownerType: $ownerType, first: 250) {
    nodes { id name namespace key type { name } description }
  }
}"
);
