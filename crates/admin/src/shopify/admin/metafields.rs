//! Product metafield operations.

use tracing::instrument;

use super::{
    AdminClient, AdminShopifyError, check_user_errors, missing,
    queries::IdVariables,
    queries::metafields::{
        GetProductMetafields, GetProducts, GetProductsVariables, MetafieldDefinitions,
        MetafieldDefinitionsVariables, MetafieldIdentifierInput, MetafieldNode, MetafieldsDelete,
        MetafieldsDeleteVariables, MetafieldsSet, MetafieldsSetInput, MetafieldsSetVariables,
    },
};
use crate::shopify::types::{
    Metafield, MetafieldDefinition, MetafieldWrite, ProductMetafields, ProductSummary,
    ProductSummaryConnection,
};

/// `metafieldsSet` accepts at most this many inputs per call.
pub const METAFIELDS_SET_LIMIT: usize = 25;

fn convert_metafield(node: MetafieldNode) -> Metafield {
    Metafield {
        id: node.id,
        namespace: node.namespace,
        key: node.key,
        field_type: node.field_type,
        value: node.value,
        updated_at: node.updated_at,
    }
}

impl AdminClient {
    /// Get a page of products with their metafield counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_products(
        &self,
        first: i64,
        after: Option<String>,
        query: Option<String>,
    ) -> Result<ProductSummaryConnection, AdminShopifyError> {
        let variables = GetProductsVariables {
            first,
            after,
            query,
        };

        let response = self.execute::<GetProducts>(variables).await?;

        let products = response
            .products
            .nodes
            .into_iter()
            .map(|p| ProductSummary {
                id: p.id,
                title: p.title,
                handle: p.handle,
                status: p.status,
                image_url: p
                    .featured_media
                    .and_then(|m| m.preview)
                    .and_then(|p| p.image)
                    .map(|i| i.url),
                metafield_count: p.metafields.nodes.len(),
            })
            .collect();

        Ok(ProductSummaryConnection {
            products,
            page_info: response.products.page_info,
        })
    }

    /// Get one product and all of its metafields.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product_metafields(
        &self,
        id: &str,
    ) -> Result<Option<ProductMetafields>, AdminShopifyError> {
        let response = self
            .execute::<GetProductMetafields>(IdVariables { id: id.to_string() })
            .await?;

        Ok(response.product.map(|p| ProductMetafields {
            id: p.id,
            title: p.title,
            handle: p.handle,
            metafields: p.metafields.nodes.into_iter().map(convert_metafield).collect(),
        }))
    }

    /// Write metafields on one owner, batching past the per-call limit.
    ///
    /// Batches are sent in order; a rejected batch stops the write and earlier
    /// batches stay applied.
    ///
    /// # Errors
    ///
    /// Returns `UserErrors` for values Shopify rejects (e.g. a value that does
    /// not match its type).
    #[instrument(skip(self, writes), fields(owner_id = %owner_id, count = writes.len()))]
    pub async fn set_metafields(
        &self,
        owner_id: &str,
        writes: &[MetafieldWrite],
    ) -> Result<Vec<Metafield>, AdminShopifyError> {
        let mut saved = Vec::with_capacity(writes.len());

        for batch in writes.chunks(METAFIELDS_SET_LIMIT) {
            let variables = MetafieldsSetVariables {
                metafields: batch
                    .iter()
                    .map(|w| MetafieldsSetInput {
                        owner_id: owner_id.to_string(),
                        namespace: w.namespace.clone(),
                        key: w.key.clone(),
                        field_type: w.field_type.clone(),
                        value: w.value.clone(),
                    })
                    .collect(),
            };

            let payload = self
                .execute::<MetafieldsSet>(variables)
                .await?
                .metafields_set
                .ok_or_else(|| missing("No payload returned from metafieldsSet"))?;
            check_user_errors(payload.user_errors)?;

            saved.extend(
                payload
                    .metafields
                    .unwrap_or_default()
                    .into_iter()
                    .map(convert_metafield),
            );
        }

        Ok(saved)
    }

    /// Delete metafields by `(namespace, key)` from one owner.
    ///
    /// Returns how many metafields existed and were deleted.
    ///
    /// # Errors
    ///
    /// Returns `UserErrors` or an API error.
    #[instrument(skip(self, keys), fields(owner_id = %owner_id, count = keys.len()))]
    pub async fn delete_metafields(
        &self,
        owner_id: &str,
        keys: &[(String, String)],
    ) -> Result<usize, AdminShopifyError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let variables = MetafieldsDeleteVariables {
            metafields: keys
                .iter()
                .map(|(namespace, key)| MetafieldIdentifierInput {
                    owner_id: owner_id.to_string(),
                    namespace: namespace.clone(),
                    key: key.clone(),
                })
                .collect(),
        };

        let payload = self
            .execute::<MetafieldsDelete>(variables)
            .await?
            .metafields_delete
            .ok_or_else(|| missing("No payload returned from metafieldsDelete"))?;
        check_user_errors(payload.user_errors)?;

        Ok(payload
            .deleted_metafields
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .count())
    }

    /// Metafield definitions for products.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_product_metafield_definitions(
        &self,
    ) -> Result<Vec<MetafieldDefinition>, AdminShopifyError> {
        let variables = MetafieldDefinitionsVariables {
            owner_type: "PRODUCT",
        };

        let response = self.execute::<MetafieldDefinitions>(variables).await?;

        Ok(response
            .metafield_definitions
            .nodes
            .into_iter()
            .map(|d| MetafieldDefinition {
                id: d.id,
                name: d.name,
                namespace: d.namespace,
                key: d.key,
                field_type: d.field_type.name,
                description: d.description.filter(|s| !s.is_empty()),
            })
            .collect())
    }
}
