//! Product metafield editor.
//!
//! Fields are laid out by the category/section layout stored in the database
//! (`storekeep layout load`). Metafields outside the layout are listed read-only
//! with a delete action.

use std::collections::HashMap;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Router,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use super::discounts::next_page_href;
use super::{NoticeQuery, PageContext, format_datetime};
use crate::db::LayoutRepository;
use crate::error::AppError;
use crate::filters;
use crate::middleware::ShopSession;
use crate::models::Category;
use crate::services::{EditorCategory, MetafieldChanges, build_editor, collect_changes};
use crate::services::metafields::unmanaged_metafields;
use crate::shopify::{
    AdminShopifyError, Metafield, MetafieldDefinition, ProductMetafields, ProductSummary,
    gid_tail, to_gid,
};
use crate::state::AppState;

const PRODUCTS_PER_PAGE: i64 = 25;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/metafields", get(index))
        .route("/metafields/{product_id}", get(editor).post(save))
        .route("/metafields/{product_id}/delete", post(delete))
}

fn product_gid(id: &str) -> String {
    to_gid("Product", id)
}

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub cursor: Option<String>,
    pub query: Option<String>,
}

/// Product row for the list page.
#[derive(Debug, Clone)]
pub struct ProductView {
    pub id: String,
    pub title: String,
    pub handle: String,
    pub status: String,
    pub image_url: Option<String>,
    pub metafield_count: usize,
}

impl From<&ProductSummary> for ProductView {
    fn from(p: &ProductSummary) -> Self {
        Self {
            id: gid_tail(&p.id).to_string(),
            title: p.title.clone(),
            handle: p.handle.clone(),
            status: p.status.to_lowercase(),
            image_url: p.image_url.clone(),
            metafield_count: p.metafield_count,
        }
    }
}

/// A metafield outside the layout.
#[derive(Debug, Clone)]
pub struct UnmanagedView {
    pub namespace: String,
    pub key: String,
    pub name: Option<String>,
    pub field_type: String,
    pub value: String,
    pub updated_at: Option<String>,
}

impl UnmanagedView {
    fn new(metafield: &Metafield, definitions: &[MetafieldDefinition]) -> Self {
        let name = definitions
            .iter()
            .find(|d| d.namespace == metafield.namespace && d.key == metafield.key)
            .map(|d| d.name.clone());
        Self {
            namespace: metafield.namespace.clone(),
            key: metafield.key.clone(),
            name,
            field_type: metafield.field_type.clone(),
            value: metafield.value.clone(),
            updated_at: metafield.updated_at.map(format_datetime),
        }
    }
}

/// Products list template.
#[derive(Template, WebTemplate)]
#[template(path = "metafields/index.html")]
pub struct ProductsTemplate {
    pub page: PageContext,
    pub products: Vec<ProductView>,
    pub next_href: Option<String>,
    pub search_query: Option<String>,
}

/// Editor template.
#[derive(Template, WebTemplate)]
#[template(path = "metafields/editor.html")]
pub struct EditorTemplate {
    pub page: PageContext,
    pub product_id: String,
    pub product_title: String,
    pub categories: Vec<EditorCategory>,
    pub unmanaged: Vec<UnmanagedView>,
}

/// GET /metafields - Products with their metafield counts.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn index(
    session: ShopSession,
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
    Query(notice): Query<NoticeQuery>,
) -> Result<ProductsTemplate, AppError> {
    let search = query.query.filter(|q| !q.trim().is_empty());
    let mut page = PageContext::new(&state, &session, "/metafields").with_notice(&notice);

    let (products, next_href) = match session
        .client
        .get_products(PRODUCTS_PER_PAGE, query.cursor, search.clone())
        .await
    {
        Ok(conn) => (
            conn.products.iter().map(ProductView::from).collect(),
            conn.page_info
                .end_cursor
                .filter(|_| conn.page_info.has_next_page)
                .map(|cursor| next_page_href("/metafields", &cursor, search.as_deref())),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch products");
            page = page.with_error(AppError::from(e).public_message());
            (vec![], None)
        }
    };

    Ok(ProductsTemplate {
        page,
        products,
        next_href,
        search_query: search,
    })
}

/// Layout plus the product's current metafields.
async fn load(
    state: &AppState,
    session: &ShopSession,
    product_id: &str,
) -> Result<(Vec<Category>, ProductMetafields), AppError> {
    let layout = LayoutRepository::new(state.pool()).list().await?;
    let product = session
        .client
        .get_product_metafields(&product_gid(product_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {product_id}")))?;
    Ok((layout, product))
}

async fn editor_page(
    session: &ShopSession,
    page: PageContext,
    layout: &[Category],
    product: &ProductMetafields,
    submitted: Option<&HashMap<String, String>>,
    errors: &HashMap<String, String>,
) -> EditorTemplate {
    let definitions = session
        .client
        .get_product_metafield_definitions()
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to fetch metafield definitions");
            Vec::new()
        });

    EditorTemplate {
        page,
        product_id: gid_tail(&product.id).to_string(),
        product_title: product.title.clone(),
        categories: build_editor(layout, product, submitted, errors),
        unmanaged: unmanaged_metafields(layout, product)
            .into_iter()
            .map(|m| UnmanagedView::new(m, &definitions))
            .collect(),
    }
}

/// GET /metafields/{product_id} - Editor.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn editor(
    session: ShopSession,
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Query(notice): Query<NoticeQuery>,
) -> Result<EditorTemplate, AppError> {
    let (layout, product) = load(&state, &session, &product_id).await?;
    let mut page = PageContext::new(&state, &session, "/metafields").with_notice(&notice);
    if layout.is_empty() {
        page = page.with_error("No editor layout is configured. Load one with `storekeep layout load`.");
    }
    Ok(editor_page(&session, page, &layout, &product, None, &HashMap::new()).await)
}

/// Apply validated changes; `userErrors` come back as banner text.
async fn apply(
    session: &ShopSession,
    owner_id: &str,
    changes: &MetafieldChanges,
) -> Result<Result<(), String>, AppError> {
    let result = async {
        if !changes.writes.is_empty() {
            session.client.set_metafields(owner_id, &changes.writes).await?;
        }
        if !changes.deletes.is_empty() {
            session
                .client
                .delete_metafields(owner_id, &changes.deletes)
                .await?;
        }
        Ok::<_, AdminShopifyError>(())
    }
    .await;

    match result {
        Ok(()) => Ok(Ok(())),
        Err(e) => {
            let messages = e.user_messages();
            if messages.is_empty() {
                Err(e.into())
            } else {
                Ok(Err(messages.join(" ")))
            }
        }
    }
}

/// POST /metafields/{product_id} - Save the editor form.
#[instrument(skip(session, state, form), fields(shop = %session.shop.domain))]
async fn save(
    session: ShopSession,
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let (layout, product) = load(&state, &session, &product_id).await?;
    let changes = collect_changes(&layout, &product, &form);
    let redirect_to = format!("/metafields/{product_id}");

    if !changes.is_valid() {
        let page = PageContext::new(&state, &session, "/metafields")
            .with_error("Some values need fixing before they can be saved.");
        return Ok(
            editor_page(&session, page, &layout, &product, Some(&form), &changes.errors)
                .await
                .into_response(),
        );
    }

    if changes.is_empty() {
        return Ok(session.redirect(&redirect_to).into_response());
    }

    match apply(&session, &product.id, &changes).await? {
        Ok(()) => {
            tracing::info!(
                product_id = %product.id,
                writes = changes.writes.len(),
                deletes = changes.deletes.len(),
                "Metafields saved"
            );
            Ok(session
                .redirect(&format!("{redirect_to}?success=metafields_saved"))
                .into_response())
        }
        Err(message) => {
            let page = PageContext::new(&state, &session, "/metafields").with_error(message);
            Ok(
                editor_page(&session, page, &layout, &product, Some(&form), &HashMap::new())
                    .await
                    .into_response(),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteInput {
    pub namespace: String,
    pub key: String,
}

/// POST /metafields/{product_id}/delete - Delete one metafield.
#[instrument(skip(session), fields(shop = %session.shop.domain))]
async fn delete(
    session: ShopSession,
    Path(product_id): Path<String>,
    Form(input): Form<DeleteInput>,
) -> Result<Response, AppError> {
    let owner_id = product_gid(&product_id);
    let changes = MetafieldChanges {
        deletes: vec![(input.namespace, input.key)],
        ..MetafieldChanges::default()
    };

    let notice = match apply(&session, &owner_id, &changes).await? {
        Ok(()) => "success=metafields_deleted",
        Err(message) => {
            tracing::warn!(product_id = %owner_id, %message, "Metafield delete rejected");
            "error=metafields_delete_failed"
        }
    };
    Ok(session
        .redirect(&format!("/metafields/{product_id}?{notice}"))
        .into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_product_view_uses_numeric_id() {
        let view = ProductView::from(&ProductSummary {
            id: "gid://shopify/Product/123".to_string(),
            title: "Mug".to_string(),
            handle: "mug".to_string(),
            status: "ACTIVE".to_string(),
            image_url: None,
            metafield_count: 4,
        });
        assert_eq!(view.id, "123");
        assert_eq!(view.status, "active");
        assert_eq!(product_gid(&view.id), "gid://shopify/Product/123");
    }

    #[test]
    fn test_unmanaged_view_takes_definition_name() {
        let metafield = Metafield {
            id: "gid://shopify/Metafield/1".to_string(),
            namespace: "custom".to_string(),
            key: "care".to_string(),
            field_type: "multi_line_text_field".to_string(),
            value: "Hand wash".to_string(),
            updated_at: None,
        };
        let definitions = vec![MetafieldDefinition {
            id: "gid://shopify/MetafieldDefinition/9".to_string(),
            name: "Care instructions".to_string(),
            namespace: "custom".to_string(),
            key: "care".to_string(),
            field_type: "multi_line_text_field".to_string(),
            description: None,
        }];
        let view = UnmanagedView::new(&metafield, &definitions);
        assert_eq!(view.name.as_deref(), Some("Care instructions"));
        assert!(UnmanagedView::new(&metafield, &[]).name.is_none());
    }
}
