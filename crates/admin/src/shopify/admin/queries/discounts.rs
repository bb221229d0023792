//! Discount code operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{IdVariables, Nodes, operation};
use crate::shopify::types::{MoneyV2, PageInfo, UserError};

/// Selection shared by every code discount type. Only `DiscountCodeBasic`
/// carries `customerGets`, which the editor needs to show a value.
macro_rules! code_discount_fields {
    () => {
        r"
      codeDiscount {
        __typename
        ... on DiscountCodeBasic {
          title status startsAt endsAt usageLimit asyncUsageCount
          codes(first: 1) { nodes { code } }
          customerGets {
            value {
              __typename
              ... on DiscountPercentage { percentage }
              ... on DiscountAmount { amount { amount currencyCode } }
            }
          }
        }
        ... on DiscountCodeBxgy {
          title status startsAt endsAt usageLimit asyncUsageCount
          codes(first: 1) { nodes { code } }
        }
        ... on DiscountCodeFreeShipping {
          title status startsAt endsAt usageLimit asyncUsageCount
          codes(first: 1) { nodes { code } }
        }
      }"
    };
}

// -----------------------------------------------------------------------------
// Response shapes
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RedeemCode {
    pub code: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscountValueNode {
    #[serde(rename = "__typename")]
    pub typename: String,
    pub percentage: Option<f64>,
    pub amount: Option<MoneyV2>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerGets {
    pub value: DiscountValueNode,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodeDiscount {
    #[serde(rename = "__typename")]
    pub typename: String,
    pub title: String,
    pub status: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    pub async_usage_count: i64,
    pub codes: Option<Nodes<RedeemCode>>,
    pub customer_gets: Option<CustomerGets>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeDiscountNode {
    pub id: String,
    pub code_discount: CodeDiscount,
}

// -----------------------------------------------------------------------------
// Queries
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct GetDiscountCodesVariables {
    pub first: i64,
    pub after: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeDiscountNodeConnection {
    pub nodes: Vec<CodeDiscountNode>,
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDiscountCodesData {
    pub code_discount_nodes: CodeDiscountNodeConnection,
}

operation!(
    GetDiscountCodes,
    "GetDiscountCodes",
    GetDiscountCodesVariables,
    GetDiscountCodesData,
    concat!(
        r"query GetDiscountCodes($first: Int!, $after: String, $query: String) {
  codeDiscountNodes(first: $first, after: $after, query: $query, sortKey: CREATED_AT, reverse: true) {
    nodes {
      id",
        code_discount_fields!(),
        r"
    }
    pageInfo { hasNextPage endCursor }
  }
}"
    )
);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDiscountCodeData {
    pub code_discount_node: Option<CodeDiscountNode>,
}

operation!(
    GetDiscountCode,
    "GetDiscountCode",
    IdVariables,
    GetDiscountCodeData,
    concat!(
        r"query GetDiscountCode($id: ID!) {
  codeDiscountNode(id: $id) {
    id",
        code_discount_fields!(),
        r"
  }
}"
    )
);

// -----------------------------------------------------------------------------
// Basic code create / update
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct AllSelection {
    pub all: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountAmountInput {
    pub amount: Decimal,
    pub applies_on_each_item: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerGetsValueInput {
    /// Fraction between 0 and 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<DiscountAmountInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerGetsInput {
    pub value: CustomerGetsValueInput,
    pub items: AllSelection,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCodeBasicInput {
    pub title: String,
    pub code: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    pub applies_once_per_customer: bool,
    pub customer_selection: AllSelection,
    pub customer_gets: CustomerGetsInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeId {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCodeBasicCreateVariables {
    pub basic_code_discount: DiscountCodeBasicInput,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountNodePayload {
    pub code_discount_node: Option<NodeId>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCodeBasicCreateData {
    pub discount_code_basic_create: Option<DiscountNodePayload>,
}

operation!(
    DiscountCodeBasicCreate,
    "DiscountCodeBasicCreate",
    DiscountCodeBasicCreateVariables,
    DiscountCodeBasicCreateData,
    r"mutation DiscountCodeBasicCreate($basicCodeDiscount: DiscountCodeBasicInput!) {
  discountCodeBasicCreate(basicCodeDiscount: $basicCodeDiscount) {
    codeDiscountNode { id }
    userErrors { field message code }
  }
}"
);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCodeBasicUpdateVariables {
    pub id: String,
    pub basic_code_discount: DiscountCodeBasicInput,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCodeBasicUpdateData {
    pub discount_code_basic_update: Option<DiscountNodePayload>,
}

operation!(
    DiscountCodeBasicUpdate,
    "DiscountCodeBasicUpdate",
    DiscountCodeBasicUpdateVariables,
    DiscountCodeBasicUpdateData,
    r"mutation DiscountCodeBasicUpdate($id: ID!, $basicCodeDiscount: DiscountCodeBasicInput!) {
  discountCodeBasicUpdate(id: $id, basicCodeDiscount: $basicCodeDiscount) {
    codeDiscountNode { id }
    userErrors { field message code }
  }
}"
);

// -----------------------------------------------------------------------------
// Activate / deactivate / delete
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCodeActivateData {
    pub discount_code_activate: Option<DiscountNodePayload>,
}

operation!(
    DiscountCodeActivate,
    "DiscountCodeActivate",
    IdVariables,
    DiscountCodeActivateData,
    r"mutation DiscountCodeActivate($id: ID!) {
  discountCodeActivate(id: $id) {
    codeDiscountNode { id }
    userErrors { field message code }
  }
}"
);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCodeDeactivateData {
    pub discount_code_deactivate: Option<DiscountNodePayload>,
}

operation!(
    DiscountCodeDeactivate,
    "DiscountCodeDeactivate",
    IdVariables,
    DiscountCodeDeactivateData,
    r"mutation DiscountCodeDeactivate($id: ID!) {
  discountCodeDeactivate(id: $id) {
    codeDiscountNode { id }
    userErrors { field message code }
  }
}"
);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCodeDeletePayload {
    pub deleted_code_discount_id: Option<String>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCodeDeleteData {
    pub discount_code_delete: Option<DiscountCodeDeletePayload>,
}

operation!(
    DiscountCodeDelete,
    "DiscountCodeDelete",
    IdVariables,
    DiscountCodeDeleteData,
    r"mutation DiscountCodeDelete($id: ID!) {
  discountCodeDelete(id: $id) {
    deletedCodeDiscountId
    userErrors { field message code }
  }
}"
);
