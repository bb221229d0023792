//! GraphQL operations for the Shopify Admin API.
//!
//! Each operation is a unit struct implementing `graphql_client::GraphQLQuery`
//! with hand-written variables and response types, grouped by domain.

pub mod billing;
pub mod discounts;
pub mod files;
pub mod metafields;
pub mod shop;

/// Declare an operation struct and its `GraphQLQuery` impl.
macro_rules! operation {
    ($name:ident, $op:literal, $vars:ty, $data:ty, $query:expr) => {
        pub struct $name;

        impl ::graphql_client::GraphQLQuery for $name {
            type Variables = $vars;
            type ResponseData = $data;

            fn build_query(
                variables: Self::Variables,
            ) -> ::graphql_client::QueryBody<Self::Variables> {
                ::graphql_client::QueryBody {
                    variables,
                    query: $query,
                    operation_name: $op,
                }
            }
        }
    };
}

pub(crate) use operation;

/// Variables of operations that take none.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct NoVariables {}

/// Variables of operations that take a single node ID.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IdVariables {
    pub id: String,
}

/// A `{ nodes: [...] }` connection.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Nodes<T> {
    pub nodes: Vec<T>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use graphql_client::GraphQLQuery;

    use super::*;

    #[test]
    fn test_query_body_serializes_operation_name() {
        let body = shop::GetShop::build_query(NoVariables {});
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["operationName"], "GetShop");
        assert!(json["query"].as_str().unwrap().contains("query GetShop"));
    }

    #[test]
    fn test_every_query_names_its_operation() {
        let bodies = [
            serde_json::to_value(billing::AppSubscriptionCreate::build_query(
                billing::AppSubscriptionCreateVariables::default(),
            ))
            .unwrap(),
            serde_json::to_value(discounts::GetDiscountCodes::build_query(
                discounts::GetDiscountCodesVariables::default(),
            ))
            .unwrap(),
            serde_json::to_value(metafields::MetafieldsSet::build_query(
                metafields::MetafieldsSetVariables::default(),
            ))
            .unwrap(),
        ];
        for body in bodies {
            let name = body["operationName"].as_str().unwrap();
            let query = body["query"].as_str().unwrap();
            assert!(query.contains(name), "{name} missing from its query");
        }
    }
}
