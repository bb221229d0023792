//! Domain types returned by [`super::AdminClient`].
//!
//! These are decoupled from the GraphQL response shapes so routes and
//! services never depend on query field names.

pub mod billing;
pub mod common;
pub mod discount;
pub mod file;
pub mod metafield;
pub mod shop;

pub use billing::*;
pub use common::*;
pub use discount::*;
pub use file::*;
pub use metafield::*;
pub use shop::*;
