//! Domain models for the admin app.
//!
//! Models are plain data; persistence lives in [`crate::db`] and remote
//! state comes from [`crate::shopify`].

pub mod billing;
pub mod chat;
pub mod file;
pub mod job;
pub mod layout;
pub mod shop;

pub use billing::{Coupon, NewCoupon, OneTimePurchase, Plan, Subscription, UsageCharge};
pub use chat::{ChatMessage, ChatSession};
pub use file::StoredFile;
pub use job::{Job, JobCount};
pub use layout::{Category, Section, SectionField};
pub use shop::{Shop, ShopUser};
