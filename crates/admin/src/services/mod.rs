//! Business logic services for the admin app.
//!
//! # Services
//!
//! - `billing` - Subscriptions, usage charges and one-time purchases
//! - `chat` - Merchant assistant conversations over Claude
//! - `coupons` - App-level promo code validation
//! - `email` - Email delivery via SMTP
//! - `install` - Offline token storage and first-install side effects
//! - `metafields` - Metafield editor layout, validation and change sets
//! - `storage` - Local file storage for uploads and reports

pub mod billing;
pub mod chat;
pub mod coupons;
pub mod email;
pub mod install;
pub mod metafields;
pub mod storage;

pub use billing::{
    BillingError, BillingService, CouponPreview, PendingCharge, SubscriptionWebhook, UsageSummary,
    check_charge_amount, sync_from_webhook,
};
pub use chat::{BillingContext, ChatError, ChatService, ChatStreamEvent, stream_reply, system_prompt};
pub use coupons::{AppliedDiscount, CouponRejection, normalize_code, validate_coupon};
pub use email::{EmailAttachment, EmailError, EmailMessage, EmailService};
pub use install::{InstallError, complete_install};
pub use metafields::{EditorCategory, MetafieldChanges, build_editor, collect_changes};
pub use storage::{FileStore, StorageError};
