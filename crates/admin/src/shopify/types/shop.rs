//! Shop details.

/// Shop fields read after install and for report emails.
#[derive(Debug, Clone)]
pub struct ShopInfo {
    pub name: String,
    /// Contact email of the store owner.
    pub email: Option<String>,
    pub currency_code: String,
    pub myshopify_domain: String,
    pub plan_name: Option<String>,
    /// Development stores can only be charged in test mode.
    pub partner_development: bool,
}
