/*!
 * # Permissions Module
 *
 * Permission strings are `resource:action`. Role membership resolves to a
 * set of these at login; route groups require one each.
 */

/// Permission actions
pub struct Actions;

impl Actions {
    pub const READ: &'static str = "read";
    pub const MANAGE: &'static str = "manage";
    pub const ADJUST: &'static str = "adjust";
    pub const ALL: &'static str = "*";
}

/// Resource types
pub struct Resources;

impl Resources {
    pub const PURCHASE_ORDERS: &'static str = "purchaseorders";
    pub const RETURNS: &'static str = "returns";
    pub const SUPPLIERS: &'static str = "suppliers";
    pub const PRODUCTS: &'static str = "products";
    pub const STOCK: &'static str = "stock";
    pub const INVOICES: &'static str = "invoices";
    pub const USERS: &'static str = "users";
}

/// Common permission string constants for compile-time safety
pub mod consts {
    // Purchase orders
    pub const PURCHASEORDERS_READ: &str = "purchaseorders:read";
    pub const PURCHASEORDERS_MANAGE: &str = "purchaseorders:manage";

    // Supplier returns
    pub const RETURNS_READ: &str = "returns:read";
    pub const RETURNS_MANAGE: &str = "returns:manage";

    // Suppliers
    pub const SUPPLIERS_READ: &str = "suppliers:read";
    pub const SUPPLIERS_MANAGE: &str = "suppliers:manage";

    // Products and stock
    pub const PRODUCTS_READ: &str = "products:read";
    pub const PRODUCTS_MANAGE: &str = "products:manage";
    pub const STOCK_ADJUST: &str = "stock:adjust";

    // Invoice documents
    pub const INVOICES_READ: &str = "invoices:read";

    // User administration
    pub const USERS_MANAGE: &str = "users:manage";
}

/// Format a permission string
pub fn format_permission(resource: &str, action: &str) -> String {
    format!("{}:{}", resource, action)
}
