/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Defines the static role table and permission matching. Users carry a
 * single role name; the role resolves to permission strings at login and
 * the resolved set travels in the JWT.
 */

use lazy_static::lazy_static;
use std::collections::HashMap;
use tracing::warn;

use super::permissions::consts;

/// Role definition with associated permissions
#[derive(Debug, Clone)]
pub struct Role {
    pub name: String,
    pub description: String,
    pub permissions: Vec<String>,
}

// Define standard roles and their permissions
lazy_static! {
    pub static ref ROLES: HashMap<String, Role> = {
        let mut roles = HashMap::new();

        // Admin role has every permission
        roles.insert(
            "admin".to_string(),
            Role {
                name: "admin".to_string(),
                description: "Administrator with full access".to_string(),
                permissions: vec!["*".to_string()],
            },
        );

        // Manager runs the stockroom end to end, minus user administration
        roles.insert(
            "manager".to_string(),
            Role {
                name: "manager".to_string(),
                description: "Manager with full access to stockroom operations".to_string(),
                permissions: vec![
                    "purchaseorders:*".to_string(),
                    "returns:*".to_string(),
                    "suppliers:*".to_string(),
                    "products:*".to_string(),
                    "stock:*".to_string(),
                    "invoices:*".to_string(),
                ],
            },
        );

        // Clerk handles day-to-day ordering and receiving
        roles.insert(
            "clerk".to_string(),
            Role {
                name: "clerk".to_string(),
                description: "Clerk handling daily purchase order and stock work".to_string(),
                permissions: vec![
                    consts::PURCHASEORDERS_READ.to_string(),
                    consts::PURCHASEORDERS_MANAGE.to_string(),
                    consts::RETURNS_READ.to_string(),
                    consts::SUPPLIERS_READ.to_string(),
                    consts::PRODUCTS_READ.to_string(),
                    consts::STOCK_ADJUST.to_string(),
                    consts::INVOICES_READ.to_string(),
                ],
            },
        );

        // Read-only role
        roles.insert(
            "viewer".to_string(),
            Role {
                name: "viewer".to_string(),
                description: "Read-only access to data".to_string(),
                permissions: vec![
                    consts::PURCHASEORDERS_READ.to_string(),
                    consts::RETURNS_READ.to_string(),
                    consts::SUPPLIERS_READ.to_string(),
                    consts::PRODUCTS_READ.to_string(),
                    consts::INVOICES_READ.to_string(),
                ],
            },
        );

        roles
    };
}

/// Resolve a role name to its permission strings. Unknown roles resolve to
/// no permissions.
pub fn permissions_for_role(role_name: &str) -> Vec<String> {
    match ROLES.get(role_name) {
        Some(role) => role.permissions.clone(),
        None => {
            warn!("Role not found: {}", role_name);
            vec![]
        }
    }
}

/// Check if a granted permission satisfies a required permission.
/// `resource:*` covers every action on the resource; `*` covers everything.
pub fn permission_matches(granted: &str, required: &str) -> bool {
    if granted == required || granted == "*" {
        return true;
    }

    if let Some(resource) = granted.strip_suffix(":*") {
        if let Some((required_resource, _)) = required.split_once(':') {
            return resource == required_resource;
        }
    }

    false
}
