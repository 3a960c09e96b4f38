use thiserror::Error;

use vevurn_core::UserId;

use crate::{Permission, Role, permissions_for_roles};

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// Resolve a principal's permissions from the static role policy.
    pub fn from_roles(user_id: UserId, roles: Vec<Role>) -> Self {
        let permissions = permissions_for_roles(&roles);
        Self {
            user_id,
            roles,
            permissions,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal for one permission.
///
/// - No IO
/// - No panics
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.permissions.iter().any(|p| p.grants(required)) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cashier_cannot_void() {
        let cashier = Principal::from_roles(UserId::new(), vec![Role::CASHIER]);
        assert!(authorize(&cashier, &Permission::SALES_CHECKOUT).is_ok());
        assert_eq!(
            authorize(&cashier, &Permission::SALES_VOID),
            Err(AuthzError::Forbidden("sales.void".to_string()))
        );
    }

    #[test]
    fn admin_can_do_anything() {
        let admin = Principal::from_roles(UserId::new(), vec![Role::ADMIN]);
        assert!(authorize(&admin, &Permission::INVENTORY_ADJUST).is_ok());
        assert!(authorize(&admin, &Permission::new("anything.at.all")).is_ok());
    }

    #[test]
    fn no_roles_no_access() {
        let nobody = Principal::from_roles(UserId::new(), vec![]);
        assert!(authorize(&nobody, &Permission::SALES_READ).is_err());
    }
}
