use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const MANAGER: Role = Role(Cow::Borrowed("manager"));
    pub const CASHIER: Role = Role(Cow::Borrowed("cashier"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static role → permission policy for the shop.
///
/// Unknown roles grant nothing.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut granted = Vec::new();
    for role in roles {
        let perms: &[&'static str] = match role.as_str() {
            "admin" => &["*"],
            "manager" => &["sales.*", "inventory.*", "products.*", "metrics.*", "payments.*"],
            "cashier" => &["sales.checkout", "sales.read", "payments.read", "products.read"],
            _ => &[],
        };
        for p in perms {
            let p = Permission::new(*p);
            if !granted.contains(&p) {
                granted.push(p);
            }
        }
    }
    granted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cashier_and_manager_policies() {
        let cashier = permissions_for_roles(&[Role::CASHIER]);
        assert!(cashier.contains(&Permission::SALES_CHECKOUT));
        assert!(!cashier.iter().any(|p| p.grants(&Permission::SALES_VOID)));

        let manager = permissions_for_roles(&[Role::MANAGER, Role::CASHIER]);
        assert!(manager.iter().any(|p| p.grants(&Permission::SALES_VOID)));
        assert!(manager.iter().any(|p| p.grants(&Permission::METRICS_READ)));

        assert!(permissions_for_roles(&[Role::new("intern")]).is_empty());
    }
}
