use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque dotted strings (e.g. "sales.checkout"). `"*"` grants
/// everything; `"area.*"` grants every permission in one area.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const SALES_CHECKOUT: Permission = Permission(Cow::Borrowed("sales.checkout"));
    pub const SALES_READ: Permission = Permission(Cow::Borrowed("sales.read"));
    pub const SALES_VOID: Permission = Permission(Cow::Borrowed("sales.void"));
    pub const PAYMENTS_READ: Permission = Permission(Cow::Borrowed("payments.read"));
    pub const INVENTORY_READ: Permission = Permission(Cow::Borrowed("inventory.read"));
    pub const INVENTORY_ADJUST: Permission = Permission(Cow::Borrowed("inventory.adjust"));
    pub const PRODUCTS_READ: Permission = Permission(Cow::Borrowed("products.read"));
    pub const PRODUCTS_WRITE: Permission = Permission(Cow::Borrowed("products.write"));
    pub const METRICS_READ: Permission = Permission(Cow::Borrowed("metrics.read"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Whether holding `self` satisfies a check for `required`.
    pub fn grants(&self, required: &Permission) -> bool {
        if self.is_wildcard() || self == required {
            return true;
        }
        match self.as_str().strip_suffix(".*") {
            Some(area) => required
                .as_str()
                .strip_prefix(area)
                .is_some_and(|rest| rest.starts_with('.')),
            None => false,
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_wildcard_covers_only_its_area() {
        let sales = Permission::new("sales.*");
        assert!(sales.grants(&Permission::SALES_VOID));
        assert!(!sales.grants(&Permission::METRICS_READ));
        assert!(!Permission::new("sale.*").grants(&Permission::SALES_READ));
        assert!(Permission::new("*").grants(&Permission::METRICS_READ));
        assert!(Permission::SALES_READ.grants(&Permission::SALES_READ));
        assert!(!Permission::SALES_READ.grants(&Permission::SALES_CHECKOUT));
    }
}
