//! `vevurn-auth`: authentication and authorization boundary.
//!
//! Decoupled from HTTP and storage: the API layer hands in a bearer token and
//! gets back a principal it can check permissions against.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthzError, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use roles::{Role, permissions_for_roles};
