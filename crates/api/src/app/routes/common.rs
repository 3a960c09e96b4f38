use std::sync::Arc;

use axum::extract::Extension;

use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// Extractors every authenticated handler starts from.
pub type Services = Extension<Arc<AppServices>>;
pub type Principal = Extension<PrincipalContext>;
