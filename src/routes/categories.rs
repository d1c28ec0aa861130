use axum::Json;

use crate::auth::AuthenticatedUser;
use crate::catalog::{CategoryCatalog, CATALOG};
use crate::error::ApiResult;
use crate::policy::{self, Action};

pub async fn get_categories(user: AuthenticatedUser) -> ApiResult<Json<CategoryCatalog>> {
    policy::require(&user, Action::ReadCategories)?;
    Ok(Json(CATALOG))
}
