use axum::extract::State;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{hash_password, AuthenticatedUser};
use crate::db::models::{Role, User};
use crate::error::{ApiError, ApiResult};
use crate::extract::Json;
use crate::policy::{self, Action};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

impl CreateUserRequest {
    fn validate(&self) -> ApiResult<()> {
        if self.email.trim().is_empty() {
            return Err(ApiError::Validation("email must not be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("name must not be empty".to_string()));
        }
        if self.password.is_empty() {
            return Err(ApiError::Validation("password must not be empty".to_string()));
        }
        Ok(())
    }
}

pub async fn create_user(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<Json<User>> {
    policy::require(&caller, Action::CreateUser)?;
    req.validate()?;

    // Cheap early rejection; the store repeats the check atomically on insert.
    if state.db.find_user_by_email(&req.email).await?.is_some() {
        return Err(ApiError::DuplicateEmail);
    }

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("password hashing task failed: {}", e)))??;

    let user = User {
        id: Uuid::new_v4().to_string(),
        email: req.email,
        name: req.name,
        password_hash,
        role: req.role,
        is_active: true,
        created_at: chrono::Utc::now(),
    };
    let user = state.db.create_user(user).await?;
    tracing::info!(user_id = %user.id, created_by = %caller.id, role = user.role.as_str(), "User created");
    Ok(Json(user))
}

pub async fn list_users(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> ApiResult<Json<Vec<User>>> {
    policy::require(&caller, Action::ListUsers)?;
    Ok(Json(state.db.list_users().await?))
}
