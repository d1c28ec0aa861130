use axum::extract::State;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::db::models::{Donor, DonorStatus};
use crate::error::ApiResult;
use crate::extract::Json;
use crate::policy::{self, Action};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateDonorRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

pub async fn create_donor(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateDonorRequest>,
) -> ApiResult<Json<Donor>> {
    policy::require(&user, Action::CreateDonor)?;

    let donor = Donor {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        email: req.email,
        phone: req.phone,
        address: req.address,
        created_at: chrono::Utc::now(),
        last_donation: None,
        total_donations: Decimal::ZERO,
        status: DonorStatus::Active,
    };
    let donor = state.db.add_donor(donor).await?;
    tracing::info!(donor_id = %donor.id, created_by = %user.id, "Donor added");
    Ok(Json(donor))
}

pub async fn list_donors(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<Donor>>> {
    policy::require(&user, Action::ListDonors)?;
    Ok(Json(state.db.list_donors().await?))
}
