use axum::extract::State;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::db::models::Income;
use crate::error::ApiResult;
use crate::extract::Json;
use crate::policy::{self, Action};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateIncomeRequest {
    pub date: NaiveDate, // YYYY-MM-DD
    pub category: String,
    pub source: String,
    pub amount: Decimal,
    pub description: Option<String>,
}

pub async fn create_income(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateIncomeRequest>,
) -> ApiResult<Json<Income>> {
    policy::require(&user, Action::CreateIncome)?;

    let income = Income {
        id: Uuid::new_v4().to_string(),
        date: req.date,
        category: req.category,
        source: req.source,
        amount: req.amount,
        description: req.description,
        created_by: user.id.clone(),
        created_at: chrono::Utc::now(),
    };
    let income = state.db.add_income(income).await?;
    tracing::info!(income_id = %income.id, created_by = %user.id, "Income recorded");
    Ok(Json(income))
}

pub async fn list_incomes(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<Income>>> {
    policy::require(&user, Action::ListIncomes)?;
    Ok(Json(state.db.list_incomes().await?))
}
