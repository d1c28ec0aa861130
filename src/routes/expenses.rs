use axum::extract::State;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::db::models::{Expense, ExpenseStatus};
use crate::error::ApiResult;
use crate::extract::Json;
use crate::policy::{self, Action};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateExpenseRequest {
    pub date: NaiveDate,
    pub category: String,
    pub vendor: String,
    pub amount: Decimal,
    pub description: Option<String>,
}

pub async fn create_expense(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateExpenseRequest>,
) -> ApiResult<Json<Expense>> {
    policy::require(&user, Action::CreateExpense)?;

    let expense = Expense {
        id: Uuid::new_v4().to_string(),
        date: req.date,
        category: req.category,
        vendor: req.vendor,
        amount: req.amount,
        description: req.description,
        created_by: user.id.clone(),
        status: ExpenseStatus::Pending,
        created_at: chrono::Utc::now(),
    };
    let expense = state.db.add_expense(expense).await?;
    tracing::info!(expense_id = %expense.id, created_by = %user.id, "Expense recorded");
    Ok(Json(expense))
}

pub async fn list_expenses(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<Expense>>> {
    policy::require(&user, Action::ListExpenses)?;
    Ok(Json(state.db.list_expenses().await?))
}
