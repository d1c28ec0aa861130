use axum::Json;
use serde_json::{json, Value};

pub mod categories;
pub mod donors;
pub mod expenses;
pub mod incomes;
pub mod reports;
pub mod users;

pub async fn welcome() -> Json<Value> {
    Json(json!({ "message": "Welcome to Parish Finance API" }))
}

pub async fn health_check() -> &'static str {
    "OK"
}
