use serde::{Deserialize, Serialize};
use chrono::{NaiveDate, DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    // Write-only: accepted on create, never sent back out.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Income {
    pub id: String,
    pub date: NaiveDate,
    pub category: String,
    pub source: String,
    pub amount: Decimal,
    pub description: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Review state of an expense. Entries are always recorded as `Pending`;
/// nothing moves them forward yet.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Pending => "pending",
            ExpenseStatus::Approved => "approved",
            ExpenseStatus::Rejected => "rejected",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Expense {
    pub id: String,
    pub date: NaiveDate,
    pub category: String,
    pub vendor: String,
    pub amount: Decimal,
    pub description: Option<String>,
    pub created_by: String,
    pub status: ExpenseStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DonorStatus {
    #[default]
    Active,
    Inactive,
}

impl DonorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonorStatus::Active => "active",
            DonorStatus::Inactive => "inactive",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Donor {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    // Neither field is maintained by any operation; donations are not linked to donors.
    pub last_donation: Option<NaiveDate>,
    pub total_donations: Decimal,
    pub status: DonorStatus,
}
