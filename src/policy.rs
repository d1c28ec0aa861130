//! Role-based access decisions.
//!
//! Every route asks [`authorize`] before touching a collection. The rules are
//! role-only: an authenticated staff member sees every income, expense and
//! donor record, not just the ones they created.

use std::fmt;

use crate::db::models::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReadOwnProfile,
    CreateUser,
    ListUsers,
    ReadCategories,
    CreateIncome,
    ListIncomes,
    CreateExpense,
    ListExpenses,
    CreateDonor,
    ListDonors,
    ReadReports,
}

impl Action {
    fn admin_only(self) -> bool {
        matches!(self, Action::CreateUser | Action::ListUsers)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotAuthorized(Action),
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::NotAuthorized(Action::CreateUser) => write!(f, "Not authorized to create users"),
            DenyReason::NotAuthorized(Action::ListUsers) => write!(f, "Not authorized to view all users"),
            DenyReason::NotAuthorized(action) => write!(f, "Not authorized: {:?}", action),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

pub fn authorize(user: &User, action: Action) -> Decision {
    if action.admin_only() && !user.is_admin() {
        return Decision::Deny(DenyReason::NotAuthorized(action));
    }
    Decision::Allow
}

/// Shorthand for handlers: turn a denial into the 403 error.
pub fn require(user: &User, action: Action) -> Result<(), crate::error::ApiError> {
    match authorize(user, action) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            tracing::warn!(user_id = %user.id, ?action, "access denied");
            Err(crate::error::ApiError::Forbidden(reason))
        }
    }
}
