use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

pub mod models;

use models::{Donor, Expense, Income, User};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("email already registered: {0}")]
    DuplicateEmail(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage port for every collection the API serves.
///
/// `create_user` must perform its email check and insert as one atomic step;
/// a database-backed implementation wraps both in a single transaction.
/// Listing methods return records ordered by `created_at`, oldest first.
#[async_trait]
pub trait Store: Send + Sync {
    // === Users ===

    /// Insert a user, rejecting an email that is already registered
    async fn create_user(&self, user: User) -> StoreResult<User>;

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>>;

    /// First user whose email matches exactly (case-sensitive)
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn list_users(&self) -> StoreResult<Vec<User>>;

    // === Ledger ===

    async fn add_income(&self, income: Income) -> StoreResult<Income>;

    async fn list_incomes(&self) -> StoreResult<Vec<Income>>;

    async fn add_expense(&self, expense: Expense) -> StoreResult<Expense>;

    async fn list_expenses(&self) -> StoreResult<Vec<Expense>>;

    // === Donors ===

    async fn add_donor(&self, donor: Donor) -> StoreResult<Donor>;

    async fn list_donors(&self) -> StoreResult<Vec<Donor>>;
}

pub type DbPool = Arc<dyn Store>;

#[derive(Default)]
struct Collections {
    users: Vec<User>,
    incomes: Vec<Income>,
    expenses: Vec<Expense>,
    donors: Vec<Donor>,
}

/// Process-local store. One lock guards all collections; throughput is low
/// enough that finer locking buys nothing.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_created<T: Clone, K: Ord>(items: &[T], key: impl Fn(&T) -> K) -> Vec<T> {
    let mut out = items.to_vec();
    out.sort_by_key(key);
    out
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: User) -> StoreResult<User> {
        let mut guard = self.inner.write().await;
        if guard.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail(user.email));
        }
        guard.users.push(user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        let guard = self.inner.read().await;
        Ok(guard.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let guard = self.inner.read().await;
        Ok(guard.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let guard = self.inner.read().await;
        Ok(sorted_by_created(&guard.users, |u| u.created_at))
    }

    async fn add_income(&self, income: Income) -> StoreResult<Income> {
        self.inner.write().await.incomes.push(income.clone());
        Ok(income)
    }

    async fn list_incomes(&self) -> StoreResult<Vec<Income>> {
        let guard = self.inner.read().await;
        Ok(sorted_by_created(&guard.incomes, |i| i.created_at))
    }

    async fn add_expense(&self, expense: Expense) -> StoreResult<Expense> {
        self.inner.write().await.expenses.push(expense.clone());
        Ok(expense)
    }

    async fn list_expenses(&self) -> StoreResult<Vec<Expense>> {
        let guard = self.inner.read().await;
        Ok(sorted_by_created(&guard.expenses, |e| e.created_at))
    }

    async fn add_donor(&self, donor: Donor) -> StoreResult<Donor> {
        self.inner.write().await.donors.push(donor.clone());
        Ok(donor)
    }

    async fn list_donors(&self) -> StoreResult<Vec<Donor>> {
        let guard = self.inner.read().await;
        Ok(sorted_by_created(&guard.donors, |d| d.created_at))
    }
}

/// Build the in-memory store and seed the initial administrator.
pub async fn init_pool(seed: &crate::config::SeedAdmin) -> anyhow::Result<DbPool> {
    let store = MemoryStore::new();
    let admin = User {
        id: uuid::Uuid::new_v4().to_string(),
        email: seed.email.clone(),
        name: seed.name.clone(),
        password_hash: crate::auth::hash_password(&seed.password)?,
        role: models::Role::Admin,
        is_active: true,
        created_at: chrono::Utc::now(),
    };
    store
        .create_user(admin)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to seed admin account: {}", e))?;
    tracing::info!("Seeded administrator account {}", seed.email);
    Ok(Arc::new(store))
}
