use serde::Serialize;

pub const INCOME_CATEGORIES: [&str; 8] = [
    "Sunday Collection",
    "Special Collection",
    "Donations",
    "Building Fund",
    "Mission Fund",
    "Youth Ministry",
    "Events",
    "Other",
];

pub const EXPENSE_CATEGORIES: [&str; 9] = [
    "Utilities",
    "Maintenance",
    "Staff Salaries",
    "Office Supplies",
    "Ministry Activities",
    "Events",
    "Charitable Giving",
    "Education",
    "Other",
];

/// Suggested categories for ledger entries. Entries may use any category
/// string; these lists only seed the client's pickers.
#[derive(Serialize, Debug, Clone, Copy)]
pub struct CategoryCatalog {
    pub income: &'static [&'static str],
    pub expense: &'static [&'static str],
}

pub const CATALOG: CategoryCatalog = CategoryCatalog {
    income: &INCOME_CATEGORIES,
    expense: &EXPENSE_CATEGORIES,
};
