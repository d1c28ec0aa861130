use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::auth::AuthenticatedUser;
use crate::db::models::{Donor, DonorStatus, Expense, Income};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Query};
use crate::policy::{self, Action};
use crate::AppState;

/// Inclusive date bounds; a missing bound is open.
#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct Period {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl Period {
    fn validate(&self) -> ApiResult<()> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err(ApiError::Validation(format!(
                "'from' ({}) is after 'to' ({})",
                from, to
            ))),
            _ => Ok(()),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

#[derive(Serialize, Debug, PartialEq)]
pub struct MonthTotals {
    /// `YYYY-MM`
    pub month: String,
    pub income: Decimal,
    pub expenses: Decimal,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct Summary {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub total_income: Decimal,
    pub total_expenses: Decimal,
    pub net: Decimal,
    pub income_by_category: BTreeMap<String, Decimal>,
    pub expense_by_category: BTreeMap<String, Decimal>,
    pub monthly: Vec<MonthTotals>,
    pub donor_count: usize,
    pub active_donor_count: usize,
}

fn out_of_range() -> ApiError {
    ApiError::Validation("totals exceed representable range".to_string())
}

fn add_to(slot: &mut Decimal, amount: Decimal) -> ApiResult<()> {
    *slot = slot.checked_add(amount).ok_or_else(out_of_range)?;
    Ok(())
}

/// Totals over the records whose `date` falls inside `period`. Donors carry
/// no booking date, so the donor counts always cover every donor.
pub fn summarize(
    incomes: &[Income],
    expenses: &[Expense],
    donors: &[Donor],
    period: Period,
) -> ApiResult<Summary> {
    let mut total_income = Decimal::ZERO;
    let mut total_expenses = Decimal::ZERO;
    let mut income_by_category: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut expense_by_category: BTreeMap<String, Decimal> = BTreeMap::new();
    // month -> (income, expenses)
    let mut months: BTreeMap<String, (Decimal, Decimal)> = BTreeMap::new();

    for i in incomes.iter().filter(|i| period.contains(i.date)) {
        add_to(&mut total_income, i.amount)?;
        add_to(income_by_category.entry(i.category.clone()).or_default(), i.amount)?;
        add_to(&mut months.entry(i.date.format("%Y-%m").to_string()).or_default().0, i.amount)?;
    }
    for e in expenses.iter().filter(|e| period.contains(e.date)) {
        add_to(&mut total_expenses, e.amount)?;
        add_to(expense_by_category.entry(e.category.clone()).or_default(), e.amount)?;
        add_to(&mut months.entry(e.date.format("%Y-%m").to_string()).or_default().1, e.amount)?;
    }

    Ok(Summary {
        from: period.from,
        to: period.to,
        total_income,
        total_expenses,
        net: total_income.checked_sub(total_expenses).ok_or_else(out_of_range)?,
        income_by_category,
        expense_by_category,
        monthly: months
            .into_iter()
            .map(|(month, (income, expenses))| MonthTotals { month, income, expenses })
            .collect(),
        donor_count: donors.len(),
        active_donor_count: donors.iter().filter(|d| d.status == DonorStatus::Active).count(),
    })
}

pub async fn summary(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(period): Query<Period>,
) -> ApiResult<Json<Summary>> {
    policy::require(&user, Action::ReadReports)?;
    period.validate()?;
    let incomes = state.db.list_incomes().await?;
    let expenses = state.db.list_expenses().await?;
    let donors = state.db.list_donors().await?;
    Ok(Json(summarize(&incomes, &expenses, &donors, period)?))
}

#[derive(Deserialize)]
pub struct ExportParams {
    pub kind: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ExportParams {
    fn period(&self) -> Period {
        Period { from: self.from, to: self.to }
    }
}

fn csv_escape(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        let escaped = s.replace('"', "\"\"");
        format!("\"{}\"", escaped)
    } else {
        s.to_string()
    }
}

/// Free text typed by users. A leading formula character is defused so
/// spreadsheets show the cell as text.
fn text_cell(s: &str) -> String {
    if s.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        format!("'{}", s)
    } else {
        s.to_string()
    }
}

fn write_csv(header: &str, rows: impl Iterator<Item = Vec<String>>) -> String {
    let mut w = String::new();
    w.push_str(header);
    w.push('\n');
    for row in rows {
        w.push_str(&row.iter().map(|f| csv_escape(f)).collect::<Vec<_>>().join(","));
        w.push('\n');
    }
    w
}

fn incomes_csv(list: &[Income]) -> String {
    write_csv(
        "id,date,category,source,amount,description,created_by,created_at",
        list.iter().map(|i| {
            vec![
                i.id.clone(),
                i.date.format("%Y-%m-%d").to_string(),
                text_cell(&i.category),
                text_cell(&i.source),
                i.amount.to_string(),
                text_cell(i.description.as_deref().unwrap_or_default()),
                i.created_by.clone(),
                i.created_at.to_rfc3339(),
            ]
        }),
    )
}

fn expenses_csv(list: &[Expense]) -> String {
    write_csv(
        "id,date,category,vendor,amount,description,status,created_by,created_at",
        list.iter().map(|e| {
            vec![
                e.id.clone(),
                e.date.format("%Y-%m-%d").to_string(),
                text_cell(&e.category),
                text_cell(&e.vendor),
                e.amount.to_string(),
                text_cell(e.description.as_deref().unwrap_or_default()),
                e.status.as_str().to_string(),
                e.created_by.clone(),
                e.created_at.to_rfc3339(),
            ]
        }),
    )
}

fn donors_csv(list: &[Donor]) -> String {
    write_csv(
        "id,name,email,phone,address,status,total_donations,last_donation,created_at",
        list.iter().map(|d| {
            vec![
                d.id.clone(),
                text_cell(&d.name),
                text_cell(&d.email),
                text_cell(d.phone.as_deref().unwrap_or_default()),
                text_cell(d.address.as_deref().unwrap_or_default()),
                d.status.as_str().to_string(),
                d.total_donations.to_string(),
                d.last_donation
                    .map(|date| date.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                d.created_at.to_rfc3339(),
            ]
        }),
    )
}

pub async fn export_csv(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<ExportParams>,
) -> ApiResult<Response> {
    policy::require(&user, Action::ReadReports)?;
    let period = params.period();
    period.validate()?;

    let (body, disposition) = match params.kind.as_str() {
        "incomes" => {
            let mut list = state.db.list_incomes().await?;
            list.retain(|i| period.contains(i.date));
            (incomes_csv(&list), "attachment; filename=incomes.csv")
        }
        "expenses" => {
            let mut list = state.db.list_expenses().await?;
            list.retain(|e| period.contains(e.date));
            (expenses_csv(&list), "attachment; filename=expenses.csv")
        }
        "donors" => (
            donors_csv(&state.db.list_donors().await?),
            "attachment; filename=donors.csv",
        ),
        other => {
            return Err(ApiError::Validation(format!(
                "unknown export kind '{}', expected 'incomes', 'expenses' or 'donors'",
                other
            )))
        }
    };

    let mut resp = body.into_response();
    let headers = resp.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8"));
    headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_static(disposition));
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ExpenseStatus;
    use chrono::Utc;
    use std::str::FromStr;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn income_on(date: NaiveDate, category: &str, amount: &str) -> Income {
        Income {
            id: "i".to_string(),
            date,
            category: category.to_string(),
            source: "Jane Doe".to_string(),
            amount: Decimal::from_str(amount).unwrap(),
            description: None,
            created_by: "u".to_string(),
            created_at: Utc::now(),
        }
    }

    fn income(category: &str, amount: &str) -> Income {
        income_on(day(2024, 1, 7), category, amount)
    }

    fn expense(category: &str, amount: &str) -> Expense {
        Expense {
            id: "e".to_string(),
            date: day(2024, 1, 8),
            category: category.to_string(),
            vendor: "City Power, Inc.".to_string(),
            amount: Decimal::from_str(amount).unwrap(),
            description: Some("said \"thanks\"".to_string()),
            created_by: "u".to_string(),
            status: ExpenseStatus::Pending,
            created_at: Utc::now(),
        }
    }

    fn all_time() -> Period {
        Period::default()
    }

    #[test]
    fn summary_sums_without_float_drift() {
        let incomes = vec![
            income("Sunday Collection", "0.1"),
            income("Sunday Collection", "0.2"),
            income("Donations", "-5"),
        ];
        let expenses = vec![expense("Utilities", "0.3")];
        let s = summarize(&incomes, &expenses, &[], all_time()).unwrap();

        assert_eq!(s.total_income, Decimal::from_str("-4.7").unwrap());
        assert_eq!(s.income_by_category["Sunday Collection"], Decimal::from_str("0.3").unwrap());
        assert_eq!(s.total_expenses, Decimal::from_str("0.3").unwrap());
        assert_eq!(s.net, Decimal::from_str("-5.0").unwrap());
        assert_eq!(s.donor_count, 0);
    }

    #[test]
    fn summary_overflow_is_an_error_not_a_panic() {
        let big = Decimal::from_scientific("5e28").unwrap();
        let mut incomes = vec![income("Donations", "0"), income("Donations", "0")];
        for i in incomes.iter_mut() {
            i.amount = big;
        }
        let err = summarize(&incomes, &[], &[], all_time()).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        // Each total fits on its own, the difference does not.
        let incomes = vec![incomes.remove(0)];
        let mut refund = expense("Utilities", "0");
        refund.amount = -big;
        let expenses = vec![refund];
        assert!(summarize(&incomes, &expenses, &[], all_time()).is_err());
    }

    #[test]
    fn empty_ledger_summarizes_to_zero() {
        let s = summarize(&[], &[], &[], all_time()).unwrap();
        assert_eq!(s.net, Decimal::ZERO);
        assert!(s.income_by_category.is_empty());
        assert!(s.monthly.is_empty());
    }

    #[test]
    fn period_bounds_are_inclusive() {
        let incomes = vec![
            income_on(day(2023, 12, 31), "Donations", "1"),
            income_on(day(2024, 1, 1), "Donations", "10"),
            income_on(day(2024, 1, 31), "Donations", "100"),
            income_on(day(2024, 2, 1), "Donations", "1000"),
        ];
        let january = Period { from: Some(day(2024, 1, 1)), to: Some(day(2024, 1, 31)) };
        let s = summarize(&incomes, &[], &[], january).unwrap();
        assert_eq!(s.total_income, Decimal::from(110));
        assert_eq!(s.from, Some(day(2024, 1, 1)));

        let single_day = Period { from: Some(day(2024, 2, 1)), to: Some(day(2024, 2, 1)) };
        let s = summarize(&incomes, &[], &[], single_day).unwrap();
        assert_eq!(s.total_income, Decimal::from(1000));

        let open_start = Period { from: None, to: Some(day(2023, 12, 31)) };
        let s = summarize(&incomes, &[], &[], open_start).unwrap();
        assert_eq!(s.total_income, Decimal::from(1));
    }

    #[test]
    fn period_without_records_is_empty() {
        let incomes = vec![income("Donations", "10")];
        let later = Period { from: Some(day(2025, 1, 1)), to: None };
        let s = summarize(&incomes, &[expense("Utilities", "3")], &[], later).unwrap();
        assert_eq!(s.total_income, Decimal::ZERO);
        assert_eq!(s.total_expenses, Decimal::ZERO);
        assert!(s.monthly.is_empty());
    }

    #[test]
    fn reversed_period_is_rejected() {
        let reversed = Period { from: Some(day(2024, 2, 1)), to: Some(day(2024, 1, 1)) };
        assert!(matches!(reversed.validate(), Err(ApiError::Validation(_))));
        assert!(all_time().validate().is_ok());
    }

    #[test]
    fn monthly_series_is_ordered_by_month() {
        let incomes = vec![
            income_on(day(2024, 3, 3), "Donations", "5"),
            income_on(day(2024, 1, 7), "Donations", "20"),
            income_on(day(2024, 1, 14), "Donations", "30"),
        ];
        let mut march_bill = expense("Utilities", "12");
        march_bill.date = day(2024, 3, 9);
        let s = summarize(&incomes, &[march_bill], &[], all_time()).unwrap();

        assert_eq!(
            s.monthly,
            vec![
                MonthTotals {
                    month: "2024-01".to_string(),
                    income: Decimal::from(50),
                    expenses: Decimal::ZERO,
                },
                MonthTotals {
                    month: "2024-03".to_string(),
                    income: Decimal::from(5),
                    expenses: Decimal::from(12),
                },
            ]
        );
    }

    #[test]
    fn csv_quotes_fields_with_separators() {
        let out = expenses_csv(&[expense("Utilities", "12.50")]);
        let mut lines = out.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,date,category,vendor,amount,description,status,created_by,created_at"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("e,2024-01-08,Utilities,\"City Power, Inc.\",12.50,\"said \"\"thanks\"\"\",pending,u,"));
    }

    #[test]
    fn csv_quotes_carriage_returns() {
        assert_eq!(csv_escape("line one\rline two"), "\"line one\rline two\"");
    }

    #[test]
    fn csv_defuses_formula_text_but_not_amounts() {
        let mut i = income("Donations", "-20.25");
        i.source = "=HYPERLINK(\"http://evil\")".to_string();
        i.description = Some("@SUM(A1)".to_string());
        let out = incomes_csv(&[i]);
        let row = out.lines().nth(1).unwrap();
        assert!(row.contains(",\"'=HYPERLINK(\"\"http://evil\"\")\",-20.25,'@SUM(A1),"));
    }

    #[test]
    fn donor_export_lists_contact_details() {
        let donor = Donor {
            id: "d".to_string(),
            name: "Jane Doe".to_string(),
            email: "jane@example.org".to_string(),
            phone: Some("+1 555 0100".to_string()),
            address: None,
            created_at: Utc::now(),
            last_donation: None,
            total_donations: Decimal::ZERO,
            status: DonorStatus::Active,
        };
        let out = donors_csv(&[donor]);
        let mut lines = out.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,name,email,phone,address,status,total_donations,last_donation,created_at"
        );
        assert!(lines
            .next()
            .unwrap()
            .starts_with("d,Jane Doe,jane@example.org,'+1 555 0100,,active,0,,"));
    }
}
