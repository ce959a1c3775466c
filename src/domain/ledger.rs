use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Category, Record};

/// Pending and committed records for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Book {
    pending: Vec<Record>,
    committed: Vec<Record>,
}

/// Purchase and sales records for a single session.
///
/// New entries land in the pending list and only reach the committed list
/// through [`Ledger::commit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    purchase: Book,
    sales: Book,
}

/// Totals over the committed records, in INR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total_purchase: Decimal,
    pub total_sales: Decimal,
    pub gross_profit: Decimal,
}

/// Running totals of a list of records in both currencies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableTotals {
    pub count: usize,
    pub total_local: Decimal,
    pub total_foreign: Decimal,
}

pub fn table_totals(records: &[Record]) -> TableTotals {
    records.iter().fold(TableTotals::default(), |acc, r| TableTotals {
        count: acc.count + 1,
        total_local: acc.total_local + r.local_currency_value,
        total_foreign: acc.total_foreign + r.foreign_currency_value,
    })
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger whose committed lists are the given records.
    /// Blank rows are dropped, derived values are left as loaded.
    pub fn from_committed(purchase: Vec<Record>, sales: Vec<Record>) -> Self {
        let keep = |rows: Vec<Record>| -> Vec<Record> {
            rows.into_iter().filter(|r| !r.is_blank()).collect()
        };
        Self {
            purchase: Book {
                pending: Vec::new(),
                committed: keep(purchase),
            },
            sales: Book {
                pending: Vec::new(),
                committed: keep(sales),
            },
        }
    }

    fn book(&self, category: Category) -> &Book {
        match category {
            Category::Purchase => &self.purchase,
            Category::Sales => &self.sales,
        }
    }

    fn book_mut(&mut self, category: Category) -> &mut Book {
        match category {
            Category::Purchase => &mut self.purchase,
            Category::Sales => &mut self.sales,
        }
    }

    pub fn pending(&self, category: Category) -> &[Record] {
        &self.book(category).pending
    }

    pub fn committed(&self, category: Category) -> &[Record] {
        &self.book(category).committed
    }

    pub fn has_pending(&self) -> bool {
        Category::ALL.iter().any(|c| !self.pending(*c).is_empty())
    }

    /// Validate an entry and append it to the pending list.
    ///
    /// Rate and quantity are checked after rounding to their stored
    /// precision. On error the ledger is left untouched.
    pub fn add_pending(
        &mut self,
        category: Category,
        counterparty: &str,
        unit_rate: Decimal,
        quantity: Decimal,
        date: NaiveDate,
    ) -> Result<Record, ValidationError> {
        let record = Record::new(date, counterparty, unit_rate, quantity);
        validate_entry(&record.counterparty, record.unit_rate, record.quantity)?;

        self.book_mut(category).pending.push(record.clone());
        Ok(record)
    }

    /// Move every pending record into the committed list, keeping insertion order.
    /// Returns how many records were moved.
    pub fn commit(&mut self, category: Category) -> usize {
        let book = self.book_mut(category);
        let moved = book.pending.len();
        book.committed.append(&mut book.pending);
        moved
    }

    /// Drop all pending records for a category. Returns how many were dropped.
    pub fn discard_pending(&mut self, category: Category) -> usize {
        let book = self.book_mut(category);
        let dropped = book.pending.len();
        book.pending.clear();
        dropped
    }

    /// Replace the committed list wholesale with an edited table.
    ///
    /// Derived values are recomputed for every row and rows with a blank
    /// counterparty are dropped, so applying the same table twice gives the
    /// same result.
    pub fn replace_committed(&mut self, category: Category, new_table: Vec<Record>) {
        let rows = new_table
            .into_iter()
            .filter(|r| !r.is_blank())
            .map(|mut r| {
                r.recompute();
                r
            })
            .collect();
        self.book_mut(category).committed = rows;
    }

    /// Totals over the committed records using the INR value column.
    pub fn summary(&self) -> Summary {
        let total = |category: Category| -> Decimal {
            self.committed(category)
                .iter()
                .map(|r| r.local_currency_value)
                .sum()
        };
        let total_purchase = total(Category::Purchase);
        let total_sales = total(Category::Sales);
        Summary {
            total_purchase,
            total_sales,
            gross_profit: total_sales - total_purchase,
        }
    }
}

/// Check the user-supplied fields of an entry, collecting every problem.
pub fn validate_entry(
    counterparty: &str,
    unit_rate: Decimal,
    quantity: Decimal,
) -> Result<(), ValidationError> {
    let mut problems = Vec::new();
    if counterparty.trim().is_empty() {
        problems.push(FieldError::new("counterparty", "must not be empty"));
    }
    if unit_rate <= Decimal::ZERO {
        problems.push(FieldError::new("unit_rate", "must be greater than zero"));
    }
    if quantity <= Decimal::ZERO {
        problems.push(FieldError::new("quantity", "must be greater than zero"));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { fields: problems })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: &'static str,
}

impl FieldError {
    fn new(field: &'static str, reason: &'static str) -> Self {
        Self { field, reason }
    }
}

/// One or more entry fields were rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    pub fn names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.field).collect()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|e| format!("{} {}", e.field, e.reason))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}
