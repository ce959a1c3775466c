use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::money::{MULTIPLIER, FOREIGN_DP, LOCAL_DP, QUANTITY_DP, RATE_DP};

/// Which side of the business a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Goods bought from a vendor
    Purchase,
    /// Goods sold to a customer
    Sales,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Purchase, Category::Sales];

    /// Sheet name in the workbook.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Purchase => "Purchase",
            Category::Sales => "Sales",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "purchase" | "purchases" => Some(Category::Purchase),
            "sales" | "sale" => Some(Category::Sales),
            _ => None,
        }
    }

    /// Header of the counterparty column for this category.
    pub fn counterparty_label(&self) -> &'static str {
        match self {
            Category::Purchase => "Vendor",
            Category::Sales => "Customer",
        }
    }

    /// Header row written at the top of the category's sheet.
    pub fn header(&self) -> [&'static str; 6] {
        [
            "Date",
            self.counterparty_label(),
            "Item Rate (BHD)",
            "Quantity",
            "INR",
            "BHD",
        ]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single purchase or sales line.
///
/// `local_currency_value` and `foreign_currency_value` are derived from
/// `quantity` and `unit_rate`; use [`Record::new`] or [`Record::recompute`]
/// rather than setting them by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub date: NaiveDate,
    /// Vendor (purchase) or customer (sales) name
    pub counterparty: String,
    /// Price per unit in BHD
    pub unit_rate: Decimal,
    pub quantity: Decimal,
    /// quantity * MULTIPLIER, in INR
    pub local_currency_value: Decimal,
    /// quantity * unit_rate, in BHD
    pub foreign_currency_value: Decimal,
}

impl Record {
    /// Build a record and compute its derived values. Does not validate.
    pub fn new(
        date: NaiveDate,
        counterparty: impl Into<String>,
        unit_rate: Decimal,
        quantity: Decimal,
    ) -> Self {
        let mut record = Self {
            date,
            counterparty: counterparty.into(),
            unit_rate,
            quantity,
            local_currency_value: Decimal::ZERO,
            foreign_currency_value: Decimal::ZERO,
        };
        record.recompute();
        record
    }

    /// Normalize inputs to their declared precision and rebuild the derived values.
    pub fn recompute(&mut self) {
        self.counterparty = self.counterparty.trim().to_string();
        self.unit_rate = self.unit_rate.round_dp(RATE_DP);
        self.quantity = self.quantity.round_dp(QUANTITY_DP);
        self.local_currency_value = (self.quantity * MULTIPLIER).round_dp(LOCAL_DP);
        self.foreign_currency_value = (self.quantity * self.unit_rate).round_dp(FOREIGN_DP);
    }

    /// True if the counterparty is blank; such rows are never kept or persisted.
    pub fn is_blank(&self) -> bool {
        self.counterparty.trim().is_empty()
    }
}
