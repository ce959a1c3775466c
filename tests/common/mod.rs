// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use chrono::NaiveDate;
use mis_ledger::application::LedgerService;
use mis_ledger::Category;
use rust_decimal::Decimal;
use tempfile::TempDir;

/// Helper to create a session whose workbook lives in a temporary directory
pub fn test_service() -> Result<(LedgerService, PathBuf, TempDir)> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("Book1.xlsx");
    let service = LedgerService::open(&path)?;
    Ok((service, path, temp_dir))
}

/// Helper to parse a date string into NaiveDate
pub fn parse_date(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Queue an entry with the given name, rate and quantity
pub fn add(
    service: &mut LedgerService,
    category: Category,
    party: &str,
    rate: &str,
    qty: &str,
    date: &str,
) -> Result<()> {
    service.add(category, party, dec(rate), dec(qty), parse_date(date))?;
    Ok(())
}
