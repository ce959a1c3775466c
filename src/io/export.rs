use std::io::Write;

use anyhow::Result;

use crate::domain::{Category, Ledger, Record};
use crate::storage::{record_to_row, AppendOnlyTable, XlsxWorkbook};

/// Build a fresh workbook holding every committed record of the ledger.
///
/// Both sheets are always present, with just a header when a category has no
/// records, so a downloaded file always has the same shape.
pub fn ledger_workbook(ledger: &Ledger) -> Result<XlsxWorkbook> {
    let mut workbook = XlsxWorkbook::in_memory();
    for category in Category::ALL {
        workbook.ensure_sheet(category.as_str(), &category.header());
        let rows = ledger
            .committed(category)
            .iter()
            .map(record_to_row)
            .collect();
        workbook.append_rows(category.as_str(), rows)?;
    }
    Ok(workbook)
}

/// Write one category's records as CSV with the same header as the workbook.
pub fn export_records_csv<W: Write>(
    category: Category,
    records: &[Record],
    writer: W,
) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(category.header())?;

    let mut count = 0;
    for record in records {
        csv_writer.write_record(&[
            record.date.format("%Y-%m-%d").to_string(),
            record.counterparty.clone(),
            record.unit_rate.to_string(),
            record.quantity.to_string(),
            record.local_currency_value.to_string(),
            record.foreign_currency_value.to_string(),
        ])?;
        count += 1;
    }

    csv_writer.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;
    use crate::storage::Cell;

    fn record(name: &str) -> Record {
        Record::new(
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            name,
            Decimal::from_str("2.5").unwrap(),
            Decimal::from_str("10").unwrap(),
        )
    }

    #[test]
    fn test_ledger_workbook_has_both_sheets() -> Result<()> {
        let ledger = Ledger::from_committed(vec![record("Acme Co")], Vec::new());
        let workbook = ledger_workbook(&ledger)?;

        assert_eq!(workbook.sheet_names(), vec!["Purchase", "Sales"]);
        assert_eq!(workbook.last_row("Purchase"), Some(2));
        assert_eq!(workbook.last_row("Sales"), Some(1));
        assert_eq!(
            workbook.read_sheet("Purchase").unwrap()[1][1],
            Cell::from("Acme Co")
        );
        Ok(())
    }

    #[test]
    fn test_export_records_csv() -> Result<()> {
        let mut out = Vec::new();
        let count = export_records_csv(Category::Sales, &[record("Bob, Ltd")], &mut out)?;

        assert_eq!(count, 1);
        let text = String::from_utf8(out)?;
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Date,Customer,Item Rate (BHD),Quantity,INR,BHD")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("2024-01-05,\"Bob, Ltd\",2.5,10,10000,"));
        let bhd = row.rsplit(',').next().unwrap();
        assert_eq!(Decimal::from_str(bhd)?, Decimal::from(25));
        Ok(())
    }
}
