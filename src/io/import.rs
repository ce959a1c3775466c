use std::io::Read;

use anyhow::{Context, Result};

use crate::domain::{Category, Record};
use crate::storage::{records_from_rows, Cell, Row};

/// Result of reading an edited table
#[derive(Debug, Clone)]
pub struct ImportResult {
    pub records: Vec<Record>,
    /// Rows dropped because they had no counterparty
    pub skipped: usize,
}

/// Read an edited category table from CSV.
///
/// The first line must be a header; columns are matched by name the same
/// way workbook sheets are. Numbers that do not parse count as zero.
pub fn import_records_csv<R: Read>(category: Category, reader: R) -> Result<ImportResult> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows: Vec<Row> = Vec::new();
    for (line_num, result) in csv_reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV parse error on line {}", line_num + 1))?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        Cell::Empty
                    } else {
                        Cell::from(field)
                    }
                })
                .collect(),
        );
    }

    // Every non-empty row except the header
    let data_rows = rows
        .iter()
        .filter(|row| !row.iter().all(Cell::is_empty))
        .count()
        .saturating_sub(1);
    let records = records_from_rows(&rows, category)?;
    Ok(ImportResult {
        skipped: data_rows - records.len(),
        records,
    })
}
