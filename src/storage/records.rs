use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::domain::{
    coerce_numeric, decimal_from_f64, Category, Ledger, Record, FOREIGN_DP, LOCAL_DP, QUANTITY_DP,
    RATE_DP,
};

use super::{date_from_serial, parse_date_text, AppendOnlyTable, Cell, Row};

/// Append `table` to the category's sheet and flush the target.
///
/// Blank rows are skipped. If nothing is left the target is not touched at
/// all, so no header-only sheet or empty file is ever produced. Returns the
/// number of rows written.
pub fn persist<T: AppendOnlyTable>(
    target: &mut T,
    category: Category,
    table: &[Record],
) -> Result<usize> {
    let rows: Vec<Row> = table
        .iter()
        .filter(|r| !r.is_blank())
        .map(|r| {
            let mut r = r.clone();
            r.recompute();
            record_to_row(&r)
        })
        .collect();
    if rows.is_empty() {
        debug!(%category, "nothing to persist");
        return Ok(0);
    }

    let sheet = category.as_str();
    if target.ensure_sheet(sheet, &category.header()) {
        debug!(sheet, "created sheet");
    }
    let start_row = target.last_row(sheet).unwrap_or(0);
    let written = target.append_rows(sheet, rows)?;
    target.flush()?;

    info!(sheet, start_row, written, "appended rows");
    Ok(written)
}

/// Read the Purchase and Sales sheets into a ledger whose records are all committed.
///
/// A missing sheet gives an empty collection. Numeric cells that do not
/// parse count as zero; a row whose date cannot be read is skipped with a warning.
pub fn load_from_store<T: AppendOnlyTable>(source: &T) -> Result<Ledger> {
    let purchase = load_category(source, Category::Purchase)?;
    let sales = load_category(source, Category::Sales)?;
    debug!(
        purchase = purchase.len(),
        sales = sales.len(),
        "loaded ledger"
    );
    Ok(Ledger::from_committed(purchase, sales))
}

fn load_category<T: AppendOnlyTable>(source: &T, category: Category) -> Result<Vec<Record>> {
    let Some(rows) = source.read_sheet(category.as_str()) else {
        return Ok(Vec::new());
    };
    let scan = scan_rows(rows, category);
    for problem in &scan.unreadable {
        warn!("{}; row skipped", problem);
    }
    Ok(scan.records)
}

/// Turn a header row plus data rows into records, failing on the first row
/// whose date cannot be read.
///
/// The header is the first non-empty row. Columns are matched by header
/// name, so column order does not matter. Fully empty rows and rows without
/// a counterparty are skipped.
pub fn records_from_rows(rows: &[Row], category: Category) -> Result<Vec<Record>> {
    let scan = scan_rows(rows, category);
    match scan.unreadable.into_iter().next() {
        Some(problem) => Err(anyhow!(problem)),
        None => Ok(scan.records),
    }
}

struct RowScan {
    records: Vec<Record>,
    /// One message per row that had a counterparty but no usable date
    unreadable: Vec<String>,
}

fn scan_rows(rows: &[Row], category: Category) -> RowScan {
    let mut scan = RowScan {
        records: Vec::new(),
        unreadable: Vec::new(),
    };
    let Some(header_idx) = rows.iter().position(|row| !row.iter().all(Cell::is_empty)) else {
        return scan;
    };
    let columns = Columns::locate(&rows[header_idx], category);

    for (i, row) in rows.iter().enumerate().skip(header_idx + 1) {
        if row.iter().all(Cell::is_empty) {
            continue;
        }
        match row_to_record(row, &columns) {
            Ok(Some(record)) => scan.records.push(record),
            Ok(None) => {}
            // Sheet rows are numbered from 1
            Err(e) => scan
                .unreadable
                .push(format!("{} row {}: {}", category, i + 1, e)),
        }
    }
    scan
}

/// Column positions resolved from a sheet's header row.
struct Columns {
    date: Option<usize>,
    counterparty: Option<usize>,
    unit_rate: Option<usize>,
    quantity: Option<usize>,
    local: Option<usize>,
    foreign: Option<usize>,
}

impl Columns {
    fn locate(header: &[Cell], category: Category) -> Self {
        Self {
            date: find_column(header, &["Date"]),
            counterparty: find_column(header, &[category.counterparty_label(), "Name"]),
            unit_rate: find_column(header, &["Item Rate (BHD)", "Item Rate", "Rate"]),
            quantity: find_column(header, &["Quantity", "Qty"]),
            local: find_column(header, &["INR"]),
            foreign: find_column(header, &["BHD"]),
        }
    }
}

fn find_column(header: &[Cell], names: &[&str]) -> Option<usize> {
    header.iter().position(|cell| match cell {
        Cell::Text(s) => names.iter().any(|n| s.trim().eq_ignore_ascii_case(n)),
        _ => false,
    })
}

static EMPTY_CELL: Cell = Cell::Empty;

fn row_to_record(row: &[Cell], columns: &Columns) -> Result<Option<Record>> {
    let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i)).unwrap_or(&EMPTY_CELL);

    let counterparty = match cell(columns.counterparty) {
        Cell::Text(s) => s.trim().to_string(),
        Cell::Number(n) | Cell::DateTime { serial: n, .. } => n.to_string(),
        Cell::Bool(b) => b.to_string(),
        Cell::Date(d) => d.to_string(),
        Cell::Error(_) | Cell::Empty => String::new(),
    };
    if counterparty.is_empty() {
        return Ok(None);
    }

    let date = cell_to_date(cell(columns.date))
        .ok_or_else(|| anyhow!("unreadable date {:?}", cell(columns.date)))?;

    Ok(Some(Record {
        date,
        counterparty,
        unit_rate: cell_to_decimal(cell(columns.unit_rate), RATE_DP),
        quantity: cell_to_decimal(cell(columns.quantity), QUANTITY_DP),
        local_currency_value: cell_to_decimal(cell(columns.local), LOCAL_DP),
        foreign_currency_value: cell_to_decimal(cell(columns.foreign), FOREIGN_DP),
    }))
}

fn cell_to_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Date(d) => Some(*d),
        Cell::Text(s) => parse_date_text(s),
        Cell::Number(n) => date_from_serial(*n),
        Cell::DateTime {
            serial,
            duration: false,
        } => date_from_serial(*serial),
        Cell::DateTime { .. } | Cell::Bool(_) | Cell::Error(_) | Cell::Empty => None,
    }
}

fn cell_to_decimal(cell: &Cell, dp: u32) -> Decimal {
    match cell {
        Cell::Number(n) => decimal_from_f64(*n, dp),
        Cell::Text(s) => coerce_numeric(s).round_dp(dp),
        _ => Decimal::ZERO,
    }
}

/// Lay out a record in header order: date, counterparty, rate, quantity, INR, BHD.
pub fn record_to_row(record: &Record) -> Row {
    let number = |d: Decimal| Cell::Number(d.to_f64().unwrap_or(0.0));
    vec![
        Cell::Date(record.date),
        Cell::Text(record.counterparty.clone()),
        number(record.unit_rate),
        number(record.quantity),
        number(record.local_currency_value),
        number(record.foreign_currency_value),
    ]
}
