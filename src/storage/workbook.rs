use std::fs;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use calamine::{open_workbook, open_workbook_from_rs, Data, Reader, Xlsx};
use chrono::{Datelike, NaiveDate};
use rust_xlsxwriter::{ExcelDateTime, Format, Formula, Workbook};
use tracing::debug;

/// A single spreadsheet cell as the ledger sees it.
///
/// Cells read from an existing file keep their original value so they can be
/// written back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// A date written by the ledger, formatted `yyyy-mm-dd`
    Date(NaiveDate),
    /// A date, time or duration read from a sheet, as its Excel serial value
    DateTime { serial: f64, duration: bool },
    /// An error value such as `#DIV/0!`
    Error(String),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

pub type Row = Vec<Cell>;

/// A sheet store that only ever grows.
///
/// Rows already present are never rewritten with different values; new rows
/// go after the current last row.
pub trait AppendOnlyTable {
    fn has_sheet(&self, name: &str) -> bool;

    /// Create the sheet with `header` as its first row if it does not exist.
    /// Returns true if the sheet was created.
    fn ensure_sheet(&mut self, name: &str, header: &[&str]) -> bool;

    /// Append rows after the last row of an existing sheet.
    fn append_rows(&mut self, name: &str, rows: Vec<Row>) -> Result<usize>;

    /// Number of rows in the sheet including the header, if the sheet exists.
    fn last_row(&self, name: &str) -> Option<usize>;

    /// All rows of a sheet, header included.
    fn read_sheet(&self, name: &str) -> Option<&[Row]>;

    /// Write pending changes to the backing store.
    fn flush(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
struct Sheet {
    name: String,
    rows: Vec<Row>,
}

/// An `.xlsx` workbook held in memory.
///
/// Reads go through calamine, writes through rust_xlsxwriter. Since neither
/// can edit a file in place, `flush` re-emits every sheet with its existing
/// cells unchanged followed by the appended rows.
#[derive(Debug, Clone, Default)]
pub struct XlsxWorkbook {
    path: Option<PathBuf>,
    sheets: Vec<Sheet>,
    dirty: bool,
}

impl XlsxWorkbook {
    /// Open the workbook at `path`, or start an empty one if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "workbook does not exist yet");
            return Ok(Self {
                path: Some(path.to_path_buf()),
                ..Self::default()
            });
        }

        let mut workbook: Xlsx<_> = open_workbook(path)
            .with_context(|| format!("Failed to open workbook {}", path.display()))?;
        let sheets = read_sheets(&mut workbook)
            .with_context(|| format!("Failed to read workbook {}", path.display()))?;
        debug!(path = %path.display(), sheets = sheets.len(), "opened workbook");

        Ok(Self {
            path: Some(path.to_path_buf()),
            sheets,
            dirty: false,
        })
    }

    /// Read a workbook from an in-memory buffer, e.g. an uploaded file.
    /// The result has no backing path; use [`XlsxWorkbook::to_buffer`] to get bytes back out.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mut workbook: Xlsx<_> =
            open_workbook_from_rs(Cursor::new(bytes)).context("Failed to parse workbook")?;
        let sheets = read_sheets(&mut workbook).context("Failed to read workbook")?;
        Ok(Self {
            path: None,
            sheets,
            dirty: false,
        })
    }

    /// An empty workbook with no backing file.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    /// Serialize the workbook to xlsx bytes.
    pub fn to_buffer(&self) -> Result<Vec<u8>> {
        let mut workbook = self.render()?;
        workbook
            .save_to_buffer()
            .context("Failed to serialize workbook")
    }

    /// Write the workbook to `path`, replacing any file there.
    ///
    /// The data goes to a sibling temporary file first and is renamed into
    /// place, so a failed write leaves the previous file intact.
    pub fn save_as(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp = path.with_extension("xlsx.tmp");
        let mut workbook = self.render()?;
        workbook
            .save(&tmp)
            .with_context(|| format!("Failed to write workbook {}", tmp.display()))?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("Failed to replace workbook {}", path.display()));
        }
        Ok(())
    }

    fn render(&self) -> Result<Workbook> {
        let mut workbook = Workbook::new();
        let header_format = Format::new().set_bold();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let datetime_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
        let duration_format = Format::new().set_num_format("[h]:mm:ss");

        for sheet in &self.sheets {
            let worksheet = workbook.add_worksheet();
            worksheet
                .set_name(&sheet.name)
                .with_context(|| format!("Invalid sheet name '{}'", sheet.name))?;

            for (r, row) in sheet.rows.iter().enumerate() {
                let r = r as u32;
                for (c, cell) in row.iter().enumerate() {
                    let c = c as u16;
                    match cell {
                        Cell::Empty => {}
                        Cell::Text(s) if r == 0 => {
                            worksheet.write_string_with_format(r, c, s, &header_format)?;
                        }
                        Cell::Text(s) => {
                            worksheet.write_string(r, c, s)?;
                        }
                        Cell::Number(n) => {
                            worksheet.write_number(r, c, *n)?;
                        }
                        Cell::Bool(b) => {
                            worksheet.write_boolean(r, c, *b)?;
                        }
                        Cell::DateTime { serial, duration } => {
                            let format = if *duration {
                                &duration_format
                            } else if serial.fract() == 0.0 {
                                &date_format
                            } else {
                                &datetime_format
                            };
                            worksheet.write_number_with_format(r, c, *serial, format)?;
                        }
                        Cell::Error(e) => {
                            let formula = Formula::new(format!("={}", e)).set_result(e);
                            worksheet.write_formula(r, c, formula)?;
                        }
                        Cell::Date(d) => {
                            let dt = ExcelDateTime::from_ymd(
                                d.year() as u16,
                                d.month() as u8,
                                d.day() as u8,
                            )?;
                            worksheet.write_datetime_with_format(r, c, &dt, &date_format)?;
                        }
                    }
                }
            }
        }

        Ok(workbook)
    }
}

impl AppendOnlyTable for XlsxWorkbook {
    fn has_sheet(&self, name: &str) -> bool {
        self.sheet(name).is_some()
    }

    fn ensure_sheet(&mut self, name: &str, header: &[&str]) -> bool {
        if self.has_sheet(name) {
            return false;
        }
        self.sheets.push(Sheet {
            name: name.to_string(),
            rows: vec![header.iter().map(|h| Cell::from(*h)).collect()],
        });
        self.dirty = true;
        true
    }

    fn append_rows(&mut self, name: &str, rows: Vec<Row>) -> Result<usize> {
        let Some(sheet) = self.sheet_mut(name) else {
            bail!("Sheet '{}' does not exist", name);
        };
        let count = rows.len();
        sheet.rows.extend(rows);
        if count > 0 {
            self.dirty = true;
        }
        Ok(count)
    }

    fn last_row(&self, name: &str) -> Option<usize> {
        self.sheet(name).map(|s| s.rows.len())
    }

    fn read_sheet(&self, name: &str) -> Option<&[Row]> {
        self.sheet(name).map(|s| s.rows.as_slice())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        // In-memory workbooks have nowhere to flush to.
        if let Some(path) = self.path.clone() {
            self.save_as(&path)?;
            debug!(path = %path.display(), "workbook written");
        }
        self.dirty = false;
        Ok(())
    }
}

fn read_sheets<RS: Read + Seek>(workbook: &mut Xlsx<RS>) -> Result<Vec<Sheet>> {
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .with_context(|| format!("Failed to read sheet '{}'", name))?;

        // Keep rows at their absolute positions so appends land after the real last row.
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<Row> = (0..start_row).map(|_| Vec::new()).collect();
        for data_row in range.rows() {
            let mut row: Row = (0..start_col).map(|_| Cell::Empty).collect();
            row.extend(data_row.iter().map(cell_from_data));
            rows.push(row);
        }

        sheets.push(Sheet { name, rows });
    }
    Ok(sheets)
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => Cell::DateTime {
            serial: dt.as_f64(),
            duration: dt.is_duration(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Error(e.to_string()),
    }
}

/// Parse a date written as text, dropping any time-of-day part.
pub fn parse_date_text(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let date_part = s.split(['T', ' ']).next().unwrap_or(s);
    ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Convert an Excel serial day number to a date (1900 date system).
pub fn date_from_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(chrono::Days::new(serial.trunc() as u64))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_ensure_sheet_only_once() {
        let mut wb = XlsxWorkbook::in_memory();
        assert!(wb.ensure_sheet("Purchase", &["Date", "Vendor"]));
        assert!(!wb.ensure_sheet("Purchase", &["Other", "Header"]));

        let rows = wb.read_sheet("Purchase").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], vec![Cell::from("Date"), Cell::from("Vendor")]);
    }

    #[test]
    fn test_append_requires_sheet() {
        let mut wb = XlsxWorkbook::in_memory();
        assert!(wb.append_rows("Sales", vec![vec![Cell::Number(1.0)]]).is_err());
        assert_eq!(wb.last_row("Sales"), None);
    }

    #[test]
    fn test_append_after_last_row() -> Result<()> {
        let mut wb = XlsxWorkbook::in_memory();
        wb.ensure_sheet("Sales", &["A"]);
        wb.append_rows("Sales", vec![vec![Cell::Number(1.0)]])?;
        wb.append_rows("Sales", vec![vec![Cell::Number(2.0)], vec![Cell::Number(3.0)]])?;

        assert_eq!(wb.last_row("Sales"), Some(4));
        let rows = wb.read_sheet("Sales").unwrap();
        assert_eq!(rows[1], vec![Cell::Number(1.0)]);
        assert_eq!(rows[3], vec![Cell::Number(3.0)]);
        Ok(())
    }

    #[test]
    fn test_flush_and_reopen() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("book.xlsx");

        let mut wb = XlsxWorkbook::open(&path)?;
        assert!(wb.sheet_names().is_empty());
        wb.ensure_sheet("Purchase", &["Date", "Vendor", "Quantity"]);
        wb.append_rows(
            "Purchase",
            vec![vec![
                Cell::Date(day(2024, 1, 5)),
                Cell::from("Acme Co"),
                Cell::Number(10.0),
            ]],
        )?;
        wb.flush()?;
        assert!(path.exists());

        let reopened = XlsxWorkbook::open(&path)?;
        assert_eq!(reopened.sheet_names(), vec!["Purchase"]);
        let rows = reopened.read_sheet("Purchase").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], Cell::from("Vendor"));
        assert_eq!(
            rows[1][0],
            Cell::DateTime {
                serial: 45296.0,
                duration: false
            }
        );
        assert_eq!(rows[1][1], Cell::from("Acme Co"));
        assert_eq!(rows[1][2], Cell::Number(10.0));
        Ok(())
    }

    #[test]
    fn test_existing_cells_survive_append() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("book.xlsx");

        let timestamp = Cell::DateTime {
            serial: 45296.572916666664,
            duration: false,
        };
        let elapsed = Cell::DateTime {
            serial: 1.5,
            duration: true,
        };
        let mut wb = XlsxWorkbook::open(&path)?;
        wb.ensure_sheet("Notes", &["Flag", "When", "Took"]);
        wb.append_rows(
            "Notes",
            vec![vec![Cell::Bool(true), timestamp.clone(), elapsed.clone()]],
        )?;
        wb.flush()?;

        let mut wb = XlsxWorkbook::open(&path)?;
        wb.ensure_sheet("Sales", &["Customer"]);
        wb.append_rows("Sales", vec![vec![Cell::from("Bob")]])?;
        wb.flush()?;

        let reopened = XlsxWorkbook::open(&path)?;
        let notes = reopened.read_sheet("Notes").unwrap();
        assert_eq!(notes[1], vec![Cell::Bool(true), timestamp, elapsed]);
        assert_eq!(reopened.last_row("Sales"), Some(2));
        Ok(())
    }

    #[test]
    fn test_flush_without_changes_does_not_create_file() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("book.xlsx");

        let mut wb = XlsxWorkbook::open(&path)?;
        wb.flush()?;
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_buffer_roundtrip() -> Result<()> {
        let mut wb = XlsxWorkbook::in_memory();
        wb.ensure_sheet("Sales", &["Customer"]);
        wb.append_rows("Sales", vec![vec![Cell::from("Bob")]])?;

        let bytes = wb.to_buffer()?;
        let loaded = XlsxWorkbook::from_bytes(bytes)?;
        assert_eq!(loaded.read_sheet("Sales").unwrap()[1][0], Cell::from("Bob"));
        assert!(loaded.path().is_none());
        Ok(())
    }

    #[test]
    fn test_open_rejects_garbage() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("broken.xlsx");
        fs::write(&path, b"not a workbook")?;

        assert!(XlsxWorkbook::open(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_parse_date_text() {
        assert_eq!(parse_date_text("2024-01-05"), Some(day(2024, 1, 5)));
        assert_eq!(parse_date_text("2024-01-05 13:45:00"), Some(day(2024, 1, 5)));
        assert_eq!(parse_date_text("2024-01-05T13:45:00"), Some(day(2024, 1, 5)));
        assert_eq!(parse_date_text("05/01/2024"), Some(day(2024, 1, 5)));
        assert_eq!(parse_date_text("yesterday"), None);
    }

    #[test]
    fn test_date_from_serial() {
        assert_eq!(date_from_serial(45296.0), Some(day(2024, 1, 5)));
        assert_eq!(date_from_serial(45296.75), Some(day(2024, 1, 5)));
        assert_eq!(date_from_serial(0.0), None);
        assert_eq!(date_from_serial(f64::NAN), None);
    }
}
