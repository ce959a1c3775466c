use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::{table_totals, Category, Ledger, Record, Summary, TableTotals};
use crate::io::ledger_workbook;
use crate::storage::{load_from_store, persist, XlsxWorkbook};

use super::AppError;

/// Application service for one user session.
/// This is the primary interface for any client (CLI, shell, tests).
///
/// Each session owns its own [`Ledger`]; nothing is shared between sessions.
/// The workbook file itself is not locked, so two sessions saving to the same
/// file at once can overwrite each other's appends.
pub struct LedgerService {
    workbook_path: PathBuf,
    ledger: Ledger,
}

/// Outcome of a save, per category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub purchase: usize,
    pub sales: usize,
}

impl SaveReport {
    pub fn total(&self) -> usize {
        self.purchase + self.sales
    }
}

impl LedgerService {
    /// Start a session with an empty ledger without touching the workbook.
    pub fn new(workbook_path: impl Into<PathBuf>) -> Self {
        Self {
            workbook_path: workbook_path.into(),
            ledger: Ledger::new(),
        }
    }

    /// Start a session whose committed records are the ones already in the workbook.
    /// A workbook that does not exist yet gives an empty ledger.
    pub fn open(workbook_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let mut service = Self::new(workbook_path);
        service.ledger = service.read_workbook()?;
        Ok(service)
    }

    pub fn workbook_path(&self) -> &Path {
        &self.workbook_path
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn read_workbook(&self) -> Result<Ledger, AppError> {
        let load_err = |source| AppError::Load {
            path: self.workbook_path.clone(),
            source,
        };
        let workbook = XlsxWorkbook::open(&self.workbook_path).map_err(load_err)?;
        load_from_store(&workbook).map_err(load_err)
    }

    /// Re-read committed records from the workbook, keeping pending entries.
    pub fn reload(&mut self) -> Result<(), AppError> {
        let mut fresh = self.read_workbook()?;
        for category in Category::ALL {
            let pending = self.ledger.pending(category).to_vec();
            for r in pending {
                fresh.add_pending(category, &r.counterparty, r.unit_rate, r.quantity, r.date)?;
            }
        }
        self.ledger = fresh;
        Ok(())
    }

    // ========================
    // Entry operations
    // ========================

    /// Validate and queue a new entry.
    pub fn add(
        &mut self,
        category: Category,
        counterparty: &str,
        unit_rate: Decimal,
        quantity: Decimal,
        date: NaiveDate,
    ) -> Result<Record, AppError> {
        let record = self
            .ledger
            .add_pending(category, counterparty, unit_rate, quantity, date)?;
        info!(%category, counterparty = %record.counterparty, "entry added");
        Ok(record)
    }

    pub fn pending(&self, category: Category) -> &[Record] {
        self.ledger.pending(category)
    }

    pub fn committed(&self, category: Category) -> &[Record] {
        self.ledger.committed(category)
    }

    pub fn pending_totals(&self, category: Category) -> TableTotals {
        table_totals(self.ledger.pending(category))
    }

    pub fn committed_totals(&self, category: Category) -> TableTotals {
        table_totals(self.ledger.committed(category))
    }

    pub fn discard(&mut self, category: Category) -> usize {
        let dropped = self.ledger.discard_pending(category);
        if dropped > 0 {
            info!(%category, dropped, "pending entries discarded");
        }
        dropped
    }

    // ========================
    // Save and apply
    // ========================

    /// Append one category's pending entries to the workbook, then commit them.
    ///
    /// If the write fails nothing moves: the entries stay pending and can be
    /// saved again once the file is writable.
    pub fn save_category(&mut self, category: Category) -> Result<usize, AppError> {
        let pending = self.ledger.pending(category);
        if pending.is_empty() {
            return Ok(0);
        }

        let persist_err = |source| AppError::Persistence {
            category,
            path: self.workbook_path.clone(),
            source,
        };
        // Re-read the file on every save so appends land after rows other sessions wrote.
        let mut workbook = XlsxWorkbook::open(&self.workbook_path).map_err(persist_err)?;
        persist(&mut workbook, category, pending).map_err(persist_err)?;

        let moved = self.ledger.commit(category);
        info!(%category, moved, path = %self.workbook_path.display(), "entries saved");
        Ok(moved)
    }

    /// Save both categories. Stops at the first failure; categories saved
    /// before it stay saved.
    pub fn save(&mut self) -> Result<SaveReport, AppError> {
        let purchase = self.save_category(Category::Purchase)?;
        let sales = self.save_category(Category::Sales)?;
        Ok(SaveReport { purchase, sales })
    }

    /// Replace the committed records of a category with an edited table.
    ///
    /// This only changes the session's view; the workbook is append-only and
    /// keeps its rows. Use [`LedgerService::export_workbook`] to write the
    /// edited ledger out.
    pub fn apply_table(&mut self, category: Category, table: Vec<Record>) -> usize {
        self.ledger.replace_committed(category, table);
        let kept = self.ledger.committed(category).len();
        info!(%category, kept, "edited table applied");
        kept
    }

    pub fn summary(&self) -> Summary {
        self.ledger.summary()
    }

    // ========================
    // Export
    // ========================

    /// The committed ledger as xlsx bytes, ready for download.
    pub fn workbook_bytes(&self) -> Result<Vec<u8>, AppError> {
        ledger_workbook(&self.ledger)
            .and_then(|wb| wb.to_buffer())
            .map_err(AppError::Export)
    }

    /// Write the committed ledger to a new workbook at `path`.
    pub fn export_workbook(&self, path: &Path) -> Result<(), AppError> {
        if path == self.workbook_path {
            warn!(path = %path.display(), "export target is the live workbook; it will be replaced");
        }
        ledger_workbook(&self.ledger)
            .and_then(|wb| wb.save_as(path))
            .map_err(AppError::Export)?;
        info!(path = %path.display(), "workbook exported");
        Ok(())
    }
}
