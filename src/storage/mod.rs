mod records;
mod workbook;

pub use records::*;
pub use workbook::*;

/// Default workbook file name.
pub const DEFAULT_WORKBOOK: &str = "Book1.xlsx";
