// Application layer - session orchestration on top of the ledger and the workbook store.

pub mod auth;
pub mod error;
pub mod service;

pub use auth::*;
pub use error::*;
pub use service::*;
