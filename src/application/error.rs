use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{Category, ValidationError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid entry: {0}")]
    Validation(#[from] ValidationError),

    #[error("Could not save {category} to {}: {source:#}", path.display())]
    Persistence {
        category: Category,
        path: PathBuf,
        source: anyhow::Error,
    },

    #[error("Could not load {}: {source:#}", path.display())]
    Load {
        path: PathBuf,
        source: anyhow::Error,
    },

    #[error("Could not import table: {0:#}")]
    Import(anyhow::Error),

    #[error("Could not export: {0:#}")]
    Export(anyhow::Error),

    #[error("Invalid credentials")]
    Authentication,
}

impl AppError {
    /// Errors the user can fix by correcting the entry, as opposed to I/O trouble.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}
