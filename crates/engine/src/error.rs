//! The module contains the errors the engine can return.
//!
//! The engine transformations themselves never fail on malformed hierarchy
//! data (they degrade to empty contributions); the errors below cover the
//! few operations with an explicit failure contract:
//!
//! - [`NothingToExport`] returned when an export is requested for zero rows.
//! - [`InvalidAmount`] returned when a money value cannot be parsed.
//! - [`InvalidField`] returned when a form or export row is not usable.
//!
//!  [`NothingToExport`]: EngineError::NothingToExport
//!  [`InvalidAmount`]: EngineError::InvalidAmount
//!  [`InvalidField`]: EngineError::InvalidField
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("nothing to export")]
    NothingToExport,
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid field: {0}")]
    InvalidField(String),
    #[error("export failed: {0}")]
    Export(String),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NothingToExport, Self::NothingToExport) => true,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidField(a), Self::InvalidField(b)) => a == b,
            (Self::Export(a), Self::Export(b)) => a == b,
            (Self::Csv(a), Self::Csv(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
