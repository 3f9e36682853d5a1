//! Typed domain errors.
//!
//! Anything that aborts a stage before it writes output gets a named
//! variant; anomalies in the data itself are filtered, never raised.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("required column '{column}' is missing from the input table")]
    MissingColumn { column: String },
}
