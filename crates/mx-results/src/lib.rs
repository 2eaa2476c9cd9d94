//! mx-results: per-run metric tables and the on-disk run store.

pub mod hash;
pub mod store;
pub mod types;

pub use hash::compute_run_id;
pub use store::RunStore;
pub use types::*;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Table '{table}' not found in run {run_id}")]
    TableNotFound { run_id: String, table: String },

    #[error("Invalid table name: {name}")]
    InvalidTableName { name: String },

    #[error("Row for iteration {iteration} has {got} values, table '{table}' has {expected} columns")]
    RowShape {
        table: String,
        iteration: usize,
        expected: usize,
        got: usize,
    },

    #[error("Malformed table '{table}': {what}")]
    Malformed { table: String, what: String },

    #[error("Invalid path: {message}")]
    InvalidPath { message: String },
}
