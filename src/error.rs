#[cfg(feature = "python")]
use pyo3::exceptions::PyRuntimeError;
#[cfg(feature = "python")]
use pyo3::PyErr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CurveError {
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Missing table: {0}")]
    MissingTable(String),

    #[error("Unparseable date in column '{column}' at row {row}: '{value}'")]
    DateParse {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Degenerate group {group}: {metric} is zero")]
    DegenerateGroup { group: String, metric: String },

    #[error("Duplicate operation_id '{operation_id}' ({count} rows in operations table)")]
    DuplicateKey { operation_id: String, count: u32 },

    #[error("InvalidData: {0}")]
    InvalidData(String),

    #[error("Config: {0}")]
    Config(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T, E = CurveError> = std::result::Result<T, E>;

#[cfg(feature = "python")]
impl From<CurveError> for PyErr {
    fn from(err: CurveError) -> PyErr {
        PyRuntimeError::new_err(err.to_string())
    }
}
