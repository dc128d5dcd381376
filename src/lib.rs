pub mod aggregate;
pub mod bucket;
pub mod config;
pub mod country;
pub mod error;
pub mod linker;
pub mod loader;
pub mod metrics;
pub mod pipeline;
pub mod schema;
pub mod summary;

#[cfg(feature = "python")]
mod model;

pub use config::{BucketPolicy, GroupKey, MetricMode, PipelineConfig, ReportKind, ReportSpec};
pub use error::{CurveError, Result};
pub use loader::{ParseGate, SourceTables, TableLoader};
pub use pipeline::Pipeline;

#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::types::PyModule;

/// Export schema constants as Python submodules
#[cfg(feature = "python")]
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Disbursement
    let disbursement = PyModule::new(m.py(), "disbursement")?;
    disbursement.add("OPERATION_ID", schema::disbursement::OPERATION_ID)?;
    disbursement.add("DISBURSEMENT_ID", schema::disbursement::DISBURSEMENT_ID)?;
    disbursement.add("EFFECTIVE_DATE", schema::disbursement::EFFECTIVE_DATE)?;
    disbursement.add("AMOUNT", schema::disbursement::AMOUNT)?;
    m.add_submodule(&disbursement)?;

    // Operation
    let operation = PyModule::new(m.py(), "operation")?;
    operation.add("OPERATION_ID", schema::operation::OPERATION_ID)?;
    operation.add("VIGENCY_DATE", schema::operation::VIGENCY_DATE)?;
    operation.add("SECTOR", schema::operation::SECTOR)?;
    operation.add(
        "FONPLATA_CONTRIBUTION",
        schema::operation::FONPLATA_CONTRIBUTION,
    )?;
    m.add_submodule(&operation)?;

    // Bucket
    let bucket = PyModule::new(m.py(), "bucket")?;
    bucket.add("DAYS_ELAPSED", schema::bucket::DAYS_ELAPSED)?;
    bucket.add("YEAR_BUCKET", schema::bucket::YEAR_BUCKET)?;
    bucket.add("MONTH_BUCKET", schema::bucket::MONTH_BUCKET)?;
    m.add_submodule(&bucket)?;

    // Metrics
    let metrics = PyModule::new(m.py(), "metrics")?;
    metrics.add("COUNTRY", schema::metrics::COUNTRY)?;
    metrics.add("CUMULATIVE_AMOUNT", schema::metrics::CUMULATIVE_AMOUNT)?;
    metrics.add("PCT_OF_GROUP_TOTAL", schema::metrics::PCT_OF_GROUP_TOTAL)?;
    metrics.add(
        "PCT_OF_CUMULATIVE_CAP",
        schema::metrics::PCT_OF_CUMULATIVE_CAP,
    )?;
    m.add_submodule(&metrics)?;

    // Summary
    let summary = PyModule::new(m.py(), "summary")?;
    summary.add("AMOUNT_SUM", schema::summary::AMOUNT_SUM)?;
    summary.add("AMOUNT_MEAN", schema::summary::AMOUNT_MEAN)?;
    summary.add("DISBURSEMENT_COUNT", schema::summary::DISBURSEMENT_COUNT)?;
    summary.add("CUMULATIVE_LAST", schema::summary::CUMULATIVE_LAST)?;
    summary.add("CUMULATIVE_MEAN", schema::summary::CUMULATIVE_MEAN)?;
    summary.add("PCT_CUMULATIVE_LAST", schema::summary::PCT_CUMULATIVE_LAST)?;
    summary.add("PCT_CUMULATIVE_MEAN", schema::summary::PCT_CUMULATIVE_MEAN)?;
    summary.add("PCT_OF_YEAR_TOTAL", schema::summary::PCT_OF_YEAR_TOTAL)?;
    m.add_submodule(&summary)?;

    Ok(())
}

#[cfg(feature = "python")]
#[pymodule]
#[pyo3(name = "_core")]
fn python_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<model::DisbursementModel>()?;
    add_schema_exports(m)?;
    Ok(())
}
