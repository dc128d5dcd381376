use std::collections::HashMap;

use once_cell::sync::Lazy;
use polars::prelude::DataFrame;
use pyo3::prelude::*;
use pyo3_polars::PyDataFrame;

use crate::config::{default_header_aliases, ReportKind, DEFAULT_UNKNOWN_COUNTRY};
use crate::error::CurveError;
use crate::loader::{ParseGate, SourceTables, TableLoader};
use crate::pipeline::Pipeline;
use crate::summary;

/// One gate for every model in the process, so concurrent sessions never
/// parse uploads at the same time.
static SHARED_GATE: Lazy<ParseGate> = Lazy::new(ParseGate::default);

#[pyclass]
pub struct DisbursementModel {
    loader: TableLoader,
    unknown_country: String,
    disbursements: Option<DataFrame>,
    operations: Option<DataFrame>,
}

#[pymethods]
impl DisbursementModel {
    #[new]
    #[pyo3(signature = (base_path=".", unknown_country=None, rename=None))]
    fn new(
        base_path: &str,
        unknown_country: Option<String>,
        rename: Option<HashMap<String, String>>,
    ) -> Self {
        let mut aliases = default_header_aliases();
        aliases.extend(rename.unwrap_or_default());
        Self {
            loader: TableLoader::new(base_path)
                .with_gate(SHARED_GATE.clone())
                .with_header_aliases(aliases),
            unknown_country: unknown_country
                .unwrap_or_else(|| DEFAULT_UNKNOWN_COUNTRY.to_string()),
            disbursements: None,
            operations: None,
        }
    }

    // ── Data loading ────────────────────────────────────────────────────────

    /// Load the disbursements CSV.
    ///
    /// Required columns: operation_id, disbursement_id, effective_date, amount
    /// (or the source headers IDEtapa, IDDesembolso, FechaEfectiva, Monto).
    #[pyo3(signature = (filename=None))]
    fn load_disbursements(&mut self, filename: Option<&str>) -> PyResult<PyDataFrame> {
        let df = self.loader.load_disbursements(filename)?;
        self.disbursements = Some(df.clone());
        Ok(PyDataFrame(df))
    }

    /// Load the operations CSV.
    ///
    /// Required columns: operation_id, vigency_date
    /// Optional columns: sector, fonplata_contribution
    #[pyo3(signature = (filename=None))]
    fn load_operations(&mut self, filename: Option<&str>) -> PyResult<PyDataFrame> {
        let df = self.loader.load_operations(filename)?;
        self.operations = Some(df.clone());
        Ok(PyDataFrame(df))
    }

    /// Parse an uploaded disbursements CSV.
    fn upload_disbursements(&mut self, data: &[u8]) -> PyResult<PyDataFrame> {
        let df = self.loader.disbursements_from_bytes(data)?;
        self.disbursements = Some(df.clone());
        Ok(PyDataFrame(df))
    }

    /// Parse an uploaded operations CSV.
    fn upload_operations(&mut self, data: &[u8]) -> PyResult<PyDataFrame> {
        let df = self.loader.operations_from_bytes(data)?;
        self.operations = Some(df.clone());
        Ok(PyDataFrame(df))
    }

    // ── Reports ─────────────────────────────────────────────────────────────

    /// Names accepted by `run_report` and `year_summary`.
    #[staticmethod]
    fn reports() -> Vec<&'static str> {
        ReportKind::ALL.iter().map(|k| k.name()).collect()
    }

    /// Run a report preset and return the annotated table.
    #[pyo3(signature = (report="operations"))]
    fn run_report(&self, report: &str) -> PyResult<PyDataFrame> {
        let pipeline = self.pipeline(report)?;
        let df = pipeline.run(&self.tables()?)?;
        Ok(PyDataFrame(df))
    }

    /// Per-group, per-year roll-up of a report.
    #[pyo3(signature = (report="operations"))]
    fn year_summary(&self, report: &str) -> PyResult<PyDataFrame> {
        let pipeline = self.pipeline(report)?;
        let annotated = pipeline.run(&self.tables()?)?;
        let df = summary::year_summary(&annotated, pipeline.spec())?;
        Ok(PyDataFrame(df))
    }

    /// Sector share of each year's disbursed amount.
    fn sector_shares(&self) -> PyResult<PyDataFrame> {
        let pipeline = self.pipeline(ReportKind::SectorCountry.name())?;
        let bucketed = pipeline.bucketed(&self.tables()?)?;
        let df = summary::sector_year_shares(&bucketed)?;
        Ok(PyDataFrame(df))
    }

    // ── Properties ──────────────────────────────────────────────────────────

    #[getter]
    fn disbursements_df(&self) -> Option<PyDataFrame> {
        self.disbursements.clone().map(PyDataFrame)
    }

    #[getter]
    fn operations_df(&self) -> Option<PyDataFrame> {
        self.operations.clone().map(PyDataFrame)
    }
}

// ── Private helpers ─────────────────────────────────────────────────────────

impl DisbursementModel {
    fn pipeline(&self, report: &str) -> Result<Pipeline, CurveError> {
        let kind: ReportKind = report.parse()?;
        Ok(Pipeline::for_report(kind).with_unknown_country(&self.unknown_country))
    }

    fn tables(&self) -> Result<SourceTables, CurveError> {
        let disbursements = self
            .disbursements
            .clone()
            .ok_or_else(|| CurveError::MissingTable("disbursements".into()))?;
        let operations = self
            .operations
            .clone()
            .ok_or_else(|| CurveError::MissingTable("operations".into()))?;
        Ok(SourceTables {
            disbursements,
            operations,
        })
    }
}
