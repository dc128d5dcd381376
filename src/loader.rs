//! Ingestion boundary: turns raw CSV tables into the two source frames.
//!
//! Every parse of a raw byte stream runs under a [`ParseGate`] so that
//! concurrent uploads never interleave. The gate belongs to the loader;
//! the pipeline that consumes the frames is lock-free.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use polars::prelude::*;
use tracing::debug;

use crate::config::default_header_aliases;
use crate::error::{CurveError, Result};
use crate::schema::{disbursement, operation};

/// Mutual-exclusion lock serializing table parses. Clone to share.
pub type ParseGate = Arc<Mutex<()>>;

pub const DEFAULT_DISBURSEMENTS_FILE: &str = "disbursements.csv";
pub const DEFAULT_OPERATIONS_FILE: &str = "operations.csv";

/// The two validated input tables.
#[derive(Debug, Clone)]
pub struct SourceTables {
    pub disbursements: DataFrame,
    pub operations: DataFrame,
}

impl SourceTables {
    /// Validate and type both tables. Columns must already carry canonical names.
    pub fn new(disbursements: DataFrame, operations: DataFrame) -> Result<Self> {
        Ok(Self {
            disbursements: prepare_disbursements(disbursements)?,
            operations: prepare_operations(operations)?,
        })
    }
}

pub struct TableLoader {
    base_path: PathBuf,
    aliases: BTreeMap<String, String>,
    gate: ParseGate,
}

impl TableLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            aliases: default_header_aliases(),
            gate: ParseGate::default(),
        }
    }

    /// Share a gate with other loaders.
    pub fn with_gate(mut self, gate: ParseGate) -> Self {
        self.gate = gate;
        self
    }

    /// Replace the canonical-name → source-header map.
    pub fn with_header_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn gate(&self) -> ParseGate {
        Arc::clone(&self.gate)
    }

    // ── Files ───────────────────────────────────────────────────────────────

    /// Load the disbursements CSV.
    ///
    /// Required columns: operation_id, disbursement_id, effective_date, amount
    /// `amount` is parsed as Float64; other columns stay strings.
    pub fn load_disbursements(&self, filename: Option<&str>) -> Result<DataFrame> {
        let raw = self.read_csv_file(filename.unwrap_or(DEFAULT_DISBURSEMENTS_FILE))?;
        prepare_disbursements(raw)
    }

    /// Load the operations CSV.
    ///
    /// Required columns: operation_id, vigency_date
    /// Optional columns: sector, fonplata_contribution (parsed as Float64)
    pub fn load_operations(&self, filename: Option<&str>) -> Result<DataFrame> {
        let raw = self.read_csv_file(filename.unwrap_or(DEFAULT_OPERATIONS_FILE))?;
        prepare_operations(raw)
    }

    pub fn load_sources(
        &self,
        disbursements_file: Option<&str>,
        operations_file: Option<&str>,
    ) -> Result<SourceTables> {
        Ok(SourceTables {
            disbursements: self.load_disbursements(disbursements_file)?,
            operations: self.load_operations(operations_file)?,
        })
    }

    // ── Uploads ─────────────────────────────────────────────────────────────

    pub fn disbursements_from_bytes(&self, bytes: &[u8]) -> Result<DataFrame> {
        prepare_disbursements(self.read_csv_bytes(bytes)?)
    }

    pub fn operations_from_bytes(&self, bytes: &[u8]) -> Result<DataFrame> {
        prepare_operations(self.read_csv_bytes(bytes)?)
    }

    pub fn sources_from_bytes(
        &self,
        disbursements: &[u8],
        operations: &[u8],
    ) -> Result<SourceTables> {
        Ok(SourceTables {
            disbursements: self.disbursements_from_bytes(disbursements)?,
            operations: self.operations_from_bytes(operations)?,
        })
    }

    // ── Private helpers ─────────────────────────────────────────────────────

    /// Read a CSV file with all columns as String dtype.
    fn read_csv_file(&self, filename: &str) -> Result<DataFrame> {
        let path = self.base_path.join(filename);
        if !path.is_file() {
            return Err(CurveError::MissingTable(path.display().to_string()));
        }

        let _guard = self.gate.lock();
        debug!(path = %path.display(), "parsing table");
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0)) // all columns as String
            .try_into_reader_with_file_path(Some(path))?
            .finish()?;
        self.normalize_headers(df)
    }

    fn read_csv_bytes(&self, bytes: &[u8]) -> Result<DataFrame> {
        let _guard = self.gate.lock();
        debug!(len = bytes.len(), "parsing uploaded table");
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
            .finish()?;
        self.normalize_headers(df)
    }

    /// Trim header whitespace, then map source headers onto canonical names.
    fn normalize_headers(&self, mut df: DataFrame) -> Result<DataFrame> {
        let trimmed: Vec<String> = df
            .get_column_names_str()
            .iter()
            .map(|c| c.trim().to_string())
            .collect();
        df.set_column_names(trimmed.as_slice())?;

        let (old, new): (Vec<&str>, Vec<&str>) = self
            .aliases
            .iter()
            .filter(|(canonical, header)| {
                df.column(header).is_ok() && df.column(canonical).is_err()
            })
            .map(|(canonical, header)| (header.as_str(), canonical.as_str()))
            .unzip();

        if old.is_empty() {
            return Ok(df);
        }
        Ok(df.lazy().rename(old, new, true).collect()?)
    }
}

// ── Table preparation ───────────────────────────────────────────────────────

pub fn prepare_disbursements(raw: DataFrame) -> Result<DataFrame> {
    require_columns(&raw, &disbursement::REQUIRED)?;
    let df = strip_id_columns(raw, &[disbursement::OPERATION_ID, disbursement::DISBURSEMENT_ID])?;
    parse_float_column(df, disbursement::AMOUNT)
}

pub fn prepare_operations(raw: DataFrame) -> Result<DataFrame> {
    require_columns(&raw, &operation::REQUIRED)?;
    let df = strip_id_columns(raw, &[operation::OPERATION_ID])?;
    if df.column(operation::FONPLATA_CONTRIBUTION).is_ok() {
        parse_float_column(df, operation::FONPLATA_CONTRIBUTION)
    } else {
        Ok(df)
    }
}

pub fn require_columns(df: &DataFrame, required: &[&str]) -> Result<()> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(CurveError::MissingColumn(col_name.to_string()));
        }
    }
    Ok(())
}

fn strip_id_columns(df: DataFrame, columns: &[&str]) -> Result<DataFrame> {
    let exprs: Vec<Expr> = columns
        .iter()
        .map(|c| col(*c).cast(DataType::String).str().strip_chars(lit(" \t\r\n")))
        .collect();
    Ok(df.lazy().with_columns(exprs).collect()?)
}

/// Parse a column to Float64, rejecting values that are present but not numeric.
fn parse_float_column(df: DataFrame, column: &str) -> Result<DataFrame> {
    let source = df.column(column)?;
    let nulls_before = source.null_count();

    let expr = if source.dtype() == &DataType::String {
        col(column)
            .str()
            .strip_chars(lit(" \t\r\n"))
            .cast(DataType::Float64)
    } else {
        col(column).cast(DataType::Float64)
    };
    let df = df.lazy().with_columns([expr]).collect()?;

    let bad = df.column(column)?.null_count().saturating_sub(nulls_before);
    if bad > 0 {
        return Err(CurveError::InvalidData(format!(
            "Column '{}' has {} non-numeric values",
            column, bad
        )));
    }
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const DISBURSEMENTS: &str = "\
IDEtapa,IDDesembolso,FechaEfectiva,Monto
AR01,D1,15/01/2021,100
AR01,D2,15/01/2022, 300.5
";

    const OPERATIONS: &str = "\
 IDEtapa ,FechaVigencia,SECTOR,AporteFonplata
AR01,15/01/2020,Transporte,1000
";

    #[test]
    fn loads_source_headers_from_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("d.csv"), DISBURSEMENTS).unwrap();
        fs::write(dir.path().join("o.csv"), OPERATIONS).unwrap();

        let loader = TableLoader::new(dir.path());
        let tables = loader.load_sources(Some("d.csv"), Some("o.csv")).unwrap();

        assert_eq!(tables.disbursements.height(), 2);
        let amounts = tables.disbursements.column(disbursement::AMOUNT).unwrap();
        assert_eq!(amounts.dtype(), &DataType::Float64);
        assert_eq!(amounts.f64().unwrap().get(1), Some(300.5));

        let ops = &tables.operations;
        assert!(ops.column(operation::OPERATION_ID).is_ok());
        assert!(ops.column(operation::SECTOR).is_ok());
        assert_eq!(
            ops.column(operation::FONPLATA_CONTRIBUTION)
                .unwrap()
                .f64()
                .unwrap()
                .get(0),
            Some(1000.0)
        );
    }

    #[test]
    fn missing_file_is_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let loader = TableLoader::new(dir.path());
        assert!(matches!(
            loader.load_disbursements(None),
            Err(CurveError::MissingTable(_))
        ));
    }

    #[test]
    fn missing_required_column_is_rejected() {
        let loader = TableLoader::new(".");
        let err = loader
            .disbursements_from_bytes(b"IDEtapa,FechaEfectiva,Monto\nAR01,15/01/2021,1\n")
            .unwrap_err();
        match err {
            CurveError::MissingColumn(c) => assert_eq!(c, disbursement::DISBURSEMENT_ID),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_numeric_amount_is_invalid_data() {
        let loader = TableLoader::new(".");
        let err = loader
            .disbursements_from_bytes(
                b"operation_id,disbursement_id,effective_date,amount\nAR01,D1,15/01/2021,abc\n",
            )
            .unwrap_err();
        assert!(matches!(err, CurveError::InvalidData(_)));
    }

    #[test]
    fn loaders_can_share_a_gate() {
        let first = TableLoader::new(".");
        let second = TableLoader::new(".").with_gate(first.gate());
        assert!(Arc::ptr_eq(&first.gate(), &second.gate()));
    }

    #[test]
    fn concurrent_uploads_parse_independently() {
        let loader = Arc::new(TableLoader::new("."));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let loader = Arc::clone(&loader);
                std::thread::spawn(move || loader.operations_from_bytes(OPERATIONS.as_bytes()))
            })
            .collect();
        for handle in handles {
            let ops = handle.join().unwrap().unwrap();
            assert_eq!(ops.height(), 1);
        }
    }

    #[test]
    fn parse_waits_for_the_gate() {
        use std::sync::mpsc::{self, TryRecvError};
        use std::time::Duration;

        let loader = Arc::new(TableLoader::new("."));
        let gate = loader.gate();
        let guard = gate.lock();

        let (tx, rx) = mpsc::channel();
        let worker = {
            let loader = Arc::clone(&loader);
            std::thread::spawn(move || {
                let parsed = loader.operations_from_bytes(OPERATIONS.as_bytes());
                tx.send(parsed.map(|df| df.height())).unwrap();
            })
        };

        std::thread::sleep(Duration::from_millis(150));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        drop(guard);
        assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap().unwrap(), 1);
        worker.join().unwrap();
    }

    #[test]
    fn loaders_sharing_a_gate_serialize_parsing() {
        let gate = ParseGate::default();
        let first = TableLoader::new(".").with_gate(gate.clone());
        let second = TableLoader::new(".").with_gate(gate.clone());
        assert!(Arc::ptr_eq(&first.gate(), &second.gate()));

        let _guard = gate.lock();
        assert!(first.gate().try_lock().is_none());
    }
}
