use polars::prelude::*;
use tracing::{info, info_span};

use crate::aggregate::aggregate;
use crate::bucket::bucket;
use crate::config::{
    BucketPolicy, MetricMode, PipelineConfig, ReportKind, ReportSpec, DEFAULT_UNKNOWN_COUNTRY,
};
use crate::country;
use crate::error::Result;
use crate::linker::link;
use crate::loader::{require_columns, SourceTables};
use crate::metrics::annotate;
use crate::schema::disbursement;

/// Link → enrich → bucket → aggregate → annotate.
///
/// A pipeline holds only its report configuration; every run is computed
/// from the two source tables alone, so identical inputs give identical
/// output, row order included.
#[derive(Debug, Clone)]
pub struct Pipeline {
    spec: ReportSpec,
    unknown_country: String,
}

impl Pipeline {
    pub fn new(spec: ReportSpec) -> Self {
        Self {
            spec,
            unknown_country: DEFAULT_UNKNOWN_COUNTRY.to_string(),
        }
    }

    pub fn for_report(kind: ReportKind) -> Self {
        Self::new(kind.spec())
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(config.report_spec()?).with_unknown_country(&config.unknown_country_label))
    }

    pub fn with_unknown_country(mut self, label: impl Into<String>) -> Self {
        self.unknown_country = label.into();
        self
    }

    pub fn spec(&self) -> &ReportSpec {
        &self.spec
    }

    /// The divisor policy this report buckets with.
    pub fn policy(&self) -> BucketPolicy {
        self.spec.policy()
    }

    pub fn mode(&self) -> MetricMode {
        self.spec.mode()
    }

    /// Linked, country-enriched and bucketed records, one row per disbursement.
    ///
    /// Fails with `MissingColumn` when the operations table lacks a column the
    /// report groups or divides by (`sector`, `fonplata_contribution`).
    pub fn bucketed(&self, tables: &SourceTables) -> Result<DataFrame> {
        require_columns(&tables.operations, &self.spec.required_operation_columns())?;
        let linked = link(&tables.disbursements, &tables.operations)?;
        let enriched = country::enrich(linked, disbursement::OPERATION_ID, &self.unknown_country)?;
        bucket(enriched, self.spec.policy())
    }

    /// Produce the annotated report table.
    pub fn run(&self, tables: &SourceTables) -> Result<DataFrame> {
        let span = info_span!(
            "pipeline",
            keys = ?self.spec.key_columns(),
            policy = %self.spec.policy(),
            mode = %self.spec.mode()
        );
        let _enter = span.enter();

        let bucketed = self.bucketed(tables)?;
        let grouped = aggregate(&bucketed, &self.spec)?;
        let annotated = annotate(&grouped, &self.spec)?;

        info!(
            disbursements = tables.disbursements.height(),
            rows = annotated.height(),
            "report computed"
        );
        Ok(annotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CurveError;
    use crate::schema::{bucket, metrics};

    fn tables() -> SourceTables {
        SourceTables::new(
            df!(
                "operation_id" => ["AR01", "AR01"],
                "disbursement_id" => ["D1", "D2"],
                "effective_date" => ["15/01/2021", "15/01/2022"],
                "amount" => ["100", "300"]
            )
            .unwrap(),
            df!(
                "operation_id" => ["AR01"],
                "vigency_date" => ["15/01/2020"]
            )
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn exposes_active_policy() {
        assert_eq!(
            Pipeline::for_report(ReportKind::Operations).policy(),
            BucketPolicy::Rounded365
        );
        assert_eq!(
            Pipeline::for_report(ReportKind::Countries).policy(),
            BucketPolicy::Truncated366
        );
    }

    #[test]
    fn bucketed_records_carry_country() {
        let df = Pipeline::for_report(ReportKind::Countries)
            .bucketed(&tables())
            .unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            df.column(metrics::COUNTRY).unwrap().str().unwrap().get(0),
            Some("Argentina")
        );
        assert!(df.column(bucket::DAYS_ELAPSED).is_ok());
    }

    #[test]
    fn run_is_deterministic() {
        let pipeline = Pipeline::for_report(ReportKind::OperationCountry);
        let first = pipeline.run(&tables()).unwrap();
        let second = pipeline.run(&tables()).unwrap();
        assert!(first.equals_missing(&second));
    }

    #[test]
    fn cap_report_requires_contribution_column() {
        match Pipeline::for_report(ReportKind::OperationCurve).run(&tables()) {
            Err(CurveError::MissingColumn(column)) => assert_eq!(column, "fonplata_contribution"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn sector_report_requires_sector_column() {
        match Pipeline::for_report(ReportKind::SectorCountry).bucketed(&tables()) {
            Err(CurveError::MissingColumn(column)) => assert_eq!(column, "sector"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }
}
