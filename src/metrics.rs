//! Derived metrics: running cumulative amount and the two percentage columns.
//!
//! Within each group (the report's key columns, ignoring buckets) rows are
//! ordered by year_bucket, month_bucket, disbursement_id. `cumulative_amount`
//! is the running sum of `amount` in that order.
//!
//! | mode              | pct_of_group_total        | pct_of_cumulative_cap                       |
//! |-------------------|---------------------------|---------------------------------------------|
//! | self-normalizing  | amount / group sum × 100  | cumulative / group max cumulative × 100     |
//! | contribution-cap  | amount / contribution × 100 | cumulative / contribution × 100           |
//!
//! A zero denominator is reported as [`CurveError::DegenerateGroup`] instead
//! of producing NaN or infinite percentages.

use polars::prelude::*;
use tracing::debug;

use crate::aggregate::{grouping_columns, stable_order};
use crate::config::{MetricMode, ReportSpec};
use crate::error::{CurveError, Result};
use crate::loader::require_columns;
use crate::schema::{disbursement, metrics, operation};

const GROUP_TOTAL: &str = "__group_total";
const CUMULATIVE_MAX: &str = "__cumulative_max";

/// Annotate grouped rows with `cumulative_amount`, `pct_of_group_total`,
/// `pct_of_cumulative_cap` and `country`.
///
/// `country` is null when it can be derived from neither a key nor a carried
/// column.
pub fn annotate(grouped: &DataFrame, spec: &ReportSpec) -> Result<DataFrame> {
    let order = grouping_columns(spec);
    require_columns(grouped, &order)?;
    require_columns(grouped, &[disbursement::AMOUNT])?;

    let keys: Vec<Expr> = spec.key_columns().iter().map(|c| col(*c)).collect();

    let sorted = grouped
        .clone()
        .lazy()
        .sort(order.clone(), stable_order())
        .with_columns([col(disbursement::AMOUNT)
            .cum_sum(false)
            .over(keys.clone())
            .alias(metrics::CUMULATIVE_AMOUNT)]);

    let with_pct = match spec.mode() {
        MetricMode::SelfNormalizing => {
            let df = sorted
                .with_columns([
                    col(disbursement::AMOUNT)
                        .sum()
                        .over(keys.clone())
                        .alias(GROUP_TOTAL),
                    col(metrics::CUMULATIVE_AMOUNT)
                        .max()
                        .over(keys.clone())
                        .alias(CUMULATIVE_MAX),
                ])
                .collect()?;
            ensure_nonzero(&df, spec, GROUP_TOTAL, "group total amount")?;
            ensure_nonzero(&df, spec, CUMULATIVE_MAX, "maximum cumulative amount")?;
            df.lazy().with_columns([
                (col(disbursement::AMOUNT) / col(GROUP_TOTAL) * lit(100.0))
                    .alias(metrics::PCT_OF_GROUP_TOTAL),
                (col(metrics::CUMULATIVE_AMOUNT) / col(CUMULATIVE_MAX) * lit(100.0))
                    .alias(metrics::PCT_OF_CUMULATIVE_CAP),
            ])
        }
        MetricMode::ContributionCap => {
            let df = sorted.collect()?;
            ensure_nonzero(&df, spec, operation::FONPLATA_CONTRIBUTION, "fonplata_contribution")?;
            df.lazy().with_columns([
                (col(disbursement::AMOUNT) / col(operation::FONPLATA_CONTRIBUTION) * lit(100.0))
                    .alias(metrics::PCT_OF_GROUP_TOTAL),
                (col(metrics::CUMULATIVE_AMOUNT) / col(operation::FONPLATA_CONTRIBUTION)
                    * lit(100.0))
                .alias(metrics::PCT_OF_CUMULATIVE_CAP),
            ])
        }
    };

    let mut output: Vec<Expr> = order.iter().map(|c| col(*c)).collect();
    if !order.contains(&metrics::COUNTRY) {
        output.push(lit(NULL).cast(DataType::String).alias(metrics::COUNTRY));
    }
    output.extend([
        col(disbursement::AMOUNT),
        col(metrics::CUMULATIVE_AMOUNT),
        col(metrics::PCT_OF_GROUP_TOTAL),
        col(metrics::PCT_OF_CUMULATIVE_CAP),
    ]);

    let annotated = with_pct.select(output).collect()?;
    debug!(rows = annotated.height(), mode = %spec.mode(), "annotated groups");
    Ok(annotated)
}

/// Fail with the first group whose `column` is zero.
fn ensure_nonzero(df: &DataFrame, spec: &ReportSpec, column: &str, metric: &str) -> Result<()> {
    let key_columns = spec.key_columns();
    let zero = df
        .clone()
        .lazy()
        .filter(col(column).eq(lit(0.0)))
        .select(key_columns.iter().map(|c| col(*c)).collect::<Vec<_>>())
        .limit(1)
        .collect()?;

    if zero.height() == 0 {
        return Ok(());
    }

    let mut parts = Vec::with_capacity(key_columns.len());
    for name in &key_columns {
        let value = zero.column(name)?.str()?.get(0).unwrap_or("null");
        parts.push(format!("{name}={value}"));
    }
    Err(CurveError::DegenerateGroup {
        group: parts.join(", "),
        metric: metric.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BucketPolicy, GroupKey, ReportKind};

    fn column_f64(df: &DataFrame, name: &str) -> Vec<f64> {
        df.column(name)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap())
            .collect()
    }

    fn assert_close(actual: Vec<f64>, expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{actual:?} != {expected:?}");
        }
    }

    fn grouped() -> DataFrame {
        // deliberately unsorted
        df!(
            "operation_id" => ["AR01", "BO02", "AR01"],
            "country" => ["Argentina", "Bolivia", "Argentina"],
            "fonplata_contribution" => [1000.0, 50.0, 1000.0],
            "year_bucket" => [1i64, 0, 0],
            "month_bucket" => [24i64, 2, 12],
            "disbursement_id" => ["D2", "D7", "D1"],
            "amount" => [300.0, 50.0, 100.0]
        )
        .unwrap()
    }

    #[test]
    fn self_normalizing_percentages() {
        let out = annotate(&grouped(), &ReportKind::Operations.spec()).unwrap();

        assert_eq!(column_f64(&out, metrics::CUMULATIVE_AMOUNT), vec![100.0, 400.0, 50.0]);
        assert_eq!(column_f64(&out, metrics::PCT_OF_GROUP_TOTAL), vec![25.0, 75.0, 100.0]);
        assert_eq!(column_f64(&out, metrics::PCT_OF_CUMULATIVE_CAP), vec![25.0, 100.0, 100.0]);
    }

    #[test]
    fn contribution_cap_percentages() {
        let out = annotate(&grouped(), &ReportKind::OperationCurve.spec()).unwrap();

        assert_close(column_f64(&out, metrics::PCT_OF_GROUP_TOTAL), &[10.0, 30.0, 100.0]);
        assert_close(column_f64(&out, metrics::PCT_OF_CUMULATIVE_CAP), &[10.0, 40.0, 100.0]);
    }

    #[test]
    fn zero_total_is_degenerate() {
        let mut df = grouped();
        df.with_column(Series::new("amount".into(), [300.0, 0.0, 100.0]))
            .unwrap();
        match annotate(&df, &ReportKind::Operations.spec()) {
            Err(CurveError::DegenerateGroup { group, metric }) => {
                assert_eq!(group, "operation_id=BO02");
                assert_eq!(metric, "group total amount");
            }
            other => panic!("expected DegenerateGroup, got {other:?}"),
        }
    }

    #[test]
    fn zero_contribution_is_degenerate() {
        let mut df = grouped();
        df.with_column(Series::new(
            "fonplata_contribution".into(),
            [0.0, 50.0, 0.0],
        ))
        .unwrap();
        assert!(matches!(
            annotate(&df, &ReportKind::OperationCurve.spec()),
            Err(CurveError::DegenerateGroup { .. })
        ));
    }

    #[test]
    fn country_is_null_without_a_source() {
        let spec = ReportSpec::new(
            vec![GroupKey::Sector],
            BucketPolicy::Truncated366,
            MetricMode::SelfNormalizing,
        )
        .unwrap();
        let df = df!(
            "sector" => ["Agua", "Agua"],
            "year_bucket" => [0i64, 1],
            "month_bucket" => [1i64, 13],
            "disbursement_id" => ["D1", "D2"],
            "amount" => [1.0, 3.0]
        )
        .unwrap();
        let out = annotate(&df, &spec).unwrap();
        assert_eq!(out.column(metrics::COUNTRY).unwrap().null_count(), 2);
        assert_eq!(column_f64(&out, metrics::PCT_OF_CUMULATIVE_CAP), vec![25.0, 100.0]);
    }
}
