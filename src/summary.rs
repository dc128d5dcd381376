//! Per-year roll-ups of a computed report, as shown next to the charts.

use polars::prelude::*;

use crate::aggregate::{grouping_columns, stable_order};
use crate::config::ReportSpec;
use crate::error::{CurveError, Result};
use crate::loader::require_columns;
use crate::schema::{bucket, disbursement, metrics, operation, summary};

const YEAR_TOTAL: &str = "__year_total";

/// Summarize an annotated report per group and `year_bucket`.
///
/// `cumulative_last` and `pct_cumulative_last` are taken from the last row
/// of each year in report order.
pub fn year_summary(annotated: &DataFrame, spec: &ReportSpec) -> Result<DataFrame> {
    let order = grouping_columns(spec);
    require_columns(annotated, &order)?;
    require_columns(
        annotated,
        &[
            disbursement::AMOUNT,
            metrics::CUMULATIVE_AMOUNT,
            metrics::PCT_OF_CUMULATIVE_CAP,
        ],
    )?;

    let mut by_names = spec.key_columns();
    by_names.push(bucket::YEAR_BUCKET);
    let by: Vec<Expr> = by_names.iter().map(|c| col(*c)).collect();

    Ok(annotated
        .clone()
        .lazy()
        .sort(order, stable_order())
        .group_by_stable(by)
        .agg([
            col(disbursement::AMOUNT).sum().alias(summary::AMOUNT_SUM),
            col(disbursement::AMOUNT).mean().alias(summary::AMOUNT_MEAN),
            len()
                .cast(DataType::Int64)
                .alias(summary::DISBURSEMENT_COUNT),
            col(metrics::CUMULATIVE_AMOUNT)
                .last()
                .alias(summary::CUMULATIVE_LAST),
            col(metrics::CUMULATIVE_AMOUNT)
                .mean()
                .alias(summary::CUMULATIVE_MEAN),
            col(metrics::PCT_OF_CUMULATIVE_CAP)
                .last()
                .alias(summary::PCT_CUMULATIVE_LAST),
            col(metrics::PCT_OF_CUMULATIVE_CAP)
                .mean()
                .alias(summary::PCT_CUMULATIVE_MEAN),
        ])
        .sort(by_names, stable_order())
        .collect()?)
}

/// Amount per sector and year with each sector's share of the year total.
///
/// Takes bucketed records (see `Pipeline::bucketed`). A year whose total is
/// zero has no meaningful shares and is rejected.
pub fn sector_year_shares(bucketed: &DataFrame) -> Result<DataFrame> {
    require_columns(
        bucketed,
        &[operation::SECTOR, bucket::YEAR_BUCKET, disbursement::AMOUNT],
    )?;
    // linking fills an absent sector column with nulls
    let sector_nulls = bucketed.column(operation::SECTOR)?.null_count();
    if bucketed.height() > 0 && sector_nulls == bucketed.height() {
        return Err(CurveError::MissingColumn(operation::SECTOR.to_string()));
    }

    let totals = bucketed
        .clone()
        .lazy()
        .group_by([col(operation::SECTOR), col(bucket::YEAR_BUCKET)])
        .agg([col(disbursement::AMOUNT).sum()])
        .with_columns([col(disbursement::AMOUNT)
            .sum()
            .over([col(bucket::YEAR_BUCKET)])
            .alias(YEAR_TOTAL)])
        .sort([bucket::YEAR_BUCKET, operation::SECTOR], stable_order())
        .collect()?;

    let zero = totals
        .clone()
        .lazy()
        .filter(col(YEAR_TOTAL).eq(lit(0.0)))
        .limit(1)
        .collect()?;
    if zero.height() > 0 {
        let year = zero
            .column(bucket::YEAR_BUCKET)?
            .i64()?
            .get(0)
            .map_or_else(|| "null".to_string(), |y| y.to_string());
        return Err(CurveError::DegenerateGroup {
            group: format!("{}={}", bucket::YEAR_BUCKET, year),
            metric: "year total amount".to_string(),
        });
    }

    Ok(totals
        .lazy()
        .select([
            col(operation::SECTOR),
            col(bucket::YEAR_BUCKET),
            col(disbursement::AMOUNT),
            (col(disbursement::AMOUNT) / col(YEAR_TOTAL) * lit(100.0))
                .alias(summary::PCT_OF_YEAR_TOTAL),
        ])
        .collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportKind;
    use crate::metrics::annotate;

    #[test]
    fn year_summary_takes_last_cumulative_of_each_year() {
        let grouped = df!(
            "operation_id" => ["AR01", "AR01", "AR01"],
            "country" => ["Argentina", "Argentina", "Argentina"],
            "year_bucket" => [0i64, 0, 1],
            "month_bucket" => [2i64, 5, 13],
            "disbursement_id" => ["D1", "D2", "D3"],
            "amount" => [10.0, 30.0, 60.0]
        )
        .unwrap();
        let spec = ReportKind::Operations.spec();
        let annotated = annotate(&grouped, &spec).unwrap();
        let out = year_summary(&annotated, &spec).unwrap();

        assert_eq!(out.height(), 2);
        let sums: Vec<Option<f64>> = out
            .column(summary::AMOUNT_SUM)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(sums, vec![Some(40.0), Some(60.0)]);
        let last: Vec<Option<f64>> = out
            .column(summary::CUMULATIVE_LAST)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(last, vec![Some(40.0), Some(100.0)]);
        let cumulative_mean: Vec<Option<f64>> = out
            .column(summary::CUMULATIVE_MEAN)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(cumulative_mean, vec![Some(25.0), Some(100.0)]);
        let counts: Vec<Option<i64>> = out
            .column(summary::DISBURSEMENT_COUNT)
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(counts, vec![Some(2), Some(1)]);
    }

    #[test]
    fn sector_shares_sum_to_one_hundred_per_year() {
        let bucketed = df!(
            "sector" => ["Agua", "Vial", "Agua", "Vial"],
            "year_bucket" => [0i64, 0, 1, 1],
            "amount" => [25.0, 75.0, 10.0, 0.0]
        )
        .unwrap();
        let out = sector_year_shares(&bucketed).unwrap();
        let pct: Vec<Option<f64>> = out
            .column(summary::PCT_OF_YEAR_TOTAL)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(pct, vec![Some(25.0), Some(75.0), Some(100.0), Some(0.0)]);
    }

    #[test]
    fn all_null_sector_is_a_missing_column() {
        let bucketed = DataFrame::new(vec![
            Series::new("sector".into(), [None::<&str>, None]).into(),
            Series::new("year_bucket".into(), [0i64, 1]).into(),
            Series::new("amount".into(), [5.0, 7.0]).into(),
        ])
        .unwrap();
        match sector_year_shares(&bucketed) {
            Err(CurveError::MissingColumn(column)) => assert_eq!(column, "sector"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn empty_year_is_degenerate() {
        let bucketed = df!(
            "sector" => ["Agua"],
            "year_bucket" => [3i64],
            "amount" => [0.0]
        )
        .unwrap();
        match sector_year_shares(&bucketed) {
            Err(CurveError::DegenerateGroup { group, .. }) => assert_eq!(group, "year_bucket=3"),
            other => panic!("expected DegenerateGroup, got {other:?}"),
        }
    }
}
