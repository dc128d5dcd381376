use polars::prelude::*;
use tracing::debug;

use crate::config::{GroupKey, MetricMode, ReportSpec};
use crate::error::Result;
use crate::loader::require_columns;
use crate::schema::{bucket, disbursement, metrics, operation};

/// Sort options shared by every stage that fixes output order.
pub(crate) fn stable_order() -> SortMultipleOptions {
    SortMultipleOptions::default()
        .with_nulls_last(true)
        .with_maintain_order(true)
}

/// Columns carried next to the group keys.
///
/// They are functions of the keys (country and contribution of an operation),
/// so grouping on them never splits a group.
pub fn dependent_columns(spec: &ReportSpec) -> Vec<&'static str> {
    let mut carried = Vec::new();
    if spec.has_key(GroupKey::OperationId) && !spec.has_key(GroupKey::Country) {
        carried.push(metrics::COUNTRY);
    }
    if spec.mode() == MetricMode::ContributionCap {
        carried.push(operation::FONPLATA_CONTRIBUTION);
    }
    carried
}

/// Full grouping tuple: keys, dependent columns, year, month, disbursement id.
pub fn grouping_columns(spec: &ReportSpec) -> Vec<&'static str> {
    let mut columns = spec.key_columns();
    columns.extend(dependent_columns(spec));
    columns.extend([
        bucket::YEAR_BUCKET,
        bucket::MONTH_BUCKET,
        disbursement::DISBURSEMENT_ID,
    ]);
    columns
}

/// Sum `amount` per distinct grouping tuple.
///
/// One output row per combination present in the input; missing buckets are
/// not filled. Rows come out sorted by the grouping tuple, nulls last.
pub fn aggregate(bucketed: &DataFrame, spec: &ReportSpec) -> Result<DataFrame> {
    let grouping = grouping_columns(spec);
    require_columns(bucketed, &grouping)?;
    require_columns(bucketed, &[disbursement::AMOUNT])?;

    let by: Vec<Expr> = grouping.iter().map(|c| col(*c)).collect();
    let grouped = bucketed
        .clone()
        .lazy()
        .group_by(by)
        .agg([col(disbursement::AMOUNT).sum()])
        .sort(grouping, stable_order())
        .collect()?;

    debug!(
        input_rows = bucketed.height(),
        groups = grouped.height(),
        "aggregated disbursements"
    );
    Ok(grouped)
}
