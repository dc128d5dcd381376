use polars::prelude::*;
use tracing::{debug, warn};

use crate::error::{CurveError, Result};
use crate::loader::require_columns;
use crate::schema::{disbursement, operation};

const ROW_INDEX: &str = "__row_index";
const MATCH_COUNT: &str = "__match_count";

/// Left-join `right` onto `left`, keeping the left frame's row order.
pub(crate) fn ordered_left_join(
    left: LazyFrame,
    right: LazyFrame,
    left_on: &str,
    right_on: &str,
) -> Result<DataFrame> {
    let joined = left
        .with_row_index(ROW_INDEX, None)
        .join(
            right,
            [col(left_on)],
            [col(right_on)],
            JoinArgs::new(JoinType::Left),
        )
        .sort([ROW_INDEX], SortMultipleOptions::default())
        .collect()?;
    Ok(joined.drop(ROW_INDEX)?)
}

/// Attach each disbursement's operation fields.
///
/// Output columns: operation_id, disbursement_id, effective_date, amount,
/// vigency_date, sector, fonplata_contribution. Every disbursement appears
/// exactly once, in input order; unmatched ones carry nulls in the joined
/// fields. `sector` and `fonplata_contribution` are null throughout when the
/// operations table lacks them.
pub fn link(disbursements: &DataFrame, operations: &DataFrame) -> Result<DataFrame> {
    require_columns(disbursements, &disbursement::REQUIRED)?;
    require_columns(operations, &operation::REQUIRED)?;
    check_unique_operations(operations)?;

    let left = disbursements.clone().lazy().select([
        col(disbursement::OPERATION_ID),
        col(disbursement::DISBURSEMENT_ID),
        col(disbursement::EFFECTIVE_DATE),
        col(disbursement::AMOUNT).cast(DataType::Float64),
    ]);

    let schema = operations.schema();
    let sector = if schema.contains(operation::SECTOR) {
        col(operation::SECTOR).cast(DataType::String)
    } else {
        lit(NULL).cast(DataType::String).alias(operation::SECTOR)
    };
    let contribution = if schema.contains(operation::FONPLATA_CONTRIBUTION) {
        col(operation::FONPLATA_CONTRIBUTION).cast(DataType::Float64)
    } else {
        lit(NULL)
            .cast(DataType::Float64)
            .alias(operation::FONPLATA_CONTRIBUTION)
    };
    let right = operations.clone().lazy().select([
        col(operation::OPERATION_ID),
        col(operation::VIGENCY_DATE).cast(DataType::String),
        sector,
        contribution,
    ]);

    let linked = ordered_left_join(left, right, disbursement::OPERATION_ID, operation::OPERATION_ID)?;

    let unmatched = linked.column(operation::VIGENCY_DATE)?.null_count();
    if unmatched > 0 {
        warn!(unmatched, "disbursements without an operation vigency date");
    }
    debug!(rows = linked.height(), "linked disbursements to operations");
    Ok(linked)
}

/// Fail when an operation_id occurs more than once in the operations table.
fn check_unique_operations(operations: &DataFrame) -> Result<()> {
    let dupes = operations
        .clone()
        .lazy()
        .filter(col(operation::OPERATION_ID).is_not_null())
        .group_by([col(operation::OPERATION_ID)])
        .agg([len().alias(MATCH_COUNT)])
        .filter(col(MATCH_COUNT).gt(lit(1)))
        .sort([operation::OPERATION_ID], SortMultipleOptions::default())
        .collect()?;

    if dupes.height() == 0 {
        return Ok(());
    }

    let operation_id = dupes
        .column(operation::OPERATION_ID)?
        .str()?
        .get(0)
        .unwrap_or_default()
        .to_string();
    let counts = dupes.column(MATCH_COUNT)?.cast(&DataType::UInt32)?;
    let count = counts.as_materialized_series().u32()?.get(0).unwrap_or(0);
    Err(CurveError::DuplicateKey {
        operation_id,
        count,
    })
}
