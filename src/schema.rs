/// Column-name constants for the disbursement-curve tables.
/// Single source of truth - exported to Python via PyO3.

// ── Disbursement columns ────────────────────────────────────────────────────
pub mod disbursement {
    pub const OPERATION_ID: &str = "operation_id";
    pub const DISBURSEMENT_ID: &str = "disbursement_id";
    pub const EFFECTIVE_DATE: &str = "effective_date";
    pub const AMOUNT: &str = "amount";

    pub const REQUIRED: [&str; 4] = [OPERATION_ID, DISBURSEMENT_ID, EFFECTIVE_DATE, AMOUNT];
}

// ── Operation columns ───────────────────────────────────────────────────────
pub mod operation {
    pub const OPERATION_ID: &str = "operation_id";
    pub const VIGENCY_DATE: &str = "vigency_date";
    pub const SECTOR: &str = "sector";
    pub const FONPLATA_CONTRIBUTION: &str = "fonplata_contribution";

    pub const REQUIRED: [&str; 2] = [OPERATION_ID, VIGENCY_DATE];
    pub const OPTIONAL: [&str; 2] = [SECTOR, FONPLATA_CONTRIBUTION];
}

// ── Elapsed-time bucket columns ─────────────────────────────────────────────
pub mod bucket {
    pub const DAYS_ELAPSED: &str = "days_elapsed";
    pub const YEAR_BUCKET: &str = "year_bucket";
    pub const MONTH_BUCKET: &str = "month_bucket";
}

// ── Derived metric columns ──────────────────────────────────────────────────
pub mod metrics {
    pub const COUNTRY: &str = "country";
    pub const CUMULATIVE_AMOUNT: &str = "cumulative_amount";
    pub const PCT_OF_GROUP_TOTAL: &str = "pct_of_group_total";
    pub const PCT_OF_CUMULATIVE_CAP: &str = "pct_of_cumulative_cap";
}

// ── Country lookup columns ──────────────────────────────────────────────────
pub mod country {
    pub const CODE: &str = "country_code";
    pub const NAME: &str = "country_name";
}

// ── Summary columns ─────────────────────────────────────────────────────────
pub mod summary {
    pub const AMOUNT_SUM: &str = "amount_sum";
    pub const AMOUNT_MEAN: &str = "amount_mean";
    pub const DISBURSEMENT_COUNT: &str = "disbursement_count";
    pub const CUMULATIVE_LAST: &str = "cumulative_last";
    pub const CUMULATIVE_MEAN: &str = "cumulative_mean";
    pub const PCT_CUMULATIVE_LAST: &str = "pct_cumulative_last";
    pub const PCT_CUMULATIVE_MEAN: &str = "pct_cumulative_mean";
    pub const PCT_OF_YEAR_TOTAL: &str = "pct_of_year_total";
}
