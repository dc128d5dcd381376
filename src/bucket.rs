//! Elapsed-time bucketing.
//!
//! Dates arrive as day-first text (`01/02/2023` is the 1st of February).
//! Each linked disbursement gets the signed number of days from its
//! operation's vigency date to its effective date, and that count is
//! discretized into year and month buckets under a [`BucketPolicy`].

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::debug;

use crate::config::BucketPolicy;
use crate::error::{CurveError, Result};
use crate::schema::{bucket, disbursement, operation};

/// Accepted date layouts, day before month. ISO dates are unambiguous and
/// accepted as well.
const DATE_FORMATS: [&str; 4] = ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d"];

/// Two-digit years: 00-68 are 20xx, 69-99 are 19xx.
const SHORT_YEAR_FORMATS: [&str; 3] = ["%d/%m/%y", "%d-%m-%y", "%d.%m.%y"];

const DATETIME_FORMATS: [&str; 5] = [
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// `%Y` takes any digit count, so `21` would otherwise become year 21.
const MIN_FULL_YEAR: i32 = 1000;

fn has_full_year(date: &NaiveDate) -> bool {
    date.year() >= MIN_FULL_YEAR
}

/// Parse a date written day-first. Time-of-day, if present, is dropped.
///
/// Years must have four digits or exactly two; `15/01/21` is 2021-01-15 and
/// `15/01/021` is rejected.
pub fn parse_day_first(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| {
            NaiveDate::parse_from_str(value, fmt)
                .ok()
                .filter(has_full_year)
        })
        .or_else(|| {
            SHORT_YEAR_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        })
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
                .filter(has_full_year)
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buckets {
    pub days_elapsed: i64,
    pub year: i64,
    pub month: i64,
}

/// Bucket one record. Negative spans (effective before vigency) are kept.
pub fn bucket_dates(effective: NaiveDate, vigency: NaiveDate, policy: BucketPolicy) -> Buckets {
    let days_elapsed = (effective - vigency).num_days();
    let (year, month) = policy.buckets(days_elapsed);
    Buckets {
        days_elapsed,
        year,
        month,
    }
}

/// Add `days_elapsed`, `year_bucket` and `month_bucket` to a linked frame.
///
/// `effective_date` and `vigency_date` are replaced by parsed `Date` columns.
/// Any unparseable date fails the whole batch, as does a missing
/// effective date. A missing vigency date (unmatched operation) yields null
/// buckets for that row.
pub fn bucket(linked: DataFrame, policy: BucketPolicy) -> Result<DataFrame> {
    let effective = parse_date_column(&linked, disbursement::EFFECTIVE_DATE, true)?;
    let vigency = parse_date_column(&linked, operation::VIGENCY_DATE, false)?;

    let height = linked.height();
    let mut days = Vec::with_capacity(height);
    let mut years = Vec::with_capacity(height);
    let mut months = Vec::with_capacity(height);

    for (eff, vig) in effective.iter().zip(&vigency) {
        match (eff, vig) {
            (Some(eff), Some(vig)) => {
                let b = bucket_dates(*eff, *vig, policy);
                days.push(Some(b.days_elapsed));
                years.push(Some(b.year));
                months.push(Some(b.month));
            }
            _ => {
                days.push(None);
                years.push(None);
                months.push(None);
            }
        }
    }

    let mut df = linked;
    df.with_column(
        DateChunked::from_naive_date_options(disbursement::EFFECTIVE_DATE.into(), effective)
            .into_series(),
    )?;
    df.with_column(
        DateChunked::from_naive_date_options(operation::VIGENCY_DATE.into(), vigency)
            .into_series(),
    )?;
    df.with_column(Series::new(bucket::DAYS_ELAPSED.into(), days))?;
    df.with_column(Series::new(bucket::YEAR_BUCKET.into(), years))?;
    df.with_column(Series::new(bucket::MONTH_BUCKET.into(), months))?;

    debug!(rows = df.height(), %policy, "bucketed elapsed time");
    Ok(df)
}

fn parse_date_column(df: &DataFrame, column: &str, required: bool) -> Result<Vec<Option<NaiveDate>>> {
    let as_text = df.column(column)?.cast(&DataType::String)?;
    as_text
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value.map(str::trim) {
            Some(text) if !text.is_empty() => {
                parse_day_first(text)
                    .map(Some)
                    .ok_or_else(|| CurveError::DateParse {
                        column: column.to_string(),
                        row,
                        value: text.to_string(),
                    })
            }
            _ if required => Err(CurveError::DateParse {
                column: column.to_string(),
                row,
                value: String::new(),
            }),
            _ => Ok(None),
        })
        .collect()
}
