//! Country classification by operation-id prefix.

use polars::prelude::*;

use crate::error::Result;
use crate::linker::ordered_left_join;
use crate::schema::{country, metrics};

/// Two-letter operation prefixes and the country they belong to.
pub const COUNTRY_CODES: [(&str, &str); 5] = [
    ("AR", "Argentina"),
    ("BO", "Bolivia"),
    ("BR", "Brasil"),
    ("PY", "Paraguay"),
    ("UR", "Uruguay"),
];

/// The country table as a two-column lookup frame.
pub fn lookup_frame() -> Result<DataFrame> {
    let codes: Vec<&str> = COUNTRY_CODES.iter().map(|(code, _)| *code).collect();
    let names: Vec<&str> = COUNTRY_CODES.iter().map(|(_, name)| *name).collect();
    Ok(DataFrame::new(vec![
        Series::new(country::CODE.into(), codes).into(),
        Series::new(country::NAME.into(), names).into(),
    ])?)
}

/// Add a `country` column derived from the first two characters of `source_column`.
///
/// Unlisted or null prefixes get `unknown_label`. Row order is preserved.
pub fn enrich(df: DataFrame, source_column: &str, unknown_label: &str) -> Result<DataFrame> {
    let with_code = df
        .lazy()
        .with_columns([col(source_column)
            .str()
            .slice(lit(0), lit(2))
            .alias(country::CODE)]);

    let joined = ordered_left_join(with_code, lookup_frame()?.lazy(), country::CODE, country::CODE)?
        .lazy()
        .with_columns([col(country::NAME)
            .fill_null(lit(unknown_label))
            .alias(metrics::COUNTRY)])
        .collect()?;

    Ok(joined.drop(country::CODE)?.drop(country::NAME)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrich_fills_unknown_and_keeps_order() {
        let df = DataFrame::new(vec![Series::new(
            "operation_id".into(),
            [Some("PY07"), Some("XX01"), None, Some("BO02"), Some("A"), Some("UR-12")],
        )
        .into()])
        .unwrap();

        let out = enrich(df, "operation_id", "Desconocido").unwrap();
        let countries: Vec<Option<&str>> = out
            .column(metrics::COUNTRY)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(
            countries,
            vec![
                Some("Paraguay"),
                Some("Desconocido"),
                Some("Desconocido"),
                Some("Bolivia"),
                Some("Desconocido"),
                Some("Uruguay")
            ]
        );
        assert_eq!(out.width(), 2);
    }
}
