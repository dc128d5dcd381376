//! Report configuration.
//!
//! A report is fully described by a [`ReportSpec`]: which columns identify a
//! group, how elapsed days are turned into buckets, and which denominator
//! the percentage metrics use. The report pages of the source workbook map
//! onto the [`ReportKind`] presets; a TOML [`PipelineConfig`] picks one and
//! may override its parts.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{CurveError, Result};
use crate::schema::{disbursement, metrics, operation};

/// Valid log levels for configuration validation.
pub const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Label used for operation ids whose prefix is not in the country table.
pub const DEFAULT_UNKNOWN_COUNTRY: &str = "Unknown";

// ── Bucketing ───────────────────────────────────────────────────────────────

/// How elapsed days are discretized into year and month buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketPolicy {
    /// `round(days / 365)` and `round(days / 12)`, ties away from zero.
    #[serde(rename = "rounded-365")]
    Rounded365,
    /// `trunc(days / 366)` and `trunc(days / 30)`.
    #[serde(rename = "truncated-366")]
    Truncated366,
}

impl BucketPolicy {
    pub fn year_divisor(self) -> i64 {
        match self {
            Self::Rounded365 => 365,
            Self::Truncated366 => 366,
        }
    }

    pub fn month_divisor(self) -> i64 {
        match self {
            Self::Rounded365 => 12,
            Self::Truncated366 => 30,
        }
    }

    /// Bucket a signed day count into `(year_bucket, month_bucket)`.
    pub fn buckets(self, days_elapsed: i64) -> (i64, i64) {
        (
            self.divide(days_elapsed, self.year_divisor()),
            self.divide(days_elapsed, self.month_divisor()),
        )
    }

    fn divide(self, days: i64, divisor: i64) -> i64 {
        match self {
            // f64::round rounds half away from zero
            Self::Rounded365 => (days as f64 / divisor as f64).round() as i64,
            Self::Truncated366 => days / divisor,
        }
    }
}

impl fmt::Display for BucketPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rounded365 => write!(f, "rounded-365"),
            Self::Truncated366 => write!(f, "truncated-366"),
        }
    }
}

// ── Metric mode ─────────────────────────────────────────────────────────────

/// Denominator used for the two percentage columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricMode {
    /// Group total for `pct_of_group_total`, group max cumulative for `pct_of_cumulative_cap`.
    SelfNormalizing,
    /// Both percentages relative to the operation's `fonplata_contribution`.
    ContributionCap,
}

impl fmt::Display for MetricMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfNormalizing => write!(f, "self-normalizing"),
            Self::ContributionCap => write!(f, "contribution-cap"),
        }
    }
}

// ── Group keys ──────────────────────────────────────────────────────────────

/// Deserialized from the column name it groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    OperationId,
    Country,
    Sector,
}

impl GroupKey {
    pub fn column(self) -> &'static str {
        match self {
            Self::OperationId => disbursement::OPERATION_ID,
            Self::Country => metrics::COUNTRY,
            Self::Sector => operation::SECTOR,
        }
    }
}

// ── Report spec ─────────────────────────────────────────────────────────────

/// Validated description of one report variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSpec {
    group_keys: Vec<GroupKey>,
    policy: BucketPolicy,
    mode: MetricMode,
}

impl ReportSpec {
    pub fn new(group_keys: Vec<GroupKey>, policy: BucketPolicy, mode: MetricMode) -> Result<Self> {
        if group_keys.is_empty() {
            return Err(CurveError::Config("group_keys must not be empty".into()));
        }
        for (i, key) in group_keys.iter().enumerate() {
            if group_keys[..i].contains(key) {
                return Err(CurveError::Config(format!(
                    "group key '{}' listed more than once",
                    key.column()
                )));
            }
        }
        if mode == MetricMode::ContributionCap && !group_keys.contains(&GroupKey::OperationId) {
            return Err(CurveError::Config(
                "contribution-cap mode requires operation_id among the group keys".into(),
            ));
        }
        Ok(Self {
            group_keys,
            policy,
            mode,
        })
    }

    pub fn key_columns(&self) -> Vec<&'static str> {
        self.group_keys.iter().map(|k| k.column()).collect()
    }

    pub fn policy(&self) -> BucketPolicy {
        self.policy
    }

    pub fn mode(&self) -> MetricMode {
        self.mode
    }

    pub fn has_key(&self, key: GroupKey) -> bool {
        self.group_keys.contains(&key)
    }

    /// Optional operation columns this report cannot do without.
    pub fn required_operation_columns(&self) -> Vec<&'static str> {
        operation::OPTIONAL
            .into_iter()
            .filter(|column| match *column {
                operation::SECTOR => self.has_key(GroupKey::Sector),
                operation::FONPLATA_CONTRIBUTION => self.mode == MetricMode::ContributionCap,
                _ => false,
            })
            .collect()
    }
}

// ── Report presets ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    /// Per operation, rounded 365-day buckets.
    #[default]
    Operations,
    /// Per operation, relative to the FONPLATA contribution.
    OperationCurve,
    OperationCountry,
    Countries,
    SectorCountry,
}

impl ReportKind {
    pub const ALL: [ReportKind; 5] = [
        Self::Operations,
        Self::OperationCurve,
        Self::OperationCountry,
        Self::Countries,
        Self::SectorCountry,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Operations => "operations",
            Self::OperationCurve => "operation-curve",
            Self::OperationCountry => "operation-country",
            Self::Countries => "countries",
            Self::SectorCountry => "sector-country",
        }
    }

    pub fn group_keys(self) -> Vec<GroupKey> {
        match self {
            Self::Operations | Self::OperationCurve => vec![GroupKey::OperationId],
            Self::OperationCountry => vec![GroupKey::OperationId, GroupKey::Country],
            Self::Countries => vec![GroupKey::Country],
            Self::SectorCountry => vec![GroupKey::Sector, GroupKey::Country],
        }
    }

    pub fn policy(self) -> BucketPolicy {
        match self {
            Self::Operations => BucketPolicy::Rounded365,
            _ => BucketPolicy::Truncated366,
        }
    }

    pub fn mode(self) -> MetricMode {
        match self {
            Self::OperationCurve => MetricMode::ContributionCap,
            _ => MetricMode::SelfNormalizing,
        }
    }

    pub fn spec(self) -> ReportSpec {
        ReportSpec {
            group_keys: self.group_keys(),
            policy: self.policy(),
            mode: self.mode(),
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReportKind {
    type Err = CurveError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.name()).collect();
                CurveError::Config(format!(
                    "Unknown report '{s}'. Must be one of: {}",
                    known.join(", ")
                ))
            })
    }
}

// ── Pipeline config ─────────────────────────────────────────────────────────

/// Source-workbook headers mapped to canonical column names.
pub fn default_header_aliases() -> BTreeMap<String, String> {
    [
        (disbursement::OPERATION_ID, "IDEtapa"),
        (disbursement::DISBURSEMENT_ID, "IDDesembolso"),
        (disbursement::EFFECTIVE_DATE, "FechaEfectiva"),
        (disbursement::AMOUNT, "Monto"),
        (operation::VIGENCY_DATE, "FechaVigencia"),
        (operation::SECTOR, "SECTOR"),
        (operation::FONPLATA_CONTRIBUTION, "AporteFonplata"),
    ]
    .into_iter()
    .map(|(canonical, header)| (canonical.to_string(), header.to_string()))
    .collect()
}

/// Pipeline configuration, usually read from a TOML file.
///
/// ```toml
/// report = "countries"
/// unknown_country_label = "Desconocido"
///
/// [columns]
/// amount = "MontoUSD"
/// ```
///
/// `bucket_policy`, `metric_mode` and `group_keys` override the preset
/// chosen by `report`. Entries under `[columns]` are merged over the
/// default header aliases.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub report: ReportKind,
    pub bucket_policy: Option<BucketPolicy>,
    pub metric_mode: Option<MetricMode>,
    pub group_keys: Option<Vec<GroupKey>>,
    pub unknown_country_label: String,
    pub log_level: String,
    pub columns: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            report: ReportKind::default(),
            bucket_policy: None,
            metric_mode: None,
            group_keys: None,
            unknown_country_label: DEFAULT_UNKNOWN_COUNTRY.to_string(),
            log_level: "info".to_string(),
            columns: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(CurveError::Config(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }
        if self.unknown_country_label.trim().is_empty() {
            return Err(CurveError::Config(
                "unknown_country_label must not be empty".into(),
            ));
        }
        self.report_spec().map(|_| ())
    }

    /// The preset for `report` with any overrides applied.
    pub fn report_spec(&self) -> Result<ReportSpec> {
        ReportSpec::new(
            self.group_keys
                .clone()
                .unwrap_or_else(|| self.report.group_keys()),
            self.bucket_policy.unwrap_or_else(|| self.report.policy()),
            self.metric_mode.unwrap_or_else(|| self.report.mode()),
        )
    }

    /// Canonical column name → source header, defaults overlaid with `[columns]`.
    pub fn header_aliases(&self) -> BTreeMap<String, String> {
        let mut aliases = default_header_aliases();
        aliases.extend(self.columns.clone());
        aliases
    }
}
