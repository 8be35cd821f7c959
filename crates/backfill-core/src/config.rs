//! Structured, validated scraper configuration.
//!
//! Configuration arrives as a document of the form
//!
//! ```json
//! {
//!   "defaults": { "scrapers": { "tz": "America/New_York", "endDate": "yesterday" } },
//!   "scrapers": [
//!     {
//!       "name": "nvda-1min",
//!       "type": "FMP",
//!       "url": "https://example.test/api/v3/historical-chart/1min/NVDA?apikey=KEY",
//!       "startDate": "2024-01-01",
//!       "destination": { "bigQuery": { "project": "p", "dataset": "market", "table": "nvda_1min" } }
//!     }
//!   ]
//! }
//! ```
//!
//! Loading the file, templating and environment substitution happen before
//! this module sees the document; any format that deserializes into a
//! `serde_json::Value` works. Keys under `defaults.scrapers` fill in keys a
//! scraper leaves unset. Every scraper is then deserialized into a typed
//! [`ScraperConfig`] and validated; problems are reported as [`ConfigError`]s.

use std::{collections::HashSet, fmt, str::FromStr, time::Duration};

use chrono::{Local, NaiveDate, TimeDelta};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    backfill::DEFAULT_CHUNK_DAYS,
    date_range::{DateRange, DateRangeError, GapPolicy, parse_date},
    writer::{DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS, RetryPolicy},
};

/// Errors raised while reading or validating configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// The document does not have the expected top-level layout.
    #[snafu(display("Malformed configuration: {details}"))]
    Malformed {
        /// What was wrong.
        details: String,
    },

    /// A scraper entry could not be deserialized (missing or mistyped keys).
    #[snafu(display("Invalid scraper entry #{index}: {source}"))]
    Parse {
        /// Position of the entry in `scrapers`.
        index: usize,
        /// Underlying deserialization error.
        source: serde_json::Error,
    },

    /// A required string is empty.
    #[snafu(display("Scraper '{scraper}': `{field}` must not be empty"))]
    EmptyField {
        /// Scraper name (may itself be empty).
        scraper: String,
        /// Offending key.
        field: &'static str,
    },

    /// `tz` is not an IANA timezone name.
    #[snafu(display("Scraper '{scraper}': unknown timezone '{tz}'"))]
    InvalidTimezone {
        /// Scraper name.
        scraper: String,
        /// Rejected timezone.
        tz: String,
    },

    /// The configured start/end dates do not form a valid range.
    #[snafu(display("Scraper '{scraper}': invalid date range: {source}"))]
    InvalidDates {
        /// Scraper name.
        scraper: String,
        /// Underlying range error.
        source: DateRangeError,
    },

    /// `chunkDays` must be positive.
    #[snafu(display("Scraper '{scraper}': chunkDays must be positive (got {chunk_days})"))]
    InvalidChunkDays {
        /// Scraper name.
        scraper: String,
        /// Rejected value.
        chunk_days: i64,
    },

    /// `retry.maxAttempts` must be at least 1.
    #[snafu(display("Scraper '{scraper}': retry.maxAttempts must be at least 1"))]
    InvalidRetry {
        /// Scraper name.
        scraper: String,
    },

    /// `coverageGapSecs` must be positive and fit a `TimeDelta`.
    #[snafu(display("Scraper '{scraper}': coverageGapSecs out of range (got {secs})"))]
    InvalidCoverageGap {
        /// Scraper name.
        scraper: String,
        /// Rejected value.
        secs: i64,
    },

    /// Two scrapers share a name.
    #[snafu(display("Duplicate scraper name '{scraper}'"))]
    DuplicateName {
        /// Repeated name.
        scraper: String,
    },
}

/// Source API flavour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScraperKind {
    /// financialmodelingprep.com style endpoints (`&from=..&to=..`).
    #[serde(rename = "FMP")]
    Fmp,
}

/// End of the desired range: a fixed date or "yesterday" at evaluation time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub enum EndDate {
    /// Today minus one day, evaluated when the range is resolved.
    Yesterday,
    /// A fixed calendar date.
    Date(NaiveDate),
}

impl EndDate {
    /// Resolve against `today`.
    pub fn resolve(self, today: NaiveDate) -> NaiveDate {
        match self {
            EndDate::Yesterday => today.pred_opt().unwrap_or(today),
            EndDate::Date(d) => d,
        }
    }
}

impl FromStr for EndDate {
    type Err = DateRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "yesterday" {
            Ok(EndDate::Yesterday)
        } else {
            parse_date(s).map(EndDate::Date)
        }
    }
}

impl TryFrom<String> for EndDate {
    type Error = DateRangeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EndDate> for String {
    fn from(v: EndDate) -> Self {
        v.to_string()
    }
}

impl fmt::Display for EndDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndDate::Yesterday => f.write_str("yesterday"),
            EndDate::Date(d) => write!(f, "{d}"),
        }
    }
}

/// Fully qualified warehouse table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BigQueryTarget {
    /// Project id.
    pub project: String,
    /// Dataset id.
    pub dataset: String,
    /// Table id.
    pub table: String,
}

impl BigQueryTarget {
    /// `project.dataset.table`.
    pub fn table_path(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// Where fetched records are loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationConfig {
    /// BigQuery-style target.
    pub big_query: BigQueryTarget,
}

/// Writer retry settings as configured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Counted insert attempts.
    pub max_attempts: u32,
    /// Seconds between counted attempts.
    pub backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_secs: DEFAULT_BACKOFF.as_secs(),
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(c: RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: c.max_attempts,
            backoff: Duration::from_secs(c.backoff_secs),
        }
    }
}

fn default_tz() -> String {
    "UTC".to_string()
}

fn default_time_column() -> String {
    "date".to_string()
}

fn default_chunk_days() -> i64 {
    DEFAULT_CHUNK_DAYS
}

fn default_coverage_gap_secs() -> i64 {
    24 * 60 * 60
}

/// One scraper: a source endpoint, a desired range and a destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScraperConfig {
    /// Unique scraper name.
    pub name: String,
    /// Source API flavour.
    #[serde(rename = "type")]
    pub kind: ScraperKind,
    /// Base request URL; range parameters are appended.
    pub url: String,
    /// IANA timezone of datetime strings returned by the source.
    #[serde(default = "default_tz")]
    pub tz: String,
    /// First date to backfill (`YYYY-MM-DD`).
    pub start_date: String,
    /// Last date to backfill.
    pub end_date: EndDate,
    /// Load target.
    pub destination: DestinationConfig,
    /// Timestamp column used for coverage.
    #[serde(default = "default_time_column")]
    pub time_column: String,
    /// Maximum days per fetch request.
    #[serde(default = "default_chunk_days")]
    pub chunk_days: i64,
    /// Whether holes between stored runs are refetched.
    #[serde(default)]
    pub gap_policy: GapPolicy,
    /// Writer retry settings.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Largest gap between stored timestamps of one coverage run.
    #[serde(default = "default_coverage_gap_secs")]
    pub coverage_gap_secs: i64,
}

impl ScraperConfig {
    /// Parsed source timezone.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        Tz::from_str(self.tz.trim()).map_err(|_| {
            InvalidTimezoneSnafu {
                scraper: &self.name,
                tz: &self.tz,
            }
            .build()
        })
    }

    /// Desired range with `yesterday` resolved against `today`.
    pub fn desired_range(&self, today: NaiveDate) -> Result<DateRange, ConfigError> {
        let start = parse_date(&self.start_date).context(InvalidDatesSnafu {
            scraper: &self.name,
        })?;
        DateRange::from_dates(start, self.end_date.resolve(today)).context(InvalidDatesSnafu {
            scraper: &self.name,
        })
    }

    /// Desired range with `yesterday` resolved against the local clock.
    pub fn desired_range_now(&self) -> Result<DateRange, ConfigError> {
        self.desired_range(Local::now().date_naive())
    }

    /// Writer retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.into()
    }

    /// Coverage run gap.
    pub fn run_gap(&self) -> Result<TimeDelta, ConfigError> {
        TimeDelta::try_seconds(self.coverage_gap_secs)
            .filter(|gap| *gap > TimeDelta::zero())
            .context(InvalidCoverageGapSnafu {
                scraper: &self.name,
                secs: self.coverage_gap_secs,
            })
    }

    /// Request URL for one fetch window.
    pub fn request_url(&self, range: &DateRange) -> String {
        match self.kind {
            ScraperKind::Fmp => format!(
                "{}&from={}&to={}",
                self.url,
                range.start().date(),
                range.end().date()
            ),
        }
    }

    /// Check every field, resolving `yesterday` against `today`.
    pub fn validate_at(&self, today: NaiveDate) -> Result<(), ConfigError> {
        let scraper = self.name.as_str();
        let required = [
            ("name", &self.name),
            ("url", &self.url),
            ("timeColumn", &self.time_column),
            ("destination.bigQuery.project", &self.destination.big_query.project),
            ("destination.bigQuery.dataset", &self.destination.big_query.dataset),
            ("destination.bigQuery.table", &self.destination.big_query.table),
        ];
        for (field, value) in required {
            ensure!(!value.trim().is_empty(), EmptyFieldSnafu { scraper, field });
        }

        self.timezone()?;
        self.desired_range(today)?;

        ensure!(
            self.chunk_days > 0,
            InvalidChunkDaysSnafu {
                scraper,
                chunk_days: self.chunk_days,
            }
        );
        ensure!(self.retry.max_attempts >= 1, InvalidRetrySnafu { scraper });
        self.run_gap()?;
        Ok(())
    }
}

/// All scrapers of one configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillConfig {
    /// Scrapers in document order.
    pub scrapers: Vec<ScraperConfig>,
}

impl BackfillConfig {
    /// Merge defaults into each scraper entry and deserialize it.
    pub fn from_value(document: serde_json::Value) -> Result<Self, ConfigError> {
        let serde_json::Value::Object(mut root) = document else {
            return MalformedSnafu {
                details: "top level must be a mapping",
            }
            .fail();
        };

        let defaults = match root.remove("defaults") {
            None | Some(serde_json::Value::Null) => serde_json::Map::new(),
            Some(serde_json::Value::Object(mut d)) => match d.remove("scrapers") {
                None | Some(serde_json::Value::Null) => serde_json::Map::new(),
                Some(serde_json::Value::Object(s)) => s,
                Some(_) => {
                    return MalformedSnafu {
                        details: "`defaults.scrapers` must be a mapping",
                    }
                    .fail();
                }
            },
            Some(_) => {
                return MalformedSnafu {
                    details: "`defaults` must be a mapping",
                }
                .fail();
            }
        };

        let entries = match root.remove("scrapers") {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(entries)) => entries,
            Some(_) => {
                return MalformedSnafu {
                    details: "`scrapers` must be a list",
                }
                .fail();
            }
        };

        let scrapers = entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let serde_json::Value::Object(mut entry) = entry else {
                    return MalformedSnafu {
                        details: format!("scraper entry #{index} must be a mapping"),
                    }
                    .fail();
                };
                for (key, value) in &defaults {
                    entry.entry(key.clone()).or_insert_with(|| value.clone());
                }
                serde_json::from_value(serde_json::Value::Object(entry))
                    .context(ParseSnafu { index })
            })
            .collect::<Result<Vec<ScraperConfig>, _>>()?;

        Ok(Self { scrapers })
    }

    /// Validate every scraper and reject duplicate names.
    pub fn validate_at(&self, today: NaiveDate) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for scraper in &self.scrapers {
            scraper.validate_at(today)?;
            ensure!(
                seen.insert(scraper.name.as_str()),
                DuplicateNameSnafu {
                    scraper: &scraper.name,
                }
            );
        }
        Ok(())
    }

    /// [`BackfillConfig::validate_at`] against the local clock.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_at(Local::now().date_naive())
    }

    /// Look up a scraper by name.
    pub fn scraper(&self, name: &str) -> Option<&ScraperConfig> {
        self.scrapers.iter().find(|s| s.name == name)
    }
}
