#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use backfill_core::{
    DateRange, Destination, Fetcher, InsertError, Record, Schema, destination::BoxError,
};
use chrono::{NaiveDate, TimeDelta};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub fn date(y: i32, m: u32, d: u32) -> TestResult<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| "invalid date".into())
}

pub fn range(start: &str, end: &str) -> TestResult<DateRange> {
    Ok(DateRange::parse(start, end)?)
}

/// Scripted insert outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    NoSchema,
    Transient,
}

#[derive(Debug, Default)]
struct Calls {
    script: VecDeque<Outcome>,
    inserts: usize,
    define_attempts: usize,
    reject_schema: bool,
    defined: Vec<Schema>,
    stored: Vec<Record>,
}

/// Destination whose insert results follow a script; once the script runs
/// out every insert succeeds.
#[derive(Debug, Default)]
pub struct ScriptedDestination {
    calls: Mutex<Calls>,
}

impl ScriptedDestination {
    pub fn new(script: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            calls: Mutex::new(Calls {
                script: script.into_iter().collect(),
                ..Calls::default()
            }),
        }
    }

    pub fn failing(outcome: Outcome, times: usize) -> Self {
        Self::new(std::iter::repeat_n(outcome, times))
    }

    /// Every `define_schema` call fails.
    pub fn rejecting_schema(self) -> Self {
        if let Ok(mut calls) = self.calls.lock() {
            calls.reject_schema = true;
        }
        self
    }

    pub fn define_attempts(&self) -> usize {
        self.calls
            .lock()
            .map(|c| c.define_attempts)
            .unwrap_or_default()
    }

    pub fn inserts(&self) -> usize {
        self.calls.lock().map(|c| c.inserts).unwrap_or_default()
    }

    pub fn defined(&self) -> Vec<Schema> {
        self.calls
            .lock()
            .map(|c| c.defined.clone())
            .unwrap_or_default()
    }

    pub fn stored(&self) -> Vec<Record> {
        self.calls
            .lock()
            .map(|c| c.stored.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Destination for ScriptedDestination {
    async fn insert(&self, rows: &[Record]) -> Result<(), InsertError> {
        let mut calls = self.calls.lock().map_err(|_| InsertError::transient("poisoned"))?;
        calls.inserts += 1;
        match calls.script.pop_front().unwrap_or(Outcome::Ok) {
            Outcome::Ok => {
                calls.stored.extend_from_slice(rows);
                Ok(())
            }
            Outcome::NoSchema => Err(InsertError::SchemaMissing {
                message: "table has no schema".to_string(),
            }),
            Outcome::Transient => Err(InsertError::transient("quota exceeded")),
        }
    }

    async fn define_schema(&self, schema: &Schema) -> Result<(), BoxError> {
        let mut calls = self.calls.lock().map_err(|_| "poisoned")?;
        calls.define_attempts += 1;
        if calls.reject_schema {
            return Err("permission denied".into());
        }
        calls.defined.push(schema.clone());
        Ok(())
    }
}

/// Fetcher producing one daily bar per day of the window.
///
/// Days listed in `empty` yield no bars; a window touching a day listed in
/// `broken` fails.
#[derive(Debug, Default)]
pub struct DailyBars {
    empty: HashSet<NaiveDate>,
    broken: HashSet<NaiveDate>,
    windows: Mutex<Vec<DateRange>>,
}

impl DailyBars {
    pub fn broken_on(days: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            broken: days.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn empty_on(days: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            empty: days.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn windows(&self) -> Vec<DateRange> {
        self.windows
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Fetcher for DailyBars {
    async fn fetch(&self, window: &DateRange) -> Result<Vec<Record>, BoxError> {
        self.windows.lock().map_err(|_| "poisoned")?.push(*window);

        let mut bars = Vec::new();
        let mut day = window.start().date();
        while day <= window.end().date() {
            if self.broken.contains(&day) {
                return Err(format!("upstream error on {day}").into());
            }
            if !self.empty.contains(&day) {
                bars.push(
                    Record::new()
                        .with("date", format!("{day} 00:00:00"))
                        .with("close", 100.0),
                );
            }
            day += TimeDelta::days(1);
        }
        Ok(bars)
    }
}
