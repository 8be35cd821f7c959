#![allow(missing_docs)]

mod common;

use std::time::Duration;

use backfill_core::{BulkWriter, FieldType, Record, RetryPolicy, Value, WriteError};
use chrono_tz::Tz;
use common::{Outcome, ScriptedDestination, TestResult, date};

fn bar(ts: &str, close: f64) -> Record {
    Record::new().with("date", ts).with("close", close)
}

#[tokio::test]
async fn empty_batch_never_reaches_destination() {
    let writer = BulkWriter::new(ScriptedDestination::default());

    let err = writer.write(Vec::new(), Tz::UTC).await.unwrap_err();

    assert!(matches!(err, WriteError::EmptyBatch));
    assert_eq!(writer.destination().inserts(), 0);
    assert!(writer.destination().defined().is_empty());
}

#[tokio::test]
async fn schema_is_defined_once_for_a_fresh_table() -> TestResult {
    let writer = BulkWriter::new(ScriptedDestination::new([Outcome::NoSchema]));

    let report = writer
        .write(
            vec![
                bar("2024-06-03 09:30:00", 10.0),
                bar("2024-06-03 09:31:00", 11.0),
            ],
            Tz::UTC,
        )
        .await?;

    assert_eq!(report.rows, 2);
    assert_eq!(report.inserts, 2);
    assert!(report.schema_defined);
    assert_eq!(report.normalized_fields, 2);

    let defined = writer.destination().defined();
    assert_eq!(defined.len(), 1);
    let date_field = defined[0].field("date").ok_or("date column not inferred")?;
    assert_eq!(date_field.field_type, FieldType::DateTime);
    let close_field = defined[0].field("close").ok_or("close column not inferred")?;
    assert_eq!(close_field.field_type, FieldType::Float);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn repeated_schema_report_is_retried_not_redefined() -> TestResult {
    let writer = BulkWriter::new(ScriptedDestination::new([Outcome::NoSchema; 2]));

    let report = writer
        .write(vec![bar("2024-06-03 09:30:00", 10.0)], Tz::UTC)
        .await?;

    assert_eq!(report.inserts, 3);
    assert_eq!(writer.destination().inserts(), 3);
    assert_eq!(writer.destination().defined().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() -> TestResult {
    let writer = BulkWriter::new(ScriptedDestination::failing(Outcome::Transient, 3));

    let started = tokio::time::Instant::now();
    let report = writer
        .write(vec![bar("2024-06-03 09:30:00", 10.0)], Tz::UTC)
        .await?;

    assert_eq!(report.inserts, 4);
    assert!(!report.schema_defined);
    assert!(started.elapsed() >= Duration::from_secs(3 * 60));
    assert_eq!(writer.destination().stored().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_ten_failed_attempts() {
    let writer = BulkWriter::new(ScriptedDestination::failing(Outcome::Transient, 50));

    let err = writer
        .write(vec![bar("2024-06-03 09:30:00", 10.0)], Tz::UTC)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WriteError::RetriesExhausted { attempts: 10, .. }
    ));
    assert_eq!(writer.destination().inserts(), 10);
    assert!(writer.destination().stored().is_empty());
}

#[tokio::test(start_paused = true)]
async fn correction_does_not_consume_an_attempt() {
    let script = std::iter::once(Outcome::NoSchema)
        .chain(std::iter::repeat_n(Outcome::Transient, 20));
    let writer = BulkWriter::new(ScriptedDestination::new(script));

    let err = writer
        .write(vec![bar("2024-06-03 09:30:00", 10.0)], Tz::UTC)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WriteError::RetriesExhausted { attempts: 10, .. }
    ));
    assert_eq!(writer.destination().inserts(), 11);
    assert_eq!(writer.destination().defined().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_schema_definition_ends_the_write() {
    let writer = BulkWriter::new(
        ScriptedDestination::failing(Outcome::NoSchema, 50).rejecting_schema(),
    );

    let started = tokio::time::Instant::now();
    let err = writer
        .write(vec![bar("2024-06-03 09:30:00", 10.0)], Tz::UTC)
        .await
        .unwrap_err();

    match &err {
        WriteError::DefineSchema { source } => {
            assert_eq!(source.to_string(), "permission denied");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(writer.destination().inserts(), 1);
    assert_eq!(writer.destination().define_attempts(), 1);
    assert!(writer.destination().defined().is_empty());
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn custom_policy_limits_attempts() {
    let policy = RetryPolicy {
        max_attempts: 2,
        backoff: Duration::from_secs(1),
    };
    let writer = BulkWriter::new(ScriptedDestination::failing(Outcome::Transient, 5))
        .with_policy(policy);

    let err = writer
        .write(vec![bar("2024-06-03 09:30:00", 10.0)], Tz::UTC)
        .await
        .unwrap_err();

    assert!(matches!(err, WriteError::RetriesExhausted { attempts: 2, .. }));
    assert_eq!(writer.destination().inserts(), 2);
}

#[tokio::test]
async fn wall_clock_survives_normalization() -> TestResult {
    let writer = BulkWriter::new(ScriptedDestination::default());

    writer
        .write(
            vec![bar("2024-06-01 14:30:00", 10.0)],
            Tz::America__New_York,
        )
        .await?;

    let stored = writer.destination().stored();
    let expected = date(2024, 6, 1)?
        .and_hms_opt(14, 30, 0)
        .ok_or("invalid time")?;
    assert_eq!(stored[0].get("date"), Some(&Value::DateTime(expected)));
    assert_eq!(stored[0].get("close"), Some(&Value::Float(10.0)));
    Ok(())
}
