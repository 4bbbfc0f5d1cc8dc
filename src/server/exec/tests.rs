use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{NaiveDate, TimeZone, Utc};

use super::*;
use crate::error::ParseError;
use crate::server::query::Intent;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn rec(key: &str, size: u64, (y, m, d, h, min): (i32, u32, u32, u32, u32), uploader: &str) -> FileRecord {
    let ts = Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap();
    FileRecord::new(key, size, ts, Some(uploader))
}

// Wednesday; the week started on Monday 2024-05-13.
fn today() -> NaiveDate {
    day(2024, 5, 15)
}

fn fixture() -> Vec<FileRecord> {
    vec![
        rec("a.pdf", 500, (2024, 5, 15, 12, 0), "alice"),
        rec("b.pdf", 700, (2024, 5, 13, 0, 0), "Bob"),
        rec("c.png", 700, (2024, 5, 12, 23, 59), "alice"),
        rec("d.txt", 100, (2024, 4, 30, 8, 0), "carol"),
        rec("e.PDF", 900, (2024, 5, 1, 9, 30), "alice"),
        rec("f.pdf", 50, (2024, 5, 20, 10, 0), "bob"),
    ]
}

fn run(plan: QueryPlan) -> ResultValue {
    execute(&plan, &fixture(), today()).value
}

fn keys(v: &ResultValue) -> Vec<&str> {
    v.ranked().iter().map(|f| f.key.as_str()).collect()
}

struct VecSource {
    records: Vec<FileRecord>,
    calls: AtomicUsize,
}

impl VecSource {
    fn new(records: Vec<FileRecord>) -> Self {
        Self { records, calls: AtomicUsize::new(0) }
    }
}

impl SnapshotSource for VecSource {
    fn snapshot(&self) -> anyhow::Result<Vec<FileRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }
}

struct FailingSource;

impl SnapshotSource for FailingSource {
    fn snapshot(&self) -> anyhow::Result<Vec<FileRecord>> {
        Err(anyhow::anyhow!("object listing timed out"))
    }
}

#[test]
fn week_starts_on_monday() {
    assert_eq!(week_start(day(2024, 5, 15)), day(2024, 5, 13));
    assert_eq!(week_start(day(2024, 5, 13)), day(2024, 5, 13));
    assert_eq!(week_start(day(2024, 5, 19)), day(2024, 5, 13));
    // crosses a year boundary
    assert_eq!(week_start(day(2025, 1, 1)), day(2024, 12, 30));
}

#[test]
fn date_window_counts() {
    assert_eq!(run(QueryPlan::UploadedToday), ResultValue::Count(1));
    assert_eq!(run(QueryPlan::UploadedLastNDays { days: 3 }), ResultValue::Count(3));
    assert_eq!(run(QueryPlan::UploadedLastNDays { days: 0 }), ResultValue::Count(1));
    // future-dated f.pdf is outside the week window
    assert_eq!(run(QueryPlan::UploadedThisWeek), ResultValue::Count(2));
    assert_eq!(run(QueryPlan::UploadedThisMonth), ResultValue::Count(5));
}

#[test]
fn last_n_days_spans_year_boundary() {
    let recs = vec![
        rec("old.txt", 1, (2023, 12, 27, 0, 0), "x"),
        rec("edge.txt", 1, (2023, 12, 28, 0, 0), "x"),
        rec("new.txt", 1, (2024, 1, 2, 0, 0), "x"),
    ];
    let r = execute(&QueryPlan::UploadedLastNDays { days: 5 }, &recs, day(2024, 1, 2));
    assert_eq!(r.value, ResultValue::Count(2));
}

#[test]
fn huge_day_window_does_not_overflow() {
    let r = execute(&QueryPlan::UploadedLastNDays { days: u32::MAX }, &fixture(), today());
    assert_eq!(r.value, ResultValue::Count(5));
}

#[test]
fn extension_match_is_case_sensitive_suffix() {
    assert_eq!(run(QueryPlan::UploadedThisMonthByExt { ext: "pdf".into() }), ResultValue::Count(3));
    assert_eq!(run(QueryPlan::UploadedThisMonthByExt { ext: "PDF".into() }), ResultValue::Count(1));
    // "df" is a suffix of the key but not the extension
    assert_eq!(run(QueryPlan::UploadedThisMonthByExt { ext: "df".into() }), ResultValue::Count(0));
}

#[test]
fn larger_than_is_strict() {
    assert_eq!(run(QueryPlan::LargerThan { literal: "600".into(), bytes: 600 }), ResultValue::Count(3));
    assert_eq!(run(QueryPlan::LargerThan { literal: "700".into(), bytes: 700 }), ResultValue::Count(1));
}

#[test]
fn top_n_ties_keep_snapshot_order() {
    let recs = vec![
        rec("A", 500, (2024, 5, 15, 0, 0), "u"),
        rec("B", 700, (2024, 5, 15, 0, 0), "u"),
        rec("C", 700, (2024, 5, 15, 0, 0), "u"),
        rec("D", 100, (2024, 5, 15, 0, 0), "u"),
    ];
    let r = execute(&QueryPlan::TopNBySize { n: 2 }, &recs, today());
    assert_eq!(keys(&r.value), vec!["B", "C"]);
}

#[test]
fn top_n_variants() {
    assert_eq!(keys(&run(QueryPlan::TopNBySize { n: 2 })), vec!["e.PDF", "b.pdf"]);
    assert_eq!(keys(&run(QueryPlan::TopNByExt { n: 2, ext: "pdf".into() })), vec!["b.pdf", "a.pdf"]);
    assert_eq!(run(QueryPlan::TopNBySize { n: 100 }).ranked().len(), 6);
    assert!(run(QueryPlan::TopNBySize { n: 0 }).ranked().is_empty());
}

#[test]
fn uploader_matching_ignores_case() {
    assert_eq!(run(QueryPlan::CountByUploader { user: "BOB".into() }), ResultValue::Count(2));
    assert_eq!(run(QueryPlan::CountByUploader { user: "alice".into() }), ResultValue::Count(3));
    assert_eq!(run(QueryPlan::CountByUploader { user: "nobody".into() }), ResultValue::Count(0));
    // c.png was uploaded on the Sunday before this week
    assert_eq!(keys(&run(QueryPlan::TopNByUploaderThisWeek { n: 5, user: "alice".into() })), vec!["a.pdf"]);
}

#[test]
fn total_storage_sums_all_sizes() {
    assert_eq!(run(QueryPlan::TotalStorage), ResultValue::Bytes(2950));
}

#[test]
fn empty_snapshot_yields_zeroes() {
    let plans = [
        QueryPlan::UploadedToday,
        QueryPlan::UploadedLastNDays { days: 7 },
        QueryPlan::UploadedThisWeek,
        QueryPlan::UploadedThisMonth,
        QueryPlan::UploadedThisMonthByExt { ext: "pdf".into() },
        QueryPlan::LargerThan { literal: "0".into(), bytes: 0 },
        QueryPlan::TopNBySize { n: 3 },
        QueryPlan::TopNByExt { n: 3, ext: "pdf".into() },
        QueryPlan::CountByUploader { user: "a".into() },
        QueryPlan::TopNByUploaderThisWeek { n: 3, user: "a".into() },
        QueryPlan::TotalStorage,
    ];
    let covered: std::collections::HashSet<Intent> = plans.iter().map(|p| p.intent()).collect();
    assert_eq!(covered.len(), crate::server::query::rules().len(), "every intent is exercised");
    for p in plans {
        let value = execute(&p, &[], today()).value;
        let expected = match p.intent() {
            Intent::TopNBySize | Intent::TopNByExt | Intent::TopNByUploaderThisWeek => ResultValue::Ranked(vec![]),
            Intent::TotalStorage => ResultValue::Bytes(0),
            _ => ResultValue::Count(0),
        };
        assert_eq!(value, expected, "plan {:?}", p);
    }
}

#[test]
fn format_sentences() {
    let fmt = |plan: QueryPlan, value: ResultValue| format_answer(&QueryResult { plan, value });
    assert_eq!(fmt(QueryPlan::UploadedToday, ResultValue::Count(4)), "4 files were uploaded today.");
    assert_eq!(
        fmt(QueryPlan::UploadedLastNDays { days: 7 }, ResultValue::Count(0)),
        "0 files were uploaded in the last 7 days."
    );
    assert_eq!(
        fmt(QueryPlan::UploadedThisMonthByExt { ext: "pdf".into() }, ResultValue::Count(2)),
        "2 pdf files were uploaded this month."
    );
    assert_eq!(
        fmt(QueryPlan::LargerThan { literal: "1.5 gb".into(), bytes: 1_610_612_736 }, ResultValue::Count(1)),
        "1 files are larger than 1.5 gb."
    );
    assert_eq!(fmt(QueryPlan::CountByUploader { user: "alice".into() }, ResultValue::Count(3)), "3 files uploaded by alice.");
    assert_eq!(
        fmt(QueryPlan::TotalStorage, ResultValue::Bytes(1_610_612_736)),
        "Total storage used: 1610612736 bytes (1.50 GB)."
    );
}

#[test]
fn format_ranked_lists() {
    let ranked = ResultValue::Ranked(vec![
        RankedFile { key: "b.pdf".into(), size: 700 },
        RankedFile { key: "a.pdf".into(), size: 500 },
    ]);
    let r = QueryResult { plan: QueryPlan::TopNByExt { n: 2, ext: "pdf".into() }, value: ranked };
    assert_eq!(format_answer(&r), "Top 2 pdf files by size: b.pdf (700 bytes), a.pdf (500 bytes)");

    let empty = QueryResult {
        plan: QueryPlan::TopNByUploaderThisWeek { n: 3, user: "bob".into() },
        value: ResultValue::Ranked(vec![]),
    };
    assert_eq!(format_answer(&empty), "Top 3 files uploaded by bob this week: ");
}

#[test]
fn answer_runs_the_whole_pipeline() {
    let src = VecSource::new(fixture());
    let a = answer_question("How many files were uploaded this week?", &src, today()).unwrap();
    assert_eq!(a.answer, "2 files were uploaded this week.");
    assert_eq!(a.intent, Some("uploaded_this_week"));
    assert_eq!(src.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn unrecognized_question_skips_snapshot() {
    let src = VecSource::new(fixture());
    let a = answer_question("xyz not a real query", &src, today()).unwrap();
    assert_eq!(a.answer, UNRECOGNIZED_ANSWER);
    assert_eq!(a.intent, None);
    assert_eq!(src.calls.load(Ordering::SeqCst), 0);
    // the fallback holds even when the store is down
    assert_eq!(answer_question("hello", &FailingSource, today()).unwrap().answer, UNRECOGNIZED_ANSWER);
}

#[test]
fn snapshot_failure_is_not_an_empty_bucket() {
    let err = answer_question("what is the total storage", &FailingSource, today()).unwrap_err();
    match err {
        QueryError::SnapshotUnavailable(msg) => assert!(msg.contains("timed out"), "{}", msg),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn parse_errors_surface_before_snapshot() {
    let src = VecSource::new(fixture());
    let err = answer_question("files larger than 1.2.3mb", &src, today()).unwrap_err();
    assert!(matches!(err, QueryError::Parse(ParseError::InvalidSize(_))));
    assert_eq!(src.calls.load(Ordering::SeqCst), 0);
}
