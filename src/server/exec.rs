//!
//! smartquery query execution
//! ---------------------------
//! Evaluates a classified `QueryPlan` over one immutable snapshot of file
//! records and hands the structured result to the answer formatter.
//!
//! Date policy: every timestamp is compared as a UTC calendar date against the
//! evaluation date supplied by the caller, so results never depend on the host
//! timezone.

use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::QueryError;
use crate::server::query::{self, QueryPlan};
use crate::storage::{FileRecord, SnapshotSource};

pub mod exec_format;

pub use exec_format::{format_answer, UNRECOGNIZED_ANSWER};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedFile {
    pub key: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultValue {
    Count(usize),
    Bytes(u64),
    Ranked(Vec<RankedFile>),
}

impl ResultValue {
    /// Scalar view: counts and byte totals as-is, ranked lists by length.
    pub fn scalar(&self) -> u64 {
        match self {
            ResultValue::Count(c) => *c as u64,
            ResultValue::Bytes(b) => *b,
            ResultValue::Ranked(v) => v.len() as u64,
        }
    }

    pub fn ranked(&self) -> &[RankedFile] {
        match self {
            ResultValue::Ranked(v) => v,
            _ => &[],
        }
    }
}

/// Output of one plan over one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub plan: QueryPlan,
    pub value: ResultValue,
}

/// First day (Monday) of the ISO week containing `today`.
pub fn week_start(today: NaiveDate) -> NaiveDate {
    let back = today.weekday().num_days_from_monday() as u64;
    today.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN)
}

fn upload_day(r: &FileRecord) -> NaiveDate {
    r.last_modified.date_naive()
}

fn in_range(r: &FileRecord, from: NaiveDate, to: NaiveDate) -> bool {
    let d = upload_day(r);
    d >= from && d <= to
}

fn same_month(r: &FileRecord, today: NaiveDate) -> bool {
    let d = upload_day(r);
    d.year() == today.year() && d.month() == today.month()
}

fn has_ext(r: &FileRecord, ext: &str) -> bool {
    r.key.len() > ext.len() && r.key.ends_with(ext) && r.key[..r.key.len() - ext.len()].ends_with('.')
}

/// Largest first; equal sizes keep snapshot order.
fn top_n<'a>(records: impl Iterator<Item = &'a FileRecord>, n: usize) -> Vec<RankedFile> {
    let mut v: Vec<&FileRecord> = records.collect();
    v.sort_by(|a, b| b.size.cmp(&a.size));
    v.into_iter().take(n).map(|r| RankedFile { key: r.key.clone(), size: r.size }).collect()
}

fn count<'a>(records: impl Iterator<Item = &'a FileRecord>) -> ResultValue {
    ResultValue::Count(records.count())
}

/// Evaluate `plan` over `records` as of `today`. Pure; never fails.
pub fn execute(plan: &QueryPlan, records: &[FileRecord], today: NaiveDate) -> QueryResult {
    let week_from = week_start(today);
    let value = match plan {
        QueryPlan::UploadedToday => count(records.iter().filter(|r| upload_day(r) == today)),
        QueryPlan::UploadedLastNDays { days } => {
            let from = today.checked_sub_days(Days::new(*days as u64)).unwrap_or(NaiveDate::MIN);
            count(records.iter().filter(|r| in_range(r, from, today)))
        }
        QueryPlan::UploadedThisWeek => count(records.iter().filter(|r| in_range(r, week_from, today))),
        QueryPlan::UploadedThisMonth => count(records.iter().filter(|r| same_month(r, today))),
        QueryPlan::UploadedThisMonthByExt { ext } => {
            count(records.iter().filter(|r| same_month(r, today) && has_ext(r, ext)))
        }
        QueryPlan::LargerThan { bytes, .. } => count(records.iter().filter(|r| r.size > *bytes)),
        QueryPlan::TopNBySize { n } => ResultValue::Ranked(top_n(records.iter(), *n)),
        QueryPlan::TopNByExt { n, ext } => ResultValue::Ranked(top_n(records.iter().filter(|r| has_ext(r, ext)), *n)),
        QueryPlan::CountByUploader { user } => {
            let user = user.to_lowercase();
            count(records.iter().filter(|r| r.uploader.to_lowercase() == user))
        }
        QueryPlan::TopNByUploaderThisWeek { n, user } => {
            let user = user.to_lowercase();
            let hits = records.iter().filter(|r| r.uploader.to_lowercase() == user && in_range(r, week_from, today));
            ResultValue::Ranked(top_n(hits, *n))
        }
        QueryPlan::TotalStorage => ResultValue::Bytes(records.iter().map(|r| r.size).sum()),
    };
    QueryResult { plan: plan.clone(), value }
}

/// `{ "answer": ... }` payload of a successful query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub answer: String,
    /// Intent tag, absent for unrecognized questions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<&'static str>,
}

/// Classify, snapshot, execute and render one question.
///
/// Unrecognized questions answer with the fixed fallback sentence without
/// touching the store. A failing snapshot is reported as
/// `QueryError::SnapshotUnavailable`, never as an empty bucket.
pub fn answer_question(question: &str, source: &dyn SnapshotSource, today: NaiveDate) -> Result<Answer, QueryError> {
    let Some(plan) = query::classify(question)? else {
        return Ok(Answer { answer: UNRECOGNIZED_ANSWER.to_string(), intent: None });
    };
    let records = source.snapshot().map_err(|e| {
        warn!(target: "smartquery::query", "snapshot failed for intent {}: {:#}", plan.intent().as_str(), e);
        QueryError::SnapshotUnavailable(format!("{:#}", e))
    })?;
    let result = execute(&plan, &records, today);
    debug!(target: "smartquery::query", intent = plan.intent().as_str(), records = records.len(), value = result.value.scalar(), "query executed");
    Ok(Answer { answer: format_answer(&result), intent: Some(plan.intent().as_str()) })
}

#[cfg(test)]
mod tests;
