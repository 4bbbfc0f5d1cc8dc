//! Fixed bucket reports behind the analytics endpoints and the dashboard page.
//! Every function is a pure fold over one snapshot of `FileRecord`s.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::NaiveDate;
use serde::Serialize;

use crate::storage::paths::key_extension;
use crate::storage::FileRecord;

pub const NO_EXTENSION: &str = "no_ext";

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / GIB
}

/// Files per extension (text after the final '.'), `no_ext` for the rest.
pub fn count_by_type(records: &[FileRecord]) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for r in records {
        let ext = key_extension(&r.key).unwrap_or(NO_EXTENSION);
        *out.entry(ext.to_string()).or_insert(0) += 1;
    }
    out
}

pub fn uploads_by_user(records: &[FileRecord]) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for r in records {
        *out.entry(r.uploader.clone()).or_insert(0) += 1;
    }
    out
}

/// Keys last modified on `date` (UTC), in snapshot order.
pub fn files_by_date(records: &[FileRecord], date: NaiveDate) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.last_modified.date_naive() == date)
        .map(|r| r.key.clone())
        .collect()
}

pub fn storage_by_date(records: &[FileRecord], date: NaiveDate) -> u64 {
    records.iter().filter(|r| r.last_modified.date_naive() == date).map(|r| r.size).sum()
}

pub fn total_storage(records: &[FileRecord]) -> u64 {
    records.iter().map(|r| r.size).sum()
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub counts: BTreeMap<String, usize>,
    pub user_counts: BTreeMap<String, usize>,
    pub total_bytes: u64,
    pub total_gb: f64,
    pub file_count: usize,
}

pub fn summarize(records: &[FileRecord]) -> DashboardSummary {
    let total_bytes = total_storage(records);
    DashboardSummary {
        counts: count_by_type(records),
        user_counts: uploads_by_user(records),
        total_bytes,
        total_gb: bytes_to_gb(total_bytes),
        file_count: records.len(),
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn push_table(html: &mut String, title: &str, head: (&str, &str), rows: impl Iterator<Item = (String, String)>) {
    let _ = write!(html, "<h2>{}</h2>\n<table>\n<tr><th>{}</th><th>{}</th></tr>\n", title, head.0, head.1);
    for (a, b) in rows {
        let _ = writeln!(html, "<tr><td>{}</td><td>{}</td></tr>", escape_html(&a), escape_html(&b));
    }
    html.push_str("</table>\n");
}

/// Self-contained HTML summary of the bucket.
pub fn dashboard_html(bucket: &str, records: &[FileRecord]) -> String {
    let s = summarize(records);
    let mut html = String::with_capacity(1024 + records.len() * 96);
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Bucket dashboard: {0}</title></head>\n<body>\n<h1>Bucket dashboard: {0}</h1>\n<p>{1} files, {2} bytes ({3:.2} GB)</p>\n",
        escape_html(bucket),
        s.file_count,
        s.total_bytes,
        s.total_gb
    );
    push_table(&mut html, "Files by type", ("Extension", "Count"), s.counts.into_iter().map(|(k, v)| (k, v.to_string())));
    push_table(&mut html, "Uploads by user", ("Uploader", "Count"), s.user_counts.into_iter().map(|(k, v)| (k, v.to_string())));
    push_table(
        &mut html,
        "Files",
        ("Key", "Size (bytes)"),
        records.iter().map(|r| (r.key.clone(), r.size.to_string())),
    );
    html.push_str("</body>\n</html>\n");
    html
}
