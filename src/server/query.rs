//! Intent classification for plain-English questions about the bucket.
//!
//! A question is normalized (trimmed, lowercased) and tried against an ordered
//! list of regex rules. The first rule that matches wins, so narrower phrasings
//! must be listed before broader ones that would otherwise shadow them. A match
//! produces a typed `QueryPlan`; no match is the `Ok(None)` outcome.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::error::ParseError;

pub mod query_parse_size;

pub use query_parse_size::parse_size;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    UploadedToday,
    UploadedLastNDays,
    UploadedThisWeek,
    UploadedThisMonth,
    UploadedThisMonthByExt,
    LargerThan,
    TopNBySize,
    TopNByExt,
    CountByUploader,
    TopNByUploaderThisWeek,
    TotalStorage,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::UploadedToday => "uploaded_today",
            Intent::UploadedLastNDays => "uploaded_last_n_days",
            Intent::UploadedThisWeek => "uploaded_this_week",
            Intent::UploadedThisMonth => "uploaded_this_month",
            Intent::UploadedThisMonthByExt => "uploaded_this_month_by_ext",
            Intent::LargerThan => "larger_than",
            Intent::TopNBySize => "top_n_by_size",
            Intent::TopNByExt => "top_n_by_ext",
            Intent::CountByUploader => "count_by_uploader",
            Intent::TopNByUploaderThisWeek => "top_n_by_uploader_this_week",
            Intent::TotalStorage => "total_storage",
        }
    }
}

/// A classified question with its typed parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    UploadedToday,
    UploadedLastNDays { days: u32 },
    UploadedThisWeek,
    UploadedThisMonth,
    UploadedThisMonthByExt { ext: String },
    /// `literal` is the size text as written in the question.
    LargerThan { literal: String, bytes: u64 },
    TopNBySize { n: usize },
    TopNByExt { n: usize, ext: String },
    CountByUploader { user: String },
    TopNByUploaderThisWeek { n: usize, user: String },
    TotalStorage,
}

impl QueryPlan {
    pub fn intent(&self) -> Intent {
        match self {
            QueryPlan::UploadedToday => Intent::UploadedToday,
            QueryPlan::UploadedLastNDays { .. } => Intent::UploadedLastNDays,
            QueryPlan::UploadedThisWeek => Intent::UploadedThisWeek,
            QueryPlan::UploadedThisMonth => Intent::UploadedThisMonth,
            QueryPlan::UploadedThisMonthByExt { .. } => Intent::UploadedThisMonthByExt,
            QueryPlan::LargerThan { .. } => Intent::LargerThan,
            QueryPlan::TopNBySize { .. } => Intent::TopNBySize,
            QueryPlan::TopNByExt { .. } => Intent::TopNByExt,
            QueryPlan::CountByUploader { .. } => Intent::CountByUploader,
            QueryPlan::TopNByUploaderThisWeek { .. } => Intent::TopNByUploaderThisWeek,
            QueryPlan::TotalStorage => Intent::TotalStorage,
        }
    }
}

type Extractor = fn(&Captures<'_>) -> Result<QueryPlan, ParseError>;

/// One entry of the ordered grammar.
pub struct IntentRule {
    pub intent: Intent,
    pattern: Regex,
    extract: Extractor,
}

impl IntentRule {
    fn new(intent: Intent, pattern: &str, extract: Extractor) -> Self {
        let pattern = Regex::new(pattern).unwrap_or_else(|e| panic!("intent pattern for {} is invalid: {e}", intent.as_str()));
        Self { intent, pattern, extract }
    }

    pub fn pattern(&self) -> &str { self.pattern.as_str() }
}

// Order encodes precedence: specific phrasings first.
static RULES: Lazy<Vec<IntentRule>> = Lazy::new(|| vec![
    IntentRule::new(Intent::UploadedToday, r"files? (were )?uploaded today", |_| Ok(QueryPlan::UploadedToday)),
    IntentRule::new(Intent::UploadedLastNDays, r"files? (were )?uploaded in the last (?P<days>\d+) days?", |c| {
        Ok(QueryPlan::UploadedLastNDays { days: parse_int(named(c, "days"))? })
    }),
    IntentRule::new(Intent::TopNByUploaderThisWeek, r"top (?P<n>\d+) files? uploaded by (?P<user>\w+) this week", |c| {
        Ok(QueryPlan::TopNByUploaderThisWeek { n: parse_int(named(c, "n"))?, user: named(c, "user").to_string() })
    }),
    IntentRule::new(Intent::UploadedThisWeek, r"files? (were )?uploaded this week", |_| Ok(QueryPlan::UploadedThisWeek)),
    IntentRule::new(Intent::UploadedThisMonthByExt, r"how many (?P<ext>\w+) files? (were )?uploaded this month", |c| {
        Ok(QueryPlan::UploadedThisMonthByExt { ext: named(c, "ext").to_string() })
    }),
    IntentRule::new(Intent::UploadedThisMonth, r"files? (were )?uploaded this month", |_| Ok(QueryPlan::UploadedThisMonth)),
    IntentRule::new(Intent::LargerThan, r"files? (are )?larger than (?P<size>[\d.]+(?: ?[kmg]b)?)", |c| {
        let literal = size_literal(named(c, "size"));
        Ok(QueryPlan::LargerThan { literal: literal.to_string(), bytes: parse_size(literal)? })
    }),
    IntentRule::new(Intent::TopNBySize, r"top (?P<n>\d+) files? taking max storage", |c| {
        Ok(QueryPlan::TopNBySize { n: parse_int(named(c, "n"))? })
    }),
    IntentRule::new(Intent::TopNByExt, r"top (?P<n>\d+) (?P<ext>\w+) files? by size", |c| {
        Ok(QueryPlan::TopNByExt { n: parse_int(named(c, "n"))?, ext: named(c, "ext").to_string() })
    }),
    IntentRule::new(Intent::CountByUploader, r"^how many files are uploaded by (?P<user>.+)$", |c| {
        let user = named(c, "user").trim().trim_end_matches('?').trim_end();
        Ok(QueryPlan::CountByUploader { user: user.to_string() })
    }),
    IntentRule::new(Intent::TotalStorage, r"(total|how much) storage", |_| Ok(QueryPlan::TotalStorage)),
]);

fn named<'t>(c: &Captures<'t>, name: &str) -> &'t str {
    c.name(name).map(|m| m.as_str()).unwrap_or("")
}

/// A bare number may carry the sentence's closing period ("larger than 2048.").
fn size_literal(raw: &str) -> &str {
    if raw.ends_with('b') { raw } else { raw.strip_suffix('.').unwrap_or(raw) }
}

fn parse_int<T: std::str::FromStr>(s: &str) -> Result<T, ParseError> {
    s.parse::<T>().map_err(|_| ParseError::InvalidNumber(s.to_string()))
}

/// Trim and lowercase a raw question.
pub fn normalize(question: &str) -> String {
    question.trim().to_lowercase()
}

/// The grammar in evaluation order.
pub fn rules() -> &'static [IntentRule] {
    &RULES
}

/// Classify a question. `Ok(None)` means no rule recognized it; a rule that
/// matches but carries a malformed literal is an error, not a fall-through.
pub fn classify(question: &str) -> Result<Option<QueryPlan>, ParseError> {
    let q = normalize(question);
    for rule in rules() {
        if let Some(caps) = rule.pattern.captures(&q) {
            debug!(target: "smartquery::query", intent = rule.intent.as_str(), "matched question '{}'", q);
            return (rule.extract)(&caps).map(Some);
        }
    }
    debug!(target: "smartquery::query", "unrecognized question '{}'", q);
    Ok(None)
}
