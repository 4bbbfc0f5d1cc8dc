use crate::server::query::QueryPlan;

use super::{QueryResult, RankedFile};

pub const UNRECOGNIZED_ANSWER: &str = "Sorry, I did not understand your query.";

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn ranked_join(files: &[RankedFile]) -> String {
    files
        .iter()
        .map(|f| format!("{} ({} bytes)", f.key, f.size))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render a query result as the answer sentence for its intent.
pub fn format_answer(result: &QueryResult) -> String {
    let count = result.value.scalar();
    let ranked = ranked_join(result.value.ranked());
    match &result.plan {
        QueryPlan::UploadedToday => format!("{} files were uploaded today.", count),
        QueryPlan::UploadedLastNDays { days } => format!("{} files were uploaded in the last {} days.", count, days),
        QueryPlan::UploadedThisWeek => format!("{} files were uploaded this week.", count),
        QueryPlan::UploadedThisMonth => format!("{} files were uploaded this month.", count),
        QueryPlan::UploadedThisMonthByExt { ext } => format!("{} {} files were uploaded this month.", count, ext),
        QueryPlan::LargerThan { literal, .. } => format!("{} files are larger than {}.", count, literal),
        QueryPlan::TopNBySize { n } => format!("Top {} files by size: {}", n, ranked),
        QueryPlan::TopNByExt { n, ext } => format!("Top {} {} files by size: {}", n, ext, ranked),
        QueryPlan::CountByUploader { user } => format!("{} files uploaded by {}.", count, user),
        QueryPlan::TopNByUploaderThisWeek { n, user } => {
            format!("Top {} files uploaded by {} this week: {}", n, user, ranked)
        }
        QueryPlan::TotalStorage => format!("Total storage used: {} bytes ({:.2} GB).", count, count as f64 / GIB),
    }
}
