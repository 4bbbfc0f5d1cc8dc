use chrono::{Duration, NaiveDate, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};

use smartquery::server::exec::execute;
use smartquery::server::query::{classify, QueryPlan};
use smartquery::storage::FileRecord;

const EXTS: [&str; 5] = ["pdf", "png", "txt", "csv", "log"];
const USERS: [&str; 4] = ["alice", "bob", "carol", "dave"];

fn gen_records(n: usize, seed: u64) -> Vec<FileRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let base = Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let ext = EXTS[rng.gen_range(0..EXTS.len())];
            let user = USERS[rng.gen_range(0..USERS.len())];
            let ts = base - Duration::minutes(rng.gen_range(0..60 * 24 * 90));
            FileRecord::new(format!("obj/{i:08}.{ext}"), rng.gen_range(0..64 * 1024 * 1024), ts, Some(user))
        })
        .collect()
}

fn bench_classify(c: &mut Criterion) {
    let questions = [
        "How many files were uploaded today?",
        "how many pdf files were uploaded this month",
        "files larger than 3.5 mb",
        "top 10 files uploaded by alice this week",
        "how many files are uploaded by bob",
        "xyz not a real query",
    ];
    let mut group = c.benchmark_group("classify");
    for q in questions {
        group.bench_with_input(BenchmarkId::from_parameter(q), &q, |b, q| {
            b.iter(|| criterion::black_box(classify(q).ok()));
        });
    }
    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let ns = [10_000usize, 100_000usize];
    let today = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
    let plans = [
        ("this_month", QueryPlan::UploadedThisMonth),
        ("larger_than", QueryPlan::LargerThan { literal: "10mb".into(), bytes: 10 * 1024 * 1024 }),
        ("top_n_by_size", QueryPlan::TopNBySize { n: 10 }),
        ("top_n_by_uploader_week", QueryPlan::TopNByUploaderThisWeek { n: 5, user: "alice".into() }),
    ];
    let mut group = c.benchmark_group("execute");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(20);

    for &n in &ns {
        let records = gen_records(n, 0xBEEF_CAFE);
        group.throughput(Throughput::Elements(n as u64));
        for (name, plan) in &plans {
            group.bench_with_input(BenchmarkId::new(*name, n.to_string()), &n, |b, _| {
                b.iter(|| criterion::black_box(execute(plan, &records, today)));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_classify, bench_execute);
criterion_main!(benches);
