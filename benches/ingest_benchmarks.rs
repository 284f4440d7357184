//! Criterion benchmarks for the ingestion hot paths.
//!
//! Run with: `cargo bench`
//!
//! All inputs are synthetic so results are comparable across machines and do
//! not depend on a real repository.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use revcache::{parse_diff_format, parse_log_record, PathInternTable};

// ─── Helpers ─────────────────────────────────────────────────────────

const OLD: &str = "1111111111111111111111111111111111111111";
const NEW: &str = "2222222222222222222222222222222222222222";

/// Raw diff payload with `lines` entries spread over 50 directories.
/// Every 20th line is a rename, every 7th an addition.
fn synthetic_diff(lines: usize) -> String {
    let mut out = String::with_capacity(lines * 130);
    for i in 0..lines {
        let dir = format!("src/module_{}/sub", i % 50);
        if i % 20 == 0 {
            out.push_str(&format!(
                ":100644 100644 {} {} R087\t{}/old_{}.rs\t{}/file_{}.rs\n",
                OLD, NEW, dir, i, dir, i
            ));
        } else {
            let status = if i % 7 == 0 { 'A' } else { 'M' };
            out.push_str(&format!(
                ":100644 100644 {} {} {}\t{}/file_{}.rs\n",
                OLD, NEW, status, dir, i % 300
            ));
        }
    }
    out
}

/// `count` log records in `git log -z` layout.
fn synthetic_log(count: usize) -> Vec<String> {
    (0..count)
        .map(|n| {
            format!(
                ">{:040x}X{:040x}\nCommitter{}<c{}@example.com>\nAuthor{}<a{}@example.com>\n{}\nSubject line {}\nBody paragraph for commit {}.\n",
                n + 1,
                n + 2,
                n % 10,
                n % 10,
                n % 25,
                n % 25,
                1_700_000_000 + n,
                n,
                n
            )
        })
        .collect()
}

// ─── Diff parsing ────────────────────────────────────────────────────

fn bench_parse_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_diff_format");
    for lines in [10usize, 1_000, 20_000] {
        let payload = synthetic_diff(lines);
        group.bench_with_input(BenchmarkId::from_parameter(lines), &payload, |b, payload| {
            b.iter(|| {
                let mut paths = PathInternTable::new();
                black_box(parse_diff_format(black_box(payload), &mut paths))
            })
        });
    }
    group.finish();
}

fn bench_parse_diff_warm_table(c: &mut Criterion) {
    // Steady state of a loaded repository: every path is already interned
    let payload = synthetic_diff(1_000);
    let mut paths = PathInternTable::new();
    parse_diff_format(&payload, &mut paths);

    c.bench_function("parse_diff_format_warm_1000", |b| {
        b.iter(|| black_box(parse_diff_format(black_box(&payload), &mut paths)))
    });
}

// ─── Interning ───────────────────────────────────────────────────────

fn bench_intern(c: &mut Criterion) {
    let paths: Vec<String> = (0..10_000)
        .map(|i| format!("src/area_{}/component_{}/file_{}.rs", i % 40, i % 200, i % 1_000))
        .collect();

    c.bench_function("intern_10000_paths", |b| {
        b.iter(|| {
            let mut table = PathInternTable::new();
            for p in &paths {
                black_box(table.intern(p));
            }
            black_box(table.dir_count())
        })
    });

    let mut table = PathInternTable::new();
    let interned: Vec<_> = paths.iter().map(|p| table.intern(p)).collect();
    c.bench_function("resolve_10000_paths", |b| {
        b.iter(|| {
            for p in &interned {
                black_box(table.resolve(*p));
            }
        })
    });
}

// ─── Log records ─────────────────────────────────────────────────────

fn bench_parse_log(c: &mut Criterion) {
    let records = synthetic_log(5_000);
    c.bench_function("parse_log_record_5000", |b| {
        b.iter(|| {
            for (i, rec) in records.iter().enumerate() {
                black_box(parse_log_record(black_box(rec), i + 1));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_parse_diff,
    bench_parse_diff_warm_table,
    bench_intern,
    bench_parse_log,
);
criterion_main!(benches);
