//! Benchmarks for the compile pipeline and the VM.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use siftlang::{compile, run, Environment};

const FIELD_FILTER: &str = r#"
if (Author == "Steve" && Count >= 3) { return true; }
if (Message ~= /panic/i) { return true; }
return false;
"#;

const ARITHMETIC: &str = "return (1 + 2 * 3 - 4) ** 2 % 7 + √16;";

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_field_filter", |b| {
        b.iter(|| compile(black_box(FIELD_FILTER)).unwrap())
    });
    c.bench_function("compile_arithmetic", |b| {
        b.iter(|| compile(black_box(ARITHMETIC)).unwrap())
    });
}

fn bench_run(c: &mut Criterion) {
    let program = compile(FIELD_FILTER).unwrap();
    let record = json!({
        "Author": "Steve",
        "Count": 5,
        "Message": "Kernel PANIC",
    });

    c.bench_function("run_field_filter", |b| {
        let mut env = Environment::new();
        b.iter(|| run(black_box(&program), &mut env, Some(&record)).unwrap())
    });

    let arithmetic = compile(ARITHMETIC).unwrap();
    c.bench_function("run_arithmetic", |b| {
        let mut env = Environment::new();
        b.iter(|| run(black_box(&arithmetic), &mut env, None).unwrap())
    });
}

criterion_group!(benches, bench_compile, bench_run);
criterion_main!(benches);
