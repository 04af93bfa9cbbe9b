//! Protocol hot paths: goal encoding, output classification, binding decode.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::time::Duration;
use trealla_driver::{build_goal, decode_bindings, Arg, GOAL_RULES};

fn result_line(bindings: usize) -> String {
    let pairs: Vec<String> = (0..bindings).map(|i| format!("V{i} = {i}")).collect();
    format!("   {}.\r\n?- ", pairs.join(", "))
}

fn bench_build_goal(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_goal");
    for size in [4usize, 64, 1_024] {
        let args: Vec<Arg> = vec![
            Arg::atom("tom"),
            Arg::var("X"),
            Arg::from((0..size as i64).collect::<Vec<_>>()),
            Arg::from("some text with \"quotes\""),
        ];
        group.bench_with_input(BenchmarkId::from_parameter(size), &args, |b, args| {
            b.iter(|| build_goal(black_box("edge"), black_box(args)));
        });
    }
    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    for bindings in [1usize, 8, 64] {
        let line = result_line(bindings);
        group.bench_with_input(BenchmarkId::from_parameter(bindings), &line, |b, line| {
            b.iter(|| GOAL_RULES.classify(black_box(line.as_bytes())));
        });
    }
    group.finish();
}

fn bench_decode_bindings(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_bindings");
    for bindings in [1usize, 8, 64] {
        let line = result_line(bindings);
        group.bench_with_input(BenchmarkId::from_parameter(bindings), &line, |b, line| {
            b.iter(|| decode_bindings(black_box(line)));
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1));
    targets = bench_build_goal, bench_classify, bench_decode_bindings
}
criterion_main!(benches);
