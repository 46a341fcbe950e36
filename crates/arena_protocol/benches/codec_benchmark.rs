//! Benchmark for the envelope hot path.
//!
//! TARGET: 1,000,000 input envelopes per second into a reused buffer
//!
//! Run with: cargo bench --package arena_protocol --bench codec_benchmark

use std::sync::Arc;

use arena_core::LogicalClock;
use arena_protocol::{
    BattleResult, ContextCodec, FixedBuffer, Input, UserOp, INPUT_BUFFER_SIZE,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn user_op() -> Input {
    UserOp {
        team_id: 100,
        action: 1,
        value: 7,
    }
    .into()
}

fn benchmark_build_input(c: &mut Criterion) {
    let mut buffer = FixedBuffer::new(INPUT_BUFFER_SIZE);
    let input = user_op();

    c.bench_function("build_input_user_op", |b| {
        b.iter(|| {
            ContextCodec::build_input(black_box(1000), black_box(5), &input, &mut buffer)
        });
    });
}

fn benchmark_inject_input(c: &mut Criterion) {
    let codec = ContextCodec::new(Arc::new(LogicalClock::new(30)));
    let mut buffer = FixedBuffer::new(INPUT_BUFFER_SIZE);
    let input = user_op();

    let mut group = c.benchmark_group("inject_input");
    group.throughput(Throughput::Elements(1));
    group.bench_function("clock_stamped", |b| {
        b.iter(|| codec.inject_input(black_box(1000), &input, &mut buffer));
    });
    group.finish();
}

fn benchmark_parse_output(c: &mut Criterion) {
    let bytes = ContextCodec::encode_output(
        1000,
        90,
        BattleResult {
            winner: 100,
            loser: 101,
            atk_damage: 320,
            def_damage: 280,
            duration_ms: 3_000,
            score: 100,
        }
        .into(),
    )
    .unwrap_or_default();

    c.bench_function("parse_output_result", |b| {
        b.iter(|| ContextCodec::parse_output(black_box(&bytes)));
    });
}

criterion_group!(
    benches,
    benchmark_build_input,
    benchmark_inject_input,
    benchmark_parse_output
);
criterion_main!(benches);
