use std::fmt::Display;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tracewire::{Context, SpanContext, SpanId, TraceFlags, TraceId};

fn span_context() -> SpanContext {
    SpanContext::new(
        TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736),
        SpanId::from(0x00f0_67aa_0ba9_02b7),
        TraceFlags::SAMPLED,
        false,
    )
}

fn criterion_benchmark(c: &mut Criterion) {
    benchmark_group(c, BenchmarkParameter::EmptyCurrent);
    benchmark_group(c, BenchmarkParameter::SpanContextCurrent);
}

fn benchmark_group(c: &mut Criterion, p: BenchmarkParameter) {
    let _guard = match p {
        BenchmarkParameter::EmptyCurrent => None,
        BenchmarkParameter::SpanContextCurrent => {
            Some(Context::new().with_span_context(span_context()).attach())
        }
    };

    let mut group = c.benchmark_group("context");

    group.bench_function(BenchmarkId::new("baseline current()", p), |b| {
        b.iter(|| {
            black_box(Context::current());
        })
    });

    group.bench_function(BenchmarkId::new("current().is_empty()", p), |b| {
        b.iter(|| {
            black_box(Context::current().is_empty());
        })
    });

    group.bench_function(BenchmarkId::new("map_current(|cx| cx.is_empty())", p), |b| {
        b.iter(|| {
            black_box(Context::map_current(|cx| cx.is_empty()));
        })
    });

    group.bench_function(BenchmarkId::new("attach and detach", p), |b| {
        b.iter(|| {
            black_box(Context::current_with_span_context(span_context()).attach());
        })
    });

    group.finish();
}

#[derive(Copy, Clone)]
enum BenchmarkParameter {
    EmptyCurrent,
    SpanContextCurrent,
}

impl Display for BenchmarkParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            BenchmarkParameter::EmptyCurrent => write!(f, "empty-current"),
            BenchmarkParameter::SpanContextCurrent => write!(f, "span-context-current"),
        }
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
