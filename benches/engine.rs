//! Benchmarks for window analysis, multi-timeframe passes and signal synthesis.

use std::collections::BTreeMap;

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use confluence::prelude::*;

/// Deterministic bars with `minutes` between timestamps
fn generate_bars(n: usize, minutes: i64) -> Vec<Bar> {
  let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 9, 15, 0).unwrap();
  let mut bars = Vec::with_capacity(n);
  let mut price = 100.0;

  for i in 0..n {
    let change = ((i * 7 + 13) % 100) as f64 / 50.0 - 1.0; // Deterministic "random"
    let volatility = 2.0 + ((i * 3) % 10) as f64 / 5.0;
    let volume = 1_000 + ((i * 37) % 900) as u64;

    let o = price;
    let c = (price + change).max(1.0);
    let h = o.max(c) + volatility * 0.5;
    let l = (o.min(c) - volatility * 0.5).max(0.5);

    bars.push(Bar::new(o, h, l, c, volume, t0 + Duration::minutes(minutes * i as i64)));
    price = c;
  }

  bars
}

fn bench_single_detector(c: &mut Criterion) {
  let bars = generate_bars(200, 15);

  let engine = EngineBuilder::new()
    .add(BuiltinDetector::Harmonic(HarmonicDetector::with_defaults()))
    .build()
    .unwrap();

  c.bench_function("harmonic_200_bars", |b| {
    b.iter(|| {
      let _ = black_box(engine.raw_detections(black_box(&bars), Timeframe::FifteenMinutes));
    })
  });
}

fn bench_all_detectors(c: &mut Criterion) {
  let bars = generate_bars(200, 5);

  let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

  c.bench_function("detect_all_200_bars", |b| {
    b.iter(|| {
      let _ = black_box(engine.detect_patterns(black_box(&bars), Timeframe::FiveMinutes));
    })
  });
}

fn bench_window_scaling(c: &mut Criterion) {
  let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

  let mut group = c.benchmark_group("window_scaling");

  for size in [50, 100, 200, 500].iter() {
    let bars = generate_bars(*size, 15);

    group.bench_with_input(BenchmarkId::new("detect", size), size, |b, _| {
      b.iter(|| {
        let _ = black_box(engine.detect_patterns(black_box(&bars), Timeframe::FifteenMinutes));
      })
    });
  }

  group.finish();
}

fn bench_multi_timeframe(c: &mut Criterion) {
  let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

  let one = generate_bars(200, 1);
  let five = generate_bars(200, 5);
  let fifteen = generate_bars(200, 15);
  let hour = generate_bars(200, 60);

  let mut windows: BTreeMap<Timeframe, &[Bar]> = BTreeMap::new();
  windows.insert(Timeframe::OneMinute, &one);
  windows.insert(Timeframe::FiveMinutes, &five);
  windows.insert(Timeframe::FifteenMinutes, &fifteen);
  windows.insert(Timeframe::OneHour, &hour);

  c.bench_function("multi_timeframe_4x200", |b| {
    b.iter(|| {
      let _ = black_box(engine.analyze_multi_timeframe(black_box(&windows)));
    })
  });
}

fn bench_signals(c: &mut Criterion) {
  let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
  let bars = generate_bars(200, 15);

  let mut detections = engine.detect_patterns(&bars, Timeframe::FifteenMinutes);
  // keep the synthesizer busy even when the synthetic window is quiet
  if let Some(first) = detections.first().cloned() {
    detections.extend(std::iter::repeat(first).take(50));
  }

  let contracts = (0..40)
    .flat_map(|i| {
      let strike = 50.0 + 2.5 * i as f64;
      [OptionClass::Call, OptionClass::Put].map(|class| OptionContract {
        symbol: format!("{class:?}{strike}"),
        strike,
        class,
        current_price: 1.0,
      })
    })
    .collect();
  let chain = OptionChain::new(bars[bars.len() - 1].close, contracts);

  c.bench_function("synthesize_signals", |b| {
    b.iter(|| {
      let _ = black_box(engine.generate_signals(black_box(&detections), black_box(&chain)));
    })
  });
}

fn bench_context_computation(c: &mut Criterion) {
  let bars = generate_bars(500, 15);

  let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

  c.bench_function("compute_context_500_bars", |b| {
    b.iter(|| {
      let _ = black_box(engine.compute_context(black_box(&bars), Timeframe::FifteenMinutes));
    })
  });
}

criterion_group!(
  benches,
  bench_single_detector,
  bench_all_detectors,
  bench_window_scaling,
  bench_multi_timeframe,
  bench_signals,
  bench_context_computation,
);

criterion_main!(benches);
