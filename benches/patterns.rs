//! Benchmarks for aggregation, both scanners and the full detection path.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mtfpd::prelude::*;

fn origin() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Deterministic hourly walk with a slow swing so pivots show up
fn generate_candles(n: usize) -> Vec<Candle> {
  let mut candles = Vec::with_capacity(n);
  let mut price = 100.0;

  for i in 0..n {
    let change = ((i * 7 + 13) % 100) as f64 / 50.0 - 1.0;
    let swing = (i as f64 / 60.0).sin() * 0.8;
    let volatility = 1.0 + ((i * 3) % 10) as f64 / 10.0;

    let o = price;
    let c = (price + change * 0.3 + swing * 0.2).max(1.0);
    let h = o.max(c) + volatility * 0.5;
    let l = o.min(c) - volatility * 0.5;
    let v = 1000.0 + ((i * 11) % 17) as f64 * 50.0;

    candles.push(Candle::new(origin() + TimeDelta::hours(i as i64), o, h, l, c, v));
    price = c;
  }

  candles
}

fn bench_aggregation(c: &mut Criterion) {
  let base = generate_candles(10_000);
  let mut group = c.benchmark_group("aggregate");

  for target in [Timeframe::H4, Timeframe::D1, Timeframe::W1] {
    group.bench_with_input(BenchmarkId::new("from_1h", target), &target, |b, &target| {
      b.iter(|| {
        let _ = black_box(aggregate(black_box(&base), Timeframe::H1, target));
      })
    });
  }

  group.finish();
}

fn bench_candlestick_scan(c: &mut Criterion) {
  let candles = generate_candles(1000);
  let scanner = ScannerBuilder::new().with_all_defaults().build().unwrap();

  c.bench_function("candlestick_drafts_1000", |b| {
    b.iter(|| {
      let _ = black_box(scanner.drafts(black_box(&candles)));
    })
  });
}

fn bench_geometric_scan(c: &mut Criterion) {
  let scanner = GeometricScanner::new(GeometryConfig::default()).unwrap();
  let mut group = c.benchmark_group("geometric");

  for size in [250, 1000, 4000] {
    let candles = generate_candles(size);
    group.bench_with_input(BenchmarkId::new("formations", size), &size, |b, _| {
      b.iter(|| {
        let _ = black_box(scanner.find_formations(black_box(&candles), 20));
      })
    });
  }

  group.finish();
}

fn bench_detect_patterns(c: &mut Criterion) {
  let candles = generate_candles(2400);
  let end = candles[candles.len() - 1].timestamp;
  let mut store = InMemoryCandleStore::new(Timeframe::H1);
  store.insert("SYM", candles);

  let service = DetectionService::new(store, DetectionConfig::default()).unwrap();

  c.bench_function("detect_patterns_4h_100_days", |b| {
    b.iter(|| {
      let _ = black_box(service.detect_patterns("SYM", Timeframe::H4, origin(), end, 20));
    })
  });
}

fn bench_parallel_requests(c: &mut Criterion) {
  let mut store = InMemoryCandleStore::new(Timeframe::H1);
  for sym in ["SYM1", "SYM2", "SYM3", "SYM4"] {
    store.insert(sym, generate_candles(1200));
  }
  let end = origin() + TimeDelta::hours(1199);
  let service = DetectionService::new(store, DetectionConfig::default()).unwrap();

  let requests: Vec<DetectionRequest> = ["SYM1", "SYM2", "SYM3", "SYM4"]
    .iter()
    .map(|sym| DetectionRequest::new(*sym, Timeframe::H4, origin(), end))
    .collect();

  c.bench_function("detect_parallel_4_instruments", |b| {
    b.iter(|| {
      let _ = black_box(service.detect_parallel(black_box(requests.clone())));
    })
  });
}

criterion_group!(
  benches,
  bench_aggregation,
  bench_candlestick_scan,
  bench_geometric_scan,
  bench_detect_patterns,
  bench_parallel_requests,
);

criterion_main!(benches);
