// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flagmetrics_core::MetricEvent;
use flagmetrics_storage::{compact_hourly, spread_variants, ClientMetricsStore, StoreOptions};
use tempfile::tempdir;

fn make_events(n: usize) -> Vec<MetricEvent> {
    let start = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            MetricEvent::new(
                format!("feature-{}", i % 200),
                format!("app-{}", i % 7),
                if i % 3 == 0 { "dev" } else { "prod" },
                start + Duration::minutes((i % 240) as i64),
            )
            .with_counts((i % 11) as u64, (i % 5) as u64)
            .with_variant(if i % 2 == 0 { "control" } else { "treatment" }, 1)
        })
        .collect()
}

fn bench_compaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("compaction");

    for size in [1_000, 10_000, 100_000].iter() {
        let events = make_events(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("hourly", size), &events, |b, events| {
            b.iter(|| compact_hourly(black_box(events)));
        });
        group.bench_with_input(BenchmarkId::new("variants", size), &events, |b, events| {
            b.iter(|| spread_variants(black_box(events)));
        });
    }

    group.finish();
}

fn bench_batch_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_insert");
    group.sample_size(20);

    for size in [100, 1_000, 10_000].iter() {
        let events = make_events(*size);
        let dir = tempdir().unwrap();
        let store = ClientMetricsStore::open(dir.path().join("bench.db"), StoreOptions::default())
            .unwrap();

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &events, |b, events| {
            b.iter(|| {
                store.batch_insert_metrics(black_box(events)).unwrap();
                store.batch_insert_total_metrics(black_box(events)).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compaction, bench_batch_insert);
criterion_main!(benches);
