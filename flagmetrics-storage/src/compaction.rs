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

//! In-memory reduction of raw events into write batches
//!
//! Each reducer folds a slice of [`MetricEvent`]s into a `BTreeMap` keyed by a
//! borrowed tuple of the row's primary-key columns, then emits one owned row
//! per key. The map lives for one call only. Iterating a `BTreeMap` yields keys
//! in ascending order, so every batch comes out deduplicated and sorted the
//! way the writer requires.
//!
//! Counts are added with saturating arithmetic. Overflow past `u64::MAX` is
//! not reachable from honest clients and must not panic the process.

use std::collections::BTreeMap;

use flagmetrics_core::{
    HourBucket, HourlyMetricRecord, MetricEvent, TotalMetricRecord, VariantMetricRecord,
};

use crate::batch::SortedBatch;

type HourlyKeyRef<'a> = (&'a str, &'a str, &'a str, HourBucket);
type VariantKeyRef<'a> = (&'a str, &'a str, &'a str, HourBucket, &'a str);
type TotalKeyRef<'a> = (&'a str, &'a str);

/// Collapse events into one row per (feature, app, environment, hour).
///
/// `yes` and `no` are summed across every event whose timestamp floors to the
/// same hour.
pub fn compact_hourly(events: &[MetricEvent]) -> SortedBatch<HourlyMetricRecord> {
    let mut buckets: BTreeMap<HourlyKeyRef<'_>, (u64, u64)> = BTreeMap::new();

    for event in events {
        let key = (
            event.feature_name.as_str(),
            event.app_name.as_str(),
            event.environment.as_str(),
            event.hour_bucket(),
        );
        let counts = buckets.entry(key).or_insert((0, 0));
        counts.0 = counts.0.saturating_add(event.yes);
        counts.1 = counts.1.saturating_add(event.no);
    }

    let rows = buckets
        .into_iter()
        .map(|((feature, app, environment, hour), (yes, no))| HourlyMetricRecord {
            feature_name: feature.to_owned(),
            app_name: app.to_owned(),
            environment: environment.to_owned(),
            timestamp: hour,
            yes,
            no,
        })
        .collect();

    SortedBatch::from_ordered(rows)
}

/// Flatten per-event variant maps into one row per
/// (feature, app, environment, hour, variant).
///
/// Works on raw events, so two events in the same hour that both report a
/// variant contribute to a single row. Events without variants add nothing.
pub fn spread_variants(events: &[MetricEvent]) -> SortedBatch<VariantMetricRecord> {
    let mut buckets: BTreeMap<VariantKeyRef<'_>, u64> = BTreeMap::new();

    for event in events {
        let hour = event.hour_bucket();
        for (variant, count) in event.variants() {
            let key = (
                event.feature_name.as_str(),
                event.app_name.as_str(),
                event.environment.as_str(),
                hour,
                variant,
            );
            let total = buckets.entry(key).or_insert(0);
            *total = total.saturating_add(count);
        }
    }

    let rows = buckets
        .into_iter()
        .map(
            |((feature, app, environment, hour, variant), count)| VariantMetricRecord {
                feature_name: feature.to_owned(),
                app_name: app.to_owned(),
                environment: environment.to_owned(),
                timestamp: hour,
                variant: variant.to_owned(),
                count,
            },
        )
        .collect();

    SortedBatch::from_ordered(rows)
}

/// Sum `yes + no` per (feature, environment), ignoring app and hour.
pub fn sum_totals(events: &[MetricEvent]) -> SortedBatch<TotalMetricRecord> {
    let mut totals: BTreeMap<TotalKeyRef<'_>, u64> = BTreeMap::new();

    for event in events {
        let key = (event.feature_name.as_str(), event.environment.as_str());
        let total = totals.entry(key).or_insert(0);
        *total = total.saturating_add(event.evaluations());
    }

    let rows = totals
        .into_iter()
        .map(|((feature, environment), total)| TotalMetricRecord {
            feature_name: feature.to_owned(),
            environment: environment.to_owned(),
            total,
        })
        .collect();

    SortedBatch::from_ordered(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, hour, minute, 0).unwrap()
    }

    fn event(feature: &str, app: &str, env: &str, ts: DateTime<Utc>) -> MetricEvent {
        MetricEvent::new(feature, app, env, ts)
    }

    #[test]
    fn test_compaction_sums_within_hour() {
        let events = vec![
            event("f1", "a1", "prod", at(10, 5)).with_counts(3, 1),
            event("f1", "a1", "prod", at(10, 59)).with_counts(5, 0),
            event("f1", "a1", "prod", at(11, 0)).with_counts(1, 1),
        ];

        let batch = compact_hourly(&events);
        let rows = batch.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].yes, rows[0].no), (8, 1));
        assert_eq!(rows[0].timestamp, HourBucket::floor(at(10, 0)));
        assert_eq!((rows[1].yes, rows[1].no), (1, 1));
        assert_eq!(rows[1].timestamp, HourBucket::floor(at(11, 0)));
    }

    #[test]
    fn test_compaction_keeps_apps_and_environments_apart() {
        let events = vec![
            event("f1", "a2", "prod", at(10, 0)).with_counts(1, 0),
            event("f1", "a1", "prod", at(10, 0)).with_counts(1, 0),
            event("f1", "a1", "dev", at(10, 0)).with_counts(1, 0),
        ];

        let batch = compact_hourly(&events);
        let keys: Vec<_> = batch
            .rows()
            .iter()
            .map(|r| (r.app_name.as_str(), r.environment.as_str()))
            .collect();
        assert_eq!(keys, vec![("a1", "dev"), ("a1", "prod"), ("a2", "prod")]);
        assert!(batch.is_strictly_sorted());
    }

    #[test]
    fn test_compaction_does_not_mutate_input() {
        let events = vec![event("f1", "a1", "prod", at(10, 30)).with_counts(2, 2)];
        let before = events.clone();
        let _ = compact_hourly(&events);
        assert_eq!(events, before);
    }

    #[test]
    fn test_spreading_uses_raw_events() {
        let events = vec![
            event("f1", "a1", "prod", at(10, 1))
                .with_counts(3, 1)
                .with_variant("A", 2),
            event("f1", "a1", "prod", at(10, 40))
                .with_counts(5, 0)
                .with_variant("A", 1)
                .with_variant("B", 4),
            event("f1", "a1", "prod", at(10, 50)).with_counts(1, 0),
        ];

        let batch = spread_variants(&events);
        let rows: Vec<_> = batch
            .rows()
            .iter()
            .map(|r| (r.variant.as_str(), r.count))
            .collect();
        assert_eq!(rows, vec![("A", 3), ("B", 4)]);
    }

    #[test]
    fn test_spreading_without_variants_is_empty() {
        let mut empty_map = event("f1", "a1", "prod", at(10, 0));
        empty_map.variants = Some(Default::default());
        let events = vec![event("f1", "a1", "prod", at(10, 0)), empty_map];

        assert!(spread_variants(&events).is_empty());
    }

    #[test]
    fn test_totals_ignore_app_and_hour() {
        let events = vec![
            event("f1", "a1", "prod", at(1, 0)).with_counts(3, 1),
            event("f1", "a2", "prod", at(20, 0)).with_counts(5, 0),
            event("f1", "a1", "dev", at(1, 0)).with_counts(0, 2),
        ];

        let batch = sum_totals(&events);
        let rows: Vec<_> = batch
            .rows()
            .iter()
            .map(|r| (r.environment.as_str(), r.total))
            .collect();
        assert_eq!(rows, vec![("dev", 2), ("prod", 9)]);
    }

    #[test]
    fn test_counts_saturate() {
        let events = vec![
            event("f1", "a1", "prod", at(10, 0)).with_counts(u64::MAX, 0),
            event("f1", "a1", "prod", at(10, 0)).with_counts(1, 0),
        ];

        assert_eq!(compact_hourly(&events).rows()[0].yes, u64::MAX);
        assert_eq!(sum_totals(&events).rows()[0].total, u64::MAX);
    }

    fn arb_event() -> impl Strategy<Value = MetricEvent> {
        (
            prop::sample::select(vec!["f1", "f2"]),
            prop::sample::select(vec!["a1", "a2", "a3"]),
            prop::sample::select(vec!["dev", "prod"]),
            0i64..(72 * 60),
            0u64..1_000,
            0u64..1_000,
            prop::collection::btree_map(
                prop::sample::select(vec!["A".to_string(), "B".to_string(), "C".to_string()]),
                0u64..100,
                0..3,
            ),
        )
            .prop_map(|(f, a, e, minutes, yes, no, variants)| {
                let ts = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
                    + Duration::minutes(minutes);
                let mut ev = MetricEvent::new(f, a, e, ts).with_counts(yes, no);
                if !variants.is_empty() {
                    ev.variants = Some(variants);
                }
                ev
            })
    }

    proptest! {
        #[test]
        fn prop_reducers_are_order_independent(
            events in prop::collection::vec(arb_event(), 0..40),
            seed in any::<u64>(),
        ) {
            let mut shuffled = events.clone();
            // deterministic permutation driven by the seed
            let len = shuffled.len();
            if len > 1 {
                let mut state = seed;
                for i in (1..len).rev() {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    let j = (state >> 33) as usize % (i + 1);
                    shuffled.swap(i, j);
                }
            }

            prop_assert_eq!(compact_hourly(&events), compact_hourly(&shuffled));
            prop_assert_eq!(spread_variants(&events), spread_variants(&shuffled));
            prop_assert_eq!(sum_totals(&events), sum_totals(&shuffled));
        }

        #[test]
        fn prop_compaction_preserves_sums(events in prop::collection::vec(arb_event(), 0..40)) {
            let hourly = compact_hourly(&events);
            let totals = sum_totals(&events);

            let input: u64 = events.iter().map(|e| e.yes + e.no).sum();
            let compacted: u64 = hourly.rows().iter().map(|r| r.yes + r.no).sum();
            let summed: u64 = totals.rows().iter().map(|r| r.total).sum();
            prop_assert_eq!(input, compacted);
            prop_assert_eq!(input, summed);
            prop_assert!(hourly.rows().len() <= events.len());
            prop_assert!(hourly.is_strictly_sorted());
            prop_assert!(totals.is_strictly_sorted());
        }

        #[test]
        fn prop_spreading_never_drops_a_variant(events in prop::collection::vec(arb_event(), 0..40)) {
            let spread = spread_variants(&events);
            prop_assert!(spread.is_strictly_sorted());

            for ev in &events {
                for (name, _) in ev.variants() {
                    let found = spread.rows().iter().any(|r| {
                        r.feature_name == ev.feature_name
                            && r.app_name == ev.app_name
                            && r.environment == ev.environment
                            && r.timestamp == ev.hour_bucket()
                            && r.variant == name
                    });
                    prop_assert!(found);
                }
            }

            let input: u64 = events.iter().flat_map(|e| e.variants()).map(|(_, c)| c).sum();
            let output: u64 = spread.rows().iter().map(|r| r.count).sum();
            prop_assert_eq!(input, output);
        }
    }
}
