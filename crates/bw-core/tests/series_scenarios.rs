//! Multi-burst scenarios for the series tracker and the emitter.
//!
//! Each scenario feeds the tracker one window per burst for a single bus
//! group and checks the episodes that come out, the way a run of live
//! bursts would.

use bw_common::{BusGroupKey, BusId, Direction, LineId};
use bw_config::{Hyperparams, LineHyperparams};
use bw_core::emitter::{current_view, emit};
use bw_core::scoring::WindowSample;
use bw_core::series::{ClosedEpisode, ClosureReason, SeriesTracker, TrackerConfig};
use bw_core::test_log;
use chrono::{DateTime, Duration, TimeZone, Utc};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
}

fn key() -> BusGroupKey {
    BusGroupKey::from_buses(&[BusId(11), BusId(12)]).unwrap()
}

fn window(anomalous: bool, distance: f64, at: DateTime<Utc>) -> WindowSample {
    WindowSample {
        line: LineId::from("44"),
        direction: Direction::Outbound,
        timestamp: at,
        dimension: 1,
        key: key(),
        headways: vec![if anomalous { 40.0 } else { 290.0 }],
        distance,
        threshold: 1.96,
        is_anomalous: anomalous,
    }
}

/// Feed `(seconds after t0, anomalous)` pairs, one burst each.
fn run(tracker: &mut SeriesTracker, bursts: &[(i64, bool)]) -> Vec<ClosedEpisode> {
    let mut closed = Vec::new();
    for &(secs, anomalous) in bursts {
        let at = t0() + Duration::seconds(secs);
        let distance = if anomalous { 4.0 + secs as f64 / 100.0 } else { 0.2 };
        let update = tracker.update_burst(&[window(anomalous, distance, at)], at);
        closed.extend(update.closed);
    }
    closed
}

fn hyperparams(size_threshold: u32) -> Hyperparams {
    let mut hp = Hyperparams::default();
    hp.0.insert(
        LineId::from("44"),
        LineHyperparams {
            confidence: 0.95,
            size_threshold,
        },
    );
    hp
}

#[test]
fn three_anomalous_then_clean_is_one_episode() {
    let mut tracker = SeriesTracker::new(TrackerConfig::default());
    let closed = run(&mut tracker, &[(0, true), (30, true), (60, true), (90, false)]);
    test_log!(INFO, "hysteresis run", closed = closed.len());

    assert_eq!(closed.len(), 1);
    let ep = &closed[0];
    assert_eq!(ep.length, 3);
    assert_eq!(ep.reason, ClosureReason::CleanBreak);
    assert_eq!(ep.started_at, t0());
    assert_eq!(ep.ended_at, t0() + Duration::seconds(60));
    assert_eq!(ep.closed_at, t0() + Duration::seconds(90));
    assert!((ep.max_distance - 4.6).abs() < 1e-9);
    assert!((ep.mean_distance - 4.3).abs() < 1e-9);

    let entry = tracker.get(&key()).unwrap();
    assert!(!entry.last_is_anomalous());
    assert_eq!(entry.consecutive_anomaly_count(), 0);
}

#[test]
fn silence_longer_than_timeout_splits_the_run() {
    let mut tracker = SeriesTracker::new(TrackerConfig::default());
    // 130 s between the second and third anomalous window
    let closed = run(&mut tracker, &[(0, true), (30, true), (160, true), (190, false)]);

    let lengths: Vec<(u32, ClosureReason)> = closed.iter().map(|e| (e.length, e.reason)).collect();
    assert_eq!(
        lengths,
        vec![(2, ClosureReason::Timeout), (1, ClosureReason::CleanBreak)]
    );
    assert_eq!(closed[1].started_at, t0() + Duration::seconds(160));
}

#[test]
fn group_that_disappears_is_expired() {
    let mut tracker = SeriesTracker::new(TrackerConfig::default());
    let mut closed = run(&mut tracker, &[(0, true), (30, true)]);
    assert!(closed.is_empty());

    // Nothing for this group for 301 s after its last window
    let later = t0() + Duration::seconds(331);
    let update = tracker.update_burst(&[], later);
    closed.extend(update.closed);

    assert_eq!(update.removed, 1);
    assert!(tracker.is_empty());
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].length, 2);
    assert_eq!(closed[0].reason, ClosureReason::Expired);
    assert_eq!(closed[0].ended_at, t0() + Duration::seconds(30));
}

#[test]
fn clean_group_expires_without_an_episode() {
    let mut tracker = SeriesTracker::new(TrackerConfig::default());
    run(&mut tracker, &[(0, false)]);
    let update = tracker.update_burst(&[], t0() + Duration::seconds(400));
    assert_eq!(update.removed, 1);
    assert!(update.closed.is_empty());
}

#[test]
fn size_threshold_filters_reportable_events() {
    let mut tracker = SeriesTracker::new(TrackerConfig::default());
    let mut closed = run(&mut tracker, &[(0, true), (30, false)]);
    closed.extend(run(&mut tracker, &[(60, true), (90, true), (120, true), (150, false)]));
    assert_eq!(closed.iter().map(|e| e.length).collect::<Vec<_>>(), vec![1, 3]);

    let emission = emit(&closed, &hyperparams(2));
    assert_eq!(emission.raw.len(), 2);
    assert_eq!(emission.reportable.len(), 1);
    assert_eq!(emission.reportable[0].episode_length, 3);

    // Unlisted lines use the default threshold, which reports nothing
    let none = emit(&closed, &Hyperparams::default());
    assert!(none.reportable.is_empty());
}

#[test]
fn current_view_is_stable_across_repeated_reads() {
    let mut tracker = SeriesTracker::new(TrackerConfig::default());
    let closed = run(
        &mut tracker,
        &[(0, true), (30, true), (60, false), (90, true), (120, true), (150, true), (180, false)],
    );
    let raw = emit(&closed, &hyperparams(2)).raw;
    assert_eq!(raw.len(), 2);

    let first = current_view(raw.clone(), &hyperparams(2), None);
    let second = current_view(raw, &hyperparams(2), None);
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].episode_length, 3);
    assert_eq!(first[0].end_timestamp, t0() + Duration::seconds(150));
}
