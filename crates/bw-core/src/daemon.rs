//! The `watch` loop.
//!
//! Each poll reads the snapshot file and hands it to the [`Detector`]:
//!
//! - **processed**: outputs persisted, short sleep
//! - **unchanged**: short sleep
//! - **outside service hours**: long sleep
//! - **unreadable**: logged, short sleep (the poller may be mid-write)
//!
//! A failed write is logged and the loop carries on; the next processed
//! burst rewrites the state file in full.

use crate::burst::{BurstOutcome, BurstReport, Detector};
use crate::ingest::Snapshot;
use crate::log_event;
use crate::logging::{event_names, Stage};
use crate::persist::DataStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub snapshot_path: PathBuf,
    /// Seconds between polls.
    pub poll_secs: u64,
    /// Seconds to wait when outside service hours.
    pub defer_secs: u64,
    /// Stop after this many polls, whatever their outcome.
    pub max_bursts: Option<u64>,
}

impl WatchConfig {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        WatchConfig {
            snapshot_path: snapshot_path.into(),
            poll_secs: 5,
            defer_secs: 120,
            max_bursts: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loop state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollKind {
    Processed,
    Unchanged,
    Deferred,
    Unreadable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchSummary {
    pub polls: u64,
    pub processed: u64,
    pub unchanged: u64,
    pub deferred: u64,
    pub unreadable: u64,
    pub persist_failures: u64,
    pub episodes_closed: u64,
    pub reportable: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report: Option<BurstReport>,
}

impl WatchSummary {
    fn record(&mut self, kind: PollKind) {
        self.polls += 1;
        match kind {
            PollKind::Processed => self.processed += 1,
            PollKind::Unchanged => self.unchanged += 1,
            PollKind::Deferred => self.deferred += 1,
            PollKind::Unreadable => self.unreadable += 1,
        }
    }
}

/// Something that can wait. Tests pass a recorder instead of sleeping.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ---------------------------------------------------------------------------
// Core loop
// ---------------------------------------------------------------------------

/// One poll: read, process, persist.
pub fn poll_once(
    detector: &mut Detector,
    store: &DataStore,
    config: &WatchConfig,
    summary: &mut WatchSummary,
) -> PollKind {
    let snapshot = match Snapshot::read(&config.snapshot_path) {
        Ok(s) => s,
        Err(err) => {
            let ctx = detector.context();
            log_event!(ctx, WARN, event_names::INGEST_UNREADABLE, Stage::Daemon,
                "snapshot unreadable", error = %err);
            summary.record(PollKind::Unreadable);
            return PollKind::Unreadable;
        }
    };

    let kind = match detector.process(&snapshot) {
        BurstOutcome::Unchanged => PollKind::Unchanged,
        BurstOutcome::OutsideServiceHours => PollKind::Deferred,
        BurstOutcome::Processed(output) => {
            if let Err(err) = detector.persist(store, &output) {
                let ctx = detector.context();
                log_event!(ctx, ERROR, event_names::PERSIST_FAILED, Stage::Persist,
                    "failed to write burst outputs", error = %err);
                summary.persist_failures += 1;
            }
            summary.episodes_closed += output.report.episodes_closed as u64;
            summary.reportable += output.report.reportable as u64;
            summary.last_report = Some(output.report);
            PollKind::Processed
        }
    };
    summary.record(kind);
    kind
}

/// Poll until `max_bursts` polls have run (forever when unset).
pub fn run_watch<S: Sleeper>(
    detector: &mut Detector,
    store: &DataStore,
    config: &WatchConfig,
    sleeper: &mut S,
) -> WatchSummary {
    let mut summary = WatchSummary::default();
    {
        let ctx = detector.context();
        log_event!(ctx, INFO, event_names::RUN_STARTED, Stage::Daemon,
            "watch started",
            snapshot = %config.snapshot_path.display(),
            poll_secs = config.poll_secs);
    }

    loop {
        let kind = poll_once(detector, store, config, &mut summary);
        if config.max_bursts.is_some_and(|max| summary.polls >= max) {
            break;
        }
        let wait = match kind {
            PollKind::Deferred => config.defer_secs,
            _ => config.poll_secs,
        };
        sleeper.sleep(Duration::from_secs(wait));
    }

    let ctx = detector.context();
    log_event!(ctx, INFO, event_names::RUN_FINISHED, Stage::Daemon,
        "watch finished",
        polls = summary.polls,
        processed = summary.processed,
        reportable = summary.reportable);
    summary
}
