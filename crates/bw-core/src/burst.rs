//! One polling cycle, from snapshot to anomaly events.
//!
//! [`Detector`] owns everything that outlives a burst: the loaded config,
//! the hyperparameter source, the series tracker and the fingerprint of the
//! last processed snapshot. [`Detector::process`] runs
//! clean → extract → window/score → track → emit for every line and hands
//! back what must be persisted; [`Detector::persist`] writes it.
//!
//! Lines are independent. A line that cannot be scored is recorded in
//! [`BurstReport::line_failures`] and the rest of the burst carries on.

use crate::emitter::{emit, Emission};
use crate::headway::{extract_line, ExtractNote, HeadwayRecord, LineHeadways};
use crate::ingest::{clean_samples, CleanSample, DropReason, Snapshot};
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::persist::{
    DataStore, HeadwayLog, PersistError, SeriesEnvelope, StateLoad, ANOMALIES_FILE,
    RAW_ANOMALIES_FILE,
};
use crate::scoring::{score_line, LineScores, ScoreSkip, ThresholdCache, WindowSample};
use crate::series::{SeriesTracker, TrackerConfig};
use bw_common::LineId;
use bw_config::{HyperparamOrigin, Hyperparams, LoadedConfig, TimeSlot};
use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Why one line produced no scores this burst.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LineError {
    #[error("line {line} is not in the topology")]
    UnknownLine { line: LineId },

    #[error("no model slice for line {line} at {slot}")]
    MissingSlice { line: LineId, slot: TimeSlot },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BurstReport {
    pub burst_id: String,
    pub taken_at: Option<DateTime<Utc>>,
    pub slot: Option<String>,
    pub samples_kept: usize,
    pub samples_dropped: BTreeMap<DropReason, usize>,
    pub headways_per_line: BTreeMap<LineId, usize>,
    pub windows_per_dimension: BTreeMap<usize, usize>,
    pub anomalous_windows: usize,
    pub entries_tracked: usize,
    pub entries_anomalous: usize,
    pub entries_removed: usize,
    pub episodes_closed: usize,
    pub reportable: usize,
    pub hyperparams_origin: Option<HyperparamOrigin>,
    pub line_failures: BTreeMap<LineId, String>,
}

/// Everything a processed burst leaves to persist.
#[derive(Debug, Clone)]
pub struct BurstOutput {
    pub report: BurstReport,
    pub headways: HeadwayLog,
    pub emission: Emission,
}

#[derive(Debug, Clone)]
pub enum BurstOutcome {
    Processed(Box<BurstOutput>),
    /// Same samples as the last processed burst; nothing touched.
    Unchanged,
    /// No hour range covers the snapshot time; nothing touched.
    OutsideServiceHours,
}

struct LineRun {
    headways: LineHeadways,
    scores: Result<LineScores, LineError>,
}

pub struct Detector {
    config: LoadedConfig,
    hyperparams: bw_config::HyperparamSource,
    tracker: SeriesTracker,
    thresholds: ThresholdCache,
    last_fingerprint: Option<String>,
    ctx: LogContext,
}

impl Detector {
    pub fn new(config: LoadedConfig, ctx: LogContext) -> Self {
        Self::with_tracker_config(config, ctx, TrackerConfig::default())
    }

    pub fn with_tracker_config(config: LoadedConfig, ctx: LogContext, tracker: TrackerConfig) -> Self {
        let hyperparams = bw_config::HyperparamSource::new(config.hyperparams_path());
        Detector {
            config,
            hyperparams,
            tracker: SeriesTracker::new(tracker),
            thresholds: ThresholdCache::new(),
            last_fingerprint: None,
            ctx,
        }
    }

    pub fn config(&self) -> &LoadedConfig {
        &self.config
    }

    pub fn tracker(&self) -> &SeriesTracker {
        &self.tracker
    }

    pub fn last_fingerprint(&self) -> Option<&str> {
        self.last_fingerprint.as_deref()
    }

    pub fn context(&self) -> &LogContext {
        &self.ctx
    }

    /// Time slot for a snapshot, in the host's local time.
    pub fn slot_for(&self, taken_at: DateTime<Utc>) -> Option<TimeSlot> {
        self.config
            .calendar
            .slot_at(taken_at.with_timezone(&Local).naive_local())
    }

    /// Adopt persisted series state if it is fresh enough.
    pub fn restore(
        &mut self,
        store: &DataStore,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<StateLoad, PersistError> {
        let load = store.load_series(now, max_age)?;
        let ctx = &self.ctx;
        match &load {
            StateLoad::Fresh(envelope) => {
                if envelope.config_hash != self.config.snapshot.combined_hash {
                    log_event!(ctx, WARN, event_names::STATE_LOADED, Stage::Init,
                        "series state was saved under a different configuration",
                        saved_hash = %envelope.config_hash,
                        current_hash = %self.config.snapshot.combined_hash);
                }
                self.tracker = SeriesTracker::from_entries(
                    envelope.entries.iter().cloned(),
                    self.tracker.config(),
                );
                self.last_fingerprint = envelope.snapshot_fingerprint.clone();
                log_event!(ctx, INFO, event_names::STATE_LOADED, Stage::Init,
                    "series state restored",
                    entries = envelope.entries.len(),
                    saved_at = %envelope.saved_at);
            }
            StateLoad::Stale { age_secs } => {
                log_event!(ctx, WARN, event_names::STATE_RESET, Stage::Init,
                    "series state too old, starting empty", age_secs = *age_secs);
            }
            StateLoad::Corrupted { reason } => {
                log_event!(ctx, WARN, event_names::STATE_RESET, Stage::Init,
                    "series state unreadable, starting empty", reason = %reason);
            }
            StateLoad::Missing => {
                log_event!(ctx, DEBUG, event_names::STATE_RESET, Stage::Init,
                    "no series state, starting empty");
            }
        }
        Ok(load)
    }

    /// Run one burst.
    pub fn process(&mut self, snapshot: &Snapshot) -> BurstOutcome {
        let fingerprint = snapshot.fingerprint();
        if self.last_fingerprint.as_deref() == Some(fingerprint) {
            let ctx = &self.ctx;
            log_event!(ctx, DEBUG, event_names::BURST_SKIPPED_UNCHANGED, Stage::Ingest,
                "snapshot unchanged, skipping", taken_at = %snapshot.taken_at);
            return BurstOutcome::Unchanged;
        }

        let now = snapshot.taken_at;
        let Some(slot) = self.slot_for(now) else {
            let ctx = &self.ctx;
            log_event!(ctx, INFO, event_names::BURST_DEFERRED, Stage::Ingest,
                "outside service hours", taken_at = %now);
            return BurstOutcome::OutsideServiceHours;
        };

        let burst_id = format!(
            "burst-{}-{}",
            now.format("%Y%m%dT%H%M%SZ"),
            fingerprint.get(..8).unwrap_or(fingerprint)
        );
        let ctx = self.ctx.clone().with_burst_id(burst_id.clone());
        log_event!(ctx, INFO, event_names::BURST_STARTED, Stage::Ingest,
            "burst started", slot = %slot, samples = snapshot.samples.len());

        let hp = self.hyperparams.refresh();
        if let Some(err) = &hp.error {
            log_event!(ctx, WARN, event_names::HYPERPARAMS_FALLBACK, Stage::Init,
                "hyperparameters unavailable, using fallback",
                origin = ?hp.origin, error = %err);
        }

        let (by_line, cleaned) = clean_samples(snapshot, &self.config.topology);
        log_event!(ctx, DEBUG, event_names::INGEST_CLEANED, Stage::Ingest,
            "samples cleaned", kept = cleaned.kept, dropped = cleaned.dropped_total());

        let mut report = BurstReport {
            burst_id,
            taken_at: Some(now),
            slot: Some(slot.to_string()),
            samples_kept: cleaned.kept,
            samples_dropped: cleaned.dropped,
            hyperparams_origin: Some(hp.origin),
            ..BurstReport::default()
        };

        let mut records: Vec<HeadwayRecord> = Vec::new();
        let mut samples: Vec<WindowSample> = Vec::new();
        for (line, line_samples) in &by_line {
            let run = self.run_line(&ctx, line, line_samples, slot, now, &hp.values);
            report
                .headways_per_line
                .insert(line.clone(), run.headways.headway_count());
            records.extend(run.headways.records().cloned());
            match run.scores {
                Ok(scores) => {
                    for (d, n) in scores.windows_by_dimension {
                        *report.windows_per_dimension.entry(d).or_insert(0) += n;
                    }
                    samples.extend(scores.samples);
                }
                Err(err) => {
                    log_event!(ctx, WARN, event_names::LINE_FAILED, Stage::Score,
                        "line not scored this burst", line = %line, error = %err);
                    report.line_failures.insert(line.clone(), err.to_string());
                }
            }
        }
        report.anomalous_windows = samples.iter().filter(|s| s.is_anomalous).count();

        let update = self.tracker.update_burst(&samples, now);
        for ep in &update.closed {
            log_event!(ctx, DEBUG, event_names::TRACK_EPISODE_CLOSED, Stage::Track,
                "episode closed", line = %ep.line, buses = %ep.key,
                length = ep.length, reason = %ep.reason);
        }
        if update.removed > 0 {
            log_event!(ctx, DEBUG, event_names::TRACK_SWEPT, Stage::Track,
                "stale series removed", removed = update.removed);
        }

        let emission = emit(&update.closed, &hp.values);
        for event in &emission.reportable {
            log_event!(ctx, INFO, event_names::EMIT_REPORTABLE, Stage::Emit,
                "bunching episode", line = %event.line, buses = %event.bus_ids,
                dimension = event.dimension, length = event.episode_length,
                mean_distance = event.mean_distance);
        }

        report.entries_tracked = self.tracker.len();
        report.entries_anomalous = self.tracker.anomalous_count();
        report.entries_removed = update.removed;
        report.episodes_closed = update.closed.len();
        report.reportable = emission.reportable.len();
        self.last_fingerprint = Some(fingerprint.to_string());

        log_event!(ctx, INFO, event_names::BURST_FINISHED, Stage::Emit,
            "burst finished",
            headways = records.iter().filter(|r| !r.is_lead()).count(),
            anomalous_windows = report.anomalous_windows,
            tracked = report.entries_tracked,
            closed = report.episodes_closed,
            reportable = report.reportable);

        BurstOutcome::Processed(Box::new(BurstOutput {
            report,
            headways: HeadwayLog {
                taken_at: now,
                records,
            },
            emission,
        }))
    }

    fn run_line(
        &mut self,
        ctx: &LogContext,
        line: &LineId,
        samples: &[CleanSample],
        slot: TimeSlot,
        now: DateTime<Utc>,
        hyperparams: &Hyperparams,
    ) -> LineRun {
        let Some(topology) = self.config.topology.line(line) else {
            return LineRun {
                headways: LineHeadways::default(),
                scores: Err(LineError::UnknownLine { line: line.clone() }),
            };
        };

        let extraction = extract_line(line, samples, topology, &self.config.travel_times, slot, now);
        for note in &extraction.notes {
            match note {
                ExtractNote::SegmentMissing { direction, from } => {
                    log_event!(ctx, WARN, event_names::EXTRACT_SEGMENT_MISSING, Stage::Extract,
                        "no travel time for segment, upstream stops ignored",
                        line = %line, direction = %direction, from = %from, slot = %slot);
                }
                ExtractNote::DirectionEmpty { direction, buses } => {
                    log_event!(ctx, DEBUG, event_names::EXTRACT_DIRECTION_EMPTY, Stage::Extract,
                        "direction has fewer than two buses",
                        line = %line, direction = %direction, buses = *buses);
                }
            }
        }
        let headways = extraction.headways;
        if headways.is_empty() {
            log_event!(ctx, DEBUG, event_names::EXTRACT_LINE_EMPTY, Stage::Extract,
                "no headways for line", line = %line);
            return LineRun {
                headways,
                scores: Ok(LineScores::default()),
            };
        }

        let Some(slice) = self.config.models.slice(line, slot) else {
            log_event!(ctx, WARN, event_names::SCORE_MISSING_SLICE, Stage::Score,
                "no model slice", line = %line, slot = %slot);
            return LineRun {
                headways,
                scores: Err(LineError::MissingSlice {
                    line: line.clone(),
                    slot,
                }),
            };
        };

        let confidence = hyperparams.for_line(line).confidence;
        let scores = score_line(&headways, slice, confidence, &mut self.thresholds);
        for skip in &scores.skipped {
            log_skip(ctx, line, slot, skip);
        }
        LineRun {
            headways,
            scores: Ok(scores),
        }
    }

    /// Write a processed burst's outputs and the current series state.
    pub fn persist(&self, store: &DataStore, output: &BurstOutput) -> Result<(), PersistError> {
        store.write_headways(&output.headways)?;
        store.append_anomalies(RAW_ANOMALIES_FILE, &output.emission.raw)?;
        store.append_anomalies(ANOMALIES_FILE, &output.emission.reportable)?;
        let envelope = SeriesEnvelope::new(
            Utc::now(),
            &self.config.snapshot.combined_hash,
            self.last_fingerprint.as_deref(),
            self.tracker.entries().cloned().collect(),
        );
        store.save_series(&envelope)?;
        Ok(())
    }
}

fn log_skip(ctx: &LogContext, line: &LineId, slot: TimeSlot, skip: &ScoreSkip) {
    if skip.is_singular() {
        log_event!(ctx, WARN, event_names::SCORE_SINGULAR_COVARIANCE, Stage::Score,
            "covariance unusable, dimension skipped",
            line = %line, slot = %slot, dimension = skip.dimension(), error = %skip);
    } else {
        log_event!(ctx, WARN, event_names::SCORE_MISSING_MODEL, Stage::Score,
            "dimension skipped",
            line = %line, slot = %slot, dimension = skip.dimension(), error = %skip);
    }
}
