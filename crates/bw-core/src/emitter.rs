//! Turning closed episodes into anomaly events.
//!
//! Every episode becomes an [`AnomalyEvent`] in the raw log. Only episodes
//! at least as long as the line's `size_threshold` are reportable.

use crate::series::{ClosedEpisode, ClosureReason};
use bw_common::{BusGroupKey, BusId, Direction, LineId};
use bw_config::Hyperparams;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub id: Uuid,
    pub line: LineId,
    pub direction: Direction,
    pub bus_ids: BusGroupKey,
    pub dimension: usize,
    pub episode_length: u32,
    pub mean_distance: f64,
    pub max_distance: f64,
    pub started_at: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub reason: ClosureReason,
}

impl AnomalyEvent {
    pub fn from_episode(episode: &ClosedEpisode) -> Self {
        AnomalyEvent {
            id: Uuid::new_v4(),
            line: episode.line.clone(),
            direction: episode.direction,
            bus_ids: episode.key,
            dimension: episode.dimension,
            episode_length: episode.length,
            mean_distance: episode.mean_distance,
            max_distance: episode.max_distance,
            started_at: episode.started_at,
            end_timestamp: episode.ended_at,
            closed_at: episode.closed_at,
            reason: episode.reason,
        }
    }

    pub fn buses(&self) -> &[BusId] {
        self.bus_ids.buses()
    }
}

pub fn is_reportable(event: &AnomalyEvent, hyperparams: &Hyperparams) -> bool {
    event.episode_length >= hyperparams.for_line(&event.line).size_threshold
}

/// Events of one burst: all of them, and the reportable subset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Emission {
    pub raw: Vec<AnomalyEvent>,
    pub reportable: Vec<AnomalyEvent>,
}

pub fn emit(episodes: &[ClosedEpisode], hyperparams: &Hyperparams) -> Emission {
    let raw: Vec<AnomalyEvent> = episodes.iter().map(AnomalyEvent::from_episode).collect();
    let reportable = raw
        .iter()
        .filter(|e| is_reportable(e, hyperparams))
        .cloned()
        .collect();
    Emission { raw, reportable }
}

/// Most recent reportable event per bus group, newest first.
pub fn current_view(
    events: impl IntoIterator<Item = AnomalyEvent>,
    hyperparams: &Hyperparams,
    line: Option<&LineId>,
) -> Vec<AnomalyEvent> {
    let mut latest: HashMap<(LineId, BusGroupKey), AnomalyEvent> = HashMap::new();
    for event in events {
        if line.is_some_and(|l| *l != event.line) || !is_reportable(&event, hyperparams) {
            continue;
        }
        let slot = (event.line.clone(), event.bus_ids);
        match latest.get(&slot) {
            Some(seen) if (seen.end_timestamp, seen.closed_at) > (event.end_timestamp, event.closed_at) => {}
            _ => {
                latest.insert(slot, event);
            }
        }
    }
    let mut view: Vec<AnomalyEvent> = latest.into_values().collect();
    view.sort_by(|a, b| {
        b.end_timestamp
            .cmp(&a.end_timestamp)
            .then_with(|| a.line.cmp(&b.line))
            .then_with(|| a.bus_ids.cmp(&b.bus_ids))
    });
    view
}
