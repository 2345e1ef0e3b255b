// crates/core/src/aggregator.rs
//! Realtime state aggregation for the live dashboard.
//!
//! [`RealtimeAggregator`] is the only writer of the live frame snapshot, the
//! rolling time-series window, and the anomaly-evidence set. Everyone else
//! reads through the accessor methods, which hand out borrowed or copied
//! views.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::message::RealtimeTelemetry;
use crate::types::{AnomalyEvidence, FrameSnapshot, TimeSeriesPoint};

/// Maximum number of points kept in the live chart window.
pub const SERIES_CAPACITY: usize = 100;

/// What one `apply_telemetry` call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// A new anomaly-evidence entry was recorded.
    pub evidence_inserted: bool,
    /// The oldest chart point was evicted to make room.
    pub evicted: bool,
}

#[derive(Debug)]
pub struct RealtimeAggregator {
    snapshot: FrameSnapshot,
    series: VecDeque<TimeSeriesPoint>,
    /// Keyed by frame index: at most one entry per frame, iterated ascending.
    evidence: BTreeMap<u64, AnomalyEvidence>,
}

impl Default for RealtimeAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeAggregator {
    pub fn new() -> Self {
        Self {
            snapshot: FrameSnapshot::default(),
            series: VecDeque::with_capacity(SERIES_CAPACITY + 1),
            evidence: BTreeMap::new(),
        }
    }

    /// Apply one realtime event. This is the sole mutator besides [`reset`].
    ///
    /// Duplicate abnormal frames keep the first evidence seen for that frame
    /// index; later ones are ignored even if their image reference differs.
    ///
    /// [`reset`]: RealtimeAggregator::reset
    pub fn apply_telemetry(
        &mut self,
        telemetry: &RealtimeTelemetry,
        observed_at: DateTime<Utc>,
    ) -> ApplyOutcome {
        self.snapshot = FrameSnapshot {
            frame_index: telemetry.frame,
            people_count: telemetry.human_count,
            violation_count: telemetry.violate_count,
            is_abnormal: telemetry.abnormal,
            is_restricted_entry: telemetry.restricted_entry,
            preview_image: telemetry.frame_image.clone(),
        };

        let mut evidence_inserted = false;
        if let Some(evidence_ref) = telemetry.evidence_ref() {
            if let std::collections::btree_map::Entry::Vacant(slot) =
                self.evidence.entry(telemetry.frame)
            {
                slot.insert(AnomalyEvidence {
                    frame_index: telemetry.frame,
                    evidence_image_ref: evidence_ref.to_string(),
                    people_count: telemetry.human_count,
                    violation_count: telemetry.violate_count,
                    restricted_entry: telemetry.restricted_entry,
                    observed_at: Some(observed_at),
                });
                evidence_inserted = true;
            } else {
                debug!(frame = telemetry.frame, "duplicate anomaly evidence ignored");
            }
        }

        self.series.push_back(TimeSeriesPoint {
            frame_index: telemetry.frame,
            people_count: telemetry.human_count,
            violation_count: telemetry.violate_count,
            abnormal_flag: u8::from(telemetry.abnormal),
        });
        let evicted = self.series.len() > SERIES_CAPACITY;
        if evicted {
            self.series.pop_front();
        }

        ApplyOutcome {
            evidence_inserted,
            evicted,
        }
    }

    /// Back to the zero state. Called at the start of every upload.
    pub fn reset(&mut self) {
        self.snapshot = FrameSnapshot::default();
        self.series.clear();
        self.evidence.clear();
    }

    pub fn snapshot(&self) -> &FrameSnapshot {
        &self.snapshot
    }

    /// Chart points, oldest first.
    pub fn series(&self) -> impl ExactSizeIterator<Item = &TimeSeriesPoint> + '_ {
        self.series.iter()
    }

    pub fn series_len(&self) -> usize {
        self.series.len()
    }

    /// Evidence entries in ascending frame order.
    pub fn evidence(&self) -> impl ExactSizeIterator<Item = &AnomalyEvidence> + '_ {
        self.evidence.values()
    }

    pub fn evidence_len(&self) -> usize {
        self.evidence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_zero() && self.series.is_empty() && self.evidence.is_empty()
    }
}
