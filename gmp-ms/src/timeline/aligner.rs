use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::models::{ChannelId, ChannelSet, SensorPoint, TimelinePoint};

/// Chart groupings; each lists its channels in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelGrouping {
    Speed,
    Pressure,
    FootLift,
    #[default]
    All,
}

impl ChannelGrouping {
    pub fn channels(self) -> &'static [ChannelId] {
        match self {
            ChannelGrouping::Speed => &[ChannelId::Speed],
            ChannelGrouping::Pressure => &[ChannelId::PressureLeft, ChannelId::PressureRight],
            ChannelGrouping::FootLift => &[ChannelId::FootLiftLeft, ChannelId::FootLiftRight],
            ChannelGrouping::All => &ChannelId::ALL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelGrouping::Speed => "speed",
            ChannelGrouping::Pressure => "pressure",
            ChannelGrouping::FootLift => "foot_lift",
            ChannelGrouping::All => "all",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            ChannelGrouping::Speed,
            ChannelGrouping::Pressure,
            ChannelGrouping::FootLift,
            ChannelGrouping::All,
        ]
        .into_iter()
        .find(|g| g.as_str() == value)
    }
}

/// What truncation-to-shortest cost for one alignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentDiagnostics {
    pub channel_lengths: BTreeMap<ChannelId, usize>,
    pub aligned_len: usize,
    /// Tail samples dropped across all channels of the grouping
    pub discarded_samples: usize,
}

impl AlignmentDiagnostics {
    pub fn is_mismatched(&self) -> bool {
        self.discarded_samples > 0
    }
}

/// Aligned view for one grouping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedTimeline {
    pub grouping: ChannelGrouping,
    pub points: Vec<TimelinePoint>,
    pub diagnostics: AlignmentDiagnostics,
}

/// Align the given channels into one ordered sequence
///
/// The first entry of `channels` supplies each point's timestamp and
/// measurement tag. Returns an empty sequence when `channels` is empty or any
/// channel has no samples.
pub fn align(channels: &[(ChannelId, &[SensorPoint])]) -> Vec<TimelinePoint> {
    if channels.is_empty() {
        return Vec::new();
    }

    // Stable sort: equal timestamps keep their fetch order
    let sorted: Vec<(ChannelId, Vec<&SensorPoint>)> = channels
        .iter()
        .map(|(id, points)| {
            let mut refs: Vec<&SensorPoint> = points.iter().collect();
            refs.sort_by_key(|p| p.measured_at);
            (*id, refs)
        })
        .collect();

    let len = sorted.iter().map(|(_, pts)| pts.len()).min().unwrap_or(0);
    let (_, canonical) = &sorted[0];

    (0..len)
        .map(|i| {
            let anchor = canonical[i];
            TimelinePoint {
                index: i,
                sequence: i + 1,
                label: format!("Measurement {}", i + 1),
                measured_at: anchor.measured_at,
                measurement_id: anchor.measurement_id.clone(),
                values: sorted.iter().map(|(id, pts)| (*id, pts[i].value)).collect(),
            }
        })
        .collect()
}

/// Align one chart grouping out of a fetched channel set
pub fn align_grouping(set: &ChannelSet, grouping: ChannelGrouping) -> AlignedTimeline {
    let channels: Vec<(ChannelId, &[SensorPoint])> = grouping
        .channels()
        .iter()
        .map(|id| (*id, set.channel(*id)))
        .collect();

    let points = align(&channels);
    let aligned_len = points.len();
    let channel_lengths: BTreeMap<ChannelId, usize> =
        channels.iter().map(|(id, pts)| (*id, pts.len())).collect();
    let discarded_samples = channel_lengths
        .values()
        .map(|len| len - aligned_len)
        .sum();

    let diagnostics = AlignmentDiagnostics {
        channel_lengths,
        aligned_len,
        discarded_samples,
    };

    if diagnostics.is_mismatched() {
        debug!(
            grouping = grouping.as_str(),
            aligned_len,
            discarded_samples,
            lengths = ?diagnostics.channel_lengths,
            "Channel lengths differ; truncated to shortest"
        );
    }

    AlignedTimeline {
        grouping,
        points,
        diagnostics,
    }
}

/// Process-wide tally of lossy alignments, reported by /health
#[derive(Debug, Default)]
pub struct AlignmentCounters {
    alignments: AtomicU64,
    mismatched_alignments: AtomicU64,
    discarded_samples: AtomicU64,
}

/// Point-in-time copy of [`AlignmentCounters`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlignmentCountersSnapshot {
    pub alignments: u64,
    pub mismatched_alignments: u64,
    pub discarded_samples: u64,
}

impl AlignmentCounters {
    pub fn record(&self, diagnostics: &AlignmentDiagnostics) {
        self.alignments.fetch_add(1, Ordering::Relaxed);
        if diagnostics.is_mismatched() {
            self.mismatched_alignments.fetch_add(1, Ordering::Relaxed);
            self.discarded_samples
                .fetch_add(diagnostics.discarded_samples as u64, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> AlignmentCountersSnapshot {
        AlignmentCountersSnapshot {
            alignments: self.alignments.load(Ordering::Relaxed),
            mismatched_alignments: self.mismatched_alignments.load(Ordering::Relaxed),
            discarded_samples: self.discarded_samples.load(Ordering::Relaxed),
        }
    }
}
