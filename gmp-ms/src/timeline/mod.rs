//! Multi-channel timeline alignment
//!
//! Channels are sampled independently by the controller. The aligner re-sorts
//! each channel by `measured_at` and pairs samples index by index, truncating
//! to the shortest channel of the requested grouping. Tail samples on longer
//! channels have no partner and are dropped from the aligned view; they stay
//! available through the raw channel reads. Every drop is reported in
//! [`AlignmentDiagnostics`] so operators can see how often it happens.

mod aligner;

pub use aligner::{
    align, align_grouping, AlignedTimeline, AlignmentCounters,
    AlignmentCountersSnapshot, AlignmentDiagnostics, ChannelGrouping,
};
