//! Video evidence resolution for timeline points
//!
//! Resolution is a strict fallback chain: exact measurement key first, then
//! nearest capture time for the patient within a bounded window. The result
//! carries a locator and a declared media type; bytes are never streamed
//! from here.

mod correlator;
mod media;
mod probe;

pub use correlator::{
    pick_nearest, CorrelatorError, MatchedBy, ResolvedVideo, VideoCorrelator, VideoQuery,
    VideoResolution,
};
pub use media::{infer_media_type, MediaType};
pub use probe::LivenessProbe;
