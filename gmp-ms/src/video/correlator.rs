//! Measurement-key and nearest-time video lookup

use super::media::infer_media_type;
use super::probe::LivenessProbe;
use crate::gateway::{GatewayError, MeasurementStore};
use crate::models::VideoAsset;
use chrono::{DateTime, Utc};
use gmp_common::config::VideoConfig;
use gmp_common::time::{abs_seconds_between, millis_to_duration};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Lookup infrastructure failed; distinct from "nothing recorded"
#[derive(Debug, Error)]
pub enum CorrelatorError {
    #[error("Video lookup failed: {0}")]
    LookupFailed(#[from] GatewayError),
}

/// Which link of the fallback chain produced the match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    MeasurementId,
    NearestTime,
}

/// A resolved asset plus what the UI needs to present it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedVideo {
    pub asset: VideoAsset,
    pub media_type: &'static str,
    pub inline_playable: bool,
    /// HEAD probe outcome; `None` when probing is off or not applicable
    pub reachable: Option<bool>,
    pub matched_by: MatchedBy,
    /// Distance from the requested time, for nearest-time matches
    pub offset_seconds: Option<i64>,
}

/// Outcome of a lookup that reached the store
#[derive(Debug, Clone, PartialEq)]
pub enum VideoResolution {
    Found(ResolvedVideo),
    NoMatchingAsset,
}

/// Resolution arguments; every field is optional
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoQuery {
    pub measurement_id: Option<String>,
    pub patient_id: Option<i64>,
    pub at: Option<DateTime<Utc>>,
    pub window_seconds: Option<u32>,
}

/// Pick the candidate closest to `at` within `window_seconds`
///
/// Candidates outside the window are ignored even if the store returned
/// them. Equal distances go to the most recently created asset, then the
/// highest id.
pub fn pick_nearest(
    candidates: &[VideoAsset],
    at: DateTime<Utc>,
    window_seconds: u32,
) -> Option<(&VideoAsset, i64)> {
    candidates
        .iter()
        .map(|asset| (asset, abs_seconds_between(&asset.captured_at, &at)))
        .filter(|(_, diff)| *diff <= i64::from(window_seconds))
        .min_by(|(a, da), (b, db)| {
            da.cmp(db)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        })
}

/// Resolves playable evidence for a timeline point
pub struct VideoCorrelator {
    store: Arc<dyn MeasurementStore>,
    default_window_seconds: u32,
    max_window_seconds: u32,
    probe: Option<LivenessProbe>,
}

impl VideoCorrelator {
    pub fn new(store: Arc<dyn MeasurementStore>, config: &VideoConfig) -> Self {
        let probe = if config.probe_liveness {
            LivenessProbe::new(millis_to_duration(config.probe_timeout_ms))
        } else {
            None
        };

        Self {
            store,
            default_window_seconds: config.default_window_seconds,
            max_window_seconds: config.max_window_seconds,
            probe,
        }
    }

    /// Requested window, defaulted and clamped to the configured maximum
    pub fn effective_window(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_window_seconds)
            .min(self.max_window_seconds)
    }

    pub async fn resolve(&self, query: &VideoQuery) -> Result<VideoResolution, CorrelatorError> {
        if let Some(measurement_id) = query.measurement_id.as_deref() {
            if let Some(asset) = self.store.fetch_asset_by_measurement_id(measurement_id).await? {
                debug!(measurement_id, asset_id = asset.id, "Video matched by measurement id");
                return Ok(VideoResolution::Found(
                    self.present(asset, MatchedBy::MeasurementId, None).await,
                ));
            }
            debug!(measurement_id, "No video for measurement id; trying nearest time");
        }

        let (Some(patient_id), Some(at)) = (query.patient_id, query.at) else {
            return Ok(VideoResolution::NoMatchingAsset);
        };

        let window = self.effective_window(query.window_seconds);
        let candidates = self
            .store
            .fetch_assets_near_time(patient_id, at, window)
            .await?;

        match pick_nearest(&candidates, at, window) {
            Some((asset, offset)) => {
                debug!(
                    patient_id,
                    asset_id = asset.id,
                    offset_seconds = offset,
                    candidates = candidates.len(),
                    "Video matched by nearest time"
                );
                let asset = asset.clone();
                Ok(VideoResolution::Found(
                    self.present(asset, MatchedBy::NearestTime, Some(offset))
                        .await,
                ))
            }
            None => Ok(VideoResolution::NoMatchingAsset),
        }
    }

    async fn present(
        &self,
        asset: VideoAsset,
        matched_by: MatchedBy,
        offset_seconds: Option<i64>,
    ) -> ResolvedVideo {
        let media = infer_media_type(&asset.locator);
        let reachable = match &self.probe {
            Some(probe) => probe.check(&asset.locator).await,
            None => None,
        };

        ResolvedVideo {
            asset,
            media_type: media.mime,
            inline_playable: media.inline_playable,
            reachable,
            matched_by,
            offset_seconds,
        }
    }
}

impl std::fmt::Debug for VideoCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoCorrelator")
            .field("default_window_seconds", &self.default_window_seconds)
            .field("max_window_seconds", &self.max_window_seconds)
            .field("probe", &self.probe.is_some())
            .finish()
    }
}
