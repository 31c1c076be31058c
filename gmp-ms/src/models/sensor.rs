//! Sensor channels, samples and the derived aligned timeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One named sensor stream on the remote controller
///
/// Declaration order is the canonical channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    /// Walking speed (km/h)
    Speed,
    /// Left hand grip pressure (kg)
    PressureLeft,
    /// Right hand grip pressure (kg)
    PressureRight,
    /// Left foot lift-off count
    FootLiftLeft,
    /// Right foot lift-off count
    FootLiftRight,
}

impl ChannelId {
    pub const ALL: [ChannelId; 5] = [
        ChannelId::Speed,
        ChannelId::PressureLeft,
        ChannelId::PressureRight,
        ChannelId::FootLiftLeft,
        ChannelId::FootLiftRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelId::Speed => "speed",
            ChannelId::PressureLeft => "pressure_left",
            ChannelId::PressureRight => "pressure_right",
            ChannelId::FootLiftLeft => "foot_lift_left",
            ChannelId::FootLiftRight => "foot_lift_right",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted sample on one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPoint {
    pub channel: ChannelId,
    pub value: f64,
    pub measured_at: DateTime<Utc>,
    /// Originating measurement, when the device tagged the sample
    pub measurement_id: Option<String>,
}

/// Ingestion body item for POST /api/patients/:id/measurements
#[derive(Debug, Clone, Deserialize)]
pub struct NewSensorPoint {
    pub channel: ChannelId,
    pub value: f64,
    pub measured_at: DateTime<Utc>,
    #[serde(default)]
    pub measurement_id: Option<String>,
}

/// Every channel fetched for one patient
///
/// Channels sample independently, so lengths routinely differ.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelSet {
    pub speed: Vec<SensorPoint>,
    pub pressure_left: Vec<SensorPoint>,
    pub pressure_right: Vec<SensorPoint>,
    pub foot_lift_left: Vec<SensorPoint>,
    pub foot_lift_right: Vec<SensorPoint>,
}

impl ChannelSet {
    /// Bucket points by their channel, preserving arrival order per channel
    pub fn from_points(points: impl IntoIterator<Item = SensorPoint>) -> Self {
        let mut set = Self::default();
        for point in points {
            set.channel_mut(point.channel).push(point);
        }
        set
    }

    pub fn channel(&self, id: ChannelId) -> &[SensorPoint] {
        match id {
            ChannelId::Speed => &self.speed,
            ChannelId::PressureLeft => &self.pressure_left,
            ChannelId::PressureRight => &self.pressure_right,
            ChannelId::FootLiftLeft => &self.foot_lift_left,
            ChannelId::FootLiftRight => &self.foot_lift_right,
        }
    }

    fn channel_mut(&mut self, id: ChannelId) -> &mut Vec<SensorPoint> {
        match id {
            ChannelId::Speed => &mut self.speed,
            ChannelId::PressureLeft => &mut self.pressure_left,
            ChannelId::PressureRight => &mut self.pressure_right,
            ChannelId::FootLiftLeft => &mut self.foot_lift_left,
            ChannelId::FootLiftRight => &mut self.foot_lift_right,
        }
    }

    /// Sample count per channel name
    pub fn lengths(&self) -> BTreeMap<String, usize> {
        ChannelId::ALL
            .iter()
            .map(|id| (id.as_str().to_string(), self.channel(*id).len()))
            .collect()
    }

    pub fn total_points(&self) -> usize {
        ChannelId::ALL.iter().map(|id| self.channel(*id).len()).sum()
    }
}

/// One aligned chart position; derived on every read, never stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    /// 0-based position in the aligned sequence
    pub index: usize,
    /// 1-based human-readable sequence number
    pub sequence: usize,
    /// Display label, e.g. "Measurement 3"
    pub label: String,
    /// Timestamp of the grouping's first channel at this position
    pub measured_at: DateTime<Utc>,
    /// Measurement tag of the first channel's sample, used for video lookup
    pub measurement_id: Option<String>,
    pub values: BTreeMap<ChannelId, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(channel: ChannelId, value: f64) -> SensorPoint {
        SensorPoint {
            channel,
            value,
            measured_at: Utc::now(),
            measurement_id: None,
        }
    }

    #[test]
    fn test_channel_names_roundtrip() {
        for id in ChannelId::ALL {
            assert_eq!(ChannelId::parse(id.as_str()), Some(id));
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{}\"", id.as_str()));
        }
        assert_eq!(ChannelId::parse("temperature"), None);
    }

    #[test]
    fn test_from_points_buckets_by_channel() {
        let set = ChannelSet::from_points(vec![
            point(ChannelId::Speed, 1.0),
            point(ChannelId::PressureLeft, 2.0),
            point(ChannelId::Speed, 3.0),
        ]);

        assert_eq!(set.speed.len(), 2);
        assert_eq!(set.speed[1].value, 3.0);
        assert_eq!(set.pressure_left.len(), 1);
        assert!(set.foot_lift_right.is_empty());
        assert_eq!(set.total_points(), 3);

        let lengths = set.lengths();
        assert_eq!(lengths["speed"], 2);
        assert_eq!(lengths["foot_lift_left"], 0);
    }
}
