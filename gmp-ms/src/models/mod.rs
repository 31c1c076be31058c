//! Data models for gmp-ms
//!
//! - Clinical roster records (patients, notes)
//! - Sensor samples and the derived aligned timeline
//! - Measurement session state machine
//! - Video evidence assets

pub mod measurement_session;
pub mod note;
pub mod patient;
pub mod sensor;
pub mod video;

pub use measurement_session::{DeviceCommand, MeasurementSession, SessionFault, StateTransition};
pub use note::{NewNote, Note};
pub use patient::{NewPatient, Patient, PatientUpdate};
pub use sensor::{ChannelId, ChannelSet, NewSensorPoint, SensorPoint, TimelinePoint};
pub use video::{NewVideoAsset, VideoAsset};
