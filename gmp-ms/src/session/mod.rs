//! Measurement session orchestration
//!
//! - [`SessionRegistry`]: process-wide per-patient slots, each with its own
//!   lifecycle guard, so different patients never contend on a shared lock
//! - [`SessionController`]: start/stop/settle state machine and timeline reads
//! - [`recorder`]: persists transitions from the event bus into history

mod controller;
pub mod recorder;
mod registry;

pub use controller::{SessionController, SessionSettings, TimelineError};
pub use registry::{PatientSlot, SessionRegistry};
