//! # GMP Common Library
//!
//! Shared code for the gait monitoring platform services including:
//! - Error and result types
//! - Event types (GmpEvent enum) and the EventBus
//! - Configuration loading and root folder resolution
//! - SSE helpers
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
