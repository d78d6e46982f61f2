//! # Telemetry Module
//!
//! Buffering and persistence of sensor readings.
//!
//! This module handles:
//! - Keeping the most recent readings of each channel in memory
//! - Spilling older readings into an on-disk JSON array log
//! - Finalizing the log into a timestamped file for upload
//! - Running the per-channel polling loops

pub mod channel;
pub mod log_appender;
pub mod scheduler;
