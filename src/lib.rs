//! # Telemetry Gateway Library
//!
//! Ground-station gateway between a local instrument bridge and the pilot UI.
//!
//! This library provides:
//! - Per-sensor channels with a bounded in-memory history and a disk-backed
//!   JSON array log ([`telemetry`])
//! - Independent periodic pollers fed by bridge or simulated fetchers
//!   ([`bridge`], [`telemetry::scheduler`])
//! - Serial link supervision through the bridge ([`port`])
//! - Servo response curve inversion ([`calibration`], [`sensors::servo`])
//! - Log upload backends ([`storage`]) and the HTTP API ([`server`])

pub mod app;
pub mod bridge;
pub mod calibration;
pub mod config;
pub mod error;
pub mod port;
pub mod sensors;
pub mod server;
pub mod storage;
pub mod telemetry;
