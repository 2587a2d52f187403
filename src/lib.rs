//! # Sensor Uplink Library
//!
//! Collect telemetry frames from a serial-attached sensor board, buffer them
//! on disk and upload them to a remote document store on a fixed schedule.
//!
//! The pipeline tolerates an unreachable network or store: every parsed
//! frame lands in the local buffer first, and unsent batches are replayed on
//! a later cycle.

pub mod buffer;
pub mod config;
pub mod error;
pub mod logging;
pub mod probe;
pub mod scheduler;
pub mod sensor;
pub mod serial;
pub mod store;
