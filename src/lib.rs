//! aeroqueue - A durable, bounded, disk-backed record queue
//!
//! Producers append small text records from any number of threads; a single
//! consumer drains them in write order and commits what it has consumed.
//! Storage is capped: once the ceiling is reached, appends are dropped.

pub mod cli;
pub mod config;
pub mod crash_point;
pub mod file_manager;
pub mod observability;
pub mod store;
