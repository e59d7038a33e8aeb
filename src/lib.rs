//! # approval-relay
//!
//! Polls an approval-workflow API and turns newly finished approvals into
//! exactly-once print jobs.
//!
//! A SQLite store holds dedup marks, a cache of already-seen instances, and
//! a durable task queue. Each cycle syncs recent instances per workflow,
//! dispatches at most one job per `(instance, status)`, and drains the
//! queue into pluggable renderers.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod render;
pub mod source;
pub mod telemetry;
pub mod workflow;
