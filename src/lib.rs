//! # pgqueue
//!
//! Postgres-backed message queue.
//!
//! Workers claim messages with `FOR UPDATE SKIP LOCKED`, acknowledge or
//! dead-letter them, and a periodic reaper returns claims whose visibility
//! timeout expired. Exposed over HTTP (axum) and a CLI, with OpenTelemetry
//! observability.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod model;
pub mod queue;
pub mod store;
pub mod telemetry;
