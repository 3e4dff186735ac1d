//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - PostgreSQL store
//! - In-memory store
//! - Prometheus metrics

pub mod database;
pub mod memory;
pub mod metrics;
