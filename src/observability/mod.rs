//! Observability
//!
//! Structured audit events for runtime lifecycle visibility.

pub mod audit;
