//! Session state
//!
//! Per-cell editable buffer, run/reset lifecycle, and output log.

pub mod controller;
