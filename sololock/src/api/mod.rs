//! Public API module.
//!
//! This module contains the high-level user-facing API for the `sololock` crate.

pub mod lock_coordinator;
pub mod models;
