//! Centralized constants for the quota engine.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod quota;
pub mod state;
