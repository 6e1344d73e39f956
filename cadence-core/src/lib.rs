//! Core engine for cadence.
//!
//! - `recurrence` expands recurrence rules into concrete dates
//! - `availability` and `conflict` classify candidate occurrences against busy time
//! - `frequency` enforces the minimum gap between occurrences of an activity
//! - `planner` runs dry-run and commit planning over an activity store and an
//!   external calendar

pub mod activity;
pub mod availability;
pub mod config;
pub mod conflict;
pub mod decision;
pub mod error;
pub mod frequency;
pub mod occurrence;
pub mod planner;
pub mod recurrence;
pub mod remote;
pub mod retry;
pub mod store;
pub mod window;

pub use error::{CadenceError, CadenceResult};
