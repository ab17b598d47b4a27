//! Core host implementation.
//!
//! This module contains the realm host structure, its shard registry and
//! the run loop driving host-level housekeeping.

pub mod core;

pub use core::{RealmServer, ServerStats};
