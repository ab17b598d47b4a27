//! Shard-level tests.
//!
//! These drive shards tick by tick with a [`crate::ManualClock`] so timing is
//! deterministic; only the scheduler tests run the real tick loop.

mod support;

#[cfg(test)]
pub mod combat_test;

#[cfg(test)]
pub mod context_test;
