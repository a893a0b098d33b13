//! Core pipeline orchestration and domain logic for Curator.
//!
//! This crate ties together classification, batching, merging, and closing
//! into the `identify`, `merge`, and `close` stages.

pub mod batch;
pub mod classifier;
pub mod closure;
pub mod context;
pub mod describe;
pub mod merge;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use context::{Rejection, RejectionReason, RunContext};
