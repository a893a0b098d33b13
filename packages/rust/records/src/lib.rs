//! On-disk artifacts exchanged between Curator stages.
//!
//! - [`EntryRecord`] rows in batch CSV files, read back after external
//!   validation
//! - the rejection ledger written by `identify`
//! - atomic text artifacts (logs, descriptions, the rewritten document)

mod artifact;
mod ledger;
mod record;

pub use artifact::{write_artifact, write_atomic};
pub use ledger::{RejectionRow, write_rejection_ledger};
pub use record::{EntryRecord, collect_records, read_records, write_records};
