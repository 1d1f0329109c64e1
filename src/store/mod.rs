//! Record store subsystem for aeroqueue
//!
//! A bounded, append-only file of newline-framed text records, drained in
//! write order by a single consuming iterator.
//!
//! # Design Principles
//!
//! - Append-only; space is reclaimed only by compacting the consumed prefix
//! - Size is checked against the ceiling before every append
//! - A full store drops appends instead of failing them
//! - Whole-frame appends; a failed append is rolled back
//! - Compaction is write-temp, fsync, rename, fsync-directory
//! - Torn trailing frames are truncated on open

mod errors;
mod frame;
mod iterator;
mod record_store;
mod recovery;

pub use errors::{Severity, StoreError, StoreErrorCode, StoreResult};
pub use frame::{framed_size, FRAME_TERMINATOR};
pub use iterator::RecordIterator;
pub use record_store::{
    DropReason, PutOutcome, RecordStore, COMPACTION_FILE_NAME, RECORDS_DIRECTORY,
    RECORDS_FILE_NAME,
};
pub use recovery::RecoveryReport;
