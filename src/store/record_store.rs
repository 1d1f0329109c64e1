//! The record store: one bounded, append-only record file
//!
//! Layout: `<data_dir>/records/records.log`, plus a transient
//! `records.log.compact` while a compaction is in flight.
//!
//! # Locking
//!
//! One mutex guards the append handle and the size counter. `put` holds it
//! for check-ceiling, append, update-size; compaction holds it for the whole
//! rewrite. Reads through an iterator never take it.
//!
//! # Durability
//!
//! - An append is one `write_all` of the complete frame, followed by
//!   `sync_data` unless the sync mode is `none`. A failed append truncates
//!   the file back to the last committed length.
//! - Compaction writes the surviving tail to a temp file, fsyncs it, renames
//!   it over the record file and fsyncs the directory. A crash at any point
//!   leaves either the old file or the complete new one.

use std::fs::{self, File, Metadata};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::errors::{StoreError, StoreResult};
use super::frame;
use super::iterator::RecordIterator;
use super::recovery;
use crate::config::{QueueConfig, SyncMode};
use crate::crash_point::{maybe_crash, points};
use crate::file_manager::FileManager;
use crate::observability::{
    log_event_with_fields, Event, MetricsRegistry, MetricsSnapshot, ObservationScope, Severity,
    Timer,
};

/// Subdirectory of the data directory holding the record file
pub const RECORDS_DIRECTORY: &str = "records";

/// Name of the record file
pub const RECORDS_FILE_NAME: &str = "records.log";

/// Name of the temp file a compaction writes before renaming
pub const COMPACTION_FILE_NAME: &str = "records.log.compact";

/// Why an append was not written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The framed record alone is larger than the ceiling
    RecordTooLarge,
    /// The record would push the file past the ceiling
    StoreFull,
}

/// Result of a `put` that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Record appended at `offset`, occupying `framed_size` bytes
    Written { offset: u64, framed_size: u64 },
    /// Nothing was written; the file is byte-for-byte unchanged
    Dropped(DropReason),
}

impl PutOutcome {
    /// Returns whether the record reached the file
    pub fn is_written(&self) -> bool {
        matches!(self, PutOutcome::Written { .. })
    }
}

/// Mutable state guarded by the store lock
struct StoreState {
    /// Append handle; `None` until the first append and after compaction
    writer: Option<File>,
    /// Bytes of committed frames in the record file
    size: u64,
    /// Set by the first drop at capacity, cleared once space is freed
    full: bool,
}

/// Bounded, append-only, disk-backed record queue
///
/// Any number of threads may call [`put`](Self::put) concurrently. A single
/// consumer drains through [`iterator`](Self::iterator).
///
/// ```no_run
/// use aeroqueue::config::QueueConfig;
/// use aeroqueue::store::RecordStore;
///
/// # fn main() -> aeroqueue::store::StoreResult<()> {
/// let store = RecordStore::open(&QueueConfig::new("/tmp/queue"))?;
/// store.put("event-1")?;
///
/// let mut iter = store.iterator()?;
/// while let Some(record) = iter.next() {
///     println!("{}", record?);
/// }
/// iter.remove_read_records()?;
/// # Ok(())
/// # }
/// ```
pub struct RecordStore {
    file_manager: FileManager,
    max_storage_size: u64,
    sync_mode: SyncMode,
    state: Mutex<StoreState>,
    /// Bumped by every compaction; iterators compare against it
    epoch: AtomicU64,
    metrics: MetricsRegistry,
}

impl RecordStore {
    /// Opens the store under `config.data_dir`, creating and recovering the
    /// record file as needed.
    ///
    /// # Errors
    ///
    /// Returns `AERO_QUEUE_IO_ERROR` if the directory or file cannot be
    /// created, opened or repaired.
    pub fn open(config: &QueueConfig) -> StoreResult<Self> {
        let file_manager = FileManager::new(config.data_path());

        file_manager
            .create_directory(RECORDS_DIRECTORY)
            .map_err(|e| {
                StoreError::io_error(
                    format!(
                        "Failed to create records directory: {}",
                        file_manager.directory(RECORDS_DIRECTORY).display()
                    ),
                    e,
                )
            })?;

        let scope = ObservationScope::new("RECOVERY");
        let report = match recovery::recover(
            &file_manager,
            &Self::records_file(),
            &Self::compaction_file(),
        ) {
            Ok(report) => report,
            Err(err) => {
                scope.fail(&err.to_string());
                return Err(err);
            }
        };
        let torn = report.torn_bytes.to_string();
        scope.complete_with_fields(&[("torn_bytes", torn.as_str())]);

        let max_storage_size = config.max_storage_size_bytes;
        let size = report.size.to_string();
        let max = max_storage_size.to_string();
        if report.size > max_storage_size {
            log_event_with_fields(
                Event::OverCeilingOnOpen,
                Severity::Warn,
                &[("size", size.as_str()), ("max_storage_size", max.as_str())],
            );
        }
        log_event_with_fields(
            Event::StoreOpened,
            Severity::Info,
            &[
                ("data_dir", config.data_dir.as_str()),
                ("size", size.as_str()),
                ("max_storage_size", max.as_str()),
            ],
        );

        Ok(Self {
            file_manager,
            max_storage_size,
            sync_mode: config.sync_mode,
            state: Mutex::new(StoreState {
                writer: None,
                size: report.size,
                full: report.size >= max_storage_size,
            }),
            epoch: AtomicU64::new(0),
            metrics: MetricsRegistry::new(),
        })
    }

    /// Record file path relative to the data directory
    pub fn records_file() -> PathBuf {
        PathBuf::from(RECORDS_DIRECTORY).join(RECORDS_FILE_NAME)
    }

    fn compaction_file() -> PathBuf {
        PathBuf::from(RECORDS_DIRECTORY).join(COMPACTION_FILE_NAME)
    }

    /// Absolute path of the record file
    pub fn records_path(&self) -> PathBuf {
        self.file_manager.file_path(Self::records_file())
    }

    /// Configured ceiling in bytes
    pub fn max_storage_size(&self) -> u64 {
        self.max_storage_size
    }

    /// Bytes currently held, framing included
    pub fn size(&self) -> u64 {
        self.lock_state().size
    }

    /// Returns whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Counter snapshot for this store
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Counters as a JSON object
    pub fn metrics_json(&self) -> String {
        self.metrics.to_json()
    }

    pub(crate) fn metrics_registry(&self) -> &MetricsRegistry {
        &self.metrics
    }

    // The state is only changed after the file operation it describes has
    // succeeded, so a poisoned lock still guards consistent data.
    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Appends one record.
    ///
    /// Returns `Dropped` without touching the disk if the framed record does
    /// not fit under the ceiling. Never writes a partial record.
    ///
    /// # Errors
    ///
    /// - `AERO_QUEUE_INVALID_RECORD` if the record contains `\n` or `\r`
    /// - `AERO_QUEUE_WRITE_FAILED` if the append or its sync fails
    pub fn put(&self, record: &str) -> StoreResult<PutOutcome> {
        let frame = frame::encode(record)?;
        let framed_size = frame::framed_size(record);

        if framed_size > self.max_storage_size {
            self.metrics.increment_dropped_too_large();
            return Ok(PutOutcome::Dropped(DropReason::RecordTooLarge));
        }

        let mut state = self.lock_state();

        if state.size + framed_size > self.max_storage_size {
            self.metrics.increment_dropped_full();
            if !state.full {
                state.full = true;
                let size = state.size.to_string();
                let max = self.max_storage_size.to_string();
                log_event_with_fields(
                    Event::StoreFull,
                    Severity::Warn,
                    &[("size", size.as_str()), ("max_storage_size", max.as_str())],
                );
            }
            return Ok(PutOutcome::Dropped(DropReason::StoreFull));
        }

        self.append_frame(&mut state, &frame)?;
        // Read after the append: opening the handle may resync the size.
        let offset = state.size;
        state.size += framed_size;
        self.metrics.record_append(framed_size);

        Ok(PutOutcome::Written {
            offset,
            framed_size,
        })
    }

    fn append_frame(&self, state: &mut StoreState, frame: &[u8]) -> StoreResult<()> {
        let sync = self.sync_mode == SyncMode::Fsync;
        let result = self.writer(state).and_then(|writer| {
            maybe_crash(points::APPEND_BEFORE_WRITE);
            writer
                .write_all(frame)
                .map_err(|e| StoreError::write_failed("Failed to append record", e))?;
            maybe_crash(points::APPEND_AFTER_WRITE);
            if sync {
                writer
                    .sync_data()
                    .map_err(|e| StoreError::write_failed("fsync failed after append", e))?;
                maybe_crash(points::APPEND_AFTER_SYNC);
            }
            Ok(())
        });

        if let Err(err) = result {
            self.metrics.increment_append_failures();
            self.rollback(state);
            let reason = err.to_string();
            log_event_with_fields(
                Event::AppendFailed,
                Severity::Error,
                &[("reason", reason.as_str())],
            );
            return Err(err);
        }
        Ok(())
    }

    /// Drops any bytes past the committed size and closes the handle so the
    /// next append reopens and re-checks the file.
    fn rollback(&self, state: &mut StoreState) {
        if let Some(writer) = state.writer.take() {
            if let Err(e) = writer.set_len(state.size) {
                let reason = e.to_string();
                log_event_with_fields(
                    Event::AppendFailed,
                    Severity::Error,
                    &[("reason", reason.as_str()), ("stage", "rollback")],
                );
            }
        }
    }

    /// Returns the append handle, opening it if needed.
    ///
    /// A cached handle is only reused while it still refers to the file at
    /// the record path; one left pointing at a deleted or replaced file is
    /// dropped and the path reopened, so a vanished directory fails the
    /// append instead of writing into an unlinked inode.
    ///
    /// On open, the file length is reconciled with the committed size:
    /// trailing bytes from an unrolled append are cut, and a file that
    /// shrank underneath the store is adopted as-is.
    fn writer<'s>(&self, state: &'s mut StoreState) -> StoreResult<&'s mut File> {
        let file = match state.writer.take() {
            Some(file) if self.is_live(&file) => file,
            _ => self.open_writer(state)?,
        };
        Ok(state.writer.insert(file))
    }

    /// Returns whether `file` is still the file at the record path.
    fn is_live(&self, file: &File) -> bool {
        match (file.metadata(), fs::metadata(self.records_path())) {
            (Ok(held), Ok(current)) => same_file(&held, &current),
            _ => false,
        }
    }

    fn open_writer(&self, state: &mut StoreState) -> StoreResult<File> {
        let records_file = Self::records_file();
        let file = self
            .file_manager
            .new_output_stream(&records_file, true)
            .map_err(|e| {
                StoreError::write_failed(
                    format!(
                        "Failed to open record file: {}",
                        self.file_manager.file_path(&records_file).display()
                    ),
                    e,
                )
            })?;
        let len = file
            .metadata()
            .map_err(|e| StoreError::write_failed("Failed to read record file metadata", e))?
            .len();

        if len > state.size {
            file.set_len(state.size)
                .map_err(|e| StoreError::write_failed("Failed to cut uncommitted bytes", e))?;
        } else if len < state.size {
            let expected = state.size.to_string();
            let actual = len.to_string();
            log_event_with_fields(
                Event::SizeResynced,
                Severity::Warn,
                &[("expected", expected.as_str()), ("actual", actual.as_str())],
            );
            state.size = len;
        }
        Ok(file)
    }

    /// Starts a consumption pass over the records currently in the file.
    ///
    /// Records appended afterwards are not visible to this iterator.
    ///
    /// # Errors
    ///
    /// Returns `AERO_QUEUE_READ_FAILED` if the record file cannot be opened.
    pub fn iterator(&self) -> StoreResult<RecordIterator<'_>> {
        let state = self.lock_state();
        let reader = self.open_reader()?;
        Ok(RecordIterator::new(
            self,
            reader,
            state.size,
            self.current_epoch(),
        ))
    }

    pub(crate) fn open_reader(&self) -> StoreResult<File> {
        let records_file = Self::records_file();
        self.file_manager
            .new_input_stream(&records_file)
            .map_err(|e| {
                StoreError::read_failed(
                    format!(
                        "Failed to open record file: {}",
                        self.file_manager.file_path(&records_file).display()
                    ),
                    e,
                )
            })
    }

    /// Counts committed records by scanning the file under the lock.
    pub fn record_count(&self) -> StoreResult<u64> {
        let state = self.lock_state();
        let reader = self.open_reader()?;
        let mut reader = BufReader::new(reader.take(state.size));

        let mut count = 0u64;
        loop {
            let buf = reader
                .fill_buf()
                .map_err(|e| StoreError::read_failed("Failed to scan record file", e))?;
            if buf.is_empty() {
                break;
            }
            count += buf.iter().filter(|&&b| b == frame::FRAME_TERMINATOR).count() as u64;
            let len = buf.len();
            reader.consume(len);
        }
        Ok(count)
    }

    /// Deletes the first `bytes` bytes (`records` whole frames) of the file.
    ///
    /// Called by an iterator with the prefix it has handed out. Returns the
    /// new epoch the iterator must adopt.
    pub(crate) fn remove_prefix(
        &self,
        bytes: u64,
        records: u64,
        iterator_epoch: u64,
    ) -> StoreResult<u64> {
        let mut state = self.lock_state();

        let store_epoch = self.current_epoch();
        if iterator_epoch != store_epoch {
            return Err(StoreError::stale_iterator(iterator_epoch, store_epoch));
        }
        if bytes == 0 {
            return Ok(store_epoch);
        }
        if bytes > state.size {
            return Err(StoreError::corruption_at_offset(
                bytes,
                format!(
                    "consumed prefix of {} bytes exceeds store size {}",
                    bytes, state.size
                ),
            ));
        }

        let timer = Timer::new();
        maybe_crash(points::COMPACTION_START);

        if let Err(err) = self.rewrite_tail(bytes, state.size) {
            let cleanup = match self.file_manager.delete_file(Self::compaction_file()) {
                Ok(_) => "ok".to_string(),
                Err(e) => e.to_string(),
            };
            let reason = err.to_string();
            log_event_with_fields(
                Event::CompactionFailed,
                Severity::Error,
                &[("reason", reason.as_str()), ("cleanup", cleanup.as_str())],
            );
            return Err(err);
        }

        // The new file is published; the old append handle points at the
        // unlinked inode and must not be used again.
        state.writer = None;
        state.size -= bytes;
        state.full = false;
        let new_epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;

        self.metrics.record_compaction(records, bytes);

        let freed = bytes.to_string();
        let removed = records.to_string();
        let remaining = state.size.to_string();
        let elapsed = timer.elapsed_ms();
        log_event_with_fields(
            Event::CompactionComplete,
            Severity::Info,
            &[
                ("bytes_freed", freed.as_str()),
                ("records_removed", removed.as_str()),
                ("size", remaining.as_str()),
                ("elapsed_ms", elapsed.as_str()),
            ],
        );

        Ok(new_epoch)
    }

    /// Copies bytes `[prefix, size)` into a temp file and renames it over
    /// the record file.
    fn rewrite_tail(&self, prefix: u64, size: u64) -> StoreResult<()> {
        let records_file = Self::records_file();
        let compaction_file = Self::compaction_file();

        let mut source = self
            .file_manager
            .new_input_stream(&records_file)
            .map_err(|e| StoreError::compaction_failed("Failed to open record file", e))?;
        source
            .seek(SeekFrom::Start(prefix))
            .map_err(|e| StoreError::compaction_failed("Failed to seek past consumed prefix", e))?;

        let mut temp = self
            .file_manager
            .new_output_stream(&compaction_file, false)
            .map_err(|e| StoreError::compaction_failed("Failed to create compaction file", e))?;

        let tail = size - prefix;
        let copied = io::copy(&mut source.take(tail), &mut temp)
            .map_err(|e| StoreError::compaction_failed("Failed to copy unread records", e))?;
        if copied != tail {
            return Err(StoreError::compaction_failed(
                format!("Record file ended after {} of {} tail bytes", copied, tail),
                io::Error::from(io::ErrorKind::UnexpectedEof),
            ));
        }

        temp.sync_all()
            .map_err(|e| StoreError::compaction_failed("Failed to fsync compaction file", e))?;
        drop(temp);
        maybe_crash(points::COMPACTION_AFTER_TEMP_WRITE);

        maybe_crash(points::COMPACTION_BEFORE_RENAME);
        self.file_manager
            .rename(&compaction_file, &records_file)
            .map_err(|e| StoreError::compaction_failed("Failed to publish compacted file", e))?;
        maybe_crash(points::COMPACTION_AFTER_RENAME);

        // The rename already happened; a failed directory sync only weakens
        // durability of the rename itself.
        if let Err(e) = self.file_manager.sync_directory(RECORDS_DIRECTORY) {
            let reason = e.to_string();
            log_event_with_fields(
                Event::DirectorySyncFailed,
                Severity::Warn,
                &[("reason", reason.as_str())],
            );
        }

        Ok(())
    }
}

#[cfg(unix)]
fn same_file(a: &Metadata, b: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

// Without inode numbers, only a file removed from the path is detected.
#[cfg(not(unix))]
fn same_file(_a: &Metadata, _b: &Metadata) -> bool {
    true
}
