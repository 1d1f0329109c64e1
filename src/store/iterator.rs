//! Consuming iterator over a point-in-time snapshot of the record file
//!
//! The snapshot is the committed byte length at creation. Reads go through
//! the iterator's own file handle and never take the store lock.
//!
//! There is no per-record removal. The only way to delete records is
//! [`RecordIterator::remove_read_records`], which drops everything returned
//! by `next` so far:
//!
//! ```compile_fail
//! use aeroqueue::config::QueueConfig;
//! use aeroqueue::store::RecordStore;
//!
//! let store = RecordStore::open(&QueueConfig::new("/tmp/queue")).unwrap();
//! let mut iter = store.iterator().unwrap();
//! iter.next();
//! iter.remove();
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use super::errors::{StoreError, StoreErrorCode, StoreResult};
use super::frame::{self, FRAME_TERMINATOR};
use super::record_store::RecordStore;
use crate::observability::{log_event_with_fields, Event, Severity};

/// Single-consumer cursor over the records present when it was created
pub struct RecordIterator<'a> {
    store: &'a RecordStore,
    /// `None` after an error or a compaction; reopened at `position`
    reader: Option<BufReader<File>>,
    /// Store epoch this iterator's offsets are valid for
    epoch: u64,
    /// End of the snapshot
    limit: u64,
    /// Offset of the next frame to read
    position: u64,
    /// Bytes handed out by `next` and not yet compacted
    consumed: u64,
    consumed_records: u64,
    /// Record read ahead by `peek`, with its framed size
    peeked: Option<(String, u64)>,
}

impl<'a> RecordIterator<'a> {
    pub(crate) fn new(store: &'a RecordStore, reader: File, limit: u64, epoch: u64) -> Self {
        Self {
            store,
            reader: Some(BufReader::new(reader)),
            epoch,
            limit,
            position: 0,
            consumed: 0,
            consumed_records: 0,
            peeked: None,
        }
    }

    /// Returns whether unread records remain in the snapshot.
    pub fn has_next(&self) -> bool {
        self.peeked.is_some() || self.position < self.limit
    }

    /// Returns the next unread record without advancing.
    ///
    /// Repeated calls return the same record.
    pub fn peek(&mut self) -> StoreResult<Option<&str>> {
        if self.peeked.is_none() {
            if self.position >= self.limit {
                return Ok(None);
            }
            let frame = self.read_frame()?;
            self.peeked = Some(frame);
        }
        Ok(self.peeked.as_ref().map(|(record, _)| record.as_str()))
    }

    /// Returns the next unread record and advances past it.
    ///
    /// Same as [`Iterator::next`] with the `Option` and `Result` swapped.
    pub fn try_next(&mut self) -> StoreResult<Option<String>> {
        let (record, framed_size) = match self.peeked.take() {
            Some(frame) => frame,
            None => {
                if self.position >= self.limit {
                    return Ok(None);
                }
                self.read_frame()?
            }
        };
        self.consumed += framed_size;
        self.consumed_records += 1;
        self.store.metrics_registry().increment_records_read();
        Ok(Some(record))
    }

    /// Deletes every record returned by `next` so far and returns the
    /// number of bytes freed.
    ///
    /// A peeked record, unread records and records appended after this
    /// iterator was created all stay. Iteration continues where it left off.
    ///
    /// # Errors
    ///
    /// - `AERO_QUEUE_STALE_ITERATOR` if another iterator compacted the file
    /// - `AERO_QUEUE_COMPACTION_FAILED` if the rewrite failed; the record
    ///   file is unchanged and the call may be retried
    pub fn remove_read_records(&mut self) -> StoreResult<u64> {
        let freed = self.consumed;
        self.epoch = self
            .store
            .remove_prefix(freed, self.consumed_records, self.epoch)?;

        if freed > 0 {
            self.limit -= freed;
            self.position -= freed;
            self.consumed = 0;
            self.consumed_records = 0;
            self.reader = None;
        }
        Ok(freed)
    }

    /// Reads the frame at `position` and advances past it.
    fn read_frame(&mut self) -> StoreResult<(String, u64)> {
        let store_epoch = self.store.current_epoch();
        if store_epoch != self.epoch {
            let err = StoreError::stale_iterator(self.epoch, store_epoch);
            self.fuse(&err);
            return Err(err);
        }

        let offset = self.position;
        let remaining = self.limit - offset;
        let mut buf = Vec::new();
        let read = self
            .reader()?
            .by_ref()
            .take(remaining)
            .read_until(FRAME_TERMINATOR, &mut buf);

        let n = match read {
            Ok(n) => n as u64,
            Err(e) => {
                self.reader = None;
                return Err(StoreError::read_failed(
                    format!("Failed to read record at offset {}", offset),
                    e,
                ));
            }
        };

        let decoded = if n == 0 {
            Err(StoreError::corruption_at_offset(
                offset,
                format!("record file ended {} bytes before snapshot end", remaining),
            ))
        } else {
            frame::decode(buf, offset)
        };

        match decoded {
            Ok(record) => {
                self.position += n;
                Ok((record, n))
            }
            Err(err) => {
                self.fuse(&err);
                Err(err)
            }
        }
    }

    /// Stops iteration at the current position after a corrupt frame or
    /// once the file was compacted underneath this iterator. Each is
    /// reported once; later reads yield nothing.
    fn fuse(&mut self, err: &StoreError) {
        match err.code() {
            StoreErrorCode::AeroQueueCorruption => {
                let offset = self.position.to_string();
                let reason = err.message().to_string();
                log_event_with_fields(
                    Event::Corruption,
                    Severity::Fatal,
                    &[("byte_offset", offset.as_str()), ("reason", reason.as_str())],
                );
            }
            StoreErrorCode::AeroQueueStaleIterator => {}
            _ => return,
        }
        self.limit = self.position;
        self.reader = None;
    }

    fn reader(&mut self) -> StoreResult<&mut BufReader<File>> {
        let reader = match self.reader.take() {
            Some(reader) => reader,
            None => {
                let mut file = self.store.open_reader()?;
                file.seek(SeekFrom::Start(self.position)).map_err(|e| {
                    StoreError::read_failed(
                        format!("Failed to seek to offset {}", self.position),
                        e,
                    )
                })?;
                BufReader::new(file)
            }
        };
        Ok(self.reader.insert(reader))
    }
}

impl Iterator for RecordIterator<'_> {
    type Item = StoreResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_next().transpose()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{QueueConfig, SyncMode};
    use crate::store::{RecordStore, StoreErrorCode};
    use std::fs;
    use tempfile::TempDir;

    fn open_store(temp_dir: &TempDir) -> RecordStore {
        let config = QueueConfig::new(temp_dir.path()).with_sync_mode(SyncMode::None);
        RecordStore::open(&config).unwrap()
    }

    #[test]
    fn test_empty_store_iterator() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);

        let mut iter = store.iterator().unwrap();
        assert!(!iter.has_next());
        assert_eq!(iter.peek().unwrap(), None);
        assert_eq!(iter.try_next().unwrap(), None);
        assert!(iter.next().is_none());
        assert_eq!(iter.remove_read_records().unwrap(), 0);
    }

    #[test]
    fn test_peek_is_idempotent_and_not_consumed() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        store.put("a").unwrap();
        store.put("b").unwrap();

        let mut iter = store.iterator().unwrap();
        assert_eq!(iter.peek().unwrap(), Some("a"));
        assert_eq!(iter.peek().unwrap(), Some("a"));
        assert!(iter.has_next());

        // Peeked but not returned by next: nothing to remove
        assert_eq!(iter.remove_read_records().unwrap(), 0);
        assert_eq!(store.size(), 4);

        assert_eq!(iter.try_next().unwrap().as_deref(), Some("a"));
        assert_eq!(iter.peek().unwrap(), Some("b"));
        assert_eq!(iter.remove_read_records().unwrap(), 2);
        assert_eq!(iter.try_next().unwrap().as_deref(), Some("b"));
        assert!(!iter.has_next());
    }

    #[test]
    fn test_remove_mid_pass_continues_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        for i in 1..=6 {
            store.put(&i.to_string()).unwrap();
        }

        let mut iter = store.iterator().unwrap();
        let mut seen = Vec::new();
        while let Some(record) = iter.next() {
            seen.push(record.unwrap());
            if seen.len() % 2 == 0 {
                assert_eq!(iter.remove_read_records().unwrap(), 4);
            }
        }

        assert_eq!(seen, vec!["1", "2", "3", "4", "5", "6"]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_other_iterator_goes_stale_after_compaction() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        store.put("a").unwrap();
        store.put("b").unwrap();

        let mut first = store.iterator().unwrap();
        let mut second = store.iterator().unwrap();

        first.next().unwrap().unwrap();
        first.remove_read_records().unwrap();

        let err = second.next().unwrap().unwrap_err();
        assert_eq!(err.code(), StoreErrorCode::AeroQueueStaleIterator);
        let err = second.remove_read_records().unwrap_err();
        assert_eq!(err.code(), StoreErrorCode::AeroQueueStaleIterator);

        // Reported once, then the iterator is exhausted
        assert!(!second.has_next());
        assert!(second.next().is_none());
        assert_eq!(second.by_ref().filter_map(Result::ok).count(), 0);

        // The compacting iterator keeps working
        assert_eq!(first.next().unwrap().unwrap(), "b");
    }

    #[test]
    fn test_corrupt_frame_fuses_iterator() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        store.put("good").unwrap();
        store.put("also good").unwrap();

        // Overwrite the second frame with bytes that are not UTF-8
        let path = store.records_path();
        let mut content = fs::read(&path).unwrap();
        content[5] = 0xff;
        fs::write(&path, &content).unwrap();

        let mut iter = store.iterator().unwrap();
        assert_eq!(iter.next().unwrap().unwrap(), "good");
        let err = iter.next().unwrap().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.details(), Some("byte_offset: 5"));
        assert!(!iter.has_next());
        assert!(iter.next().is_none());

        // The record read before the corruption can still be committed
        assert_eq!(iter.remove_read_records().unwrap(), 5);
    }
}
