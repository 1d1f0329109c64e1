//! On-disk record framing
//!
//! ```text
//! +---------------------+----+
//! | payload (UTF-8)     | \n |
//! +---------------------+----+
//! ```
//!
//! One record per line. A payload may not contain `\n` or `\r`; such a
//! payload is rejected rather than escaped, so every byte of the file is
//! either payload or a terminator and the framed size is `len + 1`.

use super::errors::{StoreError, StoreResult};

/// Terminates every frame
pub const FRAME_TERMINATOR: u8 = b'\n';

/// Bytes a record occupies on disk, terminator included.
pub fn framed_size(record: &str) -> u64 {
    record.len() as u64 + 1
}

/// Rejects payloads that would break line framing.
pub fn validate(record: &str) -> StoreResult<()> {
    if let Some(pos) = record.bytes().position(|b| b == b'\n' || b == b'\r') {
        return Err(StoreError::invalid_record(format!(
            "record contains a line terminator at byte {}",
            pos
        )));
    }
    Ok(())
}

/// Builds the complete frame so it can be written in one call.
pub fn encode(record: &str) -> StoreResult<Vec<u8>> {
    validate(record)?;
    let mut frame = Vec::with_capacity(record.len() + 1);
    frame.extend_from_slice(record.as_bytes());
    frame.push(FRAME_TERMINATOR);
    Ok(frame)
}

/// Turns one raw frame read at `offset` back into its payload.
pub fn decode(mut frame: Vec<u8>, offset: u64) -> StoreResult<String> {
    if frame.last() != Some(&FRAME_TERMINATOR) {
        return Err(StoreError::corruption_at_offset(
            offset,
            format!("frame of {} bytes is not newline-terminated", frame.len()),
        ));
    }
    frame.pop();
    String::from_utf8(frame)
        .map_err(|e| StoreError::corruption_at_offset(offset, format!("invalid UTF-8: {}", e)))
}
