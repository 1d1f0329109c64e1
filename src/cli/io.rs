//! Line and JSON I/O for the CLI
//!
//! - Input: one record per line, UTF-8
//! - Output: one JSON object per command on stdout

use std::io::{BufRead, Write};

use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Reads records from `input`, one per line, skipping nothing.
///
/// `\r\n` endings are accepted and the `\r` is stripped with the `\n`.
pub fn read_records<R: BufRead>(input: R) -> impl Iterator<Item = CliResult<String>> {
    input.lines().map(|line| line.map_err(CliError::from))
}

/// Write a success response
pub fn write_response<W: Write>(out: &mut W, data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    serde_json::to_writer(&mut *out, &response)?;
    writeln!(out)?;
    out.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_records_strips_line_endings() {
        let input = Cursor::new("one\r\ntwo\n\nthree");
        let records: Vec<String> = read_records(input).map(|r| r.unwrap()).collect();
        assert_eq!(records, vec!["one", "two", "", "three"]);
    }

    #[test]
    fn test_write_response_envelope() {
        let mut out = Vec::new();
        write_response(&mut out, serde_json::json!({"written": 2})).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with('\n'));
        let parsed: Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["data"]["written"], 2);
    }
}
