//! Carriage-return record framing for live feeds.
//!
//! The streaming host writes one JSON object per record and separates records
//! with `\r`. Keep-alive filler (blank or whitespace-only fragments) shows up
//! between records and is skipped silently.

use serde_json::Value;
use tracing::debug;

/// Byte separating records on the live feed.
pub const RECORD_DELIMITER: u8 = b'\r';

/// Largest partial record [`Framing::Buffered`] holds while waiting for a
/// delimiter. A longer run is dropped as one fragment.
pub const MAX_CARRY_BYTES: usize = 1024 * 1024;

/// How incoming chunks are cut into records.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Framing {
    /// Every chunk is split on its own. A record cut in two by a chunk
    /// boundary yields two unparsable halves and is dropped.
    #[default]
    PerChunk,
    /// The trailing partial fragment of a chunk is carried over and joined
    /// with the start of the next one, so split records are reassembled.
    Buffered,
}

/// Splits raw feed chunks into parsed JSON records.
#[derive(Debug, Default)]
pub struct RecordSplitter {
    framing: Framing,
    carry: Vec<u8>,
    dropped: u64,
}

impl RecordSplitter {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            carry: Vec::new(),
            dropped: 0,
        }
    }

    /// Number of non-blank fragments that failed to parse so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Feeds one chunk and returns the records it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        match self.framing {
            Framing::PerChunk => self.parse_fragments(chunk),
            Framing::Buffered => {
                self.carry.extend_from_slice(chunk);
                let Some(last) = self.carry.iter().rposition(|b| *b == RECORD_DELIMITER) else {
                    self.trim_carry();
                    return Vec::new();
                };

                let rest = self.carry.split_off(last + 1);
                let complete = std::mem::replace(&mut self.carry, rest);
                self.trim_carry();
                self.parse_fragments(&complete)
            }
        }
    }

    fn parse_fragments(&mut self, bytes: &[u8]) -> Vec<Value> {
        bytes
            .split(|b| *b == RECORD_DELIMITER)
            .filter_map(|fragment| self.parse_fragment(fragment))
            .collect()
    }

    fn parse_fragment(&mut self, fragment: &[u8]) -> Option<Value> {
        if is_blank(fragment) {
            return None;
        }

        match serde_json::from_slice(fragment) {
            Ok(value) => Some(value),
            Err(err) => {
                self.dropped += 1;
                debug!(
                    event = "stream_fragment_dropped",
                    len = fragment.len(),
                    error = %err
                );
                None
            }
        }
    }

    // Keep-alive filler never ends in a delimiter; neither filler nor an
    // unterminated record may pile up.
    fn trim_carry(&mut self) {
        if is_blank(&self.carry) {
            self.carry.clear();
        } else if self.carry.len() > MAX_CARRY_BYTES {
            self.dropped += 1;
            debug!(
                event = "stream_fragment_dropped",
                len = self.carry.len(),
                error = "no delimiter within carry limit"
            );
            self.carry.clear();
        }
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Framing, RecordSplitter, MAX_CARRY_BYTES};

    #[test]
    fn splits_chunk_into_records_in_order() {
        let mut splitter = RecordSplitter::new(Framing::PerChunk);
        let records = splitter.push(b"{\"a\":1}\r{\"b\":2}\r");
        assert_eq!(records, vec![json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(splitter.dropped(), 0);
    }

    #[test]
    fn blank_fragments_are_skipped_silently() {
        let mut splitter = RecordSplitter::new(Framing::PerChunk);
        let records = splitter.push(b"{\"a\":1}\r\r{\"b\":2}\r");
        assert_eq!(records, vec![json!({"a": 1}), json!({"b": 2})]);

        assert!(splitter.push(b" ").is_empty());
        assert!(splitter.push(b"\r \r").is_empty());
        assert_eq!(splitter.dropped(), 0);
    }

    #[test]
    fn per_chunk_framing_loses_record_split_across_chunks() {
        let mut splitter = RecordSplitter::new(Framing::PerChunk);
        assert!(splitter.push(b"{\"id\":").is_empty());
        let records = splitter.push(b"7}\r{\"id\":8}\r");
        assert_eq!(records, vec![json!({"id": 8})]);
        assert_eq!(splitter.dropped(), 2);
    }

    #[test]
    fn buffered_framing_reassembles_split_record() {
        let mut splitter = RecordSplitter::new(Framing::Buffered);
        assert!(splitter.push(b"{\"id\":").is_empty());
        let records = splitter.push(b"7}\r{\"id\":8}\r{\"id\"");
        assert_eq!(records, vec![json!({"id": 7}), json!({"id": 8})]);
        let records = splitter.push(b":9}\r");
        assert_eq!(records, vec![json!({"id": 9})]);
        assert_eq!(splitter.dropped(), 0);
    }

    #[test]
    fn buffered_framing_discards_keep_alive_filler() {
        let mut splitter = RecordSplitter::new(Framing::Buffered);
        assert!(splitter.push(b" ").is_empty());
        assert!(splitter.push(b" ").is_empty());
        let records = splitter.push(b"{\"id\":1}\r");
        assert_eq!(records, vec![json!({"id": 1})]);
    }

    #[test]
    fn buffered_framing_drops_oversized_partial_record() {
        let mut splitter = RecordSplitter::new(Framing::Buffered);
        let chunk = vec![b'x'; MAX_CARRY_BYTES / 2 + 1];
        assert!(splitter.push(&chunk).is_empty());
        assert_eq!(splitter.dropped(), 0);
        assert!(splitter.push(&chunk).is_empty());
        assert_eq!(splitter.dropped(), 1);

        // The tail after the overflow starts a fresh record.
        let records = splitter.push(b"\r{\"id\":1}\r");
        assert_eq!(records, vec![json!({"id": 1})]);
        assert_eq!(splitter.dropped(), 1);
    }

    #[test]
    fn garbage_fragment_is_counted_not_returned() {
        let mut splitter = RecordSplitter::new(Framing::PerChunk);
        let records = splitter.push(b"not json\r{\"ok\":true}\r");
        assert_eq!(records, vec![json!({"ok": true})]);
        assert_eq!(splitter.dropped(), 1);
    }
}
