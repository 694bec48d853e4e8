//! NDJSON line decoder
//!
//! Turns raw byte chunks from the wire into records, one per
//! newline-terminated JSON object. A line split across chunks is carried
//! over to the next chunk; a final line that never gets its terminator is
//! dropped when the stream ends.

use serde::Deserialize;

/// Longest partial line carried between chunks before it is discarded
pub const MAX_PENDING_LINE: usize = 64 * 1024;

/// One line of the generation stream. Extra fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
}

impl Record {
    /// Text worth rendering, if any
    pub fn fragment(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

/// Incremental decoder state for one stream
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
    malformed: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every record completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Record> {
        let mut records = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.pending.is_empty() {
                self.decode_line(head, &mut records);
            } else {
                let mut line = std::mem::take(&mut self.pending);
                line.extend_from_slice(head);
                self.decode_line(&line, &mut records);
            }
        }

        if !rest.is_empty() {
            if self.pending.len() + rest.len() > MAX_PENDING_LINE {
                tracing::warn!(
                    pending = self.pending.len() + rest.len(),
                    "dropping oversized partial line"
                );
                self.pending.clear();
                self.malformed += 1;
            } else {
                self.pending.extend_from_slice(rest);
            }
        }

        records
    }

    /// End of stream. Any unterminated tail is dropped.
    pub fn finish(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(bytes = self.pending.len(), "dropping unterminated final line");
            self.pending.clear();
        }
    }

    /// Lines that failed to parse so far
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    fn decode_line(&mut self, raw: &[u8], out: &mut Vec<Record>) {
        let line = trim_ascii(raw);
        if line.is_empty() {
            return;
        }

        match serde_json::from_slice::<Record>(line) {
            Ok(record) => out.push(record),
            Err(e) => {
                self.malformed += 1;
                tracing::warn!(error = %e, line = %String::from_utf8_lossy(line), "skipping malformed record");
            }
        }
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |p| p + 1);
    &bytes[start..end]
}
