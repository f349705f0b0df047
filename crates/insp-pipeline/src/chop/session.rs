//! Line-level chopping state machine
//!
//! No I/O in here: [`ChopSession::push_line`] is fed one line at a time and
//! hands back a [`Chunk`] whenever the buffer is full. The caller uploads it
//! before feeding the next line, which bounds memory to one chunk.
//!
//! Lines are raw bytes without the terminator. Chunks are byte-exact copies of
//! the source lines; only the marker check decodes, and it does so lossily.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::extract::Coercer;

/// `Running date: 2023-01-05 10:00:00` (also `=`, `;` or `,` as separator)
static RUNNING_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*running[ _]?date\s*[:=;,]\s*(.*?)[\s;,]*$")
        .expect("running date pattern is valid")
});

/// How many leading lines may carry the running-date marker
const MARKER_LINES: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChopState {
    ReadingHeader,
    ReadingBody,
}

/// One emitted sub-file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u32,
    /// Header line, then the buffered body lines, each `\n`-terminated
    pub body: Vec<u8>,
    pub lines: usize,
}

#[derive(Debug)]
pub struct ChopSession {
    report_id: i64,
    threshold: usize,
    state: ChopState,
    lines_seen: usize,
    running_date: Option<DateTime<Utc>>,
    running_date_raw: Option<String>,
    header_line: Option<Vec<u8>>,
    line_buffer: Vec<Vec<u8>>,
    chunk_index: u32,
}

impl ChopSession {
    pub fn new(report_id: i64, threshold: usize) -> Self {
        Self {
            report_id,
            threshold: threshold.max(1),
            state: ChopState::ReadingHeader,
            lines_seen: 0,
            running_date: None,
            running_date_raw: None,
            header_line: None,
            line_buffer: Vec::new(),
            chunk_index: 0,
        }
    }

    pub fn report_id(&self) -> i64 {
        self.report_id
    }

    pub fn state(&self) -> ChopState {
        self.state
    }

    pub fn running_date(&self) -> Option<DateTime<Utc>> {
        self.running_date
    }

    /// Marker value as found in the file, even if it did not parse
    pub fn running_date_raw(&self) -> Option<&str> {
        self.running_date_raw.as_deref()
    }

    pub fn header_line(&self) -> Option<&[u8]> {
        self.header_line.as_deref()
    }

    /// Chunks emitted so far
    pub fn chunks_emitted(&self) -> u32 {
        self.chunk_index
    }

    pub fn push_line(&mut self, line: Vec<u8>, coercer: &Coercer) -> Option<Chunk> {
        match self.state {
            ChopState::ReadingHeader => {
                self.lines_seen += 1;
                if self.lines_seen <= MARKER_LINES && self.running_date_raw.is_none() {
                    if let Some(raw) = running_date_marker(&String::from_utf8_lossy(&line)) {
                        self.running_date = coercer.parse_date(&raw).ok();
                        self.running_date_raw = Some(raw);
                        return None;
                    }
                }
                self.header_line = Some(line);
                self.state = ChopState::ReadingBody;
                None
            }
            ChopState::ReadingBody => {
                self.line_buffer.push(line);
                if self.line_buffer.len() >= self.threshold {
                    self.flush()
                } else {
                    None
                }
            }
        }
    }

    /// Emit whatever is still buffered. `None` when the buffer is empty.
    pub fn finish(&mut self) -> Option<Chunk> {
        self.flush()
    }

    fn flush(&mut self) -> Option<Chunk> {
        if self.line_buffer.is_empty() {
            return None;
        }
        let header = self.header_line.as_deref().unwrap_or_default();

        let lines = self.line_buffer.len();
        let capacity = header.len() + 1 + self.line_buffer.iter().map(|l| l.len() + 1).sum::<usize>();
        let mut body = Vec::with_capacity(capacity);
        body.extend_from_slice(header);
        body.push(b'\n');
        for line in self.line_buffer.drain(..) {
            body.extend_from_slice(&line);
            body.push(b'\n');
        }

        let chunk = Chunk {
            index: self.chunk_index,
            lines,
            body,
        };
        self.chunk_index += 1;
        Some(chunk)
    }
}

/// Value part of a running-date marker line
pub fn running_date_marker(line: &str) -> Option<String> {
    RUNNING_DATE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// `<prefix>/chunkFile_<reportId>_<index>_<fileName>`
pub fn chunk_key(folder_prefix: &str, report_id: i64, index: u32, file_name: &str) -> String {
    let name = format!("chunkFile_{}_{}_{}", report_id, index, file_name);
    if folder_prefix.is_empty() {
        name
    } else {
        format!("{}/{}", folder_prefix, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feed<L: AsRef<[u8]>>(session: &mut ChopSession, lines: &[L]) -> Vec<Chunk> {
        let coercer = Coercer::utc();
        let mut chunks: Vec<Chunk> = lines
            .iter()
            .filter_map(|l| session.push_line(l.as_ref().to_vec(), &coercer))
            .collect();
        chunks.extend(session.finish());
        chunks
    }

    #[test]
    fn test_header_then_body() {
        let mut session = ChopSession::new(7, 2);
        let chunks = feed(&mut session, &["a,b", "1,2", "3,4", "5,6"]);
        assert_eq!(session.header_line(), Some(&b"a,b"[..]));
        assert_eq!(session.running_date(), None);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].body, b"a,b\n1,2\n3,4\n");
        assert_eq!(chunks[1].index, 1);
        assert_eq!(chunks[1].body, b"a,b\n5,6\n");
    }

    #[test]
    fn test_running_date_marker_precedes_header() {
        let mut session = ChopSession::new(1, 10);
        let chunks = feed(&mut session, &["Running date: 2023-01-05 10:00:00", "a,b", "1,2"]);
        assert_eq!(session.header_line(), Some(&b"a,b"[..]));
        assert_eq!(
            session.running_date().map(|d| d.to_rfc3339()),
            Some("2023-01-05T10:00:00+00:00".to_string())
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].body, b"a,b\n1,2\n");
    }

    #[test]
    fn test_unparseable_marker_still_skipped() {
        let mut session = ChopSession::new(1, 10);
        let coercer = Coercer::utc();
        session.push_line(b"RUNNING DATE; soon".to_vec(), &coercer);
        session.push_line(b"h".to_vec(), &coercer);
        assert_eq!(session.running_date_raw(), Some("soon"));
        assert_eq!(session.running_date(), None);
        assert_eq!(session.header_line(), Some(&b"h"[..]));
    }

    #[test]
    fn test_header_only_emits_nothing() {
        let mut session = ChopSession::new(1, 10);
        let chunks = feed(&mut session, &["h"]);
        assert!(chunks.is_empty());
        assert_eq!(session.state(), ChopState::ReadingBody);
    }

    #[test]
    fn test_non_utf8_lines_are_copied_verbatim() {
        let mut session = ChopSession::new(1, 10);
        let chunks = feed(&mut session, &[&b"Mittaus,\xC4ani"[..], &b"\xE4,\xF6"[..]]);
        assert_eq!(session.header_line(), Some(&b"Mittaus,\xC4ani"[..]));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].body, b"Mittaus,\xC4ani\n\xE4,\xF6\n");
    }

    #[test]
    fn test_marker_detection() {
        assert_eq!(running_date_marker("Running date: 05.01.2023"), Some("05.01.2023".to_string()));
        assert_eq!(running_date_marker("running_date=2023-01-05;"), Some("2023-01-05".to_string()));
        assert_eq!(running_date_marker("Date,Value"), None);
    }

    #[test]
    fn test_chunk_key() {
        assert_eq!(chunk_key("a/b", 12, 0, "X_1.csv"), "a/b/chunkFile_12_0_X_1.csv");
        assert_eq!(chunk_key("", 12, 3, "X_1.csv"), "chunkFile_12_3_X_1.csv");
    }

    proptest! {
        #[test]
        fn chunk_count_is_ceil_and_bodies_reassemble(n in 0usize..400, t in 1usize..60) {
            let mut lines = vec!["header".to_string()];
            lines.extend((0..n).map(|i| format!("row{}", i)));

            let mut session = ChopSession::new(1, t);
            let chunks = feed(&mut session, &lines);

            prop_assert_eq!(chunks.len(), n.div_ceil(t));

            let mut rebuilt = Vec::new();
            for chunk in &chunks {
                let text = std::str::from_utf8(&chunk.body).unwrap();
                let mut body = text.lines();
                prop_assert_eq!(body.next(), Some("header"));
                rebuilt.extend(body.map(str::to_string));
            }
            prop_assert_eq!(rebuilt, lines[1..].to_vec());
        }
    }
}
