//! Per-connection message reassembly.
//!
//! Workers stream frames over a duplex connection and nothing guarantees a
//! transport message lines up with a frame, so every session owns one
//! [`Framer`] that buffers partial input and hands back complete frames in
//! receipt order.
//!
//! Two boundary strategies are supported:
//!
//! - [`FrameBoundary::Delimiter`]: frames sit between occurrences of a fixed
//!   byte string, written as `DELIM payload DELIM`. A single occurrence is
//!   never enough to close a frame; the buffer keeps everything from the last
//!   occurrence (delimiter included) so the next chunk continues it.
//! - [`FrameBoundary::JsonObject`]: no delimiter; a frame is a complete JSON
//!   object, recognised by parsing. Truncated input is held until more bytes
//!   arrive, including a parse error that lands on the very end of the buffer
//!   (a number cut off after `-`, `.` or `e` reads as invalid, not as EOF).

use bytes::{Buf, Bytes, BytesMut};
use serde::de::IgnoredAny;

/// Default cap on buffered-but-incomplete bytes per session (16 MiB).
pub const DEFAULT_MAX_PENDING_BYTES: usize = 16 * 1024 * 1024;

/// How frame edges are found in the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBoundary {
    Delimiter(Vec<u8>),
    JsonObject,
}

impl FrameBoundary {
    /// Boundary for an optional configured delimiter; an empty or absent
    /// delimiter falls back to JSON object detection.
    pub fn from_delimiter(delimiter: Option<&str>) -> Self {
        match delimiter {
            Some(d) if !d.is_empty() => FrameBoundary::Delimiter(d.as_bytes().to_vec()),
            _ => FrameBoundary::JsonObject,
        }
    }

    /// Wrap an outbound payload so the peer's framer can find its edges.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        match self {
            FrameBoundary::Delimiter(delim) => {
                let mut out = Vec::with_capacity(payload.len() + delim.len() * 2);
                out.extend_from_slice(delim);
                out.extend_from_slice(payload);
                out.extend_from_slice(delim);
                out
            }
            FrameBoundary::JsonObject => payload.to_vec(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FramerError {
    /// The incomplete buffer grew past its cap and was discarded.
    #[error("Pending frame buffer exceeded {limit} bytes ({pending} buffered); discarded")]
    Overflow { pending: usize, limit: usize },
}

/// Reassembly buffer for one session.
#[derive(Debug)]
pub struct Framer {
    boundary: FrameBoundary,
    buf: BytesMut,
    max_pending: usize,
    /// Delimiter offsets already found in `buf`.
    marks: Vec<usize>,
    /// First offset in `buf` the delimiter scan has not examined yet.
    scan_from: usize,
}

impl Framer {
    pub fn new(boundary: FrameBoundary) -> Self {
        Self {
            boundary,
            buf: BytesMut::new(),
            max_pending: DEFAULT_MAX_PENDING_BYTES,
            marks: Vec::new(),
            scan_from: 0,
        }
    }

    /// Override the cap on incomplete buffered bytes.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Drop any partial frame (session closed).
    pub fn clear(&mut self) {
        self.buf.clear();
        self.marks.clear();
        self.scan_from = 0;
    }

    /// Append a chunk and return every frame it completed, oldest first.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, FramerError> {
        self.buf.extend_from_slice(chunk);

        let frames = match &self.boundary {
            FrameBoundary::Delimiter(delim) => {
                let delim = delim.clone();
                self.drain_delimited(&delim)
            }
            FrameBoundary::JsonObject => self.drain_json(),
        };

        if self.buf.len() > self.max_pending {
            let pending = self.buf.len();
            self.clear();
            return Err(FramerError::Overflow {
                pending,
                limit: self.max_pending,
            });
        }

        Ok(frames)
    }

    fn drain_delimited(&mut self, delim: &[u8]) -> Vec<Bytes> {
        let n = delim.len();
        if n == 0 {
            return Vec::new();
        }

        // Resume where the previous push stopped; earlier bytes are settled.
        let mut i = self.scan_from;
        while i + n <= self.buf.len() {
            if &self.buf[i..i + n] == delim {
                self.marks.push(i);
                i += n;
            } else {
                i += 1;
            }
        }
        self.scan_from = i;

        if self.marks.len() < 2 {
            return Vec::new();
        }

        let last = self.marks[self.marks.len() - 1];
        let mut complete = self.buf.split_to(last).freeze();

        let mut frames = Vec::with_capacity(self.marks.len() - 1);
        let mut cursor = 0;
        for &pos in &self.marks[..self.marks.len() - 1] {
            push_non_empty(&mut frames, complete.slice(cursor..pos));
            cursor = pos + n;
        }
        push_non_empty(&mut frames, complete.split_off(cursor.min(complete.len())));

        // What remains opens with the last delimiter.
        self.marks.clear();
        self.marks.push(0);
        self.scan_from -= last;
        frames
    }

    fn drain_json(&mut self) -> Vec<Bytes> {
        let mut frames = Vec::new();

        loop {
            let Some(start) = self.buf.iter().position(|b| !b.is_ascii_whitespace()) else {
                self.buf.clear();
                break;
            };
            self.buf.advance(start);

            if self.buf[0] != b'{' {
                // Cannot become an object no matter what arrives next; hand it
                // on so the caller can report it.
                frames.push(self.buf.split().freeze());
                break;
            }

            let parsed = {
                let mut stream =
                    serde_json::Deserializer::from_slice(&self.buf).into_iter::<IgnoredAny>();
                match stream.next() {
                    Some(Ok(_)) => Ok(stream.byte_offset()),
                    Some(Err(e)) => {
                        Err(e.is_eof() || error_offset(&self.buf, &e) >= self.buf.len())
                    }
                    None => Err(true),
                }
            };

            match parsed {
                Ok(end) => frames.push(self.buf.split_to(end).freeze()),
                // Truncated: wait for more input.
                Err(true) => break,
                Err(false) => {
                    frames.push(self.buf.split().freeze());
                    break;
                }
            }
        }

        frames
    }
}

fn push_non_empty(frames: &mut Vec<Bytes>, frame: Bytes) {
    if !frame.is_empty() {
        frames.push(frame);
    }
}

/// Byte offset in `buf` that a parse error points at. serde_json counts
/// columns in bytes from the start of the line.
fn error_offset(buf: &[u8], err: &serde_json::Error) -> usize {
    let line_start = match err.line() {
        0 | 1 => 0,
        line => buf
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'\n')
            .nth(line - 2)
            .map_or(buf.len(), |(i, _)| i + 1),
    };
    line_start + err.column()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELIM: &str = "<<<FRAME>>";

    fn delimited() -> Framer {
        Framer::new(FrameBoundary::from_delimiter(Some(DELIM)))
    }

    fn strs(frames: Vec<Bytes>) -> Vec<String> {
        frames
            .into_iter()
            .map(|f| String::from_utf8(f.to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn empty_delimiter_falls_back_to_json() {
        assert_eq!(FrameBoundary::from_delimiter(Some("")), FrameBoundary::JsonObject);
        assert_eq!(FrameBoundary::from_delimiter(None), FrameBoundary::JsonObject);
    }

    #[test]
    fn single_delimiter_is_incomplete_and_retained() {
        let mut framer = delimited();
        let frames = framer.push(format!("{DELIM}{{\"a\":1}}").as_bytes()).unwrap();
        assert!(frames.is_empty());
        assert_eq!(framer.pending(), format!("{DELIM}{{\"a\":1}}").as_bytes());
    }

    #[test]
    fn split_frame_completes_on_third_chunk() {
        assert_eq!(DELIM.len(), 10);
        let payload = format!("{{\"action\":\"task_update\",\"data\":\"{}\"}}", "x".repeat(76));
        assert_eq!(payload.len(), 110);
        let wire = FrameBoundary::from_delimiter(Some(DELIM)).encode(payload.as_bytes());
        assert_eq!(wire.len(), 130);

        let mut framer = delimited();
        assert!(framer.push(&wire[..40]).unwrap().is_empty());
        assert!(framer.push(&wire[40..80]).unwrap().is_empty());
        let frames = framer.push(&wire[80..]).unwrap();
        assert_eq!(strs(frames), vec![payload]);
        assert_eq!(framer.pending(), DELIM.as_bytes());
    }

    #[test]
    fn several_frames_in_one_chunk_keep_order() {
        let mut framer = delimited();
        let chunk = format!("{DELIM}one{DELIM}{DELIM}two{DELIM}three");
        let frames = framer.push(chunk.as_bytes()).unwrap();
        assert_eq!(strs(frames), vec!["one", "two"]);
        assert_eq!(framer.pending(), format!("{DELIM}three").as_bytes());
    }

    #[test]
    fn delimiter_split_across_chunks_is_found() {
        let mut framer = delimited();
        assert!(framer.push(b"<<<FRA").unwrap().is_empty());
        assert!(framer.push(b"ME>>hello<<<F").unwrap().is_empty());
        assert_eq!(strs(framer.push(b"RAME>>").unwrap()), vec!["hello"]);
    }

    #[test]
    fn arbitrary_chunking_reconstructs_delimited_stream() {
        let boundary = FrameBoundary::from_delimiter(Some(DELIM));
        let expected = vec!["{\"n\":1}", "{\"n\":22}", "{\"n\":333}"];
        let wire: Vec<u8> = expected
            .iter()
            .flat_map(|p| boundary.encode(p.as_bytes()))
            .collect();

        for size in 1..=wire.len() {
            let mut framer = Framer::new(boundary.clone());
            let mut got = Vec::new();
            for chunk in wire.chunks(size) {
                got.extend(strs(framer.push(chunk).unwrap()));
            }
            assert_eq!(got, expected, "chunk size {size}");
        }
    }

    #[test]
    fn json_mode_holds_truncated_object() {
        let mut framer = Framer::new(FrameBoundary::JsonObject);
        assert!(framer.push(b"{\"action\":\"reg").unwrap().is_empty());
        assert_eq!(
            strs(framer.push(b"ister_worker\"}").unwrap()),
            vec!["{\"action\":\"register_worker\"}"]
        );
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn json_mode_brace_inside_string_is_not_a_boundary() {
        let mut framer = Framer::new(FrameBoundary::JsonObject);
        assert!(framer.push(b"{\"output\":\"}").unwrap().is_empty());
        assert_eq!(
            strs(framer.push(b"\"}").unwrap()),
            vec!["{\"output\":\"}\"}"]
        );
    }

    #[test]
    fn json_mode_splits_back_to_back_objects() {
        let mut framer = Framer::new(FrameBoundary::JsonObject);
        let frames = framer.push(b" {\"a\":1}\n{\"b\":2} {\"c\"").unwrap();
        assert_eq!(strs(frames), vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(framer.pending(), b"{\"c\"");
    }

    #[test]
    fn arbitrary_chunking_reconstructs_json_stream() {
        let expected = vec!["{\"a\":[1,2,{\"b\":\"}{\"}]}", "{\"c\":null}", "{}"];
        let wire = expected.concat().into_bytes();

        for size in 1..=wire.len() {
            let mut framer = Framer::new(FrameBoundary::JsonObject);
            let mut got = Vec::new();
            for chunk in wire.chunks(size) {
                got.extend(strs(framer.push(chunk).unwrap()));
            }
            assert_eq!(got, expected, "chunk size {size}");
        }
    }

    #[test]
    fn json_mode_holds_numbers_cut_mid_token() {
        let expected = vec!["{\"n\":-1.5e3,\"m\":[1E-2,0.25,-7]}", "{\"x\":\n-2.0e+1}"];
        let wire = expected.concat().into_bytes();

        for at in 1..wire.len() {
            let mut framer = Framer::new(FrameBoundary::JsonObject);
            let mut got = strs(framer.push(&wire[..at]).unwrap());
            got.extend(strs(framer.push(&wire[at..]).unwrap()));
            assert_eq!(got, expected, "split at {at}");
        }

        let mut framer = Framer::new(FrameBoundary::JsonObject);
        for head in ["{\"a\":-", "{\"a\":1.", "{\"a\":1e"] {
            assert!(framer.push(head.as_bytes()).unwrap().is_empty(), "{head}");
            framer.clear();
        }
    }

    #[test]
    fn json_mode_flushes_garbage() {
        let mut framer = Framer::new(FrameBoundary::JsonObject);
        assert_eq!(strs(framer.push(b"hello").unwrap()), vec!["hello"]);
        assert!(framer.pending().is_empty());

        assert_eq!(strs(framer.push(b"{\"a\" 1}").unwrap()), vec!["{\"a\" 1}"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn delimiter_scan_resumes_after_previous_chunk() {
        let mut framer = delimited();
        let payload = "y".repeat(4096);
        framer.push(DELIM.as_bytes()).unwrap();
        for byte in payload.as_bytes() {
            assert!(framer.push(std::slice::from_ref(byte)).unwrap().is_empty());
            assert_eq!(framer.marks, vec![0]);
        }
        // Only the last DELIM.len() - 1 bytes are left to re-examine.
        assert_eq!(framer.pending().len(), 4106);
        assert_eq!(framer.scan_from, 4097);

        let frames = framer.push(format!("{DELIM}tail").as_bytes()).unwrap();
        assert_eq!(strs(frames), vec![payload]);
        assert_eq!(framer.pending(), format!("{DELIM}tail").as_bytes());
        assert_eq!(framer.marks, vec![0]);
        assert_eq!(framer.scan_from, DELIM.len());
    }

    #[test]
    fn overflow_discards_buffer() {
        let mut framer = delimited().with_max_pending(16);
        let err = framer.push(&[b'x'; 32]).unwrap_err();
        assert_eq!(err, FramerError::Overflow { pending: 32, limit: 16 });
        assert!(framer.pending().is_empty());
        assert!(framer.marks.is_empty());
        assert_eq!(framer.scan_from, 0);
    }

    #[test]
    fn clear_discards_partial_frame() {
        let mut framer = delimited();
        framer.push(format!("{DELIM}partial").as_bytes()).unwrap();
        framer.clear();
        assert!(framer.pending().is_empty());
    }
}
