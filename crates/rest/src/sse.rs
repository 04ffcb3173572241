//! Server-sent-events framing: parse a byte stream into timed chunks, and
//! re-emit chunks with per-write flushing so a client observes streaming
//! rather than buffered aggregation.

use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};

/// One SSE frame: the raw bytes as they arrived, its parsed fields, and
/// timing relative to the previous chunk of the same interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseChunk {
    pub raw: Bytes,
    pub event: Option<String>,
    pub data: Option<String>,
    pub id: Option<String>,
    pub retry: Option<u64>,
    pub time_delta_ms: i64,
}

/// Incremental SSE parser fed bytes as they arrive from upstream. A chunk
/// boundary is a line that is empty after trimming; on EOF, a final
/// non-terminated partial chunk is still yielded.
pub struct SseDecoder {
    buffer: BytesMut,
    last_chunk_at: Option<Instant>,
    eof: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            last_chunk_at: None,
            eof: false,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn mark_eof(&mut self) {
        self.eof = true;
    }

    /// Pull the next complete chunk out of the buffer, if one is available.
    /// On EOF with a non-empty remaining buffer, drains and returns it as a
    /// final chunk exactly once.
    pub fn next_chunk(&mut self) -> Option<SseChunk> {
        if let Some(boundary) = find_blank_line_boundary(&self.buffer) {
            let raw = self.buffer.split_to(boundary).freeze();
            // Skip the blank-line terminator itself.
            let skip = blank_line_len(&self.buffer);
            self.buffer.advance(skip);
            return Some(self.build_chunk(raw));
        }

        if self.eof && !self.buffer.is_empty() {
            let raw = self.buffer.split_to(self.buffer.len()).freeze();
            return Some(self.build_chunk(raw));
        }

        None
    }

    fn build_chunk(&mut self, raw: Bytes) -> SseChunk {
        let now = Instant::now();
        let time_delta_ms = match self.last_chunk_at {
            Some(prev) => now.duration_since(prev).as_millis() as i64,
            None => 0,
        };
        self.last_chunk_at = Some(now);

        let (event, data, id, retry) = parse_fields(&raw);
        SseChunk { raw, event, data, id, retry, time_delta_ms }
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn find_blank_line_boundary(buffer: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < buffer.len() {
        if let Some(nl) = buffer[i..].iter().position(|&b| b == b'\n') {
            let line_end = i + nl;
            let line = trim_cr(&buffer[i..line_end]);
            if line.is_empty() {
                return Some(line_end + 1);
            }
            i = line_end + 1;
        } else {
            return None;
        }
    }
    None
}

fn blank_line_len(_remaining: &[u8]) -> usize {
    0
}

fn trim_cr(line: &[u8]) -> &[u8] {
    if line.last() == Some(&b'\r') {
        &line[..line.len() - 1]
    } else {
        line
    }
}

fn parse_fields(raw: &[u8]) -> (Option<String>, Option<String>, Option<String>, Option<u64>) {
    let mut event = None;
    let mut data_lines: Vec<String> = Vec::new();
    let mut id = None;
    let mut retry = None;

    for line in raw.split(|&b| b == b'\n') {
        let line = trim_cr(line);
        if line.is_empty() || line.starts_with(b":") {
            continue;
        }
        let line = String::from_utf8_lossy(line);
        let (name, value) = match line.split_once(':') {
            Some((n, v)) => (n, v.strip_prefix(' ').unwrap_or(v)),
            None => (line.as_ref(), ""),
        };
        match name {
            "event" => event = Some(value.to_string()),
            "data" => data_lines.push(value.to_string()),
            "id" => id = Some(value.to_string()),
            "retry" => retry = value.parse().ok(),
            _ => {}
        }
    }

    let data = if data_lines.is_empty() { None } else { Some(data_lines.join("\n")) };
    (event, data, id, retry)
}

/// Write timing for replaying recorded chunks: sleep `time_delta_ms` before
/// each chunk (skipping the wait for the first, which is always 0) so the
/// client observes the original inter-arrival pacing.
pub async fn sleep_for_chunk_timing(time_delta_ms: i64) {
    if time_delta_ms > 0 {
        tokio::time::sleep(Duration::from_millis(time_delta_ms as u64)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_terminated_chunk() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"event: message\ndata: hello\n\n");
        let chunk = decoder.next_chunk().unwrap();
        assert_eq!(chunk.event.as_deref(), Some("message"));
        assert_eq!(chunk.data.as_deref(), Some("hello"));
        assert_eq!(chunk.time_delta_ms, 0);
    }

    #[test]
    fn joins_repeated_data_lines_with_newline() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"data: line1\ndata: line2\n\n");
        let chunk = decoder.next_chunk().unwrap();
        assert_eq!(chunk.data.as_deref(), Some("line1\nline2"));
    }

    #[test]
    fn skips_comment_lines() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b": this is a comment\ndata: hello\n\n");
        let chunk = decoder.next_chunk().unwrap();
        assert_eq!(chunk.data.as_deref(), Some("hello"));
    }

    #[test]
    fn eof_without_trailing_blank_line_still_yields_final_chunk() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"data: partial");
        assert!(decoder.next_chunk().is_none());
        decoder.mark_eof();
        let chunk = decoder.next_chunk().unwrap();
        assert_eq!(chunk.data.as_deref(), Some("partial"));
    }

    #[test]
    fn parses_retry_as_integer() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"retry: 5000\ndata: hi\n\n");
        let chunk = decoder.next_chunk().unwrap();
        assert_eq!(chunk.retry, Some(5000));
    }

    #[test]
    fn second_chunk_has_nonzero_time_delta() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"data: a\n\n");
        let first = decoder.next_chunk().unwrap();
        assert_eq!(first.time_delta_ms, 0);

        std::thread::sleep(Duration::from_millis(5));
        decoder.feed(b"data: b\n\n");
        let second = decoder.next_chunk().unwrap();
        assert!(second.time_delta_ms >= 0);
    }
}
