//! Incremental parser for `data:`-prefixed streaming responses.
//!
//! The streaming chat endpoint emits one `data: {json}` line per chunk and a
//! literal `data: [DONE]` terminator. HTTP chunk boundaries do not respect
//! line boundaries, so the parser buffers the unfinished tail until its
//! newline arrives.

/// Literal payload marking the end of the stream.
pub const DONE_MARKER: &str = "[DONE]";

pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Feed raw bytes from the HTTP response. Returns the payloads of any
    /// complete `data:` lines; blank lines and other fields are dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer = self.buffer[pos + 1..].to_string();

            if line.is_empty() {
                continue;
            }
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start_matches(' ').to_string());
            }
            // Ignore other fields (event:, id:, retry:, comments starting with :)
        }

        payloads
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_lines() {
        let mut parser = SseParser::new();
        let payloads = parser.feed(b"data: hello\ndata: world\n");
        assert_eq!(payloads, vec!["hello", "world"]);
    }

    #[test]
    fn test_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: hel").is_empty());
        let payloads = parser.feed(b"lo\n");
        assert_eq!(payloads, vec!["hello"]);
    }

    #[test]
    fn test_done_marker_passes_through() {
        let mut parser = SseParser::new();
        let payloads = parser.feed(b"data: [DONE]\n");
        assert_eq!(payloads, vec![DONE_MARKER]);
    }

    #[test]
    fn test_non_data_lines_dropped() {
        let mut parser = SseParser::new();
        let payloads = parser.feed(b": keep-alive\nevent: ping\n\ndata: x\n");
        assert_eq!(payloads, vec!["x"]);
    }
}
