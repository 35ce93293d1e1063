use anyhow::Result;
use std::collections::VecDeque;

/// Byte ring that yields complete `\n`-terminated lines.
///
/// Network chunks from the model endpoint split SSE lines (and UTF-8
/// sequences) arbitrarily; bytes stay buffered until a newline arrives.
pub struct CircularLineBuffer {
    buffer: VecDeque<u8>,
}

impl CircularLineBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Next complete line, trimmed. `None` until a newline is buffered.
    pub fn next_line(&mut self) -> Option<Result<String>> {
        let newline_pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();

        match String::from_utf8(line_bytes) {
            Ok(line) => Some(Ok(line.trim().to_string())),
            Err(e) => Some(Err(anyhow::anyhow!("Invalid UTF-8 in stream: {}", e))),
        }
    }

    /// Whatever is left after the connection closed without a final newline
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let bytes: Vec<u8> = self.buffer.drain(..).collect();
        let line = String::from_utf8_lossy(&bytes).trim().to_string();
        (!line.is_empty()).then_some(line)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut buffer = CircularLineBuffer::with_capacity(64);

        buffer.extend(b"data: {\"a\"");
        assert!(buffer.next_line().is_none());

        buffer.extend(b":1}\n\ndata: [DONE]\n");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "data: {\"a\":1}");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "data: [DONE]");
        assert!(buffer.next_line().is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multibyte_char_split() {
        let mut buffer = CircularLineBuffer::with_capacity(16);
        let text = "café\n".as_bytes();

        buffer.extend(&text[..4]);
        assert!(buffer.next_line().is_none());
        buffer.extend(&text[4..]);
        assert_eq!(buffer.next_line().unwrap().unwrap(), "café");
    }

    #[test]
    fn test_remainder() {
        let mut buffer = CircularLineBuffer::with_capacity(16);
        buffer.extend(b"data: tail");
        assert_eq!(buffer.take_remainder().as_deref(), Some("data: tail"));
        assert!(buffer.take_remainder().is_none());
    }
}
