/// Incremental Server-Sent Events decoder for the subscribe stream.
///
/// Feeds raw byte chunks in arbitrary splits and yields the `data` payload
/// of each complete event. Comment lines (`:`) and the `event`, `id` and
/// `retry` fields are ignored; multiple `data` lines are joined with `\n`.
use crate::agent::TransportError;

/// Longest line accepted before the stream is treated as malformed.
const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, TransportError> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8(line)
                .map_err(|e| TransportError::MalformedFrame(format!("invalid utf-8: {}", e)))?;
            if let Some(payload) = self.take_line(&line) {
                events.push(payload);
            }
        }

        if self.pending.len() > MAX_LINE_BYTES {
            return Err(TransportError::MalformedFrame(format!(
                "line exceeds {} bytes",
                MAX_LINE_BYTES
            )));
        }
        Ok(events)
    }

    fn take_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let payload = self.data.join("\n");
            self.data.clear();
            return Some(payload);
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }
}
