//! Server-Sent Events decoding
//!
//! Splits a raw `text/event-stream` byte stream into the payloads of its events.
//! Only `data:` fields are interpreted; multiple `data:` lines of one event are joined
//! with `\n`, comment lines (`:`) and the other SSE fields (`event:`, `id:`, `retry:`)
//! are ignored. An event cut off by the end of the stream is discarded.

use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::debug;

/// Incremental line-oriented SSE decoder.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the payloads of every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut completed = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.trim_end_matches('\r');

            if line.is_empty() {
                // Blank line terminates the event
                if let Some(data) = self.data.take() {
                    completed.push(data);
                }
            } else if let Some(value) = field_value(line, "data") {
                match self.data.as_mut() {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => self.data = Some(value.to_string()),
                }
            }
        }
        completed
    }

    /// Ends decoding. An event still missing its blank line is incomplete and
    /// is dropped; returns whether one was.
    pub fn finish(&mut self) -> bool {
        let partial = self.data.take().is_some() || !self.buffer.is_empty();
        self.buffer.clear();
        partial
    }
}

fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Turns a byte stream into a stream of event payloads.
///
/// Transport errors are forwarded and end the stream.
pub fn data_stream<S, E>(bytes: S) -> impl Stream<Item = Result<String, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    stream! {
        let mut decoder = SseDecoder::new();
        let mut bytes = Box::pin(bytes);
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for data in decoder.push(&chunk) {
                        yield Ok(data);
                    }
                }
                Err(err) => {
                    yield Err(err);
                    return;
                }
            }
        }
        if decoder.finish() {
            debug!("dropping unterminated SSE event at end of stream");
        }
    }
}
