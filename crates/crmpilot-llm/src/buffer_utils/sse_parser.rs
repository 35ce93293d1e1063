use anyhow::Result;
use futures::{Stream, StreamExt};
use std::fmt::Display;

use super::buffering::CircularLineBuffer;
use crate::traits::EventStream;
use crate::StreamEvent;

/// Strategy for turning one SSE `data:` payload into model events
pub trait SseLineParser: Send {
    fn parse_data_line(&self, data: &str) -> Result<Vec<StreamEvent>>;

    fn is_done_marker(&self, data: &str) -> bool {
        data == "[DONE]"
    }
}

/// Drive a byte stream through the line buffer and `parser`.
///
/// The returned stream ends with exactly one `Done` event unless a transport
/// error is yielded first.
pub fn parse_sse_stream<S, B, E, P>(byte_stream: S, parser: P) -> EventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
    P: SseLineParser + 'static,
{
    Box::pin(async_stream::stream! {
        let mut chunks = Box::pin(byte_stream);
        let mut buffer = CircularLineBuffer::with_capacity(4096);
        let mut saw_marker = false;
        let mut done_emitted = false;

        'outer: while let Some(chunk_result) = chunks.next().await {
            let bytes = match chunk_result {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(anyhow::anyhow!("Stream error: {}", e));
                    return;
                }
            };
            buffer.extend(bytes.as_ref());

            while let Some(line_result) = buffer.next_line() {
                let line = match line_result {
                    Ok(line) => line,
                    Err(e) => {
                        yield Err(e);
                        continue;
                    }
                };

                let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                    continue;
                };

                if parser.is_done_marker(data) {
                    saw_marker = true;
                    break 'outer;
                }

                match parser.parse_data_line(data) {
                    Ok(events) => {
                        for event in events {
                            if matches!(event, StreamEvent::Done { .. }) {
                                done_emitted = true;
                            }
                            yield Ok(event);
                        }
                    }
                    Err(e) => yield Err(e),
                }
            }
        }

        if !saw_marker {
            let remainder = buffer.take_remainder();
            if let Some(data) = remainder.as_deref().and_then(|l| l.strip_prefix("data:")).map(str::trim) {
                if !parser.is_done_marker(data) {
                    match parser.parse_data_line(data) {
                        Ok(events) => {
                            for event in events {
                                if matches!(event, StreamEvent::Done { .. }) {
                                    done_emitted = true;
                                }
                                yield Ok(event);
                            }
                        }
                        Err(e) => yield Err(e),
                    }
                }
            }
        }

        if !done_emitted {
            yield Ok(StreamEvent::Done { finish_reason: None });
        }
    })
}
