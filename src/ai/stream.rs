//! Line framing for streamed HTTP bodies.
//!
//! Providers stream either server-sent events (`data: {...}` lines) or
//! newline-delimited JSON. Both arrive as arbitrary byte chunks, so lines are
//! reassembled before any JSON is parsed.

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use std::fmt::Display;
use std::pin::Pin;

use super::provider::TextStream;
use crate::models::error::{AgentError, Result};

struct LineState<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    done: bool,
}

/// Split a byte stream into lines, without their `\n` or `\r\n` endings.
///
/// A transport error ends the stream after being yielded once.
pub fn line_stream<S, B, E>(bytes: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = LineState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                return Some((Ok(decode_line(&line)), state));
            }

            if state.done {
                if state.buffer.is_empty() {
                    return None;
                }
                let rest = std::mem::take(&mut state.buffer);
                return Some((Ok(decode_line(&rest)), state));
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    state.done = true;
                    state.buffer.clear();
                    return Some((
                        Err(AgentError::Provider(format!("Stream interrupted: {}", e))),
                        state,
                    ));
                }
                None => state.done = true,
            }
        }
    })
    .boxed()
}

fn decode_line(line: &[u8]) -> String {
    String::from_utf8_lossy(line)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

/// Payload of an SSE `data:` line; other fields and comments yield `None`
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Turn framed lines into text fragments.
///
/// `parse` returns `None` for lines that carry no text.
pub fn text_stream<F>(lines: BoxStream<'static, Result<String>>, mut parse: F) -> TextStream
where
    F: FnMut(&str) -> Option<Result<String>> + Send + 'static,
{
    lines
        .filter_map(move |line| {
            let fragment = match line {
                Ok(line) => parse(&line),
                Err(e) => Some(Err(e)),
            };
            futures_util::future::ready(fragment)
        })
        .boxed()
}
