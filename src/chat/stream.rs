use std::pin::Pin;
use std::task::{Context, Poll};

use async_stream::try_stream;
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use tracing::{debug, error, trace};

use super::{ChainError, StreamMode};
use crate::client::types::ErrorEnvelope;
use crate::client::{ChatChunk, ProviderError};
use crate::tokens::{StreamAccountant, TokenLedger, UsageRecord};

const CHUNK_SEPARATOR: &[u8] = b"\n\n";
const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

/// One item of a streamed response
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A decoded fragment, produced in [`StreamMode::Raw`]
    Fragment(ChatChunk),
    /// A piece of text, produced in [`StreamMode::PlainText`]
    Delta(String),
    /// Always the last event of a completed stream
    Usage(UsageRecord),
}

#[derive(Debug, PartialEq)]
pub(crate) enum SseEvent {
    Chunk(ChatChunk),
    Done,
}

/// Splits server-sent event bytes into frames. Incomplete frames stay buffered until the
/// rest of their bytes arrive.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: BytesMut,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer
            .extend(bytes.iter().copied().filter(|byte| *byte != b'\r'));
    }

    /// Terminate the last frame of a body that ended without a separator
    pub fn finish(&mut self) {
        let pending = self.buffer.iter().any(|byte| !byte.is_ascii_whitespace());
        if pending && !self.buffer.ends_with(CHUNK_SEPARATOR) {
            self.buffer.put_slice(CHUNK_SEPARATOR);
        }
    }

    /// Next complete event in the buffer, `None` when more bytes are needed
    pub fn next_event(&mut self) -> Result<Option<SseEvent>, ChainError> {
        loop {
            let Some(separator_pos) = self
                .buffer
                .windows(CHUNK_SEPARATOR.len())
                .position(|window| window == CHUNK_SEPARATOR)
            else {
                return Ok(None);
            };

            let frame = self.buffer.split_to(separator_pos + CHUNK_SEPARATOR.len());
            if let Some(event) = parse_frame(&frame[..separator_pos])? {
                return Ok(Some(event));
            }
        }
    }
}

fn parse_frame(frame: &[u8]) -> Result<Option<SseEvent>, ChainError> {
    let frame = std::str::from_utf8(frame)
        .map_err(|e| ProviderError::transport(format!("stream is not valid UTF-8: {e}")))?;

    let data: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();

    // Comments and keep-alives
    if data.is_empty() {
        return Ok(None);
    }

    let payload = data.join("\n");
    if payload.trim() == DONE_MARKER {
        debug!("DONE detected");
        return Ok(Some(SseEvent::Done));
    }

    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&payload) {
        error!(message = %envelope.error.message, "error in stream");
        return Err(ProviderError::other(envelope.error.message).into());
    }

    match serde_json::from_str::<ChatChunk>(&payload) {
        Ok(chunk) => Ok(Some(SseEvent::Chunk(chunk))),
        Err(e) => {
            error!("Failed to parse chunk as JSON: {}", payload);
            Err(ProviderError::transport(format!("cannot parse chunk: {e}")).into())
        }
    }
}

type EventStream<'a> = Pin<Box<dyn Stream<Item = Result<StreamEvent, ChainError>> + Send + 'a>>;

/// Events of one streamed call, ending with a single [`StreamEvent::Usage`].
///
/// The usage is committed to the chain's ledger when that last event is produced. The stream
/// is fused: after it ends or fails it only yields `None`.
pub struct ChainStream<'a> {
    inner: EventStream<'a>,
    finished: bool,
}

impl<'a> ChainStream<'a> {
    fn new(inner: EventStream<'a>) -> Self {
        Self {
            inner,
            finished: false,
        }
    }

    /// Drain the stream and concatenate its text
    pub async fn collect_text(mut self) -> Result<String, ChainError> {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event? {
                StreamEvent::Delta(delta) => text.push_str(&delta),
                StreamEvent::Fragment(chunk) => text.push_str(chunk.content().unwrap_or_default()),
                StreamEvent::Usage(_) => {}
            }
        }
        Ok(text)
    }
}

impl Stream for ChainStream<'_> {
    type Item = Result<StreamEvent, ChainError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        let poll = this.inner.as_mut().poll_next(cx);
        if matches!(poll, Poll::Ready(None) | Poll::Ready(Some(Err(_)))) {
            this.finished = true;
        }
        poll
    }
}

/// Decode `bytes` into chain events. Usage reported by the backend is preferred over the
/// accountant's estimate.
pub(crate) fn decode_events<'a, S>(
    bytes: S,
    mode: StreamMode,
    mut accountant: StreamAccountant,
    ledger: &'a mut TokenLedger,
) -> ChainStream<'a>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'a,
{
    let stream = try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut decoder = SseDecoder::default();
        let mut exhausted = false;
        let mut reported = None;

        debug!(?mode, "Opening stream");
        loop {
            let event = match decoder.next_event()? {
                Some(event) => event,
                None if exhausted => break,
                None => {
                    match bytes.next().await {
                        Some(chunk) => {
                            let chunk = chunk.map_err(|e| ChainError::from(ProviderError::from(e)))?;
                            trace!(size = chunk.len(), "processing");
                            decoder.push(&chunk);
                        }
                        None => {
                            debug!("Stream exhausted");
                            exhausted = true;
                            decoder.finish();
                        }
                    }
                    continue;
                }
            };

            let chunk = match event {
                SseEvent::Done => break,
                SseEvent::Chunk(chunk) => chunk,
            };

            if let Some(usage) = chunk.usage {
                reported = Some(usage);
            }

            let delta = chunk.content().map(str::to_string);
            if let Some(text) = &delta {
                accountant.push(text);
            }

            match mode {
                StreamMode::Raw => {
                    yield StreamEvent::Fragment(chunk);
                }
                StreamMode::PlainText => {
                    if let Some(text) = delta {
                        yield StreamEvent::Delta(text);
                    }
                }
            }
        }

        let record = accountant.finish(reported.as_ref());
        debug!(
            prompt_tokens = record.prompt_tokens,
            completion_tokens = record.completion_tokens,
            source = ?record.source,
            "End of streaming"
        );
        ledger.record(record.clone());
        yield StreamEvent::Usage(record);
    };

    ChainStream::new(Box::pin(stream) as EventStream<'a>)
}
