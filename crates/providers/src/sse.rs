//! SSE ingest shared by provider adapters.
//!
//! Providers stream completions as `text/event-stream`. The adapter feeds
//! raw response bytes into an [`SseBuffer`], which yields complete `data:`
//! payloads; a provider-specific closure turns each payload into zero or
//! more [`StreamEvent`]s.

use ah_domain::error::{Error, Result};
use ah_domain::stream::{BoxStream, StreamEvent};

/// Incremental buffer for an SSE byte stream.
///
/// Events are delimited by `\n\n`; only `data:` lines matter. Partial
/// events remain buffered until the delimiter arrives.
#[derive(Default)]
pub(crate) struct SseBuffer {
    pending: String,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes and return every complete `data:` payload.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));
        self.drain_complete()
    }

    /// Flush whatever remains as a final event (stream closed mid-block).
    pub fn flush(&mut self) -> Vec<String> {
        if self.pending.trim().is_empty() {
            self.pending.clear();
            return Vec::new();
        }
        self.pending.push_str("\n\n");
        self.drain_complete()
    }

    fn drain_complete(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.find("\n\n") {
            let block: String = self.pending.drain(..pos).collect();
            self.pending.drain(..2);
            for line in block.lines() {
                if let Some(data) = line.trim().strip_prefix("data:") {
                    let data = data.trim();
                    if !data.is_empty() {
                        payloads.push(data.to_string());
                    }
                }
            }
        }
        payloads
    }
}

/// Build a [`BoxStream`] of [`StreamEvent`]s from an SSE response.
///
/// `parse_data` receives each `data:` payload; it is `FnMut` so parsers can
/// keep assembly state across payloads. When the body closes without the
/// parser producing a `Done`, a fallback `Done` is emitted so consumers
/// always see a terminal stream event.
pub(crate) fn event_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = SseBuffer::new();
        let mut done_emitted = false;

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    for payload in buffer.push(&bytes) {
                        for event in parse_data(&payload) {
                            done_emitted |= matches!(&event, Ok(StreamEvent::Done { .. }));
                            yield event;
                        }
                    }
                }
                Ok(None) => {
                    for payload in buffer.flush() {
                        for event in parse_data(&payload) {
                            done_emitted |= matches!(&event, Ok(StreamEvent::Done { .. }));
                            yield event;
                        }
                    }
                    break;
                }
                Err(e) => {
                    let err = if e.is_timeout() {
                        Error::Timeout(e.to_string())
                    } else {
                        Error::Http(e.to_string())
                    };
                    yield Err(err);
                    break;
                }
            }
        }

        if !done_emitted {
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
