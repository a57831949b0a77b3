//! Server-Sent Events (SSE) stream framer.
//!
//! Turns a byte stream into discrete SSE events. Lines are buffered as bytes
//! so a UTF-8 character split across two transport chunks survives, and a
//! single line may not grow past the configured maximum.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::config::FramerConfig;
use crate::error::StreamError;

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type (from `event:` field). None if not specified.
    pub event_type: Option<String>,
    /// The event data (from `data:` field(s)), joined with `\n`.
    pub data: String,
    /// The event id (from `id:` field). None if not specified.
    pub id: Option<String>,
}

/// Extract the payload of a single `data:` line without assembling events.
///
/// Useful for providers whose streams are one JSON document per `data:` line.
pub fn parse_data_line(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// Parser state for SSE stream.
#[derive(Default)]
struct SseParserState {
    /// Bytes of the line currently being received
    line_buf: Vec<u8>,
    current_event_type: Option<String>,
    current_id: Option<String>,
    current_data: Vec<String>,
}

impl SseParserState {
    /// Feed a transport chunk, pushing every completed event onto `out`.
    fn feed(
        &mut self,
        mut bytes: &[u8],
        max_line_bytes: usize,
        out: &mut VecDeque<SseEvent>,
    ) -> Result<(), StreamError> {
        while let Some(pos) = bytes.iter().position(|&b| b == b'\n') {
            self.extend_line(&bytes[..pos], max_line_bytes)?;
            let line = std::mem::take(&mut self.line_buf);
            self.dispatch_line(&line, out);
            bytes = &bytes[pos + 1..];
        }
        self.extend_line(bytes, max_line_bytes)
    }

    fn extend_line(&mut self, part: &[u8], max_line_bytes: usize) -> Result<(), StreamError> {
        let len = self.line_buf.len() + part.len();
        // The CR of a CRLF terminator is not part of the line
        let cr_terminated =
            len == max_line_bytes + 1 && part.last().or(self.line_buf.last()) == Some(&b'\r');
        if len > max_line_bytes && !cr_terminated {
            return Err(StreamError::LineTooLong {
                max: max_line_bytes,
            });
        }
        self.line_buf.extend_from_slice(part);
        Ok(())
    }

    fn dispatch_line(&mut self, raw: &[u8], out: &mut VecDeque<SseEvent>) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        if let Some(event) = self.process_line(&line) {
            out.push_back(event);
        }
    }

    /// Process a complete line. Returns an event if one is complete.
    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        // Empty line signals end of event
        if line.trim().is_empty() {
            return self.take_event();
        }

        if line.starts_with(':') {
            return None;
        }

        if let Some((field, value)) = line.split_once(':') {
            let value = value.trim();
            match field {
                "event" => self.current_event_type = Some(value.to_string()),
                "data" => self.current_data.push(value.to_string()),
                "id" => self.current_id = Some(value.to_string()),
                // retry and unknown fields
                _ => {}
            }
        }

        None
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        let event_type = self.current_event_type.take();
        let id = self.current_id.take();
        if self.current_data.is_empty() {
            return None;
        }

        let data = self.current_data.join("\n");
        self.current_data.clear();
        tracing::trace!(event_type = ?event_type, bytes = data.len(), "framed sse event");
        Some(SseEvent {
            event_type,
            data,
            id,
        })
    }

    /// Flush a trailing unterminated line and any event still being built.
    fn finish(&mut self, out: &mut VecDeque<SseEvent>) {
        if !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            self.dispatch_line(&line, out);
        }
        if let Some(event) = self.take_event() {
            out.push_back(event);
        }
    }
}

/// Stream wrapper that parses SSE events from a byte stream.
///
/// Yields `Ok(event)` for each framed event, at most one `Err` after which the
/// stream ends, and `None` once the input is exhausted.
pub struct SseStream<S> {
    inner: S,
    state: SseParserState,
    pending_events: VecDeque<SseEvent>,
    pending_error: Option<StreamError>,
    max_line_bytes: usize,
    cancelled: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
    deadline: Option<Pin<Box<Sleep>>>,
    inner_done: bool,
    terminated: bool,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, FramerConfig::default())
    }

    pub fn with_config(inner: S, config: FramerConfig) -> Self {
        Self {
            inner,
            state: SseParserState::default(),
            pending_events: VecDeque::new(),
            pending_error: None,
            max_line_bytes: config.max_line_bytes,
            cancelled: None,
            deadline: None,
            inner_done: false,
            terminated: false,
        }
    }

    /// Stop with [`StreamError::Cancelled`] once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancelled = Some(Box::pin(token.cancelled_owned()));
        self
    }

    /// Stop with [`StreamError::DeadlineExceeded`] once `deadline` passes.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(Box::pin(tokio::time::sleep_until(deadline)));
        self
    }

    /// Check the cancellation token and deadline, registering for wakeups.
    fn poll_interrupt(&mut self, cx: &mut Context<'_>) -> Option<StreamError> {
        if let Some(cancelled) = self.cancelled.as_mut() {
            if cancelled.as_mut().poll(cx).is_ready() {
                tracing::debug!("sse stream cancelled");
                return Some(StreamError::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                tracing::debug!("sse stream deadline exceeded");
                return Some(StreamError::DeadlineExceeded);
            }
        }
        None
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = Result<SseEvent, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if this.terminated {
            return Poll::Ready(None);
        }

        if let Some(err) = this.poll_interrupt(cx) {
            this.terminated = true;
            return Poll::Ready(Some(Err(err)));
        }

        loop {
            // Events framed before a failure are delivered ahead of it
            if let Some(event) = this.pending_events.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if let Some(err) = this.pending_error.take() {
                tracing::warn!(error = %err, "sse stream failed");
                this.terminated = true;
                return Poll::Ready(Some(Err(err)));
            }
            if this.inner_done {
                this.terminated = true;
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    if let Err(err) =
                        this.state
                            .feed(&bytes, this.max_line_bytes, &mut this.pending_events)
                    {
                        this.pending_error = Some(err);
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.pending_error = Some(StreamError::transport(e));
                }
                Poll::Ready(None) => {
                    this.state.finish(&mut this.pending_events);
                    this.inner_done = true;
                }
                Poll::Pending => {
                    return Poll::Pending;
                }
            }
        }
    }
}

/// Create an SSE stream from a byte stream.
pub fn parse_sse_stream<S, E>(stream: S) -> SseStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    SseStream::new(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn bytes_stream(
        chunks: Vec<&'static str>,
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        futures::stream::iter(chunks.into_iter().map(|s| Ok(Bytes::from(s))))
    }

    #[tokio::test]
    async fn parse_simple_event() {
        let mut sse = parse_sse_stream(bytes_stream(vec!["data: hello\n\n"]));

        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.event_type, None);
        assert_eq!(event.data, "hello");
        assert_eq!(event.id, None);
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn parse_event_with_type_and_id() {
        let mut sse = parse_sse_stream(bytes_stream(vec![
            "event: message\ndata: hello world\nid: 42\n\n",
        ]));

        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.event_type.as_deref(), Some("message"));
        assert_eq!(event.data, "hello world");
        assert_eq!(event.id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn parse_multi_line_data() {
        let mut sse = parse_sse_stream(bytes_stream(vec!["data: foo\ndata: bar\n\n"]));

        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.data, "foo\nbar");
    }

    #[tokio::test]
    async fn parse_multiple_events() {
        let mut sse = parse_sse_stream(bytes_stream(vec![
            "event: first\ndata: one\n\nevent: second\ndata: two\n\n",
        ]));

        let event1 = sse.next().await.unwrap().unwrap();
        assert_eq!(event1.event_type.as_deref(), Some("first"));
        assert_eq!(event1.data, "one");

        let event2 = sse.next().await.unwrap().unwrap();
        assert_eq!(event2.event_type.as_deref(), Some("second"));
        assert_eq!(event2.data, "two");

        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn parse_chunked_data() {
        let mut sse = parse_sse_stream(bytes_stream(vec!["data: hel", "lo wor", "ld\n\n"]));

        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.data, "hello world");
    }

    #[tokio::test]
    async fn multibyte_char_split_across_chunks() {
        // "é" is 0xC3 0xA9
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: caf\xC3")),
            Ok(Bytes::from_static(b"\xA9\n\n")),
        ];
        let mut sse = parse_sse_stream(futures::stream::iter(chunks));

        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.data, "café");
    }

    #[tokio::test]
    async fn parse_with_crlf() {
        let mut sse = parse_sse_stream(bytes_stream(vec!["data: hello\r\n\r\n"]));

        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.data, "hello");
    }

    #[tokio::test]
    async fn ignore_comments_and_keepalives() {
        let mut sse = parse_sse_stream(bytes_stream(vec![
            ": keepalive\n\n: this is a comment\ndata: actual data\n\n",
        ]));

        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.data, "actual data");
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn ignore_unknown_fields() {
        let mut sse = parse_sse_stream(bytes_stream(vec!["retry: 5000\ndata: hello\n\n"]));

        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.data, "hello");
    }

    #[tokio::test]
    async fn field_values_are_trimmed() {
        let mut sse = parse_sse_stream(bytes_stream(vec![
            "event:   delta  \ndata:\t{\"a\":1}  \n\n",
        ]));

        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.event_type.as_deref(), Some("delta"));
        assert_eq!(event.data, "{\"a\":1}");
    }

    #[tokio::test]
    async fn empty_data_field() {
        let mut sse = parse_sse_stream(bytes_stream(vec!["data:\n\n"]));

        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.data, "");
    }

    #[tokio::test]
    async fn block_without_data_emits_nothing() {
        let mut sse = parse_sse_stream(bytes_stream(vec![
            "event: ping\nid: 1\n\ndata: real\n\n",
        ]));

        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.event_type, None);
        assert_eq!(event.id, None);
        assert_eq!(event.data, "real");
    }

    #[tokio::test]
    async fn multiple_empty_lines_between_events() {
        let mut sse = parse_sse_stream(bytes_stream(vec!["data: first\n\n\n\ndata: second\n\n"]));

        assert_eq!(sse.next().await.unwrap().unwrap().data, "first");
        assert_eq!(sse.next().await.unwrap().unwrap().data, "second");
    }

    #[tokio::test]
    async fn data_with_colon() {
        let mut sse = parse_sse_stream(bytes_stream(vec!["data: {\"key\": \"value\"}\n\n"]));

        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.data, "{\"key\": \"value\"}");
    }

    #[tokio::test]
    async fn event_at_stream_end_without_trailing_newline() {
        let mut sse = parse_sse_stream(bytes_stream(vec!["data: final"]));

        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.data, "final");
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn oversized_line_fails_after_earlier_events() {
        let config = FramerConfig { max_line_bytes: 16 };
        let stream = bytes_stream(vec![
            "data: ok\n\ndata: this line is far too long\n\n",
        ]);
        let mut sse = SseStream::with_config(stream, config);

        assert_eq!(sse.next().await.unwrap().unwrap().data, "ok");
        let err = sse.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::LineTooLong { max: 16 }));
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn oversized_line_detected_across_chunks() {
        let config = FramerConfig { max_line_bytes: 8 };
        let stream = bytes_stream(vec!["data:", " 1234", "56789"]);
        let mut sse = SseStream::with_config(stream, config);

        let err = sse.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::LineTooLong { .. }));
    }

    #[tokio::test]
    async fn line_at_exact_limit_is_accepted() {
        let config = FramerConfig { max_line_bytes: 8 };
        let mut sse = SseStream::with_config(bytes_stream(vec!["data: ab\n\n"]), config);

        assert_eq!(sse.next().await.unwrap().unwrap().data, "ab");
    }

    #[tokio::test]
    async fn crlf_line_at_exact_limit_is_accepted() {
        let config = FramerConfig { max_line_bytes: 8 };
        let mut sse = SseStream::with_config(bytes_stream(vec!["data: ab\r\n\r\n"]), config);
        assert_eq!(sse.next().await.unwrap().unwrap().data, "ab");

        // CR and LF in separate chunks
        let stream = bytes_stream(vec!["data: cd\r", "\n\r\n"]);
        let mut sse = SseStream::with_config(stream, config);
        assert_eq!(sse.next().await.unwrap().unwrap().data, "cd");

        // A CR that turns out not to end the line still counts
        let stream = bytes_stream(vec!["data: ef\r", "g\n\n"]);
        let mut sse = SseStream::with_config(stream, config);
        let err = sse.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::LineTooLong { max: 8 }));
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from("data: before\n\n")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset by peer",
            )),
            Ok(Bytes::from("data: after\n\n")),
        ];
        let mut sse = parse_sse_stream(futures::stream::iter(chunks));

        assert_eq!(sse.next().await.unwrap().unwrap().data, "before");
        let err = sse.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Transport(_)));
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn cancelled_token_stops_stream() {
        let token = CancellationToken::new();
        token.cancel();
        let mut sse =
            parse_sse_stream(bytes_stream(vec!["data: never\n\n"])).with_cancellation(token);

        let err = sse.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Cancelled));
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn cancellation_wakes_pending_read() {
        let token = CancellationToken::new();
        let stream = futures::stream::pending::<Result<Bytes, std::io::Error>>();
        let mut sse = parse_sse_stream(stream).with_cancellation(token.clone());

        tokio::spawn(async move {
            tokio::task::yield_now().await;
            token.cancel();
        });

        let err = sse.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_stalled_stream() {
        let stream = futures::stream::pending::<Result<Bytes, std::io::Error>>();
        let deadline = Instant::now() + Duration::from_secs(30);
        let mut sse = parse_sse_stream(stream).with_deadline(deadline);

        let err = sse.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::DeadlineExceeded));
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn data_line_extraction() {
        assert_eq!(parse_data_line("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(parse_data_line("data:[DONE]"), Some("[DONE]"));
        assert_eq!(parse_data_line("event: delta"), None);
        assert_eq!(parse_data_line(": comment"), None);
    }
}
