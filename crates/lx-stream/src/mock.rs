//! Mock producers for testing.
//!
//! `mock_stream` yields the same unified `StreamEvent` sequence a real
//! decoder would, and `sse_byte_stream` yields raw SSE bytes for framer-level
//! tests, so every layer can be exercised without a provider.

use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures::Stream;
use lx_protocol::{ContentDelta, ModelUsage, PartDelta, StreamEvent};
use tokio::time::sleep;

use crate::error::StreamError;

/// Configurable mock responses for testing.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Emit a text delta.
    Text { index: usize, content: String },
    /// Emit a reasoning delta.
    Reasoning { index: usize, content: String },
    /// Emit a tool call delta.
    ToolCall {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        args: String,
    },
    /// Emit a base64 audio chunk.
    Audio { index: usize, data: String },
    /// Emit usage information.
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },
    /// Emit a cost snapshot.
    Cost { amount: f64 },
    /// Fail the stream with a transport error.
    Error { message: String },
    /// Delay before next event (for timing tests).
    Delay { ms: u64 },
}

/// Configuration for mock stream.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Sequence of responses to emit.
    pub responses: Vec<MockResponse>,
    /// Optional delay between each event (ms).
    pub chunk_delay_ms: Option<u64>,
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(mut self, responses: Vec<MockResponse>) -> Self {
        self.responses = responses;
        self
    }

    pub fn with_chunk_delay(mut self, ms: u64) -> Self {
        self.chunk_delay_ms = Some(ms);
        self
    }
}

/// Create a stream of unified events from mock config.
///
/// Ends with `Done`, unless an `Error` response cuts the stream short.
pub fn mock_stream(config: MockConfig) -> impl Stream<Item = Result<StreamEvent, StreamError>> {
    stream! {
        for response in config.responses {
            if let Some(delay_ms) = config.chunk_delay_ms {
                sleep(Duration::from_millis(delay_ms)).await;
            }

            match response {
                MockResponse::Text { index, content } => {
                    let part = PartDelta::text(content);
                    yield Ok(StreamEvent::Delta(ContentDelta::new(index, part)));
                }
                MockResponse::Reasoning { index, content } => {
                    let part = PartDelta::reasoning(content);
                    yield Ok(StreamEvent::Delta(ContentDelta::new(index, part)));
                }
                MockResponse::ToolCall { index, id, name, args } => {
                    let part = PartDelta::ToolCall {
                        tool_call_id: id,
                        tool_name: name,
                        args: Some(args),
                        id: None,
                    };
                    yield Ok(StreamEvent::Delta(ContentDelta::new(index, part)));
                }
                MockResponse::Audio { index, data } => {
                    let part = PartDelta::audio_data(data);
                    yield Ok(StreamEvent::Delta(ContentDelta::new(index, part)));
                }
                MockResponse::Usage { input_tokens, output_tokens } => {
                    yield Ok(StreamEvent::Usage(ModelUsage::new(input_tokens, output_tokens)));
                }
                MockResponse::Cost { amount } => {
                    yield Ok(StreamEvent::Cost(amount));
                }
                MockResponse::Error { message } => {
                    yield Err(StreamError::transport(std::io::Error::other(message)));
                    return;
                }
                MockResponse::Delay { ms } => {
                    sleep(Duration::from_millis(ms)).await;
                    // Delay doesn't emit an event
                }
            }
        }

        yield Ok(StreamEvent::Done);
    }
}

/// Raw SSE transport chunks, delivered exactly as given.
pub fn sse_byte_stream<I, T>(chunks: I) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin
where
    I: IntoIterator<Item = T>,
    T: Into<Bytes>,
{
    let chunks: Vec<Bytes> = chunks.into_iter().map(Into::into).collect();
    futures::stream::iter(chunks.into_iter().map(Ok))
}

/// Built-in test fixtures for common scenarios.
pub mod fixtures {
    use super::*;

    /// Create a mock config that streams text in chunks at index 0.
    pub fn streaming_text(chunks: &[&str]) -> MockConfig {
        let responses = chunks
            .iter()
            .map(|chunk| MockResponse::Text {
                index: 0,
                content: (*chunk).to_string(),
            })
            .collect();

        MockConfig::new().with_responses(responses)
    }

    /// Text at index 0 followed by a tool call at index 1 whose arguments
    /// arrive in `arg_chunks`.
    pub fn text_then_tool_call(
        text: &str,
        id: &str,
        name: &str,
        arg_chunks: &[&str],
    ) -> MockConfig {
        let mut responses = vec![MockResponse::Text {
            index: 0,
            content: text.to_string(),
        }];

        for (i, chunk) in arg_chunks.iter().enumerate() {
            let first = i == 0;
            responses.push(MockResponse::ToolCall {
                index: 1,
                id: first.then(|| id.to_string()),
                name: first.then(|| name.to_string()),
                args: (*chunk).to_string(),
            });
        }

        MockConfig::new().with_responses(responses)
    }

    /// Create a mock config that errors mid-stream.
    pub fn error_mid_stream(text_before: &str, error: &str) -> MockConfig {
        MockConfig::new().with_responses(vec![
            MockResponse::Text {
                index: 0,
                content: text_before.to_string(),
            },
            MockResponse::Error {
                message: error.to_string(),
            },
        ])
    }
}
