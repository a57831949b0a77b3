//! lx-stream: Streaming response normalization for llmux.
//!
//! This crate turns a provider's SSE byte stream into one ordered
//! `ModelResponse`: the framer splits bytes into events, a provider decoder
//! (supplied by the caller) maps them to deltas, the resolver assigns missing
//! indices, and the accumulator merges everything into final parts.

pub mod accumulator;
pub mod audio;
pub mod config;
pub mod error;
pub mod mock;
pub mod pipeline;
pub mod resolver;
pub mod sse;

pub use accumulator::{accumulate_stream, AccumulatorState, StreamAccumulator};
pub use audio::{merge_pcm16_base64, SampleBuffer};
pub use config::{Config, ConfigError, FramerConfig};
pub use error::{ErrorKind, StreamError};
pub use mock::{MockConfig, MockResponse};
pub use pipeline::{DecodedEvent, DeltaPipeline, ResponseDecoder};
pub use resolver::{guess_delta_index, DeltaIndexer};
pub use sse::{parse_data_line, parse_sse_stream, SseEvent, SseStream};
