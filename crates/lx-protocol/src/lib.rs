//! lx-protocol: Shared content types for llmux.
//!
//! This crate defines the provider-neutral vocabulary that decoders produce
//! and the stream accumulator consumes: parts, part deltas, the finished
//! response, and the audio format registry.

pub mod audio;
pub mod content;
pub mod message;

pub use audio::{AudioFormat, AudioFormatRegistry};
pub use content::{ContentDelta, ModelResponse, ModelUsage, Part, PartDelta, PartKind};
pub use message::StreamEvent;
