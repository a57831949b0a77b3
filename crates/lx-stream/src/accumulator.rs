//! Streaming response accumulator.
//!
//! Merges indexed deltas into parts and, once the stream has ended, builds the
//! final [`ModelResponse`]. One accumulator serves exactly one stream.

use std::collections::BTreeMap;
use std::fmt;

use futures::{Stream, StreamExt};
use lx_protocol::{
    AudioFormat, ContentDelta, ModelResponse, ModelUsage, Part, PartDelta, PartKind, StreamEvent,
};

use crate::audio::{encode_pcm16, ByteBuffer, SampleBuffer};
use crate::error::StreamError;

/// Lifecycle of an accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    /// Deltas are still arriving.
    Open,
    /// The source signalled end of stream (successfully or not).
    Finalizing,
    /// `finalize` has produced the response.
    Closed,
}

impl fmt::Display for AccumulatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Finalizing => "finalizing",
            Self::Closed => "closed",
        })
    }
}

/// Audio payload being merged. The buffer kind follows the part's format as
/// established when the first chunk arrives; raw PCM16 is assumed when none
/// is known yet.
#[derive(Debug, Clone)]
enum AudioData {
    Pcm16(SampleBuffer),
    Encoded(ByteBuffer),
}

impl AudioData {
    fn for_format(format: Option<AudioFormat>) -> Self {
        match format {
            Some(format) if !format.is_pcm16() => Self::Encoded(ByteBuffer::default()),
            _ => Self::Pcm16(SampleBuffer::new()),
        }
    }

    /// Append a chunk. A sample buffer whose part has since been given a
    /// compressed `format` switches to byte merging first. The buffer is left
    /// untouched on error.
    fn push_base64(
        &mut self,
        chunk: &str,
        format: Option<AudioFormat>,
    ) -> Result<(), StreamError> {
        match self {
            Self::Pcm16(buffer) if format.is_some_and(|f| !f.is_pcm16()) => {
                let mut bytes = ByteBuffer::from(encode_pcm16(buffer.samples()));
                bytes.push_base64(chunk)?;
                *self = Self::Encoded(bytes);
                Ok(())
            }
            Self::Pcm16(buffer) => buffer.push_base64(chunk),
            Self::Encoded(buffer) => buffer.push_base64(chunk),
        }
    }

    fn to_base64(&self) -> String {
        match self {
            Self::Pcm16(buffer) => buffer.to_base64(),
            Self::Encoded(buffer) => buffer.to_base64(),
        }
    }
}

/// A part under construction.
#[derive(Debug, Clone)]
enum PartBuilder {
    Text {
        text: String,
    },
    ToolCall {
        tool_call_id: Option<String>,
        tool_name: Option<String>,
        args: String,
        id: Option<String>,
    },
    Reasoning {
        text: String,
        signature: Option<String>,
        id: Option<String>,
    },
    Image {
        mime_type: Option<String>,
        data: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        id: Option<String>,
    },
    Audio {
        data: Option<AudioData>,
        format: Option<AudioFormat>,
        sample_rate: Option<u32>,
        channels: Option<u16>,
        transcript: Option<String>,
        id: Option<String>,
    },
}

/// Keep the first non-empty string.
fn set_once(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value.filter(|v| !v.is_empty());
    }
}

fn push_opt(target: &mut String, fragment: Option<String>) {
    if let Some(fragment) = fragment {
        target.push_str(&fragment);
    }
}

impl PartBuilder {
    /// An empty builder of the same variant as `delta`.
    fn empty_for(delta: &PartDelta) -> Self {
        match delta {
            PartDelta::Text { .. } => Self::Text {
                text: String::new(),
            },
            PartDelta::ToolCall { .. } => Self::ToolCall {
                tool_call_id: None,
                tool_name: None,
                args: String::new(),
                id: None,
            },
            PartDelta::Reasoning { .. } => Self::Reasoning {
                text: String::new(),
                signature: None,
                id: None,
            },
            PartDelta::Image { .. } => Self::Image {
                mime_type: None,
                data: None,
                width: None,
                height: None,
                id: None,
            },
            PartDelta::Audio { .. } => Self::Audio {
                data: None,
                format: None,
                sample_rate: None,
                channels: None,
                transcript: None,
                id: None,
            },
        }
    }

    fn kind(&self) -> PartKind {
        match self {
            Self::Text { .. } => PartKind::Text,
            Self::ToolCall { .. } => PartKind::ToolCall,
            Self::Reasoning { .. } => PartKind::Reasoning,
            Self::Image { .. } => PartKind::Image,
            Self::Audio { .. } => PartKind::Audio,
        }
    }

    /// Merge `delta` into this part. Nothing is modified when an error is returned.
    fn merge(&mut self, index: usize, delta: PartDelta) -> Result<(), StreamError> {
        match (self, delta) {
            (Self::Text { text }, PartDelta::Text { text: fragment }) => {
                text.push_str(&fragment);
            }
            (
                Self::ToolCall {
                    tool_call_id,
                    tool_name,
                    args,
                    id,
                },
                PartDelta::ToolCall {
                    tool_call_id: new_call_id,
                    tool_name: new_name,
                    args: fragment,
                    id: new_id,
                },
            ) => {
                set_once(tool_call_id, new_call_id);
                set_once(tool_name, new_name);
                set_once(id, new_id);
                push_opt(args, fragment);
            }
            (
                Self::Reasoning {
                    text,
                    signature,
                    id,
                },
                PartDelta::Reasoning {
                    text: fragment,
                    signature: new_signature,
                    id: new_id,
                },
            ) => {
                push_opt(text, fragment);
                set_once(signature, new_signature);
                set_once(id, new_id);
            }
            (
                Self::Image {
                    mime_type,
                    data,
                    width,
                    height,
                    id,
                },
                PartDelta::Image {
                    mime_type: new_mime,
                    data: new_data,
                    width: new_width,
                    height: new_height,
                    id: new_id,
                },
            ) => {
                // Images arrive whole, so later values replace earlier ones
                if new_mime.is_some() {
                    *mime_type = new_mime;
                }
                if new_data.is_some() {
                    *data = new_data;
                }
                if new_width.is_some() {
                    *width = new_width;
                }
                if new_height.is_some() {
                    *height = new_height;
                }
                if new_id.is_some() {
                    *id = new_id;
                }
            }
            (
                Self::Audio {
                    data,
                    format,
                    sample_rate,
                    channels,
                    transcript,
                    id,
                },
                PartDelta::Audio {
                    data: chunk,
                    format: new_format,
                    sample_rate: new_rate,
                    channels: new_channels,
                    transcript: new_transcript,
                    id: new_id,
                },
            ) => {
                // The only fallible step runs first
                let established = (*format).or(new_format);
                if let Some(chunk) = chunk.as_deref().filter(|c| !c.is_empty()) {
                    match data {
                        Some(buffer) => buffer.push_base64(chunk, established)?,
                        None => {
                            let mut buffer = AudioData::for_format(established);
                            buffer.push_base64(chunk, established)?;
                            *data = Some(buffer);
                        }
                    }
                }
                if format.is_none() {
                    *format = new_format;
                }
                if sample_rate.is_none() {
                    *sample_rate = new_rate;
                }
                if channels.is_none() {
                    *channels = new_channels;
                }
                if let Some(fragment) = new_transcript {
                    transcript.get_or_insert_with(String::new).push_str(&fragment);
                }
                set_once(id, new_id);
            }
            (builder, delta) => {
                return Err(StreamError::TypeConflict {
                    index,
                    existing: builder.kind(),
                    incoming: delta.kind(),
                });
            }
        }
        Ok(())
    }

    fn to_part(&self) -> Part {
        match self {
            Self::Text { text } => Part::Text { text: text.clone() },
            Self::ToolCall {
                tool_call_id,
                tool_name,
                args,
                id,
            } => Part::ToolCall {
                tool_call_id: tool_call_id.clone().unwrap_or_default(),
                tool_name: tool_name.clone().unwrap_or_default(),
                args: args.clone(),
                id: id.clone(),
            },
            Self::Reasoning {
                text,
                signature,
                id,
            } => Part::Reasoning {
                text: text.clone(),
                signature: signature.clone(),
                id: id.clone(),
            },
            Self::Image {
                mime_type,
                data,
                width,
                height,
                id,
            } => Part::Image {
                mime_type: mime_type.clone().unwrap_or_default(),
                data: data.clone().unwrap_or_default(),
                width: *width,
                height: *height,
                id: id.clone(),
            },
            Self::Audio {
                data,
                format,
                sample_rate,
                channels,
                transcript,
                id,
            } => Part::Audio {
                data: data.as_ref().map(AudioData::to_base64).unwrap_or_default(),
                format: format.unwrap_or(AudioFormat::Linear16),
                sample_rate: *sample_rate,
                channels: *channels,
                transcript: transcript.clone(),
                id: id.clone(),
            },
        }
    }
}

/// Accumulates indexed deltas into a complete response.
///
/// Parts are keyed by index, so a part first seen late but assigned a low
/// index still sorts first in the final content.
#[derive(Debug)]
pub struct StreamAccumulator {
    parts: BTreeMap<usize, PartBuilder>,
    usage: Option<ModelUsage>,
    cost: Option<f64>,
    state: AccumulatorState,
}

impl Default for StreamAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self {
            parts: BTreeMap::new(),
            usage: None,
            cost: None,
            state: AccumulatorState::Open,
        }
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    /// Number of distinct parts seen so far.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn usage(&self) -> Option<ModelUsage> {
        self.usage
    }

    pub fn cost(&self) -> Option<f64> {
        self.cost
    }

    fn ensure_state(
        &self,
        operation: &'static str,
        allowed: &[AccumulatorState],
    ) -> Result<(), StreamError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(StreamError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Merge one delta into the part at its index.
    ///
    /// The first delta for an index fixes the part's variant. A rejected
    /// delta leaves every part untouched.
    pub fn add_partial(&mut self, delta: ContentDelta) -> Result<(), StreamError> {
        self.ensure_state("add_partial", &[AccumulatorState::Open])?;
        let ContentDelta { index, part } = delta;

        let result = match self.parts.get_mut(&index) {
            Some(builder) => builder.merge(index, part),
            None => {
                let mut builder = PartBuilder::empty_for(&part);
                let merged = builder.merge(index, part);
                if merged.is_ok() {
                    tracing::debug!(index, kind = %builder.kind(), "new part");
                    self.parts.insert(index, builder);
                }
                merged
            }
        };

        if let Err(ref err) = result {
            tracing::warn!(index, error = %err, "rejected delta");
        }
        result
    }

    /// Replace the usage snapshot.
    pub fn set_usage(&mut self, usage: ModelUsage) -> Result<(), StreamError> {
        self.ensure_state(
            "set_usage",
            &[AccumulatorState::Open, AccumulatorState::Finalizing],
        )?;
        self.usage = Some(usage);
        Ok(())
    }

    /// Replace the cost snapshot.
    pub fn set_cost(&mut self, cost: f64) -> Result<(), StreamError> {
        self.ensure_state(
            "set_cost",
            &[AccumulatorState::Open, AccumulatorState::Finalizing],
        )?;
        self.cost = Some(cost);
        Ok(())
    }

    /// Record that the source has stopped producing events.
    pub fn complete(&mut self) -> Result<(), StreamError> {
        self.ensure_state(
            "complete",
            &[AccumulatorState::Open, AccumulatorState::Finalizing],
        )?;
        self.state = AccumulatorState::Finalizing;
        Ok(())
    }

    /// Apply one unified stream event.
    pub fn apply(&mut self, event: StreamEvent) -> Result<(), StreamError> {
        match event {
            StreamEvent::Delta(delta) => self.add_partial(delta),
            StreamEvent::Usage(usage) => self.set_usage(usage),
            StreamEvent::Cost(cost) => self.set_cost(cost),
            StreamEvent::Done => self.complete(),
        }
    }

    /// Snapshot of the content merged so far, in index order.
    ///
    /// Does not finalize; meant for callers salvaging a cancelled or failed
    /// stream.
    pub fn parts_so_far(&self) -> Vec<Part> {
        self.parts.values().map(PartBuilder::to_part).collect()
    }

    /// Build the final response. Only valid once, after [`complete`](Self::complete).
    pub fn finalize(&mut self) -> Result<ModelResponse, StreamError> {
        if self.state != AccumulatorState::Finalizing {
            return Err(StreamError::FinalizeBeforeComplete { state: self.state });
        }

        if let Some((expected, _)) = self
            .parts
            .keys()
            .enumerate()
            .find(|(expected, index)| expected != *index)
        {
            return Err(StreamError::MissingIndex(expected));
        }

        let content = self.parts_so_far();
        self.parts.clear();
        self.state = AccumulatorState::Closed;

        tracing::debug!(
            parts = content.len(),
            usage = ?self.usage,
            cost = ?self.cost,
            "finalized response"
        );
        Ok(ModelResponse::new(content, self.usage, self.cost))
    }
}

/// Drain a stream of unified events into a finalized response.
///
/// Stops at [`StreamEvent::Done`] or when the stream ends, and returns the
/// first error any event or merge produces.
pub async fn accumulate_stream<S>(mut stream: S) -> Result<ModelResponse, StreamError>
where
    S: Stream<Item = Result<StreamEvent, StreamError>> + Unpin,
{
    let mut accumulator = StreamAccumulator::new();

    while let Some(event) = stream.next().await {
        accumulator.apply(event?)?;
        if accumulator.state() != AccumulatorState::Open {
            break;
        }
    }

    accumulator.complete()?;
    accumulator.finalize()
}
