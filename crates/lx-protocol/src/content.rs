//! Content parts, their incremental deltas, and the finished response.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audio::AudioFormat;

/// The variant tag shared by [`Part`] and [`PartDelta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartKind {
    Text,
    ToolCall,
    Reasoning,
    Image,
    Audio,
    Source,
}

impl PartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::ToolCall => "tool_call",
            Self::Reasoning => "reasoning",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finished unit of model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        /// Raw JSON argument text as streamed by the provider. Not validated.
        args: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Reasoning {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Image {
        mime_type: String,
        /// Base64-encoded image bytes.
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Audio {
        /// Base64-encoded audio bytes.
        data: String,
        format: AudioFormat,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sample_rate: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channels: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transcript: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Citation-style attachment wrapping a nested sequence of parts.
    Source {
        content: Vec<Part>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_call(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: impl Into<String>,
    ) -> Self {
        Self::ToolCall {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            args: args.into(),
            id: None,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::Reasoning {
            text: text.into(),
            signature: None,
            id: None,
        }
    }

    pub fn source(content: Vec<Part>) -> Self {
        Self::Source { content }
    }

    pub fn kind(&self) -> PartKind {
        match self {
            Self::Text { .. } => PartKind::Text,
            Self::ToolCall { .. } => PartKind::ToolCall,
            Self::Reasoning { .. } => PartKind::Reasoning,
            Self::Image { .. } => PartKind::Image,
            Self::Audio { .. } => PartKind::Audio,
            Self::Source { .. } => PartKind::Source,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Parse the argument text of a tool call part.
    ///
    /// Returns `None` for any other variant. An empty argument string parses
    /// as an empty object, since providers omit arguments for no-arg tools.
    pub fn parse_args(&self) -> Option<serde_json::Result<serde_json::Value>> {
        match self {
            Self::ToolCall { args, .. } if args.trim().is_empty() => {
                Some(Ok(serde_json::Value::Object(Default::default())))
            }
            Self::ToolCall { args, .. } => Some(serde_json::from_str(args)),
            _ => None,
        }
    }
}

/// An incremental update to a [`Part`]. Every field is optional: a delta says
/// what changed, not the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartDelta {
    /// An absent `text` is an empty fragment.
    Text {
        #[serde(default)]
        text: String,
    },
    ToolCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Reasoning {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Audio {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<AudioFormat>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sample_rate: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channels: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transcript: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

impl PartDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// A tool call fragment carrying only argument text.
    pub fn tool_call_args(args: impl Into<String>) -> Self {
        Self::ToolCall {
            tool_call_id: None,
            tool_name: None,
            args: Some(args.into()),
            id: None,
        }
    }

    /// The opening fragment of a tool call: identity plus the first argument text.
    pub fn tool_call_start(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: impl Into<String>,
    ) -> Self {
        Self::ToolCall {
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
            args: Some(args.into()),
            id: None,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::Reasoning {
            text: Some(text.into()),
            signature: None,
            id: None,
        }
    }

    /// An audio fragment carrying only base64 sample data.
    pub fn audio_data(data: impl Into<String>) -> Self {
        Self::Audio {
            data: Some(data.into()),
            format: None,
            sample_rate: None,
            channels: None,
            transcript: None,
            id: None,
        }
    }

    pub fn kind(&self) -> PartKind {
        match self {
            Self::Text { .. } => PartKind::Text,
            Self::ToolCall { .. } => PartKind::ToolCall,
            Self::Reasoning { .. } => PartKind::Reasoning,
            Self::Image { .. } => PartKind::Image,
            Self::Audio { .. } => PartKind::Audio,
        }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall { .. })
    }
}

/// A [`PartDelta`] positioned in the final content sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDelta {
    pub index: usize,
    pub part: PartDelta,
}

impl ContentDelta {
    pub fn new(index: usize, part: PartDelta) -> Self {
        Self { index, part }
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl ModelUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

/// The complete response produced once a stream has been finalized.
///
/// Fields are read-only; a response never changes after it is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    content: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    usage: Option<ModelUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cost: Option<f64>,
}

impl ModelResponse {
    pub fn new(content: Vec<Part>, usage: Option<ModelUsage>, cost: Option<f64>) -> Self {
        Self {
            content,
            usage,
            cost,
        }
    }

    pub fn content(&self) -> &[Part] {
        &self.content
    }

    pub fn usage(&self) -> Option<ModelUsage> {
        self.usage
    }

    pub fn cost(&self) -> Option<f64> {
        self.cost
    }

    /// Concatenate the text of every top-level text part.
    pub fn text(&self) -> String {
        self.content.iter().filter_map(Part::as_text).collect()
    }

    pub fn into_content(self) -> Vec<Part> {
        self.content
    }
}
