//! Audio formats and the format/MIME type registry.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Wav,
    Mp3,
    /// Raw 16-bit little-endian PCM.
    Linear16,
    Flac,
    Mulaw,
    Alaw,
    Aac,
    Opus,
}

impl AudioFormat {
    /// Whether chunks of this format are raw PCM16 samples that must be merged
    /// on sample boundaries.
    pub fn is_pcm16(&self) -> bool {
        matches!(self, Self::Linear16)
    }
}

const STANDARD_TABLE: &[(AudioFormat, &str)] = &[
    (AudioFormat::Wav, "audio/wav"),
    (AudioFormat::Mp3, "audio/mpeg"),
    (AudioFormat::Linear16, "audio/L16"),
    (AudioFormat::Flac, "audio/flac"),
    (AudioFormat::Mulaw, "audio/basic"),
    (AudioFormat::Alaw, "audio/x-alaw-basic"),
    (AudioFormat::Aac, "audio/aac"),
    (AudioFormat::Opus, "audio/opus"),
];

/// Read-only mapping between [`AudioFormat`] and MIME types.
///
/// Adapters receive a registry by reference instead of consulting a global
/// table. The first entry for a format is its canonical MIME type; later
/// entries act as aliases for MIME lookups.
#[derive(Debug, Clone, Copy)]
pub struct AudioFormatRegistry<'a> {
    entries: &'a [(AudioFormat, &'a str)],
}

impl AudioFormatRegistry<'static> {
    pub fn standard() -> Self {
        Self {
            entries: STANDARD_TABLE,
        }
    }
}

impl Default for AudioFormatRegistry<'static> {
    fn default() -> Self {
        Self::standard()
    }
}

impl<'a> AudioFormatRegistry<'a> {
    pub fn new(entries: &'a [(AudioFormat, &'a str)]) -> Self {
        Self { entries }
    }

    /// Canonical MIME type for `format`.
    pub fn mime_type(&self, format: AudioFormat) -> Option<&'a str> {
        self.entries
            .iter()
            .find(|(f, _)| *f == format)
            .map(|(_, mime)| *mime)
    }

    /// Look up the format for a MIME type. Parameters (`;rate=24000`) are
    /// ignored and the comparison is case-insensitive.
    pub fn format_for_mime(&self, mime_type: &str) -> Option<AudioFormat> {
        let essence = mime_type.split(';').next().unwrap_or("").trim();
        self.entries
            .iter()
            .find(|(_, mime)| mime.eq_ignore_ascii_case(essence))
            .map(|(format, _)| *format)
    }
}
