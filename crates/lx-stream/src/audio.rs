//! Sample-accurate merging of base64-encoded audio chunks.
//!
//! Providers stream 16-bit little-endian PCM as base64 strings split at
//! arbitrary points. Concatenating the base64 text is only valid when every
//! chunk happens to end on a 3-byte boundary, so chunks are decoded to
//! samples, appended, and re-encoded once at the end.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::StreamError;

/// Decode little-endian PCM16 bytes into samples.
///
/// Fails if `bytes` does not hold a whole number of samples.
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<i16>, StreamError> {
    if bytes.len() % 2 != 0 {
        return Err(StreamError::MalformedAudioChunk(format!(
            "{} bytes is not a whole number of 16-bit samples",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Encode samples as little-endian PCM16 bytes.
pub fn encode_pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn decode_base64(chunk: &str) -> Result<Vec<u8>, StreamError> {
    STANDARD
        .decode(chunk.trim())
        .map_err(|e| StreamError::MalformedAudioChunk(format!("invalid base64: {e}")))
}

/// Running buffer of PCM16 samples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleBuffer {
    samples: Vec<i16>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a base64 chunk and append its samples.
    ///
    /// On error the buffer is left exactly as it was.
    pub fn push_base64(&mut self, chunk: &str) -> Result<(), StreamError> {
        let bytes = decode_base64(chunk)?;
        let samples = decode_pcm16(&bytes)?;
        self.samples.extend_from_slice(&samples);
        Ok(())
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(encode_pcm16(&self.samples))
    }
}

/// Running buffer for formats merged as plain bytes (compressed or
/// container formats, where sample boundaries are not visible).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    bytes: Vec<u8>,
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl ByteBuffer {
    pub fn push_base64(&mut self, chunk: &str) -> Result<(), StreamError> {
        let bytes = decode_base64(chunk)?;
        self.bytes.extend_from_slice(&bytes);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Merge a sequence of base64 PCM16 chunks into one base64 string.
pub fn merge_pcm16_base64<I, T>(chunks: I) -> Result<String, StreamError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let mut buffer = SampleBuffer::new();
    for chunk in chunks {
        buffer.push_base64(chunk.as_ref())?;
    }
    Ok(buffer.to_base64())
}
