//! Errors raised while framing, resolving, and accumulating a stream.

use lx_protocol::PartKind;
use thiserror::Error;

use crate::accumulator::AccumulatorState;

/// Broad classification of a [`StreamError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The byte stream could not be framed into events, or the read stopped.
    TransportFraming,
    TypeConflict,
    MalformedAudioChunk,
    /// A decoder could not make sense of a framed event.
    Decode,
    /// The caller broke the accumulator's call contract.
    Misuse,
    /// The accumulator's own state is inconsistent.
    Internal,
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("line exceeds maximum length of {max} bytes")]
    LineTooLong { max: usize },
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("stream cancelled")]
    Cancelled,
    #[error("stream deadline exceeded")]
    DeadlineExceeded,
    #[error("part {index} is {existing}, cannot merge a {incoming} delta")]
    TypeConflict {
        index: usize,
        existing: PartKind,
        incoming: PartKind,
    },
    #[error("malformed audio chunk: {0}")]
    MalformedAudioChunk(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("finalize called while accumulator is {state}")]
    FinalizeBeforeComplete { state: AccumulatorState },
    #[error("{operation} is not allowed while accumulator is {state}")]
    InvalidState {
        operation: &'static str,
        state: AccumulatorState,
    },
    #[error("no content was accumulated for index {0}")]
    MissingIndex(usize),
}

impl StreamError {
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(err))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LineTooLong { .. }
            | Self::Transport(_)
            | Self::Cancelled
            | Self::DeadlineExceeded => ErrorKind::TransportFraming,
            Self::TypeConflict { .. } => ErrorKind::TypeConflict,
            Self::MalformedAudioChunk(_) => ErrorKind::MalformedAudioChunk,
            Self::Decode(_) => ErrorKind::Decode,
            Self::FinalizeBeforeComplete { .. } | Self::InvalidState { .. } => ErrorKind::Misuse,
            Self::MissingIndex(_) => ErrorKind::Internal,
        }
    }

    /// True for contract violations by the caller, as opposed to bad data.
    pub fn is_misuse(&self) -> bool {
        self.kind() == ErrorKind::Misuse
    }
}
