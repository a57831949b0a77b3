//! Framer → decoder → resolver → accumulator.
//!
//! Provider decoders live outside this crate and plug in through
//! [`ResponseDecoder`]. The pipeline owns everything else for one stream.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use lx_protocol::{ContentDelta, ModelResponse, ModelUsage, PartDelta};

use crate::accumulator::{AccumulatorState, StreamAccumulator};
use crate::error::StreamError;
use crate::resolver::DeltaIndexer;
use crate::sse::{SseEvent, SseStream};

/// What a decoder extracted from one SSE event.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    /// The provider supplied a usable content index.
    Indexed(ContentDelta),
    /// The index must be inferred. `tool_call_index` carries the provider's
    /// own tool call ordinal when it has a separate channel for tool calls.
    Unindexed {
        part: PartDelta,
        tool_call_index: Option<usize>,
    },
    Usage(ModelUsage),
    Cost(f64),
    /// The provider's end-of-stream marker.
    Done,
}

/// Translates one provider's SSE events into unified events.
pub trait ResponseDecoder {
    fn decode(&mut self, event: &SseEvent) -> Result<Vec<DecodedEvent>, StreamError>;
}

impl<F> ResponseDecoder for F
where
    F: FnMut(&SseEvent) -> Result<Vec<DecodedEvent>, StreamError>,
{
    fn decode(&mut self, event: &SseEvent) -> Result<Vec<DecodedEvent>, StreamError> {
        self(event)
    }
}

/// Drives one stream from raw bytes to a finalized response.
pub struct DeltaPipeline<S, D> {
    events: SseStream<S>,
    decoder: D,
    indexer: DeltaIndexer,
    accumulator: StreamAccumulator,
}

impl<S, E, D> DeltaPipeline<S, D>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
    D: ResponseDecoder,
{
    pub fn new(events: SseStream<S>, decoder: D) -> Self {
        Self {
            events,
            decoder,
            indexer: DeltaIndexer::new(),
            accumulator: StreamAccumulator::new(),
        }
    }

    /// Read the stream to its end and finalize the response.
    ///
    /// On error the accumulator is left open with everything merged so far,
    /// available through [`accumulator`](Self::accumulator).
    pub async fn run(&mut self) -> Result<ModelResponse, StreamError> {
        while let Some(event) = self.events.next().await {
            let event = event?;
            for decoded in self.decoder.decode(&event)? {
                self.apply(decoded)?;
            }
            if self.accumulator.state() != AccumulatorState::Open {
                break;
            }
        }

        self.accumulator.complete()?;
        self.accumulator.finalize()
    }

    fn apply(&mut self, decoded: DecodedEvent) -> Result<(), StreamError> {
        match decoded {
            DecodedEvent::Indexed(delta) => self.merge(delta),
            DecodedEvent::Unindexed {
                part,
                tool_call_index,
            } => {
                let index = self.indexer.guess(&part, tool_call_index);
                self.merge(ContentDelta::new(index, part))
            }
            DecodedEvent::Usage(usage) => self.accumulator.set_usage(usage),
            DecodedEvent::Cost(cost) => self.accumulator.set_cost(cost),
            DecodedEvent::Done => self.accumulator.complete(),
        }
    }

    /// Only deltas the accumulator accepted enter the resolver's history.
    fn merge(&mut self, delta: ContentDelta) -> Result<(), StreamError> {
        self.accumulator.add_partial(delta.clone())?;
        self.indexer.record(delta);
        Ok(())
    }

    pub fn accumulator(&self) -> &StreamAccumulator {
        &self.accumulator
    }

    pub fn accumulator_mut(&mut self) -> &mut StreamAccumulator {
        &mut self.accumulator
    }

    pub fn indexer(&self) -> &DeltaIndexer {
        &self.indexer
    }

    pub fn into_accumulator(self) -> StreamAccumulator {
        self.accumulator
    }
}
