//! Unified events handed from a provider decoder to the accumulator.

use serde::{Deserialize, Serialize};

use crate::content::{ContentDelta, ModelUsage};

/// Events emitted while a response is streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "value", rename_all = "snake_case")]
pub enum StreamEvent {
    /// An indexed fragment of response content.
    Delta(ContentDelta),

    /// Token usage snapshot. Replaces any earlier snapshot.
    Usage(ModelUsage),

    /// Cost snapshot. Replaces any earlier snapshot.
    Cost(f64),

    /// Stream has completed successfully.
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::PartDelta;

    #[test]
    fn stream_event_json_shape() {
        let event = StreamEvent::Delta(ContentDelta::new(0, PartDelta::text("hi")));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "delta");
        assert_eq!(json["value"]["index"], 0);
        assert_eq!(json["value"]["part"]["type"], "text");

        let done = serde_json::to_value(StreamEvent::Done).unwrap();
        assert_eq!(done, serde_json::json!({"event": "done"}));
    }

    #[test]
    fn usage_event_roundtrip() {
        let event = StreamEvent::Usage(ModelUsage::new(100, 50));
        let json = serde_json::to_string(&event).unwrap();
        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
