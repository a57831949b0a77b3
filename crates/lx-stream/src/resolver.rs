//! Index resolution for deltas that arrive without a usable index.
//!
//! Providers disagree on indexing: some never index, some index every content
//! block, some index tool calls in a channel of their own. The resolver maps
//! every incoming fragment onto the unified content index space using the
//! deltas already seen on the stream.
//!
//! Known limitation: un-indexed text (or audio) is always attached to the most
//! recent part of the same kind, so a provider interleaving two un-indexed
//! text streams would have them merged into one part.

use std::collections::HashSet;

use lx_protocol::{ContentDelta, PartDelta, PartKind};

/// One entry per distinct index, in order of first appearance.
fn unique_by_index(history: &[ContentDelta]) -> Vec<(usize, PartKind)> {
    let mut seen = HashSet::new();
    history
        .iter()
        .filter(|delta| seen.insert(delta.index))
        .map(|delta| (delta.index, delta.part.kind()))
        .collect()
}

fn next_index(entries: &[(usize, PartKind)]) -> usize {
    entries
        .iter()
        .map(|(index, _)| index + 1)
        .max()
        .unwrap_or(0)
}

/// Whether an un-indexed delta of kind `incoming` continues a part of kind
/// `existing`. Only single-channel kinds continue implicitly.
fn continues(existing: PartKind, incoming: PartKind) -> bool {
    matches!(
        (existing, incoming),
        (PartKind::Text, PartKind::Text) | (PartKind::Audio, PartKind::Audio)
    )
}

/// Guess the content index for `part`.
///
/// `tool_call_index` is the provider's own ordinal for tool calls, when it
/// has one. It is remapped onto the content index of the n-th distinct tool
/// call seen so far; an ordinal past the known tool calls opens a new part.
pub fn guess_delta_index(
    part: &PartDelta,
    history: &[ContentDelta],
    tool_call_index: Option<usize>,
) -> usize {
    let entries = unique_by_index(history);

    if let Some(ordinal) = tool_call_index.filter(|_| part.is_tool_call()) {
        return entries
            .iter()
            .filter(|(_, kind)| *kind == PartKind::ToolCall)
            .nth(ordinal)
            .map(|(index, _)| *index)
            .unwrap_or_else(|| next_index(&entries));
    }

    let incoming = part.kind();
    entries
        .iter()
        .rev()
        .find(|(_, kind)| continues(*kind, incoming))
        .map(|(index, _)| *index)
        .unwrap_or_else(|| next_index(&entries))
}

/// Stateful resolver owning the delta history of one stream.
#[derive(Debug, Default)]
pub struct DeltaIndexer {
    history: Vec<ContentDelta>,
}

impl DeltaIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guess an index for `part` without recording it.
    pub fn guess(&self, part: &PartDelta, tool_call_index: Option<usize>) -> usize {
        let index = guess_delta_index(part, &self.history, tool_call_index);
        tracing::trace!(index, kind = %part.kind(), "resolved delta index");
        index
    }

    /// Assign an index to `part`, record it, and return the positioned delta.
    pub fn resolve(&mut self, part: PartDelta, tool_call_index: Option<usize>) -> ContentDelta {
        let index = self.guess(&part, tool_call_index);
        let delta = ContentDelta::new(index, part);
        self.history.push(delta.clone());
        delta
    }

    /// Append a delta to the history, whether its index was guessed or
    /// supplied by the provider.
    pub fn record(&mut self, delta: ContentDelta) {
        self.history.push(delta);
    }

    pub fn history(&self) -> &[ContentDelta] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(index: usize) -> ContentDelta {
        ContentDelta::new(index, PartDelta::text("x"))
    }

    fn tool(index: usize) -> ContentDelta {
        ContentDelta::new(index, PartDelta::tool_call_args("{}"))
    }

    fn audio(index: usize) -> ContentDelta {
        ContentDelta::new(index, PartDelta::audio_data("AAA="))
    }

    #[test]
    fn empty_history_starts_at_zero() {
        assert_eq!(guess_delta_index(&PartDelta::text("a"), &[], None), 0);
        assert_eq!(
            guess_delta_index(&PartDelta::tool_call_args("{"), &[], Some(0)),
            0
        );
        assert_eq!(guess_delta_index(&PartDelta::reasoning("r"), &[], None), 0);
    }

    #[test]
    fn text_extends_single_text_stream() {
        let history = [text(0)];
        assert_eq!(guess_delta_index(&PartDelta::text("b"), &history, None), 0);
    }

    #[test]
    fn tool_ordinal_zero_maps_to_first_tool_call() {
        let history = [text(0), tool(1)];
        assert_eq!(
            guess_delta_index(&PartDelta::tool_call_args("1}"), &history, Some(0)),
            1
        );
    }

    #[test]
    fn tool_ordinal_maps_past_interleaved_parts() {
        let history = [text(0), tool(1), text(2), tool(3)];
        assert_eq!(
            guess_delta_index(&PartDelta::tool_call_args("}"), &history, Some(1)),
            3
        );
    }

    #[test]
    fn tool_ordinal_out_of_range_opens_new_part() {
        let history = [text(0), tool(1)];
        assert_eq!(
            guess_delta_index(&PartDelta::tool_call_args("{"), &history, Some(1)),
            2
        );
    }

    #[test]
    fn repeated_partials_count_once() {
        let history = [tool(0), tool(0), tool(0), text(1), tool(2), tool(2)];
        assert_eq!(
            guess_delta_index(&PartDelta::tool_call_args(""), &history, Some(1)),
            2
        );
        assert_eq!(
            guess_delta_index(&PartDelta::tool_call_args(""), &history, Some(2)),
            3
        );
    }

    #[test]
    fn text_after_tool_call_extends_earlier_text() {
        let history = [text(0), tool(1)];
        assert_eq!(guess_delta_index(&PartDelta::text("c"), &history, None), 0);
    }

    #[test]
    fn most_recent_text_wins() {
        let history = [text(0), tool(1), text(2)];
        assert_eq!(guess_delta_index(&PartDelta::text("c"), &history, None), 2);
    }

    #[test]
    fn audio_does_not_match_text() {
        let history = [text(0)];
        assert_eq!(
            guess_delta_index(&PartDelta::audio_data("AAA="), &history, None),
            1
        );

        let history = [text(0), audio(1)];
        assert_eq!(
            guess_delta_index(&PartDelta::audio_data("AAA="), &history, None),
            1
        );
        assert_eq!(guess_delta_index(&PartDelta::text("t"), &history, None), 0);
    }

    #[test]
    fn reasoning_never_continues_implicitly() {
        let history = [ContentDelta::new(0, PartDelta::reasoning("think"))];
        assert_eq!(
            guess_delta_index(&PartDelta::reasoning("more"), &history, None),
            1
        );
    }

    #[test]
    fn tool_call_without_ordinal_opens_new_part() {
        let history = [text(0), tool(1)];
        assert_eq!(
            guess_delta_index(&PartDelta::tool_call_args("{"), &history, None),
            2
        );
    }

    #[test]
    fn new_index_is_one_past_highest_not_count() {
        let history = [text(4), tool(1)];
        assert_eq!(
            guess_delta_index(&PartDelta::reasoning("r"), &history, None),
            5
        );
    }

    #[test]
    fn indexer_records_history() {
        let mut indexer = DeltaIndexer::new();
        let a = indexer.resolve(PartDelta::text("Hel"), None);
        let b = indexer.resolve(PartDelta::text("lo"), None);
        let c = indexer.resolve(PartDelta::tool_call_start("t1", "f", "{"), Some(0));
        let d = indexer.resolve(PartDelta::tool_call_args("}"), Some(0));
        let e = indexer.resolve(PartDelta::tool_call_start("t2", "g", "{"), Some(1));

        assert_eq!(
            [a.index, b.index, c.index, d.index, e.index],
            [0, 0, 1, 1, 2]
        );
        assert_eq!(indexer.history().len(), 5);
    }

    #[test]
    fn indexer_respects_recorded_indices() {
        let mut indexer = DeltaIndexer::new();
        indexer.record(ContentDelta::new(0, PartDelta::reasoning("r")));
        indexer.record(ContentDelta::new(1, PartDelta::text("a")));

        let next = indexer.resolve(PartDelta::text("b"), None);
        assert_eq!(next.index, 1);
        let tool = indexer.resolve(PartDelta::tool_call_args("{"), Some(0));
        assert_eq!(tool.index, 2);
    }
}
