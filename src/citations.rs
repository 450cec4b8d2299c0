//! Short-form citation markers and their final resolution.
//!
//! Research tasks attach a compact marker to every grounded source they
//! gather, keyed by the task's ordinal so markers stay unique across a
//! fan-out. Drafting stages cite by marker; at finalize time
//! [`resolve`] rewrites every marker occurrence to the source's canonical
//! URL and returns the sources that were actually cited.

use crate::service::GroundingRef;
use crate::state::SourceRef;

/// Mint the marker for source `index` gathered by task `task_seq`.
#[must_use]
pub fn mint_marker(task_seq: u32, index: usize) -> String {
    format!("[s{task_seq}.{index}]")
}

/// Attach markers to a task's grounding references, in gathered order.
#[must_use]
pub fn attach_markers(task_seq: u32, refs: &[GroundingRef]) -> Vec<SourceRef> {
    refs.iter()
        .enumerate()
        .map(|(index, grounding)| SourceRef {
            marker: mint_marker(task_seq, index),
            url: grounding.url.clone(),
            label: grounding.label.clone(),
        })
        .collect()
}

/// Rewrite markers in `text` to canonical URLs and collect the citations.
///
/// A source is cited only if its marker literally appears in the text;
/// every occurrence of that marker is replaced. Markers with no matching
/// source are left untouched. Because replacement removes the marker from
/// the text, a duplicate source with the same marker never matches again,
/// so the returned list is deduplicated by marker in first-seen order.
#[must_use]
pub fn resolve(text: &str, sources: &[SourceRef]) -> (String, Vec<SourceRef>) {
    let mut resolved = text.to_string();
    let mut cited = Vec::new();
    for source in sources {
        if source.marker.is_empty() {
            continue;
        }
        if resolved.contains(&source.marker) {
            resolved = resolved.replace(&source.marker, &source.url);
            cited.push(source.clone());
        }
    }
    (resolved, cited)
}
