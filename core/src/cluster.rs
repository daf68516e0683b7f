//! Temporal clustering of raw symbol detections
//!
//! Greedy windowed non-maximum suppression: every pass scores a window of
//! one tone length around each remaining detection, keeps the best scoring
//! window as a cluster and removes its members. Detections of a different key
//! inside the window count against the cluster.

use crate::event::SymbolEvent;

/// Result of one extraction run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterExtraction {
    /// Accepted clusters in the order they were extracted (strongest first)
    pub events: Vec<SymbolEvent>,
    /// Raw detections absorbed by accepted or discarded windows
    pub consumed: usize,
    /// Raw detections left over once the best window fell below threshold
    pub remaining: usize,
}

/// Best scoring window of one pass, as a half-open index range
struct Window {
    start: usize,
    end: usize,
    event: SymbolEvent,
}

/// Partition detections into clusters of at most one tone window each
///
/// `pending` must be ordered by frame. Extraction stops once the best window
/// scores below `min_relevance`; windows holding a single detection are
/// dropped but still removed from the working set.
pub fn extract_clusters(
    mut pending: Vec<SymbolEvent>,
    tone_window: f64,
    min_relevance: f32,
) -> ClusterExtraction {
    let mut events = Vec::new();
    let mut consumed = 0;

    while let Some(best) = best_window(&pending, tone_window) {
        if best.event.relevance < min_relevance {
            break;
        }

        if best.event.span > 1 {
            events.push(best.event);
        }

        consumed += best.end - best.start;
        pending.drain(best.start..best.end);
    }

    ClusterExtraction {
        events,
        consumed,
        remaining: pending.len(),
    }
}

fn best_window(pending: &[SymbolEvent], tone_window: f64) -> Option<Window> {
    let mut best: Option<Window> = None;
    let mut start = 0;

    for anchor in pending {
        while pending[start].frame + tone_window / 2.0 < anchor.frame {
            start += 1;
        }

        let mut end = start;
        while end < pending.len() && pending[start].frame + tone_window > pending[end].frame {
            end += 1;
        }

        let event = aggregate(anchor, &pending[start..end]);
        let best_relevance = best.as_ref().map_or(0.0, |w| w.event.relevance);
        if event.relevance > best_relevance {
            best = Some(Window { start, end, event });
        }
    }

    best
}

/// Score the anchor's key over a window
///
/// Same-key members contribute their span, their relevance and a
/// relevance-weighted frame; other keys subtract their relevance.
fn aggregate(anchor: &SymbolEvent, window: &[SymbolEvent]) -> SymbolEvent {
    let mut span = 0;
    let mut relevance = 0.0f32;
    let mut frame_sum = 0.0f64;
    let mut weight_sum = 0.0f64;

    for event in window {
        if event.key == anchor.key {
            span += event.span;
            frame_sum += event.frame * event.relevance as f64;
            weight_sum += event.relevance as f64;
            relevance += event.relevance;
        } else {
            relevance -= event.relevance;
        }
    }

    let frame = if weight_sum != 0.0 {
        frame_sum / weight_sum
    } else {
        anchor.frame
    };

    SymbolEvent {
        key: anchor.key,
        frame,
        span,
        relevance,
    }
}
