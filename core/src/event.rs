use std::collections::VecDeque;

/// A DTMF key observed at a (possibly fractional) block index
///
/// Raw detections have `span == 1` and a positive relevance. Clustered events
/// sum the spans of their members and carry a signed relevance that competing
/// keys in the same window push down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolEvent {
    pub key: char,
    pub frame: f64,
    pub span: u32,
    pub relevance: f32,
}

impl SymbolEvent {
    /// A single-block detection
    pub fn raw(key: char, frame: u64, relevance: f32) -> Self {
        Self {
            key,
            frame: frame as f64,
            span: 1,
            relevance,
        }
    }

    /// Fold another same-key event into this one
    pub fn absorb(&mut self, other: &SymbolEvent) {
        self.span += other.span;
        self.relevance += other.relevance;
    }
}

/// Arrival-ordered raw detections awaiting a decode attempt
///
/// The owner keeps the buffer bounded: once the oldest entry is older than
/// the configured window a decode is attempted and, unless it consumed the
/// buffer, the oldest entry is evicted.
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    events: VecDeque<SymbolEvent>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: SymbolEvent) {
        self.events.push_back(event);
    }

    pub fn front(&self) -> Option<&SymbolEvent> {
        self.events.front()
    }

    pub fn pop_front(&mut self) -> Option<SymbolEvent> {
        self.events.pop_front()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Owned copy for the cluster extractor to consume
    pub fn snapshot(&self) -> Vec<SymbolEvent> {
        self.events.iter().copied().collect()
    }

    /// Whether the oldest entry lags `current_frame` by more than `max_frames`
    pub fn is_stale(&self, current_frame: u64, max_frames: f64) -> bool {
        self.events
            .front()
            .is_some_and(|oldest| oldest.frame + max_frames < current_frame as f64)
    }

    /// Distance in blocks between the oldest and newest entry
    pub fn span_frames(&self) -> f64 {
        match (self.events.front(), self.events.back()) {
            (Some(oldest), Some(newest)) => newest.frame - oldest.frame,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_event() {
        let event = SymbolEvent::raw('5', 12, 42.0);
        assert_eq!(event.key, '5');
        assert_eq!(event.frame, 12.0);
        assert_eq!(event.span, 1);
        assert_eq!(event.relevance, 42.0);
    }

    #[test]
    fn test_absorb_sums_span_and_relevance() {
        let mut a = SymbolEvent { key: 'A', frame: 3.0, span: 4, relevance: 900.0 };
        let b = SymbolEvent { key: 'A', frame: 7.0, span: 2, relevance: -100.0 };
        a.absorb(&b);
        assert_eq!(a.span, 6);
        assert_eq!(a.relevance, 800.0);
        assert_eq!(a.frame, 3.0);
    }

    #[test]
    fn test_buffer_staleness() {
        let mut buffer = EventBuffer::new();
        assert!(!buffer.is_stale(1000, 70.0));

        buffer.push(SymbolEvent::raw('1', 10, 100.0));
        buffer.push(SymbolEvent::raw('1', 11, 100.0));
        assert!(!buffer.is_stale(80, 70.0));
        assert!(buffer.is_stale(81, 70.0));
        assert_eq!(buffer.span_frames(), 1.0);

        buffer.pop_front();
        assert!(!buffer.is_stale(81, 70.0));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.span_frames(), 0.0);
    }

    #[test]
    fn test_staleness_after_weeks_of_audio() {
        // 2^27 blocks is about 78 days at 20 blocks per second
        let start = 1u64 << 27;
        let mut buffer = EventBuffer::new();
        buffer.push(SymbolEvent::raw('4', start, 100.0));
        buffer.push(SymbolEvent::raw('4', start + 1, 100.0));

        assert_eq!(buffer.span_frames(), 1.0);
        assert!(!buffer.is_stale(start + 70, 70.0));
        assert!(buffer.is_stale(start + 71, 70.0));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut buffer = EventBuffer::new();
        buffer.push(SymbolEvent::raw('2', 0, 10.0));
        let snapshot = buffer.snapshot();
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(snapshot.len(), 1);
    }
}
