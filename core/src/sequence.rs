use crate::cluster::extract_clusters;
use crate::config::DecoderConfig;
use crate::event::SymbolEvent;
use crate::GAP_CHAR;
use std::f64::consts::PI;

/// Cut markers the clapboard plays between takes
const CUT_MARKERS: [&str; 2] = ["A#A#A#", "B#B#B#"];

/// A clapboard sequence recovered from the audio track
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSequence {
    /// Time of the first tone, in seconds from the start of the stream
    pub start_time: f64,
    /// Decoded keys, with `GAP_CHAR` where a tone was missed
    pub symbols: String,
}

impl DecodedSequence {
    /// Number of gap placeholders in the symbols
    pub fn wildcards(&self) -> usize {
        self.symbols.chars().filter(|&c| c == GAP_CHAR).count()
    }

    /// Whether two sequences agree, treating gaps on either side as wildcards
    pub fn matches(&self, other: &DecodedSequence) -> bool {
        self.match_wildcards(other).is_some()
    }

    /// Positions covered by a gap on either side, if the sequences agree elsewhere
    pub fn match_wildcards(&self, other: &DecodedSequence) -> Option<usize> {
        if self.symbols.chars().count() != other.symbols.chars().count() {
            return None;
        }

        let mut wildcards = 0;
        for (a, b) in self.symbols.chars().zip(other.symbols.chars()) {
            if a == GAP_CHAR || b == GAP_CHAR {
                wildcards += 1;
            } else if a != b {
                return None;
            }
        }
        Some(wildcards)
    }

    /// Whether this is one of the take-separating cut markers
    pub fn is_cut_marker(&self) -> bool {
        CUT_MARKERS.contains(&self.symbols.as_str())
    }
}

/// Why a decode attempt produced nothing yet
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeferReason {
    /// No cluster survived extraction
    NoClusters,
    /// The strongest cluster is below the peak threshold
    WeakPeak { relevance: f32 },
    /// The sequence is still playing; it should end around `expected_end`
    Incomplete { expected_end: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Decoded(DecodedSequence),
    Deferred(DeferReason),
}

/// Tone windows from a marker key to the last tone of the sequence
pub fn tones_until_end(key: char) -> f64 {
    match key {
        'A' => 12.0,
        'B' => 11.0,
        '*' => 6.0,
        'C' => 1.0,
        'D' => 0.0,
        _ => 10.0,
    }
}

/// Reassembles clustered detections into a rasterized key string
pub struct SequenceDecoder {
    fps: f64,
    tone_window: f64,
    min_relevance: f32,
    min_peak_relevance: f32,
    min_mark_relevance: f32,
    snap_tolerance: f64,
    gap_tolerance: f64,
}

impl SequenceDecoder {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            fps: config.fps as f64,
            tone_window: config.tone_window(),
            min_relevance: config.min_relevance,
            min_peak_relevance: config.min_peak_relevance,
            min_mark_relevance: config.min_mark_relevance,
            snap_tolerance: config.snap_tolerance as f64,
            gap_tolerance: config.gap_tolerance as f64,
        }
    }

    /// Cluster raw detections and try to decode them at `current_frame`
    pub fn decode(&self, raw: Vec<SymbolEvent>, current_frame: f64) -> DecodeOutcome {
        let extraction = extract_clusters(raw, self.tone_window, self.min_relevance);
        log::debug!(
            "frame {}: {} clusters from {} detections ({} left as noise)",
            current_frame,
            extraction.events.len(),
            extraction.consumed,
            extraction.remaining
        );
        self.decode_clusters(extraction.events, current_frame)
    }

    /// Decode clusters given in extraction order (strongest first)
    pub fn decode_clusters(&self, clusters: Vec<SymbolEvent>, current_frame: f64) -> DecodeOutcome {
        let peak = match clusters.first() {
            Some(event) => event.relevance,
            None => return DecodeOutcome::Deferred(DeferReason::NoClusters),
        };
        if peak < self.min_peak_relevance {
            return DecodeOutcome::Deferred(DeferReason::WeakPeak { relevance: peak });
        }

        let events = merge_adjacent(clusters);

        let expected_end = self.expected_end(&events, current_frame);
        if expected_end + self.tone_window > current_frame {
            return DecodeOutcome::Deferred(DeferReason::Incomplete { expected_end });
        }

        let offset = self.raster_offset(&events);
        let symbols = self.rasterize(&events, offset);

        DecodeOutcome::Decoded(DecodedSequence {
            start_time: events[0].frame / self.fps,
            symbols,
        })
    }

    /// Earliest end of sequence implied by any confident marker
    fn expected_end(&self, events: &[SymbolEvent], current_frame: f64) -> f64 {
        events
            .iter()
            .filter(|event| event.relevance > self.min_mark_relevance)
            .map(|event| event.frame + tones_until_end(event.key) * self.tone_window)
            .fold(current_frame, f64::min)
    }

    /// Circular mean of the interior events' position within the tone raster
    fn raster_offset(&self, events: &[SymbolEvent]) -> f64 {
        if events.len() < 3 {
            return 0.0;
        }

        let (re, im) = events[1..events.len() - 1]
            .iter()
            .fold((0.0f64, 0.0f64), |(re, im), event| {
                let theta = 2.0 * PI * (event.frame % self.tone_window) / self.tone_window;
                let weight = event.relevance as f64;
                (re + weight * theta.cos(), im + weight * theta.sin())
            });

        self.tone_window * im.atan2(re) / (2.0 * PI)
    }

    /// Walk the raster one tone at a time, emitting keys and gap markers
    fn rasterize(&self, events: &[SymbolEvent], offset: f64) -> String {
        let tone_window = self.tone_window;
        let mut symbols = String::with_capacity(events.len());
        let mut cursor = (events[0].frame / tone_window).floor() * tone_window + offset;
        let mut index = 0;

        while index < events.len() {
            let event = &events[index];
            if event.frame - tone_window * self.snap_tolerance <= cursor {
                symbols.push(event.key);
                index += 1;
            } else if index > 0 && event.frame - events[index - 1].frame > tone_window * self.gap_tolerance {
                symbols.push(GAP_CHAR);
            }
            cursor += tone_window;
        }

        symbols
    }
}

/// Sort by frame and fold runs of the same key into their first event
fn merge_adjacent(mut events: Vec<SymbolEvent>) -> Vec<SymbolEvent> {
    events.sort_by(|a, b| a.frame.total_cmp(&b.frame));

    let mut merged: Vec<SymbolEvent> = Vec::with_capacity(events.len());
    for event in events {
        match merged.last_mut() {
            Some(last) if last.key == event.key => last.absorb(&event),
            _ => merged.push(event),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(key: char, frame: f64, relevance: f32) -> SymbolEvent {
        SymbolEvent {
            key,
            frame,
            span: 4,
            relevance,
        }
    }

    fn decoder() -> SequenceDecoder {
        SequenceDecoder::new(&DecoderConfig::default())
    }

    fn sequence(symbols: &str) -> DecodedSequence {
        DecodedSequence {
            start_time: 0.0,
            symbols: symbols.to_string(),
        }
    }

    #[test]
    fn test_no_clusters_defers() {
        assert_eq!(
            decoder().decode_clusters(Vec::new(), 100.0),
            DecodeOutcome::Deferred(DeferReason::NoClusters)
        );
    }

    #[test]
    fn test_weak_peak_defers() {
        let clusters = vec![cluster('A', 10.0, 500.0), cluster('D', 14.0, 400.0)];
        assert_eq!(
            decoder().decode_clusters(clusters, 100.0),
            DecodeOutcome::Deferred(DeferReason::WeakPeak { relevance: 500.0 })
        );
    }

    #[test]
    fn test_peak_is_the_first_extracted_cluster() {
        // The earliest event is weak but the strongest one is listed first
        let clusters = vec![cluster('D', 14.0, 1500.0), cluster('A', 10.0, 300.0)];
        match decoder().decode_clusters(clusters, 100.0) {
            DecodeOutcome::Decoded(decoded) => assert_eq!(decoded.symbols, "AD"),
            other => panic!("expected a decode, got {:?}", other),
        }
    }

    #[test]
    fn test_incomplete_sequence_defers_until_end_plus_one_tone() {
        let clusters = vec![cluster('A', 10.0, 1500.0), cluster('*', 14.0, 800.0)];

        // '*' implies the sequence ends 6 tones later, at frame 38
        assert_eq!(
            decoder().decode_clusters(clusters.clone(), 40.0),
            DecodeOutcome::Deferred(DeferReason::Incomplete { expected_end: 38.0 })
        );
        assert!(matches!(
            decoder().decode_clusters(clusters, 42.0),
            DecodeOutcome::Decoded(_)
        ));
    }

    #[test]
    fn test_weak_markers_do_not_bound_the_sequence() {
        // Only the strong 'A' counts, so the sequence ends at frame 58
        let clusters = vec![cluster('A', 10.0, 1500.0), cluster('D', 14.0, 150.0)];
        assert_eq!(
            decoder().decode_clusters(clusters, 60.0),
            DecodeOutcome::Deferred(DeferReason::Incomplete { expected_end: 58.0 })
        );
    }

    #[test]
    fn test_decodes_jittered_sequence() {
        let clusters = vec![
            cluster('3', 37.56, 1293.0),
            cluster('2', 33.43, 1102.0),
            cluster('A', 21.47, 979.0),
            cluster('D', 49.54, 969.0),
            cluster('*', 25.61, 877.0),
            cluster('*', 45.61, 877.0),
            cluster('1', 29.53, 792.0),
            cluster('4', 41.52, 639.0),
        ];
        match decoder().decode_clusters(clusters, 91.0) {
            DecodeOutcome::Decoded(decoded) => {
                assert_eq!(decoded.symbols, "A*1234*D");
                assert!((decoded.start_time - 21.47 / 20.0).abs() < 1e-4);
            }
            other => panic!("expected a decode, got {:?}", other),
        }
    }

    #[test]
    fn test_decodes_after_weeks_of_audio() {
        // 2^27 blocks is about 78 days at 20 blocks per second
        let base = (1u64 << 27) as f64;
        let clusters = vec![
            cluster('A', base + 2.0, 1500.0),
            cluster('1', base + 6.0, 300.0),
            cluster('2', base + 10.0, 300.0),
            cluster('D', base + 14.0, 300.0),
        ];
        match decoder().decode_clusters(clusters, base + 100.0) {
            DecodeOutcome::Decoded(decoded) => {
                assert_eq!(decoded.symbols, "A12D");
                assert!((decoded.start_time - (base + 2.0) / 20.0).abs() < 1e-6);
            }
            other => panic!("expected a decode, got {:?}", other),
        }
    }

    #[test]
    fn test_adjacent_duplicates_merge_and_gap_is_marked() {
        let clusters = vec![
            cluster('A', 2.0, 1500.0),
            cluster('1', 6.0, 300.0),
            cluster('1', 10.0, 300.0),
            cluster('2', 14.0, 300.0),
            cluster('D', 18.0, 300.0),
        ];
        match decoder().decode_clusters(clusters, 100.0) {
            DecodeOutcome::Decoded(decoded) => {
                assert_eq!(decoded.symbols, "A1.2D");
                assert_eq!(decoded.start_time, 0.1);
                assert_eq!(decoded.wildcards(), 1);
            }
            other => panic!("expected a decode, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_adjacent() {
        let merged = merge_adjacent(vec![
            cluster('1', 10.0, 300.0),
            cluster('A', 2.0, 1500.0),
            cluster('1', 6.0, 200.0),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].key, 'A');
        assert_eq!(merged[1].key, '1');
        assert_eq!(merged[1].frame, 6.0);
        assert_eq!(merged[1].span, 8);
        assert_eq!(merged[1].relevance, 500.0);
    }

    #[test]
    fn test_raster_offset_follows_interior_phase() {
        let decoder = decoder();
        let events = vec![
            cluster('A', 0.0, 1500.0),
            cluster('1', 5.0, 300.0),
            cluster('2', 9.0, 300.0),
            cluster('D', 12.0, 300.0),
        ];
        assert!((decoder.raster_offset(&events) - 1.0).abs() < 1e-4);
        assert_eq!(decoder.raster_offset(&events[..2]), 0.0);
    }

    #[test]
    fn test_tones_until_end() {
        assert_eq!(tones_until_end('A'), 12.0);
        assert_eq!(tones_until_end('B'), 11.0);
        assert_eq!(tones_until_end('*'), 6.0);
        assert_eq!(tones_until_end('C'), 1.0);
        assert_eq!(tones_until_end('D'), 0.0);
        assert_eq!(tones_until_end('7'), 10.0);
        assert_eq!(tones_until_end('#'), 10.0);
    }

    #[test]
    fn test_sequence_matching() {
        let full = sequence("AB1234*5678CD");
        assert!(full.matches(&sequence("AB12.4*5678CD")));
        assert!(sequence("AB12.4*5678CD").matches(&full));
        assert!(!full.matches(&sequence("AB1334*5678CD")));
        assert!(!full.matches(&sequence("AB1234*5678C")));
        assert_eq!(full.wildcards(), 0);
    }

    #[test]
    fn test_match_wildcards_counts_either_side() {
        let partial = sequence("AB12.4*5678CD");
        assert_eq!(partial.match_wildcards(&sequence("AB1234*5678CD")), Some(1));
        assert_eq!(partial.match_wildcards(&sequence("AB1234*56.8CD")), Some(2));
        assert_eq!(partial.match_wildcards(&partial), Some(1));
        assert_eq!(partial.match_wildcards(&sequence("AB1234*5679CD")), None);
    }

    #[test]
    fn test_cut_markers() {
        assert!(sequence("A#A#A#").is_cut_marker());
        assert!(sequence("B#B#B#").is_cut_marker());
        assert!(!sequence("A#A#A").is_cut_marker());
        assert!(!sequence("AB1234*5678CD").is_cut_marker());
    }
}
