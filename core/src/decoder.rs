use crate::config::DecoderConfig;
use crate::dtmf::ToneSpectrum;
use crate::error::{ClapError, Result};
use crate::event::{EventBuffer, SymbolEvent};
use crate::sequence::{DecodeOutcome, DecodedSequence, SequenceDecoder};
use crate::source::BlockSource;

/// Streaming clapboard decoder
///
/// Classifies each block into at most one DTMF key, buffers the detections
/// and, whenever the oldest detection is older than the configured window,
/// tries to decode a complete clapboard sequence from the buffer. A decode
/// clears the buffer; otherwise the oldest detection is evicted.
pub struct ClapDecoder {
    config: DecoderConfig,
    sequencer: SequenceDecoder,
    events: EventBuffer,
    frame_counter: u64,
}

impl ClapDecoder {
    pub fn new(config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sequencer: SequenceDecoder::new(&config),
            config,
            events: EventBuffer::new(),
            frame_counter: 0,
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Samples expected by `process_block`
    pub fn block_len(&self) -> usize {
        self.config.block_len()
    }

    /// Blocks processed so far
    pub fn frames_processed(&self) -> u64 {
        self.frame_counter
    }

    /// Audio processed so far, in seconds
    pub fn elapsed_seconds(&self) -> f64 {
        self.frame_counter as f64 / self.config.fps as f64
    }

    /// Detections waiting for a decode attempt
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Distance in blocks between the oldest and newest buffered detection
    pub fn buffered_span_frames(&self) -> f64 {
        self.events.span_frames()
    }

    /// Process one block of `block_len()` samples
    pub fn process_block(&mut self, block: &[i16]) -> Result<Option<DecodedSequence>> {
        if block.len() != self.block_len() {
            return Err(ClapError::InvalidBlockSize {
                expected: self.block_len(),
                actual: block.len(),
            });
        }

        let frame = self.frame_counter;
        self.frame_counter += 1;

        if let Some((key, relevance)) = ToneSpectrum::measure(block, self.config.fps).classify() {
            log::trace!("frame {}: key {} relevance {:.1}", frame, key, relevance);
            self.events.push(SymbolEvent::raw(key, frame, relevance));
        }

        if !self.events.is_stale(frame, self.config.max_seq_frames()) {
            return Ok(None);
        }

        let decoded = match self.sequencer.decode(self.events.snapshot(), frame as f64) {
            DecodeOutcome::Decoded(sequence) => {
                log::info!(
                    "decoded {:?} at {:.2}s",
                    sequence.symbols,
                    sequence.start_time
                );
                self.events.clear();
                Some(sequence)
            }
            DecodeOutcome::Deferred(reason) => {
                log::debug!("frame {}: deferred ({:?})", frame, reason);
                None
            }
        };

        self.events.pop_front();
        Ok(decoded)
    }

    /// Decode a whole stream, reporting each sequence as it is found
    ///
    /// Returns the number of blocks read. Detections still buffered when the
    /// stream ends are never reported.
    pub fn run_with<S, F>(&mut self, source: &mut S, mut on_sequence: F) -> Result<u64>
    where
        S: BlockSource + ?Sized,
        F: FnMut(&DecodedSequence),
    {
        let mut block = vec![0i16; self.block_len()];
        let mut blocks = 0u64;

        while source.next_block(&mut block)? {
            if let Some(sequence) = self.process_block(&block)? {
                on_sequence(&sequence);
            }
            blocks += 1;
        }

        if blocks == 0 {
            return Err(ClapError::EmptyStream);
        }
        Ok(blocks)
    }

    /// Decode a whole stream and collect every sequence
    pub fn run<S>(&mut self, source: &mut S) -> Result<Vec<DecodedSequence>>
    where
        S: BlockSource + ?Sized,
    {
        let mut sequences = Vec::new();
        self.run_with(source, |sequence| sequences.push(sequence.clone()))?;
        Ok(sequences)
    }
}
