use crate::error::Result;
use std::io::{ErrorKind, Read};

/// Producer of fixed-size audio blocks
///
/// `next_block` fills `block` completely and returns `true`, or returns
/// `false` once the stream has ended. A trailing partial block counts as the
/// end of the stream.
pub trait BlockSource {
    fn next_block(&mut self, block: &mut [i16]) -> Result<bool>;
}

impl<F> BlockSource for F
where
    F: FnMut(&mut [i16]) -> Result<bool>,
{
    fn next_block(&mut self, block: &mut [i16]) -> Result<bool> {
        self(block)
    }
}

/// Raw signed 16-bit big-endian mono PCM read from any byte stream
///
/// This is the format external decoders produce with `-f s16be`.
pub struct PcmReader<R> {
    inner: R,
    bytes: Vec<u8>,
}

impl<R: Read> PcmReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes: Vec::new(),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> BlockSource for PcmReader<R> {
    fn next_block(&mut self, block: &mut [i16]) -> Result<bool> {
        self.bytes.resize(block.len() * 2, 0);

        match self.inner.read_exact(&mut self.bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        for (sample, pair) in block.iter_mut().zip(self.bytes.chunks_exact(2)) {
            *sample = i16::from_be_bytes([pair[0], pair[1]]);
        }
        Ok(true)
    }
}

/// Blocks cut from samples already held in memory
pub struct SampleBlocks {
    samples: Vec<i16>,
    position: usize,
}

impl SampleBlocks {
    pub fn new(samples: Vec<i16>) -> Self {
        Self {
            samples,
            position: 0,
        }
    }
}

impl BlockSource for SampleBlocks {
    fn next_block(&mut self, block: &mut [i16]) -> Result<bool> {
        let end = self.position + block.len();
        if end > self.samples.len() {
            return Ok(false);
        }
        block.copy_from_slice(&self.samples[self.position..end]);
        self.position = end;
        Ok(true)
    }
}
