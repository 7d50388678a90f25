//! Access-unit samples in length-prefixed framing.
//!
//! Each NAL unit inside a sample is preceded by its length as a 4-byte
//! big-endian integer, with no start codes:
//!
//! ```text
//! +------------+-----------------+------------+-----------------+
//! | len: u32be | NAL (hdr+data)  | len: u32be | NAL (hdr+data)  | ...
//! +------------+-----------------+------------+-----------------+
//! ```

use super::h264::NalUnit;

const LENGTH_PREFIX: usize = 4;

/// One access unit: zero or more non-boundary NALs (SPS, PPS, SEI, ...)
/// followed by exactly one boundary NAL (slice or IDR slice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    data: Vec<u8>,
    nal_count: usize,
}

impl Sample {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn nal_count(&self) -> usize {
        self.nal_count
    }

    pub fn nal_units(&self) -> LengthPrefixedUnits<'_> {
        LengthPrefixedUnits::new(&self.data)
    }
}

/// Groups an ordered NAL sequence into [`Sample`]s.
///
/// Exactly one sample is open at a time. Every unit is appended to it; a
/// boundary unit (type 1 or 5) then closes it and a fresh one opens.
#[derive(Debug, Default)]
pub struct SampleBuilder {
    open: Vec<u8>,
    open_nals: usize,
    finished: Vec<Sample>,
}

impl SampleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one unit; returns the finalized sample if this unit closed it.
    pub fn push(&mut self, unit: &NalUnit) -> Option<&Sample> {
        let bytes = unit.as_bytes();
        self.open
            .extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        self.open.extend_from_slice(bytes);
        self.open_nals += 1;

        if !unit.is_boundary() {
            return None;
        }

        let sample = Sample {
            data: std::mem::take(&mut self.open),
            nal_count: std::mem::replace(&mut self.open_nals, 0),
        };
        tracing::trace!(
            bytes = sample.len(),
            nals = sample.nal_count,
            nal_type = unit.unit_type(),
            "sample finalized"
        );
        self.finished.push(sample);
        self.finished.last()
    }

    /// Units appended since the last boundary.
    pub fn pending_nals(&self) -> usize {
        self.open_nals
    }

    /// Finalized samples in input order. A trailing open sample without a
    /// boundary unit is discarded, never emitted.
    pub fn finish(self) -> Vec<Sample> {
        if self.open_nals > 0 {
            tracing::debug!(
                nals = self.open_nals,
                bytes = self.open.len(),
                "discarding trailing units without a closing slice"
            );
        }
        self.finished
    }
}

/// Build samples from a whole unit sequence.
pub fn build_samples<'a>(units: impl IntoIterator<Item = &'a NalUnit>) -> Vec<Sample> {
    let mut builder = SampleBuilder::new();
    for unit in units {
        builder.push(unit);
    }
    builder.finish()
}

/// Iterates the NAL units of a length-prefixed buffer.
///
/// Stops at the first prefix that runs past the end of the buffer.
pub struct LengthPrefixedUnits<'a> {
    rest: &'a [u8],
}

impl<'a> LengthPrefixedUnits<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { rest: data }
    }
}

impl<'a> Iterator for LengthPrefixedUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.rest.len() < LENGTH_PREFIX {
            return None;
        }
        let len = u32::from_be_bytes([self.rest[0], self.rest[1], self.rest[2], self.rest[3]])
            as usize;
        let body = &self.rest[LENGTH_PREFIX..];
        if body.len() < len {
            tracing::warn!(len, available = body.len(), "length prefix overruns sample");
            self.rest = &[];
            return None;
        }
        let (unit, rest) = body.split_at(len);
        self.rest = rest;
        Some(unit)
    }
}
