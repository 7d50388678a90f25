//! Recorded RTP capture files.
//!
//! A capture is a flat sequence of records, each a fixed header followed by
//! one raw RTP packet:
//!
//! ```text
//! Plain (24-byte header):
//!   +----------------+----------------+----------------+---------------+
//!   | valid: i64 LE  | size: i64 LE   | delay: i64 LE  | size bytes... |
//!   +----------------+----------------+----------------+---------------+
//!
//! Framed (recorder layout, 32-byte header):
//!   +-----+-----+-----------+----------------------------+---------------+
//!   | '$' | crc | 6 x pad   | valid | size | delay (LE)  | size bytes... |
//!   +-----+-----+-----------+----------------------------+---------------+
//! ```
//!
//! The sequence ends at end of file, at a record whose `size` is zero (or
//! negative), or at a truncated trailing record. None of those are errors:
//! the only failure surfaced to callers is failing to open the file.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use crate::error::{ReplayError, Result};

/// Value of the `valid` field written by the recorder.
pub const VALID_SENTINEL: i64 = 1;

const FIELDS_LEN: usize = 24;
const FRAME_PREFIX_LEN: usize = 8;
const FRAME_MARKER: u8 = b'$';

/// On-disk record header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureFormat {
    /// Three little-endian `i64` fields.
    #[default]
    Plain,
    /// The three fields preceded by an 8-byte `'$'`/checksum preamble.
    Framed,
}

impl CaptureFormat {
    /// Total header length in bytes.
    pub fn header_len(self) -> usize {
        match self {
            Self::Plain => FIELDS_LEN,
            Self::Framed => FRAME_PREFIX_LEN + FIELDS_LEN,
        }
    }
}

/// One recorded RTP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub valid: bool,
    pub size: u32,
    /// Inter-packet delay noted by the recorder. Informational only; playback
    /// pacing is derived from RTP timestamps.
    pub delay_hint: i32,
    pub payload: Vec<u8>,
}

/// Lazily yields [`CaptureRecord`]s in file order.
pub struct CaptureReader<R> {
    inner: R,
    format: CaptureFormat,
    records: u64,
    done: bool,
}

impl CaptureReader<BufReader<File>> {
    /// Open a capture file. This is the only fallible step of reading.
    pub fn open(path: impl AsRef<Path>, format: CaptureFormat) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ReplayError::CaptureOpen {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), ?format, "capture opened");
        Ok(Self::new(BufReader::new(file), format))
    }
}

impl<R: Read> CaptureReader<R> {
    pub fn new(inner: R, format: CaptureFormat) -> Self {
        Self {
            inner,
            format,
            records: 0,
            done: false,
        }
    }

    /// Number of records yielded so far.
    pub fn records_read(&self) -> u64 {
        self.records
    }

    fn read_record(&mut self) -> Option<CaptureRecord> {
        let mut header = [0u8; FRAME_PREFIX_LEN + FIELDS_LEN];
        let header = &mut header[..self.format.header_len()];
        if let Err(e) = self.inner.read_exact(header) {
            if e.kind() != ErrorKind::UnexpectedEof {
                tracing::warn!(error = %e, record = self.records, "capture read failed, ending");
            }
            return None;
        }

        let fields = match self.format {
            CaptureFormat::Plain => &header[..],
            CaptureFormat::Framed => {
                if header[0] != FRAME_MARKER {
                    tracing::debug!(record = self.records, marker = header[0], "unexpected frame marker");
                }
                &header[FRAME_PREFIX_LEN..]
            }
        };
        let valid = read_i64(&fields[0..8]);
        let size = read_i64(&fields[8..16]);
        let delay = read_i64(&fields[16..24]);

        if size <= 0 {
            tracing::debug!(record = self.records, size, "end-of-capture record");
            return None;
        }
        let size = match u32::try_from(size) {
            Ok(size) => size,
            Err(_) => {
                tracing::warn!(record = self.records, size, "implausible record size, ending");
                return None;
            }
        };

        // Sized by what is actually read, never preallocated from the header.
        let mut payload = Vec::new();
        if let Err(e) = (&mut self.inner)
            .take(u64::from(size))
            .read_to_end(&mut payload)
        {
            tracing::warn!(error = %e, record = self.records, "capture read failed, ending");
            return None;
        }
        if payload.len() < size as usize {
            tracing::debug!(
                record = self.records,
                expected = size,
                got = payload.len(),
                "truncated trailing record"
            );
            return None;
        }

        Some(CaptureRecord {
            valid: valid == VALID_SENTINEL,
            size,
            delay_hint: delay.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
            payload,
        })
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = CaptureRecord;

    fn next(&mut self) -> Option<CaptureRecord> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Some(record) => {
                self.records += 1;
                tracing::trace!(record = self.records, size = record.size, "capture record");
                Some(record)
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

fn read_i64(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    i64::from_le_bytes(buf)
}

/// Writes capture records in either layout.
pub struct CaptureWriter<W: Write> {
    inner: W,
    format: CaptureFormat,
}

impl CaptureWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, format: CaptureFormat) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?), format))
    }
}

impl<W: Write> CaptureWriter<W> {
    pub fn new(inner: W, format: CaptureFormat) -> Self {
        Self { inner, format }
    }

    /// Append one RTP packet.
    pub fn write_record(&mut self, packet: &[u8], delay_hint: i64) -> Result<()> {
        self.write_header(packet.len() as i64, delay_hint)?;
        self.inner.write_all(packet)?;
        Ok(())
    }

    /// Write the zero-size record that marks the end of the capture, then flush.
    pub fn finish(mut self) -> Result<W> {
        self.write_header(0, 0)?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn write_header(&mut self, size: i64, delay_hint: i64) -> Result<()> {
        if self.format == CaptureFormat::Framed {
            let mut prefix = [0u8; FRAME_PREFIX_LEN];
            prefix[0] = FRAME_MARKER;
            self.inner.write_all(&prefix)?;
        }
        self.inner.write_all(&VALID_SENTINEL.to_le_bytes())?;
        self.inner.write_all(&size.to_le_bytes())?;
        self.inner.write_all(&delay_hint.to_le_bytes())?;
        Ok(())
    }
}
