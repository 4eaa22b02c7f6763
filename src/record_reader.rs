//! Record tokenizer for RAPIC byte streams.
//!
//! Text lines and binary radials share one stream but terminate differently:
//! text records end on CR, LF, `#`, CTRL-Z, CTRL-C or NUL, while binary
//! radials end on two consecutive NULs once the angle header is complete.
//! Records are returned without their terminator.

use crate::constants::{
    ASCII_RADIAL_MARKER, BINARY_RADIAL_MARKER, COMMENT_MARKER, DEFAULT_RECORD_BUFFER_SIZE, EOT,
    MIN_BINARY_RECORD_LEN, NUL, RECORD_TERMINATORS,
};
use crate::error::{RapicError, Result};
use crate::models::{RawRecord, RecordKind};
use std::io::{BufRead, ErrorKind};
use tracing::{debug, trace, warn};

/// Pull-based tokenizer with a single-slot pushback
#[derive(Debug)]
pub struct RecordReader<R> {
    source: R,
    capacity: usize,
    pushed_back: Option<RawRecord>,
    /// Overflowed record whose tail still has to be discarded
    resync: Option<Resync>,
    records_read: usize,
    overflows: usize,
    stray_eots: usize,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(source: R) -> Self {
        Self::with_capacity(source, DEFAULT_RECORD_BUFFER_SIZE)
    }

    pub fn with_capacity(source: R, capacity: usize) -> Self {
        Self {
            source,
            capacity: capacity.max(1),
            pushed_back: None,
            resync: None,
            records_read: 0,
            overflows: 0,
            stray_eots: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn records_read(&self) -> usize {
        self.records_read
    }

    pub fn overflow_count(&self) -> usize {
        self.overflows
    }

    pub fn stray_eot_count(&self) -> usize {
        self.stray_eots
    }

    /// Returns the next record, or `None` at end of stream
    pub fn next_record(&mut self) -> Result<Option<RawRecord>> {
        if let Some(record) = self.pushed_back.take() {
            trace!("Replaying pushed-back {} record", record.kind().name());
            return Ok(Some(record));
        }

        if let Some(resync) = self.resync.take() {
            self.discard_remainder(resync)?;
        }

        let first = loop {
            match self.next_byte()? {
                None => return Ok(None),
                Some(EOT) => {
                    self.stray_eots += 1;
                    debug!("Ignoring stray EOT before record");
                }
                Some(b) if b.is_ascii_whitespace() || b.is_ascii_control() => {}
                Some(b) => break b,
            }
        };

        let kind = classify(first);
        let mut buf = Vec::with_capacity(self.capacity.min(256));
        buf.push(first);

        let record = match kind {
            RecordKind::BinaryRadial => self.read_binary(buf)?,
            _ => self.read_text(kind, buf)?,
        };

        self.records_read += 1;
        trace!(
            "Record {}: {} ({} bytes)",
            self.records_read,
            record.kind().name(),
            record.len()
        );
        Ok(Some(record))
    }

    /// Un-consumes one record; the next call to `next_record` returns it
    pub fn push_back(&mut self, record: RawRecord) -> Result<()> {
        if self.pushed_back.is_some() {
            return Err(RapicError::Internal {
                message: "record pushback slot already occupied".to_string(),
            });
        }
        self.pushed_back = Some(record);
        Ok(())
    }

    fn read_text(&mut self, kind: RecordKind, mut buf: Vec<u8>) -> Result<RawRecord> {
        loop {
            match self.next_byte()? {
                None => return Ok(RawRecord::new(kind, buf)),
                Some(b) if RECORD_TERMINATORS.contains(&b) => return Ok(RawRecord::new(kind, buf)),
                Some(b) => {
                    if buf.len() >= self.capacity {
                        return Ok(self.overflow(kind, buf, false));
                    }
                    buf.push(b);
                }
            }
        }
    }

    fn read_binary(&mut self, mut buf: Vec<u8>) -> Result<RawRecord> {
        let mut pending_nul = false;
        loop {
            match self.next_byte()? {
                None => {
                    debug!("Stream ended inside a binary radial ({} bytes)", buf.len());
                    return Ok(RawRecord::new(RecordKind::BinaryRadial, buf));
                }
                Some(NUL) if pending_nul => {
                    buf.pop();
                    return Ok(RawRecord::new(RecordKind::BinaryRadial, buf));
                }
                Some(b) => {
                    if buf.len() >= self.capacity {
                        // b is dropped but may be the first sentinel NUL
                        return Ok(self.overflow(RecordKind::BinaryRadial, buf, b == NUL));
                    }
                    buf.push(b);
                    pending_nul = b == NUL && buf.len() >= MIN_BINARY_RECORD_LEN;
                }
            }
        }
    }

    fn overflow(&mut self, kind: RecordKind, buf: Vec<u8>, pending_nul: bool) -> RawRecord {
        self.overflows += 1;
        self.resync = Some(Resync { kind, pending_nul });
        warn!(
            "Record buffer full after {} bytes, force-terminating {} record",
            buf.len(),
            kind.name()
        );
        RawRecord::new(RecordKind::Overflow, buf)
    }

    /// Skips the rest of an overflowed record up to its own terminator
    fn discard_remainder(&mut self, resync: Resync) -> Result<()> {
        let mut discarded = 0usize;
        let mut pending_nul = resync.pending_nul;
        while let Some(b) = self.next_byte()? {
            if resync.kind == RecordKind::BinaryRadial {
                if b == NUL && pending_nul {
                    break;
                }
                pending_nul = b == NUL;
            } else if RECORD_TERMINATORS.contains(&b) {
                break;
            }
            discarded += 1;
        }
        debug!("Discarded {} bytes of overflowed record", discarded);
        Ok(())
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        loop {
            let buf = match self.source.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            let Some(&b) = buf.first() else {
                return Ok(None);
            };
            self.source.consume(1);
            return Ok(Some(b));
        }
    }
}

/// Tail-skipping state left behind by a forced termination
#[derive(Debug, Clone, Copy)]
struct Resync {
    kind: RecordKind,
    /// The last byte consumed before termination was a NUL
    pending_nul: bool,
}

fn classify(first: u8) -> RecordKind {
    match first {
        BINARY_RADIAL_MARKER => RecordKind::BinaryRadial,
        ASCII_RADIAL_MARKER => RecordKind::AsciiRadial,
        COMMENT_MARKER => RecordKind::Comment,
        _ => RecordKind::Header,
    }
}
