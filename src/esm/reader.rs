//! Seekable chunked-stream reader for ESM/ESP archives.
//!
//! An ESM file is a flat sequence of records. Each record is a 16-byte
//! header followed by named sub-records: a 4-byte tag, a little-endian u32
//! payload size, then the payload. The reader tracks how much of the
//! current record is still unread, keeps a one-tag lookahead cache so
//! optional sub-records can be scanned with a peek-then-consume protocol,
//! and can snapshot its cursor so a record seen during the initial scan can
//! be decoded lazily long after the stream has moved on.

use std::fmt;
use std::io::{Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use encoding_rs::WINDOWS_1252;

use super::error::{EsmError, Result};
use super::header::{self, Tes3Header};

/// A four-byte chunk tag ("LAND", "VHGT", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCc(pub [u8; 4]);

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

/// Header of one top-level record.
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    pub name: FourCc,
    pub size: u32,
    pub flags: u32,
}

/// Resumable cursor state, captured with [`EsmReader::get_context`].
///
/// Opaque to callers: it carries the byte position together with the record
/// framing state the reader needs to continue scanning from that point.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadContext {
    file_pos: u64,
    left_rec: u32,
    cached_sub: Option<FourCc>,
}

/// The main reader for ESM/ESP archive files.
#[derive(Debug)]
pub struct EsmReader<R> {
    src: R,
    ctx: ReadContext,
    header: Tes3Header,
}

impl<R: Read + Seek> EsmReader<R> {
    /// Opens an archive and parses its leading TES3 header record.
    ///
    /// # Errors
    /// Returns an error if the source is empty, does not start with a TES3
    /// record, or declares a format version the vanilla toolset never wrote.
    pub fn new(src: R) -> Result<Self> {
        let mut esm = EsmReader {
            src,
            ctx: ReadContext::default(),
            header: Tes3Header::default(),
        };
        esm.header = header::parse(&mut esm)?;
        Ok(esm)
    }

    /// The archive's parsed TES3 header.
    pub fn header(&self) -> &Tes3Header {
        &self.header
    }

    /// Reads the next record header, or `None` at end of file.
    ///
    /// Any unread remainder of the previous record must have been consumed
    /// or skipped with [`EsmReader::skip_record`] first.
    pub fn read_record_header(&mut self) -> Result<Option<RecordHeader>> {
        let mut tag = [0u8; 4];
        let first = self.src.read(&mut tag)?;
        if first == 0 {
            return Ok(None);
        }
        self.src.read_exact(&mut tag[first..])?;
        let size = self.src.read_u32::<LittleEndian>()?;
        self.src.read_u32::<LittleEndian>()?; // unused header field
        let flags = self.src.read_u32::<LittleEndian>()?;
        self.ctx.left_rec = size;
        self.ctx.cached_sub = None;
        Ok(Some(RecordHeader {
            name: FourCc(tag),
            size,
            flags,
        }))
    }

    /// Skips whatever is left of the current record.
    pub fn skip_record(&mut self) -> Result<()> {
        self.src.seek(SeekFrom::Current(i64::from(self.ctx.left_rec)))?;
        self.ctx.left_rec = 0;
        self.ctx.cached_sub = None;
        Ok(())
    }

    /// True while the current record still has sub-records to offer.
    pub fn has_more_subs(&self) -> bool {
        self.ctx.left_rec > 0 || self.ctx.cached_sub.is_some()
    }

    /// Reads the next sub-record tag, honouring the lookahead cache.
    pub fn get_sub_name(&mut self) -> Result<FourCc> {
        if let Some(tag) = self.ctx.cached_sub.take() {
            return Ok(tag);
        }
        let mut raw = [0u8; 4];
        self.fill(&mut raw)?;
        Ok(FourCc(raw))
    }

    /// Reads the next sub-record tag and fails unless it is `name`.
    pub fn get_sub_name_is(&mut self, name: FourCc) -> Result<()> {
        let found = self.get_sub_name()?;
        if found != name {
            return Err(EsmError::SubRecordMismatch {
                expected: name,
                found,
            });
        }
        Ok(())
    }

    /// Reads a sub-record's declared payload size.
    pub fn get_sub_header(&mut self) -> Result<u32> {
        self.read_u32()
    }

    /// Reads the declared payload size and fails unless it is `expected`.
    pub fn expect_sub_header(&mut self, name: FourCc, expected: u32) -> Result<()> {
        let found = self.get_sub_header()?;
        if found != expected {
            return Err(EsmError::SizeMismatch {
                name,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Non-destructive lookahead: consumes the next tag only when it
    /// matches `name`, otherwise leaves it cached for the next probe.
    /// Returns false without touching the stream once the record is
    /// exhausted.
    pub fn is_next_sub(&mut self, name: FourCc) -> Result<bool> {
        if self.ctx.cached_sub.is_none() {
            if self.ctx.left_rec == 0 {
                return Ok(false);
            }
            let mut raw = [0u8; 4];
            self.fill(&mut raw)?;
            self.ctx.cached_sub = Some(FourCc(raw));
        }
        let matches = self.ctx.cached_sub == Some(name);
        if matches {
            self.ctx.cached_sub = None;
        }
        Ok(matches)
    }

    /// Skips a sub-record whose declared size must equal `size`. The tag
    /// itself must already have been consumed.
    pub fn skip_h_sub(&mut self, name: FourCc, size: u32) -> Result<()> {
        self.expect_sub_header(name, size)?;
        self.skip(size)
    }

    /// Named sub-record holding a single little-endian u32.
    pub fn get_hnt_u32(&mut self, name: FourCc) -> Result<u32> {
        self.get_sub_name_is(name)?;
        self.expect_sub_header(name, 4)?;
        self.read_u32()
    }

    /// Named sub-record holding a single little-endian u64.
    pub fn get_hnt_u64(&mut self, name: FourCc) -> Result<u64> {
        self.get_sub_name_is(name)?;
        self.expect_sub_header(name, 8)?;
        self.read_u64()
    }

    /// Named sub-record whose payload must be exactly `buf.len()` bytes.
    pub fn get_hn_exact(&mut self, name: FourCc, buf: &mut [u8]) -> Result<()> {
        self.get_sub_name_is(name)?;
        self.get_h_exact(name, buf)
    }

    /// Size-checked payload read for when the tag was already consumed by a
    /// successful [`EsmReader::is_next_sub`] probe.
    pub fn get_h_exact(&mut self, name: FourCc, buf: &mut [u8]) -> Result<()> {
        self.expect_sub_header(name, buf.len() as u32)?;
        self.fill(buf)
    }

    /// Variable-length string sub-record: Windows-1252, NUL-terminated.
    /// The tag must already have been consumed.
    pub fn get_h_string(&mut self) -> Result<String> {
        let size = self.get_sub_header()?;
        let mut raw = vec![0u8; size as usize];
        self.fill(&mut raw)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let (text, _, _) = WINDOWS_1252.decode(&raw[..end]);
        Ok(text.into_owned())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut raw = [0u8; 4];
        self.fill(&mut raw)?;
        Ok(LittleEndian::read_i32(&raw))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.fill(&mut raw)?;
        Ok(LittleEndian::read_u32(&raw))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut raw = [0u8; 8];
        self.fill(&mut raw)?;
        Ok(LittleEndian::read_u64(&raw))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let mut raw = [0u8; 4];
        self.fill(&mut raw)?;
        Ok(LittleEndian::read_f32(&raw))
    }

    /// Reads exactly `buf.len()` bytes of the current record's payload.
    pub fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        self.debit(buf.len() as u32)?;
        self.src.read_exact(buf)?;
        Ok(())
    }

    /// Seeks forward over `n` payload bytes without reading them.
    pub fn skip(&mut self, n: u32) -> Result<()> {
        self.debit(n)?;
        self.src.seek(SeekFrom::Current(i64::from(n)))?;
        Ok(())
    }

    fn debit(&mut self, n: u32) -> Result<()> {
        match self.ctx.left_rec.checked_sub(n) {
            Some(left) => {
                self.ctx.left_rec = left;
                Ok(())
            }
            None => Err(EsmError::RecordOverrun {
                requested: n,
                left: self.ctx.left_rec,
            }),
        }
    }

    /// Captures the cursor so decoding can resume here later, after other
    /// records have moved the underlying stream.
    pub fn get_context(&mut self) -> Result<ReadContext> {
        let mut ctx = self.ctx;
        ctx.file_pos = self.src.stream_position()?;
        Ok(ctx)
    }

    /// Rewinds the reader to a previously captured context.
    pub fn restore_context(&mut self, ctx: &ReadContext) -> Result<()> {
        self.src.seek(SeekFrom::Start(ctx.file_pos))?;
        self.ctx = *ctx;
        Ok(())
    }
}
