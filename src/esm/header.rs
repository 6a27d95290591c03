//! TES3 file header parsing.
//!
//! Every ESM/ESP archive opens with a `TES3` record whose `HEDR` sub-record
//! carries the format version, file type, author and description fields and
//! the total record count, followed by one `MAST`/`DATA` pair per master
//! file the archive depends on.

use std::io::{Read, Seek};

use encoding_rs::WINDOWS_1252;
use log::{debug, info, trace};

use super::error::{EsmError, Result};
use super::reader::{EsmReader, FourCc};

const TES3: FourCc = FourCc(*b"TES3");
const HEDR: FourCc = FourCc(*b"HEDR");
const MAST: FourCc = FourCc(*b"MAST");
const DATA: FourCc = FourCc(*b"DATA");

/// Size of the fixed HEDR payload: version, file type, two fixed-width
/// text fields and the record count.
const HEDR_SIZE: u32 = 300;

/// Format versions written by the vanilla toolset.
const VER_1_2: f32 = 1.2;
const VER_1_3: f32 = 1.3;

/// Parsed TES3 header of an ESM/ESP archive.
#[derive(Debug, Default, Clone)]
pub struct Tes3Header {
    pub version: f32,
    /// 0 for plugins, 1 for masters, 32 for save games.
    pub file_type: u32,
    pub author: String,
    pub description: String,
    /// Number of records the archive claims to contain, not counting TES3
    /// itself.
    pub record_count: u32,
    pub masters: Vec<MasterFile>,
}

/// A master file this archive depends on.
#[derive(Debug, Clone)]
pub struct MasterFile {
    pub name: String,
    pub size: u64,
}

/// Parses the leading TES3 record from a freshly opened archive.
pub(crate) fn parse<R: Read + Seek>(esm: &mut EsmReader<R>) -> Result<Tes3Header> {
    let rec = esm
        .read_record_header()?
        .ok_or_else(|| EsmError::InvalidFormat("file is empty".to_string()))?;
    if rec.name != TES3 {
        return Err(EsmError::RecordMismatch {
            expected: TES3,
            found: rec.name,
        });
    }

    esm.get_sub_name_is(HEDR)?;
    esm.expect_sub_header(HEDR, HEDR_SIZE)?;
    let version = esm.read_f32()?;
    let file_type = esm.read_u32()?;
    let mut author_raw = [0u8; 32];
    esm.fill(&mut author_raw)?;
    let mut description_raw = [0u8; 256];
    esm.fill(&mut description_raw)?;
    let record_count = esm.read_u32()?;

    if version != VER_1_2 && version != VER_1_3 {
        return Err(EsmError::UnsupportedVersion(version));
    }

    let mut masters = Vec::new();
    while esm.is_next_sub(MAST)? {
        let name = esm.get_h_string()?;
        let size = esm.get_hnt_u64(DATA)?;
        debug!("Master file dependency: {name} ({size} bytes)");
        masters.push(MasterFile { name, size });
    }

    // Save games append further sub-records here; none of them matter for
    // reading the archive body.
    while esm.has_more_subs() {
        let name = esm.get_sub_name()?;
        let size = esm.get_sub_header()?;
        trace!("Skipping header sub-record {name} ({size} bytes)");
        esm.skip(size)?;
    }

    let header = Tes3Header {
        version,
        file_type,
        author: decode_fixed_string(&author_raw),
        description: decode_fixed_string(&description_raw),
        record_count,
        masters,
    };
    info!(
        "Opened ESM archive: version {}, {} records, author '{}'",
        header.version, header.record_count, header.author
    );
    Ok(header)
}

/// Decodes a fixed-width, NUL-padded Windows-1252 text field.
fn decode_fixed_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let (text, _, _) = WINDOWS_1252.decode(&raw[..end]);
    text.into_owned()
}
