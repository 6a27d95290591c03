//! Terrain cell ("LAND") records.
//!
//! Landscape data is bulky, so it is loaded in two phases: a cheap header
//! pass that runs for every record during the archive scan, and an
//! expensive data pass that runs only when a cell is actually needed. The
//! header pass notes which sub-records are present and bookmarks the
//! stream; the data pass seeks back to the bookmark and decodes heights,
//! vertex colours and texture indices.

use std::io::{Read, Seek};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};

use super::error::Result;
use super::reader::{EsmReader, FourCc, ReadContext};

/// Record tag for terrain cells.
pub const REC_LAND: FourCc = FourCc(*b"LAND");

/// Vertices per cell edge.
pub const LAND_SIZE: usize = 65;
/// Vertices per cell.
pub const LAND_NUM_VERTS: usize = LAND_SIZE * LAND_SIZE;
/// Texture indices per cell: a 16x16 grid of quadrants.
pub const LAND_NUM_TEXTURES: usize = 16 * 16;
/// Converts decoded integer height units to world units.
pub const HEIGHT_SCALE: f32 = 8.0;

/// Flat floor used for cells that carry no landscape data, in integer
/// height units.
const DEFAULT_HEIGHT: f32 = -256.0;

const INTV: FourCc = FourCc(*b"INTV");
const DATA: FourCc = FourCc(*b"DATA");
const VNML: FourCc = FourCc(*b"VNML");
const VHGT: FourCc = FourCc(*b"VHGT");
const WNAM: FourCc = FourCc(*b"WNAM");
const VCLR: FourCc = FourCc(*b"VCLR");
const VTEX: FourCc = FourCc(*b"VTEX");

// Payload sizes are fixed for this format version.
const VNML_SIZE: u32 = (3 * LAND_NUM_VERTS) as u32;
const VHGT_SIZE: u32 = 4 + LAND_NUM_VERTS as u32 + 3;
const WNAM_SIZE: u32 = 81;
const VCLR_SIZE: u32 = (3 * LAND_NUM_VERTS) as u32;
const VTEX_SIZE: u32 = (2 * LAND_NUM_TEXTURES) as u32;

/// Decoded landscape payload for one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct LandData {
    /// Absolute vertex heights in world units, row-major.
    pub heights: Vec<f32>,
    /// Per-vertex RGB bytes, present only when the cell has a colour map.
    pub colours: Option<Vec<u8>>,
    /// Texture indices for the cell's 16x16 quadrant grid.
    pub textures: Vec<u16>,
}

impl LandData {
    pub fn using_colours(&self) -> bool {
        self.colours.is_some()
    }

    fn placeholder() -> Self {
        LandData {
            heights: vec![DEFAULT_HEIGHT * HEIGHT_SCALE; LAND_NUM_VERTS],
            colours: None,
            textures: vec![0; LAND_NUM_TEXTURES],
        }
    }
}

/// One cell's landscape record.
///
/// Produced by [`Land::read`] with only the grid position, flags and a
/// stream bookmark filled in; the payload arrives when [`Land::load_data`]
/// runs and leaves again on [`Land::unload_data`].
#[derive(Debug)]
pub struct Land {
    grid_x: i32,
    grid_y: i32,
    flags: u32,
    context: ReadContext,
    has_data: bool,
    data: Option<LandData>,
}

impl Land {
    /// Header pass: reads the grid position and flags, bookmarks the
    /// stream, and skips the bulk sub-records for later.
    pub fn read<R: Read + Seek>(esm: &mut EsmReader<R>) -> Result<Land> {
        esm.get_sub_name_is(INTV)?;
        esm.expect_sub_header(INTV, 8)?;
        let grid_x = esm.read_i32()?;
        let grid_y = esm.read_i32()?;

        let flags = esm.get_hnt_u32(DATA)?;

        // Everything past the flags is decoded on demand, once the cell is
        // actually entered.
        let context = esm.get_context()?;

        let mut present = 0;
        if esm.is_next_sub(VNML)? {
            esm.skip_h_sub(VNML, VNML_SIZE)?;
            present += 1;
        }
        if esm.is_next_sub(VHGT)? {
            esm.skip_h_sub(VHGT, VHGT_SIZE)?;
            present += 1;
        }
        if esm.is_next_sub(WNAM)? {
            esm.skip_h_sub(WNAM, WNAM_SIZE)?;
        }
        if esm.is_next_sub(VCLR)? {
            esm.skip_h_sub(VCLR, VCLR_SIZE)?;
        }
        if esm.is_next_sub(VTEX)? {
            esm.skip_h_sub(VTEX, VTEX_SIZE)?;
            present += 1;
        }

        // The landscape is only usable when normals, heights and texture
        // indices are all present.
        let has_data = present == 3;
        trace!("Land ({grid_x}, {grid_y}): flags {flags:#x}, has_data {has_data}");

        Ok(Land {
            grid_x,
            grid_y,
            flags,
            context,
            has_data,
            data: None,
        })
    }

    /// Data pass: decodes the bookmarked sub-records into a payload.
    ///
    /// A no-op when the payload is already loaded. Cells without landscape
    /// data get a placeholder payload without touching the stream. On
    /// failure nothing is retained and the cell stays unloaded.
    pub fn load_data<R: Read + Seek>(&mut self, esm: &mut EsmReader<R>) -> Result<()> {
        if self.data.is_some() {
            return Ok(());
        }

        if !self.has_data {
            self.data = Some(LandData::placeholder());
            return Ok(());
        }

        debug!(
            "Loading landscape data for cell ({}, {})",
            self.grid_x, self.grid_y
        );
        esm.restore_context(&self.context)?;

        // Normals are not decoded; the skip still has to be size-exact to
        // keep the stream aligned.
        if esm.is_next_sub(VNML)? {
            esm.skip_h_sub(VNML, VNML_SIZE)?;
        }

        let heights = read_heights(esm)?;

        if esm.is_next_sub(WNAM)? {
            esm.skip_h_sub(WNAM, WNAM_SIZE)?;
        }

        let colours = if esm.is_next_sub(VCLR)? {
            let mut raw = vec![0u8; 3 * LAND_NUM_VERTS];
            esm.get_h_exact(VCLR, &mut raw)?;
            Some(raw)
        } else {
            None
        };

        let textures = read_textures(esm)?;

        self.data = Some(LandData {
            heights,
            colours,
            textures,
        });
        Ok(())
    }

    /// Releases the decoded payload, returning the cell to its deferred
    /// state. The bookmark survives, so the payload can be reloaded later.
    pub fn unload_data(&mut self) {
        self.data = None;
    }

    pub fn grid(&self) -> (i32, i32) {
        (self.grid_x, self.grid_y)
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Whether the record carried all sub-records needed for a usable
    /// landscape. Fixed at header time.
    pub fn has_data(&self) -> bool {
        self.has_data
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&LandData> {
        self.data.as_ref()
    }
}

/// Reads a VHGT sub-record and rebuilds absolute vertex heights.
///
/// On disk: a float base offset, one signed byte delta per vertex in
/// row-major order, and three trailing bytes of padding. A single integer
/// accumulator runs over the whole grid, so the walk entering a row
/// continues from wherever the previous row's walk ended, not from that
/// row's first vertex. Archives are encoded against exactly this scan; a
/// per-row reseed decodes them wrong.
fn read_heights<R: Read + Seek>(esm: &mut EsmReader<R>) -> Result<Vec<f32>> {
    esm.get_sub_name_is(VHGT)?;
    esm.expect_sub_header(VHGT, VHGT_SIZE)?;

    let base = esm.read_f32()?;
    let mut deltas = vec![0u8; LAND_NUM_VERTS];
    esm.fill(&mut deltas)?;
    esm.skip(3)?;

    let mut heights = vec![0.0f32; LAND_NUM_VERTS];
    let mut offset = base as i32;
    for (vertex, &delta) in deltas.iter().enumerate() {
        offset += (delta as i8) as i32;
        heights[vertex] = offset as f32 * HEIGHT_SCALE;
    }
    Ok(heights)
}

/// Reads a VTEX sub-record: 256 texture indices in a flat scan order,
/// remapped into the cell's 16x16 quadrant grid.
///
/// The on-disk order groups indices into 4x4 macro-cells of 4x4 sub-cells;
/// iterating y1, then x1, then y2, then x2 and writing each consumed value
/// to `(y1*4 + y2)*16 + (x1*4 + x2)` reproduces the grid. This is not a
/// row-major transpose.
fn read_textures<R: Read + Seek>(esm: &mut EsmReader<R>) -> Result<Vec<u16>> {
    let mut raw = [0u8; VTEX_SIZE as usize];
    esm.get_hn_exact(VTEX, &mut raw)?;
    let mut flat = [0u16; LAND_NUM_TEXTURES];
    LittleEndian::read_u16_into(&raw, &mut flat);

    let mut textures = vec![0u16; LAND_NUM_TEXTURES];
    let mut read_pos = 0;
    for y1 in 0..4 {
        for x1 in 0..4 {
            for y2 in 0..4 {
                for x2 in 0..4 {
                    textures[(y1 * 4 + y2) * 16 + (x1 * 4 + x2)] = flat[read_pos];
                    read_pos += 1;
                }
            }
        }
    }
    Ok(textures)
}
