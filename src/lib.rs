//! # esm-reader
//!
//! A reader for Elder Scrolls III game archives (.esm and .esp files).
//!
//! The archive is a flat sequence of chunked records. Opening a file parses
//! the TES3 header; callers then scan record headers and hand interesting
//! records to the matching decoder. Terrain cell ("LAND") records are the
//! crate's centrepiece: their bulk data is bookmarked during the scan and
//! only decoded when [`Land::load_data`](esm::land::Land::load_data) is
//! called, so a whole world's worth of cells can be indexed cheaply.
pub mod esm;

// Re-export the main types for convenience
pub use esm::{
    EsmError,
    EsmReader,
    Land,
    LandData,
    Tes3Header,
};
