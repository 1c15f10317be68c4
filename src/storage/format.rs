//! Binary format for trained maps.
//!
//! ## Format Layout
//!
//! ```text
//! +------------------+
//! | Header (8 bytes) |
//! +------------------+
//! | Snapshot         |
//! | (bincode)        |
//! +------------------+
//! ```
//!
//! ### Header (8 bytes)
//! - Magic number (4 bytes): "HSOM"
//! - Version (2 bytes, little endian)
//! - Flags (2 bytes): reserved, written as 0
//!
//! ### Snapshot
//! - Grid size, input shape, prototypes `(H, W, seq_len, point_dim)`,
//!   QE/TE histories and the built-in distance metric, if any.

use crate::error::{HysomError, Result};
use crate::som::Distance;
use bincode::Options;
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Magic number for HySOM map files.
const MAGIC: &[u8; 4] = b"HSOM";

/// Current format version.
const VERSION: u16 = 1;

/// Header size in bytes.
const HEADER_SIZE: usize = 8;

/// Map file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapHeader {
    /// Format version.
    pub version: u16,
    /// Flags.
    pub flags: u16,
}

impl Default for MapHeader {
    fn default() -> Self {
        Self {
            version: VERSION,
            flags: 0,
        }
    }
}

impl MapHeader {
    /// Writes the header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(MAGIC);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.flags.to_le_bytes());
        bytes
    }

    /// Reads a header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(HysomError::InvalidMapFormat("Header too short".to_string()));
        }
        if &bytes[0..4] != MAGIC {
            return Err(HysomError::InvalidMapFormat("Invalid magic number".to_string()));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(HysomError::InvalidMapFormat(format!(
                "Unsupported version {} (expected {})",
                version, VERSION
            )));
        }
        let flags = u16::from_le_bytes([bytes[6], bytes[7]]);

        Ok(Self { version, flags })
    }
}

/// Everything persisted for a trained map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapSnapshot {
    /// Grid rows.
    pub height: usize,
    /// Grid columns.
    pub width: usize,
    /// Sample shape `(seq_len, point_dim)`.
    pub input_dim: (usize, usize),
    /// Prototype array.
    pub prototypes: Array4<f64>,
    /// `(iteration, QE)` snapshots.
    pub qe_history: Vec<(usize, f64)>,
    /// `(iteration, TE)` snapshots.
    pub te_history: Vec<(usize, f64)>,
    /// Built-in metric the map was trained with; custom metrics are not stored.
    pub distance: Option<Distance>,
}

impl MapSnapshot {
    fn check_shape(&self) -> Result<()> {
        let expected = [self.height, self.width, self.input_dim.0, self.input_dim.1];
        if self.prototypes.shape() != expected {
            return Err(HysomError::InvalidMapFormat(format!(
                "prototype shape {:?} does not match header {:?}",
                self.prototypes.shape(),
                expected
            )));
        }
        Ok(())
    }
}

/// Binary format reader/writer for map files.
pub struct MapFormat;

impl MapFormat {
    /// Writes a snapshot to a binary file.
    pub fn write<P: AsRef<Path>>(path: P, snapshot: &MapSnapshot) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(&MapHeader::default().to_bytes())?;
        bincode::serialize_into(&mut writer, snapshot)?;

        writer.flush()?;
        Ok(())
    }

    /// Reads a snapshot from a binary file.
    ///
    /// Decoding may not consume more bytes than the file holds, so a corrupt
    /// length prefix fails instead of allocating.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<MapSnapshot> {
        let file = File::open(path)?;
        let payload_len = file.metadata()?.len().saturating_sub(HEADER_SIZE as u64);
        let mut reader = BufReader::new(file);

        let mut header_bytes = [0u8; HEADER_SIZE];
        reader
            .read_exact(&mut header_bytes)
            .map_err(|_| HysomError::InvalidMapFormat("Header too short".to_string()))?;
        MapHeader::from_bytes(&header_bytes)?;

        let snapshot: MapSnapshot = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .with_limit(payload_len)
            .deserialize_from(&mut reader)?;
        snapshot.check_shape()?;
        Ok(snapshot)
    }
}
