//! Per-pixel correspondence grid with a binary file format.
//!
//! A map stores one decoded projector coordinate per camera pixel together
//! with a validity flag. File layout (little endian): magic `CM2F`,
//! `width: u32`, `height: u32`, then `width * height` row-major cells of
//! `(value: f32, valid: u8)`. Invalid cells carry a zeroed value both in
//! memory and on disk, so stale coordinates cannot survive a round-trip.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

const MAP_MAGIC: [u8; 4] = *b"CM2F";

// ── Error type ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum MapError {
    Io { path: PathBuf, source: io::Error },
    BadMagic { path: PathBuf, found: [u8; 4] },
    BadHeader { path: PathBuf, detail: String },
    BadFlag { path: PathBuf, found: u8 },
    Truncated { path: PathBuf },
    TrailingData { path: PathBuf },
}

impl std::fmt::Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            Self::BadMagic { path, found } => write!(
                f,
                "{}: not a correspondence map (magic {:02x?})",
                path.display(),
                found
            ),
            Self::BadHeader { path, detail } => write!(f, "{}: {}", path.display(), detail),
            Self::BadFlag { path, found } => {
                write!(f, "{}: invalid cell flag {}", path.display(), found)
            }
            Self::Truncated { path } => write!(f, "{}: truncated map file", path.display()),
            Self::TrailingData { path } => {
                write!(f, "{}: trailing bytes after map body", path.display())
            }
        }
    }
}

impl std::error::Error for MapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn read_failure(path: &Path, source: io::Error) -> MapError {
    if source.kind() == io::ErrorKind::UnexpectedEof {
        MapError::Truncated {
            path: path.to_path_buf(),
        }
    } else {
        MapError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ── Map ──────────────────────────────────────────────────────────────────

/// Row-major grid of `(value, valid)` cells sized to the camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceMap {
    width: u32,
    height: u32,
    values: Vec<f32>,
    valid: Vec<bool>,
}

impl CorrespondenceMap {
    /// Grid of the given size with every cell invalid.
    pub fn new(width: u32, height: u32) -> Self {
        let cells = width as usize * height as usize;
        Self {
            width,
            height,
            values: vec![0.0; cells],
            valid: vec![false; cells],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width && y < self.height,
            "map access out of bounds: ({}, {}) in {}x{}",
            x,
            y,
            self.width,
            self.height
        );
        y as usize * self.width as usize + x as usize
    }

    /// Value at a cell, or `None` when the cell is invalid.
    ///
    /// Panics when `(x, y)` is outside the grid.
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        let i = self.index(x, y);
        self.valid[i].then(|| self.values[i])
    }

    /// True when the cell holds a decoded value.
    ///
    /// Panics when `(x, y)` is outside the grid.
    pub fn is_valid(&self, x: u32, y: u32) -> bool {
        self.valid[self.index(x, y)]
    }

    /// Store a value and mark the cell valid.
    ///
    /// Panics when `(x, y)` is outside the grid.
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let i = self.index(x, y);
        self.values[i] = value;
        self.valid[i] = true;
    }

    /// Mark the cell invalid and zero its value.
    ///
    /// Panics when `(x, y)` is outside the grid.
    pub fn invalidate(&mut self, x: u32, y: u32) {
        let i = self.index(x, y);
        self.values[i] = 0.0;
        self.valid[i] = false;
    }

    /// Number of valid cells.
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Minimum and maximum value over valid cells, or `None` when empty.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        let mut range: Option<(f32, f32)> = None;
        for (value, valid) in self.values.iter().zip(&self.valid) {
            if !valid {
                continue;
            }
            range = Some(match range {
                None => (*value, *value),
                Some((lo, hi)) => (lo.min(*value), hi.max(*value)),
            });
        }
        range
    }

    // ── Persistence ──────────────────────────────────────────────────────

    /// Write the map to a file.
    pub fn write(&self, path: &Path) -> Result<(), MapError> {
        let io_err = |source: io::Error| MapError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(&MAP_MAGIC).map_err(io_err)?;
        writer.write_u32::<LittleEndian>(self.width).map_err(io_err)?;
        writer
            .write_u32::<LittleEndian>(self.height)
            .map_err(io_err)?;

        for (value, valid) in self.values.iter().zip(&self.valid) {
            let stored = if *valid { *value } else { 0.0 };
            writer.write_f32::<LittleEndian>(stored).map_err(io_err)?;
            writer.write_u8(u8::from(*valid)).map_err(io_err)?;
        }
        writer.flush().map_err(io_err)
    }

    /// Read a map from a file, rejecting corrupt or truncated content.
    pub fn read(path: &Path) -> Result<Self, MapError> {
        let io_err = |source: io::Error| MapError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(io_err)?;
        let file_len = file.metadata().map_err(io_err)?.len();
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|e| read_failure(path, e))?;
        if magic != MAP_MAGIC {
            return Err(MapError::BadMagic {
                path: path.to_path_buf(),
                found: magic,
            });
        }

        let width = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| read_failure(path, e))?;
        let height = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| read_failure(path, e))?;
        let cells = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| MapError::BadHeader {
                path: path.to_path_buf(),
                detail: format!("cell count overflows for {}x{}", width, height),
            })?;

        // The header's cell count must be backed by the file length before
        // the grid is allocated. A wrong-resolution file must not half-parse
        // as a smaller map.
        let expected_len = 12 + cells as u128 * 5;
        if (file_len as u128) < expected_len {
            return Err(MapError::Truncated {
                path: path.to_path_buf(),
            });
        }
        if (file_len as u128) > expected_len {
            return Err(MapError::TrailingData {
                path: path.to_path_buf(),
            });
        }

        let mut map = Self::new(width, height);
        for i in 0..cells {
            let value = reader
                .read_f32::<LittleEndian>()
                .map_err(|e| read_failure(path, e))?;
            let flag = reader.read_u8().map_err(|e| read_failure(path, e))?;
            match flag {
                0 => {}
                1 => {
                    map.values[i] = value;
                    map.valid[i] = true;
                }
                found => {
                    return Err(MapError::BadFlag {
                        path: path.to_path_buf(),
                        found,
                    })
                }
            }
        }

        Ok(map)
    }
}
