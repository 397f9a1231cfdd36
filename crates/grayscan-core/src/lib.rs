//! grayscan-core — Gray-code structured-light surface reconstruction.
//!
//! Turns a calibrated projector + camera pair into a depth sensor. The
//! pipeline stages are:
//!
//! 1. **Encode** – binary Gray-code pattern sequence for the projector.
//! 2. **Decode** – per-pixel projector coordinates from captured frames.
//! 3. **Map** – correspondence grids with per-cell validity, persisted as
//!    compact binary files.
//! 4. **Triangulate** – ray-plane intersection into a colored point mesh.
//!
//! Scan geometry comes from [`options`] (projector description and capture
//! settings) and [`calib`] (stereo calibration of the pair).

pub mod options;
pub mod camera;
pub mod calib;
pub mod encode;
pub mod decode;
pub mod map;
pub mod triangulate;
pub mod mesh;

#[cfg(test)]
mod pipeline_tests;

/// One rendered pattern in a capture manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PatternRecord {
    /// Position in the projection sequence.
    pub index: usize,
    /// Image file name the pattern was rendered to.
    pub file: String,
    /// Axis the pattern encodes.
    pub axis: encode::PatternAxis,
    /// Gray-code bit position (0 = least significant).
    pub bit: u32,
    /// Whether this is the inverted half of the pattern pair.
    pub inverted: bool,
}

/// Summary of one decode run for serialization.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecodeReport {
    /// Camera frame dimensions [width, height].
    pub image_size: [u32; 2],
    /// Frames consumed.
    pub frames: usize,
    /// Pixels valid in both maps.
    pub valid_pixels: usize,
    /// Fraction of camera pixels with a valid correspondence, in [0, 1].
    pub coverage: f32,
}

/// Coverage and value statistics of one correspondence map.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MapStats {
    /// Map dimensions [width, height].
    pub image_size: [u32; 2],
    /// Number of valid cells.
    pub valid_pixels: usize,
    /// Fraction of valid cells in [0, 1].
    pub coverage: f32,
    /// Smallest valid value, absent for an all-invalid map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f32>,
    /// Largest valid value, absent for an all-invalid map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f32>,
}

impl MapStats {
    /// Collect statistics of one map.
    pub fn of(map: &map::CorrespondenceMap) -> Self {
        let (width, height) = map.dimensions();
        let total = (width as usize) * (height as usize);
        let valid = map.valid_count();
        let range = map.value_range();
        Self {
            image_size: [width, height],
            valid_pixels: valid,
            coverage: if total == 0 {
                0.0
            } else {
                valid as f32 / total as f32
            },
            min_value: range.map(|r| r.0),
            max_value: range.map(|r| r.1),
        }
    }
}
