//! Scan session configuration.
//!
//! A session is described by a JSON record (`grayscan.config.v1`) covering
//! both the decoding core and the capture collaborator (camera resolution,
//! device id, settle time). The validated core subset is [`Options`], a small
//! value type threaded explicitly through the encoder, decoder, and
//! triangulator; nothing in the pipeline reads configuration from global
//! state.

use std::path::Path;

const CONFIG_SCHEMA_V1: &str = "grayscan.config.v1";

const DEFAULT_GRAY_LOW: u8 = 0;
const DEFAULT_GRAY_HIGH: u8 = 255;
const DEFAULT_HORIZONTAL_CENTER: f64 = 0.5;
const DEFAULT_NSAMPLES: u32 = 1;
const DEFAULT_BUFFER_TIME_MS: u32 = 120;

// ── Error type ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    ZeroResolution { what: &'static str },
    InvalidSampleCount { got: u32 },
    InvalidGrayRange { low: u8, high: u8 },
    InvalidHorizontalCenter { got: f64 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroResolution { what } => {
                write!(f, "{} resolution must be non-zero", what)
            }
            Self::InvalidSampleCount { got } => {
                write!(f, "nsamples must be >= 1, got {}", got)
            }
            Self::InvalidGrayRange { low, high } => {
                write!(f, "gray_high ({}) must exceed gray_low ({})", high, low)
            }
            Self::InvalidHorizontalCenter { got } => {
                write!(f, "projector_horizontal_center must be finite, got {}", got)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ── Options ──────────────────────────────────────────────────────────────

/// Validated core parameters of one scan session.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Options {
    /// Projector image width in pixels.
    pub projector_width: u32,
    /// Projector image height in pixels.
    pub projector_height: u32,
    /// Fraction of the projector image height at which the lens optical axis
    /// crosses the pattern; 0.5 for a centered lens, larger for the upward
    /// lens shift typical of table-mounted projectors.
    pub projector_horizontal_center: f64,
    /// Captured frames per pattern; the decoder averages each group before
    /// taking bit decisions.
    pub nsamples: u32,
}

impl Options {
    /// Validate and build session options.
    pub fn new(
        projector_width: u32,
        projector_height: u32,
        projector_horizontal_center: f64,
        nsamples: u32,
    ) -> Result<Self, ConfigError> {
        if projector_width == 0 {
            return Err(ConfigError::ZeroResolution {
                what: "projector width",
            });
        }
        if projector_height == 0 {
            return Err(ConfigError::ZeroResolution {
                what: "projector height",
            });
        }
        if !projector_horizontal_center.is_finite() {
            return Err(ConfigError::InvalidHorizontalCenter {
                got: projector_horizontal_center,
            });
        }
        if nsamples == 0 {
            return Err(ConfigError::InvalidSampleCount { got: nsamples });
        }
        Ok(Self {
            projector_width,
            projector_height,
            projector_horizontal_center,
            nsamples,
        })
    }
}

// ── Scan configuration record ────────────────────────────────────────────

/// On-disk scan configuration (`grayscan.config.v1`).
///
/// Covers the full session: the core fields that become [`Options`], the
/// projected gray levels, and the capture-side fields (`camera_*`,
/// `device_id`, `buffer_time_ms`) consumed by the acquisition collaborator.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    pub schema: String,
    /// Projector image width in pixels.
    pub projector_width: u32,
    /// Projector image height in pixels.
    pub projector_height: u32,
    /// Camera frame width in pixels.
    pub camera_width: u32,
    /// Camera frame height in pixels.
    pub camera_height: u32,
    /// Intensity of unlit pattern pixels (projector black level).
    pub gray_low: u8,
    /// Intensity of lit pattern pixels (projector white level).
    pub gray_high: u8,
    /// Capture device index for the acquisition collaborator.
    pub device_id: u32,
    /// Settle time between pattern display and capture, in milliseconds.
    pub buffer_time_ms: u32,
    /// Vertical lens-shift fraction; see [`Options::projector_horizontal_center`].
    pub projector_horizontal_center: f64,
    /// Captured frames per pattern.
    pub nsamples: u32,
}

impl ScanConfig {
    /// Load a scan configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file {}: {}", path.display(), e))?;
        let config: ScanConfig = serde_json::from_str(&data)
            .map_err(|e| format!("failed to parse config file {}: {}", path.display(), e))?;
        config
            .validate()
            .map_err(|e| format!("invalid config file {}: {}", path.display(), e))?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.schema != CONFIG_SCHEMA_V1 {
            return Err(format!(
                "unsupported config schema '{}' (expected '{}')",
                self.schema, CONFIG_SCHEMA_V1
            ));
        }
        if self.camera_width == 0 || self.camera_height == 0 {
            return Err("camera resolution must be non-zero".to_string());
        }
        if self.gray_high <= self.gray_low {
            return Err(ConfigError::InvalidGrayRange {
                low: self.gray_low,
                high: self.gray_high,
            }
            .to_string());
        }
        self.options().map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Core session options derived from this record.
    pub fn options(&self) -> Result<Options, ConfigError> {
        Options::new(
            self.projector_width,
            self.projector_height,
            self.projector_horizontal_center,
            self.nsamples,
        )
    }

    /// Camera frame dimensions as `(width, height)`.
    pub fn camera_dimensions(&self) -> (u32, u32) {
        (self.camera_width, self.camera_height)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            schema: CONFIG_SCHEMA_V1.to_string(),
            projector_width: 1024,
            projector_height: 768,
            camera_width: 1280,
            camera_height: 720,
            gray_low: DEFAULT_GRAY_LOW,
            gray_high: DEFAULT_GRAY_HIGH,
            device_id: 0,
            buffer_time_ms: DEFAULT_BUFFER_TIME_MS,
            projector_horizontal_center: DEFAULT_HORIZONTAL_CENTER,
            nsamples: DEFAULT_NSAMPLES,
        }
    }
}
