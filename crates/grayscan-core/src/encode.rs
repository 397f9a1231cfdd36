//! Gray-code pattern generation.
//!
//! A scan addresses every projector column and row with binary reflected
//! Gray code, one bit per projected pattern pair. Each pair consists of the
//! "normal" pattern (pixels whose encoded axis index has that bit set are
//! lit) and its full complement, so the decoder can threshold per pixel
//! without knowing ambient level or surface albedo. Gray code rather than
//! raw binary keeps adjacent columns/rows one bit apart, so edge
//! misregistration costs at most one bit-plane.
//!
//! The sequence order produced here is the contract with
//! [`FrameDecoder`](crate::decode::FrameDecoder): frames must be fed back in
//! exactly this order.

use image::GrayImage;

use crate::options::{ConfigError, Options};

// ── Gray code ────────────────────────────────────────────────────────────

/// Number of bits needed to address `extent` distinct indices.
pub fn bits_for_extent(extent: u32) -> u32 {
    if extent <= 1 {
        0
    } else {
        32 - (extent - 1).leading_zeros()
    }
}

/// Binary reflected Gray code of an index.
pub fn index_to_gray(index: u32) -> u32 {
    index ^ (index >> 1)
}

/// Inverse of [`index_to_gray`].
pub fn gray_to_index(gray: u32) -> u32 {
    let mut index = gray;
    let mut shift = 1;
    while shift < 32 {
        index ^= index >> shift;
        shift <<= 1;
    }
    index
}

// ── Pattern sequence ─────────────────────────────────────────────────────

/// Axis a pattern encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternAxis {
    /// Encodes projector columns; stripes are vertical.
    Column,
    /// Encodes projector rows; stripes are horizontal.
    Row,
}

/// One step of the projection sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PatternStep {
    /// Axis being encoded.
    pub axis: PatternAxis,
    /// Bit position within the Gray code (0 = least significant).
    pub bit: u32,
    /// Whether this is the complement of the normal pattern.
    pub inverted: bool,
}

/// Enumerate the full projection sequence for a session.
///
/// For each axis (columns first), bits run from most to least significant,
/// and every bit emits the normal pattern followed by its complement. The
/// total length is `2 * (bits(width) + bits(height))`.
pub fn pattern_sequence(options: &Options) -> Vec<PatternStep> {
    let column_bits = bits_for_extent(options.projector_width);
    let row_bits = bits_for_extent(options.projector_height);
    let mut steps = Vec::with_capacity(2 * (column_bits + row_bits) as usize);

    for (axis, bits) in [(PatternAxis::Column, column_bits), (PatternAxis::Row, row_bits)] {
        for bit in (0..bits).rev() {
            for inverted in [false, true] {
                steps.push(PatternStep {
                    axis,
                    bit,
                    inverted,
                });
            }
        }
    }
    steps
}

// ── Error type ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum EncodeError {
    Exhausted { pattern_count: usize },
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted { pattern_count } => write!(
                f,
                "pattern sequence exhausted after {} patterns",
                pattern_count
            ),
        }
    }
}

impl std::error::Error for EncodeError {}

// ── Encoder ──────────────────────────────────────────────────────────────

/// Stateful generator of the projection sequence.
///
/// `current_image` renders the pattern for the current step; `advance` moves
/// to the next step until the sequence is exhausted. Both are errors once
/// `is_finished` reports true.
#[derive(Debug, Clone)]
pub struct PatternEncoder {
    options: Options,
    steps: Vec<PatternStep>,
    cursor: usize,
    unlit: u8,
    lit: u8,
}

impl PatternEncoder {
    /// Encoder projecting full-scale patterns (0/255).
    pub fn new(options: &Options) -> Self {
        Self {
            options: *options,
            steps: pattern_sequence(options),
            cursor: 0,
            unlit: 0,
            lit: 255,
        }
    }

    /// Encoder projecting at the configured gray levels.
    ///
    /// Keeping patterns inside the projector's linear response range (the
    /// config's `gray_low`/`gray_high`) improves margins on projectors with
    /// aggressive gamma near black and white.
    pub fn with_levels(options: &Options, unlit: u8, lit: u8) -> Result<Self, ConfigError> {
        if lit <= unlit {
            return Err(ConfigError::InvalidGrayRange {
                low: unlit,
                high: lit,
            });
        }
        let mut encoder = Self::new(options);
        encoder.unlit = unlit;
        encoder.lit = lit;
        Ok(encoder)
    }

    /// Total number of patterns in the sequence.
    pub fn pattern_count(&self) -> usize {
        self.steps.len()
    }

    /// True once every pattern has been produced.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    /// Sequence step the encoder currently points at.
    pub fn current_step(&self) -> Result<PatternStep, EncodeError> {
        self.steps
            .get(self.cursor)
            .copied()
            .ok_or(EncodeError::Exhausted {
                pattern_count: self.steps.len(),
            })
    }

    /// Render the pattern image for the current step.
    pub fn current_image(&self) -> Result<GrayImage, EncodeError> {
        let step = self.current_step()?;
        Ok(render_pattern(&self.options, step, self.unlit, self.lit))
    }

    /// Move to the next step of the sequence.
    pub fn advance(&mut self) -> Result<(), EncodeError> {
        if self.is_finished() {
            return Err(EncodeError::Exhausted {
                pattern_count: self.steps.len(),
            });
        }
        self.cursor += 1;
        Ok(())
    }
}

/// Render one pattern at the given output levels.
fn render_pattern(options: &Options, step: PatternStep, unlit: u8, lit: u8) -> GrayImage {
    let (width, height) = (options.projector_width, options.projector_height);

    // Stripes are constant along one axis, so precompute a line of levels
    // and replicate it.
    let extent = match step.axis {
        PatternAxis::Column => width,
        PatternAxis::Row => height,
    };
    let line: Vec<u8> = (0..extent)
        .map(|i| {
            let bit_set = (index_to_gray(i) >> step.bit) & 1 == 1;
            if bit_set != step.inverted {
                lit
            } else {
                unlit
            }
        })
        .collect();

    let mut image = GrayImage::new(width, height);
    match step.axis {
        PatternAxis::Column => {
            for (x, _, pixel) in image.enumerate_pixels_mut() {
                pixel.0[0] = line[x as usize];
            }
        }
        PatternAxis::Row => {
            for (_, y, pixel) in image.enumerate_pixels_mut() {
                pixel.0[0] = line[y as usize];
            }
        }
    }
    image
}
