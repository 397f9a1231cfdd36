//! Per-pixel decoding of captured Gray-code frames.
//!
//! The decoder consumes camera frames in the exact order the encoder emits
//! patterns. Each pattern may be captured `nsamples` times; repeated captures
//! are averaged before classification. A pattern and its inverse form a pair:
//! a pixel's bit is set when the normal capture is brighter than the inverse,
//! and the absolute brightness gap feeds the pixel's reliability score.

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::encode::{gray_to_index, pattern_sequence, PatternAxis, PatternStep};
use crate::map::CorrespondenceMap;
use crate::options::Options;

/// Default minimum per-bit contrast for a pixel to stay valid.
pub const DEFAULT_MIN_MARGIN: f32 = 8.0;

// ── Parameters ──────────────────────────────────────────────────────────────

/// Bit classification thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DecodeParams {
    /// Minimum `|normal - inverse|` brightness gap, in gray levels. A pixel
    /// whose weakest bit falls below this is excluded from the maps.
    pub min_margin: f32,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            min_margin: DEFAULT_MIN_MARGIN,
        }
    }
}

impl DecodeParams {
    /// Derive a margin from the projected gray levels.
    ///
    /// Scales with the projected contrast so dim setups are not rejected
    /// wholesale, with a floor of one gray level.
    pub fn from_levels(gray_low: u8, gray_high: u8) -> Self {
        let span = gray_high.saturating_sub(gray_low) as f32;
        Self {
            min_margin: (span / 32.0).max(1.0),
        }
    }
}

// ── Error type ──────────────────────────────────────────────────────────────

/// Errors reported while feeding frames or reading results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// More frames were supplied than the pattern sequence expects.
    SequenceOverrun { expected: usize },
    /// A frame's dimensions differ from the first frame's.
    DimensionMismatch {
        expected: (u32, u32),
        got: (u32, u32),
    },
    /// A frame with zero width or height was supplied.
    EmptyFrame,
    /// Results were requested before the full sequence was consumed.
    NotFinished { consumed: usize, expected: usize },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::SequenceOverrun { expected } => {
                write!(f, "frame sequence overrun: all {expected} frames already consumed")
            }
            DecodeError::DimensionMismatch { expected, got } => write!(
                f,
                "frame dimensions {}x{} do not match first frame {}x{}",
                got.0, got.1, expected.0, expected.1
            ),
            DecodeError::EmptyFrame => write!(f, "frame has zero width or height"),
            DecodeError::NotFinished { consumed, expected } => write!(
                f,
                "decode incomplete: {consumed} of {expected} frames consumed"
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

// ── Decoder ─────────────────────────────────────────────────────────────────

/// Everything the decode stage produces for one scan.
#[derive(Debug, Clone)]
pub struct DecodeOutputs {
    /// Per-pixel projector column map.
    pub horizontal: CorrespondenceMap,
    /// Per-pixel projector row map.
    pub vertical: CorrespondenceMap,
    /// 255 where both maps are valid, 0 elsewhere.
    pub mask: GrayImage,
    /// Weakest per-bit brightness gap per pixel, clamped to `0..=255`.
    pub reliability: GrayImage,
}

/// Incremental Gray-code decoder.
///
/// Frame dimensions are locked by the first frame; every later frame must
/// match. Decoding completes synchronously inside the final [`add_frame`]
/// call, after which the result accessors stop returning
/// [`DecodeError::NotFinished`]. A configuration whose pattern sequence is
/// empty expects no frames and is finished from the start.
///
/// [`add_frame`]: FrameDecoder::add_frame
#[derive(Debug)]
pub struct FrameDecoder {
    options: Options,
    params: DecodeParams,
    steps: Vec<PatternStep>,
    samples_per_pattern: usize,
    frames_seen: usize,
    dims: Option<(u32, u32)>,
    sample_sum: Vec<f32>,
    normal_plane: Vec<f32>,
    gray_cols: Vec<u32>,
    gray_rows: Vec<u32>,
    margin_min: Vec<f32>,
    outputs: Option<DecodeOutputs>,
}

impl FrameDecoder {
    /// Create a decoder with default thresholds.
    pub fn new(options: &Options) -> Self {
        Self::with_params(options, DecodeParams::default())
    }

    /// Create a decoder with explicit thresholds.
    pub fn with_params(options: &Options, params: DecodeParams) -> Self {
        let steps = pattern_sequence(options);
        // A single-cell projector emits no patterns, so the scan needs no
        // frames and the decode is complete from the start, with empty maps.
        let outputs = steps.is_empty().then(|| DecodeOutputs {
            horizontal: CorrespondenceMap::new(0, 0),
            vertical: CorrespondenceMap::new(0, 0),
            mask: GrayImage::new(0, 0),
            reliability: GrayImage::new(0, 0),
        });
        Self {
            options: *options,
            params,
            steps,
            samples_per_pattern: options.nsamples as usize,
            frames_seen: 0,
            dims: None,
            sample_sum: Vec::new(),
            normal_plane: Vec::new(),
            gray_cols: Vec::new(),
            gray_rows: Vec::new(),
            margin_min: Vec::new(),
            outputs,
        }
    }

    /// Total number of frames the scan sequence requires.
    pub fn expected_frames(&self) -> usize {
        self.steps.len() * self.samples_per_pattern
    }

    /// Number of frames consumed so far.
    pub fn frames_consumed(&self) -> usize {
        self.frames_seen
    }

    /// Returns `true` once the full sequence has been decoded.
    pub fn is_finished(&self) -> bool {
        self.outputs.is_some()
    }

    /// Feed the next camera frame of the capture sequence.
    pub fn add_frame(&mut self, frame: &GrayImage) -> Result<(), DecodeError> {
        let expected_frames = self.expected_frames();
        if self.frames_seen >= expected_frames {
            return Err(DecodeError::SequenceOverrun {
                expected: expected_frames,
            });
        }

        let got = frame.dimensions();
        match self.dims {
            None => {
                if got.0 == 0 || got.1 == 0 {
                    return Err(DecodeError::EmptyFrame);
                }
                let len = (got.0 as usize) * (got.1 as usize);
                self.dims = Some(got);
                self.sample_sum = vec![0.0; len];
                self.normal_plane = vec![0.0; len];
                self.gray_cols = vec![0; len];
                self.gray_rows = vec![0; len];
                self.margin_min = vec![f32::INFINITY; len];
            }
            Some(expected) if expected != got => {
                return Err(DecodeError::DimensionMismatch { expected, got });
            }
            Some(_) => {}
        }

        for (acc, &sample) in self.sample_sum.iter_mut().zip(frame.as_raw().iter()) {
            *acc += sample as f32;
        }
        self.frames_seen += 1;

        if self.frames_seen % self.samples_per_pattern == 0 {
            self.absorb_pattern();
        }
        if self.frames_seen == expected_frames {
            self.finalize();
        }
        Ok(())
    }

    /// Fold the averaged capture of the just-completed pattern into the
    /// per-pixel code and margin state.
    fn absorb_pattern(&mut self) {
        let scale = 1.0 / self.samples_per_pattern as f32;
        for v in &mut self.sample_sum {
            *v *= scale;
        }

        let step = self.steps[self.frames_seen / self.samples_per_pattern - 1];
        if !step.inverted {
            std::mem::swap(&mut self.normal_plane, &mut self.sample_sum);
        } else {
            let bit = 1u32 << step.bit;
            let target = match step.axis {
                PatternAxis::Column => &mut self.gray_cols,
                PatternAxis::Row => &mut self.gray_rows,
            };
            for (i, inverse) in self.sample_sum.iter().enumerate() {
                let diff = self.normal_plane[i] - inverse;
                if diff > 0.0 {
                    target[i] |= bit;
                }
                let margin = diff.abs();
                if margin < self.margin_min[i] {
                    self.margin_min[i] = margin;
                }
            }
        }
        self.sample_sum.fill(0.0);
    }

    fn finalize(&mut self) {
        let (width, height) = match self.dims {
            Some(dims) => dims,
            None => return,
        };
        let mut horizontal = CorrespondenceMap::new(width, height);
        let mut vertical = CorrespondenceMap::new(width, height);
        let mut mask = GrayImage::new(width, height);
        let mut reliability = GrayImage::new(width, height);

        let mut valid = 0usize;
        for y in 0..height {
            for x in 0..width {
                let i = (y as usize) * (width as usize) + x as usize;
                let col = gray_to_index(self.gray_cols[i]);
                let row = gray_to_index(self.gray_rows[i]);
                let margin = self.margin_min[i];
                let in_range =
                    col < self.options.projector_width && row < self.options.projector_height;
                if margin.is_finite() && margin >= self.params.min_margin && in_range {
                    horizontal.set(x, y, col as f32);
                    vertical.set(x, y, row as f32);
                    mask.put_pixel(x, y, Luma([255]));
                    valid += 1;
                }
                let score = if margin.is_finite() {
                    margin.round().clamp(0.0, 255.0) as u8
                } else {
                    0
                };
                reliability.put_pixel(x, y, Luma([score]));
            }
        }

        tracing::debug!(
            valid,
            total = (width as usize) * (height as usize),
            min_margin = self.params.min_margin,
            "decoded correspondence maps"
        );
        self.outputs = Some(DecodeOutputs {
            horizontal,
            vertical,
            mask,
            reliability,
        });
    }

    fn finished(&self) -> Result<&DecodeOutputs, DecodeError> {
        self.outputs.as_ref().ok_or(DecodeError::NotFinished {
            consumed: self.frames_seen,
            expected: self.expected_frames(),
        })
    }

    /// Projector column map, available once decoding finished.
    pub fn horizontal_map(&self) -> Result<&CorrespondenceMap, DecodeError> {
        Ok(&self.finished()?.horizontal)
    }

    /// Projector row map, available once decoding finished.
    pub fn vertical_map(&self) -> Result<&CorrespondenceMap, DecodeError> {
        Ok(&self.finished()?.vertical)
    }

    /// Validity mask image, available once decoding finished.
    pub fn mask(&self) -> Result<&GrayImage, DecodeError> {
        Ok(&self.finished()?.mask)
    }

    /// Reliability image, available once decoding finished.
    pub fn reliability(&self) -> Result<&GrayImage, DecodeError> {
        Ok(&self.finished()?.reliability)
    }

    /// Consume the decoder and hand out the results.
    pub fn into_outputs(self) -> Result<DecodeOutputs, DecodeError> {
        let expected = self.expected_frames();
        self.outputs.ok_or(DecodeError::NotFinished {
            consumed: self.frames_seen,
            expected,
        })
    }
}
