//! Ray-plane triangulation of decoded correspondences.
//!
//! Every valid camera pixel fixes one projector column and one projector
//! row. Each of those is a plane of light through the projector origin, so
//! the surface point lies where the camera ray meets them. Both planes are
//! intersected independently and the resulting depths averaged; a plane
//! that runs (near) parallel to the ray, as the row planes of a purely
//! horizontal baseline do, contributes nothing.

use image::{GrayImage, RgbImage};
use nalgebra::Vector3;

use crate::calib::Calibration;
use crate::map::CorrespondenceMap;
use crate::mesh::{Mesh, Vertex};
use crate::options::Options;

/// Reject ray-plane intersections shallower than this normalized incidence.
const MIN_INCIDENCE: f64 = 1e-6;

// ── Error type ──────────────────────────────────────────────────────────────

/// Errors reported by [`triangulate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriangulateError {
    /// An input raster does not share the camera geometry of the maps.
    DimensionMismatch {
        what: &'static str,
        expected: (u32, u32),
        got: (u32, u32),
    },
}

impl std::fmt::Display for TriangulateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriangulateError::DimensionMismatch {
                what,
                expected,
                got,
            } => write!(
                f,
                "{what} dimensions {}x{} do not match horizontal map {}x{}",
                got.0, got.1, expected.0, expected.1
            ),
        }
    }
}

impl std::error::Error for TriangulateError {}

// ── Triangulation ───────────────────────────────────────────────────────────

/// Convert correspondence maps into a colored point mesh.
///
/// A pixel contributes one vertex when the mask admits it, both maps hold a
/// valid value, and at least one light plane intersects its viewing ray in
/// front of the camera. Vertex positions are in the camera frame; color is
/// sampled from the reference image at the same pixel. The output order is
/// row-major over contributing pixels but carries no meaning.
pub fn triangulate(
    options: &Options,
    horizontal: &CorrespondenceMap,
    vertical: &CorrespondenceMap,
    mask: &GrayImage,
    calibration: &Calibration,
    color: &RgbImage,
) -> Result<Mesh, TriangulateError> {
    let dims = horizontal.dimensions();
    ensure_dims("vertical map", dims, vertical.dimensions())?;
    ensure_dims("mask", dims, mask.dimensions())?;
    ensure_dims("color image", dims, color.dimensions())?;

    let camera = calibration.camera();
    let mut projector = calibration.projector();
    // Lens shift moves the effective principal row off the calibrated one.
    projector.intrinsics.cy +=
        (options.projector_horizontal_center - 0.5) * options.projector_height as f64;
    let rotation = calibration.rotation();
    let translation = calibration.translation();

    let mut mesh = Mesh::new();
    let mut skipped = 0usize;
    for y in 0..dims.1 {
        for x in 0..dims.0 {
            if mask.get_pixel(x, y).0[0] == 0 {
                continue;
            }
            let (col, row) = match (horizontal.get(x, y), vertical.get(x, y)) {
                (Some(c), Some(r)) => (c as f64, r as f64),
                _ => continue,
            };

            let ray = match camera.undistort_to_normalized([x as f64 + 0.5, y as f64 + 0.5]) {
                Some(n) => Vector3::new(n[0], n[1], 1.0),
                None => {
                    skipped += 1;
                    continue;
                }
            };
            let proj_norm = match projector.undistort_to_normalized([col + 0.5, row + 0.5]) {
                Some(n) => n,
                None => {
                    skipped += 1;
                    continue;
                }
            };

            // Planes x = pxn * z and y = pyn * z in the projector frame,
            // rotated into the camera frame.
            let column_normal = rotation * Vector3::new(1.0, 0.0, -proj_norm[0]);
            let row_normal = rotation * Vector3::new(0.0, 1.0, -proj_norm[1]);

            let mut depth_sum = 0.0;
            let mut depth_count = 0u32;
            for normal in [column_normal, row_normal] {
                if let Some(depth) = plane_depth(&normal, &translation, &ray) {
                    depth_sum += depth;
                    depth_count += 1;
                }
            }
            if depth_count == 0 {
                skipped += 1;
                continue;
            }

            let position = ray * (depth_sum / depth_count as f64);
            mesh.push(Vertex {
                position: [position.x, position.y, position.z],
                color: color.get_pixel(x, y).0,
            });
        }
    }

    tracing::debug!(
        vertices = mesh.len(),
        skipped,
        "triangulated correspondence maps"
    );
    Ok(mesh)
}

/// Depth along `dir` where the camera-origin ray meets the plane with the
/// given normal through the projector origin. Rejects grazing incidence and
/// intersections behind the camera.
fn plane_depth(
    normal: &Vector3<f64>,
    translation: &Vector3<f64>,
    dir: &Vector3<f64>,
) -> Option<f64> {
    let denom = normal.dot(dir);
    let incidence = denom / (normal.norm() * dir.norm());
    if !incidence.is_finite() || incidence.abs() < MIN_INCIDENCE {
        return None;
    }
    let depth = normal.dot(translation) / denom;
    if depth.is_finite() && depth > 0.0 {
        Some(depth)
    } else {
        None
    }
}

fn ensure_dims(
    what: &'static str,
    expected: (u32, u32),
    got: (u32, u32),
) -> Result<(), TriangulateError> {
    if expected == got {
        Ok(())
    } else {
        Err(TriangulateError::DimensionMismatch {
            what,
            expected,
            got,
        })
    }
}
