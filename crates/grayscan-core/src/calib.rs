//! Camera-projector calibration records.
//!
//! A calibration file carries the camera and projector intrinsics with their
//! distortion vectors plus the rigid transform mapping projector-frame
//! points into the camera frame. Records are validated on load; a
//! [`Calibration`] value is therefore always usable for triangulation.

use std::error::Error;
use std::path::Path;

use nalgebra::{Matrix3, Vector3};
use serde::Deserialize;

use crate::camera::{CameraIntrinsics, CameraModel, RadialTangentialDistortion};

/// Schema tag expected in calibration files.
pub const CALIBRATION_SCHEMA_V1: &str = "grayscan.calibration.v1";

const ROTATION_TOL: f64 = 1e-6;

/// Validated stereo calibration of one camera-projector pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    camera: CameraModel,
    projector: CameraModel,
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
}

impl Calibration {
    /// Assemble a calibration from already-parsed parts.
    ///
    /// `rotation` and `translation` map projector-frame points into the
    /// camera frame.
    pub fn new(
        camera: CameraModel,
        projector: CameraModel,
        rotation: Matrix3<f64>,
        translation: Vector3<f64>,
    ) -> Result<Self, String> {
        if !camera.intrinsics.is_valid() {
            return Err("camera intrinsics are not invertible".to_string());
        }
        if !projector.intrinsics.is_valid() {
            return Err("projector intrinsics are not invertible".to_string());
        }
        if !translation.iter().all(|v| v.is_finite()) {
            return Err("translation has non-finite entries".to_string());
        }
        check_rotation(&rotation)?;
        Ok(Self {
            camera,
            projector,
            rotation,
            translation,
        })
    }

    /// Load and validate a calibration record from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn Error>> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read calibration file {}: {}", path.display(), e))?;
        Self::from_json_str(&text)
            .map_err(|e| format!("invalid calibration file {}: {}", path.display(), e).into())
    }

    /// Parse and validate a calibration record from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, Box<dyn Error>> {
        let spec: CalibrationSpecV1 = serde_json::from_str(text)?;
        spec.validate()?;
        let calib = spec.build()?;
        Ok(calib)
    }

    /// Camera-side model.
    pub fn camera(&self) -> CameraModel {
        self.camera
    }

    /// Projector-side model.
    pub fn projector(&self) -> CameraModel {
        self.projector
    }

    /// Rotation of the projector frame into the camera frame.
    pub fn rotation(&self) -> Matrix3<f64> {
        self.rotation
    }

    /// Projector origin expressed in the camera frame.
    pub fn translation(&self) -> Vector3<f64> {
        self.translation
    }
}

// ── On-disk record ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct CalibrationSpecV1 {
    schema: String,
    camera_intrinsic: [[f64; 3]; 3],
    camera_distortion: Vec<f64>,
    projector_intrinsic: [[f64; 3]; 3],
    projector_distortion: Vec<f64>,
    projector_extrinsic: [[f64; 4]; 4],
}

impl CalibrationSpecV1 {
    fn validate(&self) -> Result<(), String> {
        if self.schema != CALIBRATION_SCHEMA_V1 {
            return Err(format!(
                "unsupported schema '{}', expected '{}'",
                self.schema, CALIBRATION_SCHEMA_V1
            ));
        }
        check_intrinsic("camera", &self.camera_intrinsic)?;
        check_intrinsic("projector", &self.projector_intrinsic)?;
        RadialTangentialDistortion::from_coeffs(&self.camera_distortion)
            .map_err(|e| format!("camera distortion: {e}"))?;
        RadialTangentialDistortion::from_coeffs(&self.projector_distortion)
            .map_err(|e| format!("projector distortion: {e}"))?;
        check_extrinsic(&self.projector_extrinsic)
    }

    fn build(&self) -> Result<Calibration, String> {
        let camera = CameraModel {
            intrinsics: intrinsics_from_matrix(&self.camera_intrinsic),
            distortion: RadialTangentialDistortion::from_coeffs(&self.camera_distortion)
                .map_err(|e| format!("camera distortion: {e}"))?,
        };
        let projector = CameraModel {
            intrinsics: intrinsics_from_matrix(&self.projector_intrinsic),
            distortion: RadialTangentialDistortion::from_coeffs(&self.projector_distortion)
                .map_err(|e| format!("projector distortion: {e}"))?,
        };
        let e = &self.projector_extrinsic;
        Calibration::new(
            camera,
            projector,
            rotation_from_extrinsic(e),
            Vector3::new(e[0][3], e[1][3], e[2][3]),
        )
    }
}

fn intrinsics_from_matrix(matrix: &[[f64; 3]; 3]) -> CameraIntrinsics {
    CameraIntrinsics {
        fx: matrix[0][0],
        fy: matrix[1][1],
        cx: matrix[0][2],
        cy: matrix[1][2],
    }
}

fn rotation_from_extrinsic(extrinsic: &[[f64; 4]; 4]) -> Matrix3<f64> {
    Matrix3::new(
        extrinsic[0][0],
        extrinsic[0][1],
        extrinsic[0][2],
        extrinsic[1][0],
        extrinsic[1][1],
        extrinsic[1][2],
        extrinsic[2][0],
        extrinsic[2][1],
        extrinsic[2][2],
    )
}

fn check_intrinsic(label: &str, matrix: &[[f64; 3]; 3]) -> Result<(), String> {
    if matrix.iter().flatten().any(|v| !v.is_finite()) {
        return Err(format!("{label} intrinsic matrix has non-finite entries"));
    }
    if matrix[2] != [0.0, 0.0, 1.0] {
        return Err(format!(
            "{label} intrinsic matrix bottom row must be [0, 0, 1]"
        ));
    }
    if matrix[0][1] != 0.0 || matrix[1][0] != 0.0 {
        return Err(format!("{label} intrinsic matrix must have zero skew"));
    }
    if !intrinsics_from_matrix(matrix).is_valid() {
        return Err(format!("{label} focal lengths must be non-zero"));
    }
    Ok(())
}

fn check_rotation(rotation: &Matrix3<f64>) -> Result<(), String> {
    if rotation.iter().any(|v| !v.is_finite()) {
        return Err("rotation has non-finite entries".to_string());
    }
    let gram = rotation * rotation.transpose();
    if (gram - Matrix3::identity()).abs().max() > ROTATION_TOL {
        return Err("extrinsic rotation is not orthonormal".to_string());
    }
    if (rotation.determinant() - 1.0).abs() > ROTATION_TOL {
        return Err("extrinsic rotation must be a proper rotation".to_string());
    }
    Ok(())
}

fn check_extrinsic(extrinsic: &[[f64; 4]; 4]) -> Result<(), String> {
    if extrinsic.iter().flatten().any(|v| !v.is_finite()) {
        return Err("projector extrinsic has non-finite entries".to_string());
    }
    if extrinsic[3] != [0.0, 0.0, 0.0, 1.0] {
        return Err("projector extrinsic bottom row must be [0, 0, 0, 1]".to_string());
    }
    check_rotation(&rotation_from_extrinsic(extrinsic))
        .map_err(|e| format!("projector extrinsic: {e}"))
}
