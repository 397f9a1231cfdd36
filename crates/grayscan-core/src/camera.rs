//! Pinhole models for the scanning camera and the projector.
//!
//! The projector is treated as an inverse camera: the same intrinsics and
//! Brown-Conrady distortion describe which scene ray each projector pixel
//! illuminates. Triangulation needs rays rather than rectified pixels, so
//! undistortion can stop at normalized coordinates.

use serde::{Deserialize, Serialize};

const MIN_FOCAL: f64 = 1e-12;
const MIN_RADIAL_SCALE: f64 = 1e-12;

/// Pinhole intrinsics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Returns `true` when all entries are finite and the focal lengths are
    /// usable as divisors.
    pub fn is_valid(self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .into_iter()
            .all(f64::is_finite)
            && self.fx.abs() > MIN_FOCAL
            && self.fy.abs() > MIN_FOCAL
    }

    /// Pixel coordinates to normalized pinhole coordinates.
    pub fn pixel_to_normalized(self, pixel_xy: [f64; 2]) -> Option<[f64; 2]> {
        if !self.is_valid() {
            return None;
        }
        let n = [
            (pixel_xy[0] - self.cx) / self.fx,
            (pixel_xy[1] - self.cy) / self.fy,
        ];
        (n[0].is_finite() && n[1].is_finite()).then_some(n)
    }

    /// Normalized pinhole coordinates to pixel coordinates.
    pub fn normalized_to_pixel(self, normalized_xy: [f64; 2]) -> [f64; 2] {
        [
            self.cx + self.fx * normalized_xy[0],
            self.cy + self.fy * normalized_xy[1],
        ]
    }
}

/// Brown-Conrady radial-tangential distortion coefficients.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RadialTangentialDistortion {
    /// Radial coefficient k1.
    pub k1: f64,
    /// Radial coefficient k2.
    pub k2: f64,
    /// Tangential coefficient p1.
    pub p1: f64,
    /// Tangential coefficient p2.
    pub p2: f64,
    /// Radial coefficient k3.
    pub k3: f64,
}

impl RadialTangentialDistortion {
    /// Build from an OpenCV-layout coefficient vector `[k1, k2, p1, p2, k3, ..]`.
    ///
    /// Accepts 0, 4, 5, or 8 entries. The rational terms k4..k6 of the
    /// 8-entry layout are not modeled and must be zero.
    pub fn from_coeffs(coeffs: &[f64]) -> Result<Self, String> {
        if !matches!(coeffs.len(), 0 | 4 | 5 | 8) {
            return Err(format!(
                "unsupported distortion vector length {}",
                coeffs.len()
            ));
        }
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err("distortion coefficients must be finite".to_string());
        }
        if coeffs.len() == 8 && coeffs[5..].iter().any(|&c| c != 0.0) {
            return Err("rational distortion terms k4..k6 are not supported".to_string());
        }
        let coeff = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        Ok(Self {
            k1: coeff(0),
            k2: coeff(1),
            p1: coeff(2),
            p2: coeff(3),
            k3: coeff(4),
        })
    }

    /// Radial magnification `1 + k1 r^2 + k2 r^4 + k3 r^6` in Horner form.
    fn radial_factor(self, r2: f64) -> f64 {
        1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3))
    }

    fn tangential_shift(self, x: f64, y: f64, r2: f64) -> [f64; 2] {
        [
            2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        ]
    }

    /// Apply distortion to normalized coordinates.
    pub fn distort_normalized(self, normalized_xy: [f64; 2]) -> [f64; 2] {
        let [x, y] = normalized_xy;
        let r2 = x * x + y * y;
        let scale = self.radial_factor(r2);
        let [tx, ty] = self.tangential_shift(x, y, r2);
        [x * scale + tx, y * scale + ty]
    }
}

/// Distortion inversion settings used by iterative undistortion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UndistortConfig {
    /// Maximum fixed-point iterations.
    pub max_iters: usize,
    /// Stop once the coordinate update falls below this threshold.
    pub eps: f64,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        Self {
            max_iters: 12,
            eps: 1e-12,
        }
    }
}

/// Complete model (intrinsics + radial-tangential distortion).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraModel {
    /// Intrinsics.
    pub intrinsics: CameraIntrinsics,
    /// Distortion coefficients.
    pub distortion: RadialTangentialDistortion,
}

impl CameraModel {
    /// Distort an undistorted pixel point into image pixel coordinates.
    pub fn distort_pixel(self, undistorted_pixel_xy: [f64; 2]) -> Option<[f64; 2]> {
        let normalized = self.intrinsics.pixel_to_normalized(undistorted_pixel_xy)?;
        let bent = self.distortion.distort_normalized(normalized);
        let pixel = self.intrinsics.normalized_to_pixel(bent);
        (pixel[0].is_finite() && pixel[1].is_finite()).then_some(pixel)
    }

    /// Undistort a pixel point into normalized coordinates with default
    /// iterative settings.
    ///
    /// `[x, y]` here is the direction `(x, y, 1)` of the scene ray through
    /// that pixel, expressed in the model's own coordinate frame.
    pub fn undistort_to_normalized(self, distorted_pixel_xy: [f64; 2]) -> Option<[f64; 2]> {
        self.undistort_to_normalized_with(distorted_pixel_xy, UndistortConfig::default())
    }

    /// Undistort a pixel point into normalized coordinates with custom
    /// iterative settings.
    pub fn undistort_to_normalized_with(
        self,
        distorted_pixel_xy: [f64; 2],
        cfg: UndistortConfig,
    ) -> Option<[f64; 2]> {
        let observed = self.intrinsics.pixel_to_normalized(distorted_pixel_xy)?;
        let [mut x, mut y] = observed;

        // Fixed point of x * radial(x) + tangential(x) = observed.
        for _ in 0..cfg.max_iters.max(1) {
            let r2 = x * x + y * y;
            let scale = self.distortion.radial_factor(r2);
            if !scale.is_finite() || scale.abs() < MIN_RADIAL_SCALE {
                return None;
            }
            let [tx, ty] = self.distortion.tangential_shift(x, y, r2);
            let next = [(observed[0] - tx) / scale, (observed[1] - ty) / scale];
            if !next[0].is_finite() || !next[1].is_finite() {
                return None;
            }

            let update = (next[0] - x).hypot(next[1] - y);
            x = next[0];
            y = next[1];
            if update <= cfg.eps.max(0.0) {
                break;
            }
        }

        Some([x, y])
    }

    /// Undistort a pixel point back into pixel coordinates.
    pub fn undistort_pixel(self, distorted_pixel_xy: [f64; 2]) -> Option<[f64; 2]> {
        let normalized = self.undistort_to_normalized(distorted_pixel_xy)?;
        let pixel = self.intrinsics.normalized_to_pixel(normalized);
        (pixel[0].is_finite() && pixel[1].is_finite()).then_some(pixel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distorted_camera() -> CameraModel {
        CameraModel {
            intrinsics: CameraIntrinsics {
                fx: 760.0,
                fy: 780.0,
                cx: 310.0,
                cy: 250.0,
            },
            distortion: RadialTangentialDistortion {
                k1: -0.18,
                k2: 0.025,
                p1: -0.0012,
                p2: 0.0009,
                k3: 0.002,
            },
        }
    }

    #[test]
    fn validation_rejects_degenerate_intrinsics() {
        let zero_focal = CameraIntrinsics {
            fx: 720.0,
            fy: 0.0,
            cx: 320.0,
            cy: 240.0,
        };
        assert!(!zero_focal.is_valid());
        assert!(zero_focal.pixel_to_normalized([10.0, 10.0]).is_none());

        let nan_center = CameraIntrinsics {
            fx: 720.0,
            fy: 700.0,
            cx: f64::NAN,
            cy: 240.0,
        };
        assert!(!nan_center.is_valid());
    }

    #[test]
    fn distort_then_undistort_is_identity_without_coefficients() {
        let cam = CameraModel {
            intrinsics: CameraIntrinsics {
                fx: 500.0,
                fy: 510.0,
                cx: 320.0,
                cy: 240.0,
            },
            distortion: RadialTangentialDistortion::default(),
        };
        let p = [123.5, 402.25];
        let d = cam.distort_pixel(p).unwrap();
        let u = cam.undistort_pixel(d).unwrap();
        assert!((u[0] - p[0]).abs() < 1e-12);
        assert!((u[1] - p[1]).abs() < 1e-12);
    }

    #[test]
    fn distort_then_undistort_converges_under_distortion() {
        let cam = distorted_camera();
        let p = [481.25, 86.5];
        let d = cam.distort_pixel(p).unwrap();
        let u = cam.undistort_pixel(d).unwrap();
        assert!((u[0] - p[0]).abs() < 1e-6, "x={}, p={}", u[0], p[0]);
        assert!((u[1] - p[1]).abs() < 1e-6, "y={}, p={}", u[1], p[1]);
    }

    #[test]
    fn custom_iteration_limit_stops_early() {
        let cam = distorted_camera();
        let d = cam.distort_pixel([481.25, 86.5]).unwrap();
        let coarse = cam
            .undistort_to_normalized_with(
                d,
                UndistortConfig {
                    max_iters: 1,
                    eps: 0.0,
                },
            )
            .unwrap();
        let refined = cam.undistort_to_normalized(d).unwrap();
        let gap = (coarse[0] - refined[0]).hypot(coarse[1] - refined[1]);
        assert!(gap > 1e-9, "gap={gap}");
    }

    #[test]
    fn undistortion_reduces_to_pinhole_rays_without_distortion() {
        let cam = CameraModel {
            intrinsics: CameraIntrinsics {
                fx: 500.0,
                fy: 510.0,
                cx: 320.0,
                cy: 240.0,
            },
            distortion: RadialTangentialDistortion::default(),
        };
        let ray = cam.undistort_to_normalized([370.0, 291.0]).unwrap();
        assert!((ray[0] - 50.0 / 500.0).abs() < 1e-12);
        assert!((ray[1] - 51.0 / 510.0).abs() < 1e-12);
    }

    #[test]
    fn coeff_vector_layouts_are_accepted() {
        let d = RadialTangentialDistortion::from_coeffs(&[]).unwrap();
        assert_eq!(d, RadialTangentialDistortion::default());

        let d = RadialTangentialDistortion::from_coeffs(&[-0.1, 0.02, 0.001, -0.002]).unwrap();
        assert_eq!(d.k1, -0.1);
        assert_eq!(d.k3, 0.0);

        let d =
            RadialTangentialDistortion::from_coeffs(&[-0.1, 0.02, 0.001, -0.002, 0.003]).unwrap();
        assert_eq!(d.k3, 0.003);

        let d = RadialTangentialDistortion::from_coeffs(&[
            -0.1, 0.02, 0.001, -0.002, 0.003, 0.0, 0.0, 0.0,
        ])
        .unwrap();
        assert_eq!(d.k3, 0.003);
    }

    #[test]
    fn coeff_vector_rejects_unsupported_shapes() {
        assert!(RadialTangentialDistortion::from_coeffs(&[0.1, 0.2]).is_err());
        assert!(RadialTangentialDistortion::from_coeffs(&[0.1, f64::NAN, 0.0, 0.0]).is_err());
        assert!(RadialTangentialDistortion::from_coeffs(&[
            0.1, 0.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0
        ])
        .is_err());
    }
}
