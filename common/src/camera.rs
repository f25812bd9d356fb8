use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Lens distortion coefficients of the rational radial + tangential model.
///
/// Radial factor: `(1 + k1 r² + k2 r⁴ + k3 r⁶) / (1 + k4 r² + k5 r⁴ + k6 r⁶)`,
/// tangential terms from `p1` and `p2`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistortionCoeffs {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
}

impl DistortionCoeffs {
    /// Every coefficient set to `value`.
    pub fn uniform(value: f64) -> Self {
        Self {
            k1: value,
            k2: value,
            p1: value,
            p2: value,
            k3: value,
            k4: value,
            k5: value,
            k6: value,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Distort a point given in normalized camera coordinates.
    pub fn distort_normalized(&self, x: f64, y: f64) -> [f64; 2] {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let num = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let den = 1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6;
        let radial = if den.abs() < 1e-12 { num } else { num / den };
        let xd = x * radial + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        [xd, yd]
    }
}

/// Pinhole intrinsics plus distortion for one camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrinsicCameraParams {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub distortion: DistortionCoeffs,
}

impl Default for IntrinsicCameraParams {
    fn default() -> Self {
        Self {
            fx: 881.0,
            fy: 881.0,
            cx: 511.5,
            cy: 383.5,
            distortion: DistortionCoeffs::default(),
        }
    }
}

impl IntrinsicCameraParams {
    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Source pixel in the distorted image that lands on `(u, v)` of the
    /// undistorted image, using the same camera matrix on both sides.
    pub fn distorted_source(&self, u: f64, v: f64) -> [f64; 2] {
        let x = (u - self.cx) / self.fx;
        let y = (v - self.cy) / self.fy;
        let [xd, yd] = self.distortion.distort_normalized(x, y);
        let projected = self.camera_matrix() * Vector3::new(xd, yd, 1.0);
        [projected.x, projected.y]
    }
}
