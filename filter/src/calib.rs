use pedtrack_common::{DistortionCoeffs, Frame, IntrinsicCameraParams};
use tracing::debug;

use crate::error::FilterError;
use crate::parameter::Parameter;
use crate::traits::{Filter, FilterCore};

/// Per-pixel source coordinates for one (intrinsics, image size) pair.
#[derive(Debug, Clone)]
pub struct RemapTable {
    width: u32,
    height: u32,
    /// Filter epoch the table was computed at.
    epoch: u64,
    coords: Vec<[f32; 2]>,
}

impl RemapTable {
    fn build(params: &IntrinsicCameraParams, width: u32, height: u32, epoch: u64) -> Self {
        let mut coords = Vec::with_capacity(width as usize * height as usize);
        for v in 0..height {
            for u in 0..width {
                let [x, y] = params.distorted_source(u as f64, v as f64);
                coords.push([x as f32, y as f32]);
            }
        }
        Self {
            width,
            height,
            epoch,
            coords,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Source position sampled for output pixel (u, v).
    pub fn source(&self, u: u32, v: u32) -> [f32; 2] {
        self.coords[v as usize * self.width as usize + u as usize]
    }

    fn fits(&self, img: &Frame, epoch: u64) -> bool {
        self.epoch == epoch && self.width == img.width() && self.height == img.height()
    }
}

/// Removes lens distortion using the configured camera intrinsics.
///
/// The remap table only depends on the intrinsics and the image size, so it
/// is built once and reused until either of them changes.
pub struct CalibFilter {
    core: FilterCore,
    cam_params: Parameter<IntrinsicCameraParams>,
    table: Option<RemapTable>,
    map_builds: u64,
}

impl Default for CalibFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibFilter {
    pub fn new() -> Self {
        let core = FilterCore::new();
        let cam_params = Parameter::with_range(
            core.notifier(),
            intrinsics_minimum(),
            intrinsics_maximum(),
            IntrinsicCameraParams::default(),
        );
        Self {
            core,
            cam_params,
            table: None,
            map_builds: 0,
        }
    }

    pub fn cam_params(&self) -> &Parameter<IntrinsicCameraParams> {
        &self.cam_params
    }

    pub fn cam_params_mut(&mut self) -> &mut Parameter<IntrinsicCameraParams> {
        &mut self.cam_params
    }

    pub fn remap_table(&self) -> Option<&RemapTable> {
        self.table.as_ref()
    }

    /// How many times the remap table has been computed.
    pub fn map_builds(&self) -> u64 {
        self.map_builds
    }

    fn ensure_table(&mut self, img: &Frame) -> &RemapTable {
        let epoch = self.core.epoch();
        let table = match self.table.take() {
            Some(table) if table.fits(img, epoch) => table,
            _ => {
                let params = self.cam_params.value();
                debug!(
                    width = img.width(),
                    height = img.height(),
                    fx = params.fx,
                    fy = params.fy,
                    cx = params.cx,
                    cy = params.cy,
                    "building undistortion map"
                );
                self.map_builds += 1;
                RemapTable::build(&params, img.width(), img.height(), epoch)
            }
        };
        self.table.insert(table)
    }
}

/// Lower end of the intrinsics a user interface should offer.
fn intrinsics_minimum() -> IntrinsicCameraParams {
    IntrinsicCameraParams {
        fx: 500.0,
        fy: 500.0,
        cx: 0.0,
        cy: 0.0,
        distortion: DistortionCoeffs::uniform(-5.0),
    }
}

/// Upper end of the intrinsics a user interface should offer.
fn intrinsics_maximum() -> IntrinsicCameraParams {
    IntrinsicCameraParams {
        fx: 5000.0,
        fy: 5000.0,
        cx: 4096.0,
        cy: 2160.0,
        distortion: DistortionCoeffs::uniform(5.0),
    }
}

/// Bilinear sample of all channels at a sub-pixel position. Neighbors outside
/// the image contribute zero.
fn sample_bilinear(img: &Frame, x: f32, y: f32, out: &mut [u8]) {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let inside = x.is_finite()
        && y.is_finite()
        && x > -1.0
        && y > -1.0
        && x < w as f32
        && y < h as f32;
    if !inside {
        out.fill(0);
        return;
    }
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let weights = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1, y0, fx * (1.0 - fy)),
        (x0, y0 + 1, (1.0 - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ];
    for (c, dst) in out.iter_mut().enumerate() {
        let mut acc = 0.0f32;
        for &(px, py, wgt) in &weights {
            if px >= 0 && py >= 0 && px < w && py < h {
                acc += wgt * img.pixel(px as u32, py as u32)[c] as f32;
            }
        }
        *dst = acc.round().clamp(0.0, 255.0) as u8;
    }
}

impl Filter for CalibFilter {
    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FilterCore {
        &mut self.core
    }

    fn act(&mut self, img: &Frame, res: &mut Frame) -> Result<(), FilterError> {
        if !res.same_shape(img) {
            *res = Frame::blank_like(img);
        }
        let table = self.ensure_table(img);
        let channels = img.channels() as usize;
        for (i, dst) in res.data_mut().chunks_exact_mut(channels).enumerate() {
            let [x, y] = table.coords[i];
            sample_bilinear(img, x, y, dst);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "calib"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let data = (0..width * height).map(|i| (i * 7 % 256) as u8).collect();
        Frame::from_raw(width, height, 1, data).unwrap()
    }

    fn centered(width: u32, height: u32) -> IntrinsicCameraParams {
        IntrinsicCameraParams {
            fx: 50.0,
            fy: 50.0,
            cx: (width as f64 - 1.0) / 2.0,
            cy: (height as f64 - 1.0) / 2.0,
            ..IntrinsicCameraParams::default()
        }
    }

    #[test]
    fn default_intrinsics() {
        let filter = CalibFilter::new();
        let params = filter.cam_params().value();
        assert_eq!(params.fx, 881.0);
        assert_eq!(params.cy, 383.5);
        assert!(!filter.changed());
    }

    #[test]
    fn intrinsics_carry_ui_bounds() {
        let filter = CalibFilter::new();
        let min = filter.cam_params().minimum();
        let max = filter.cam_params().maximum();
        assert_eq!((min.fx, max.fx), (500.0, 5000.0));
        assert_eq!((min.fy, max.fy), (500.0, 5000.0));
        assert_eq!((min.cx, max.cx), (0.0, 4096.0));
        assert_eq!((min.cy, max.cy), (0.0, 2160.0));
        assert_eq!((min.distortion.k1, max.distortion.k6), (-5.0, 5.0));
        assert_eq!((min.distortion.p2, max.distortion.p1), (-5.0, 5.0));
    }

    #[test]
    fn zero_distortion_is_identity() {
        let mut filter = CalibFilter::new();
        let img = gradient(16, 12);
        let out = filter.apply(img.clone()).unwrap();
        assert_eq!(out, &img);
    }

    #[test]
    fn table_is_reused_between_frames() {
        let mut filter = CalibFilter::new();
        filter.cam_params_mut().set_value(centered(20, 10));
        filter.apply(gradient(20, 10)).unwrap();
        filter.apply(gradient(20, 10)).unwrap();
        assert_eq!(filter.map_builds(), 1);
    }

    #[test]
    fn direct_act_calls_reuse_table() {
        let mut filter = CalibFilter::new();
        let img = gradient(8, 8);
        let mut res = Frame::blank_like(&img);
        filter.act(&img, &mut res).unwrap();
        filter.act(&img, &mut res).unwrap();
        assert_eq!(filter.map_builds(), 1);
    }

    #[test]
    fn parameter_change_rebuilds_table() {
        let mut filter = CalibFilter::new();
        filter.apply(gradient(20, 10)).unwrap();
        let mut params = centered(20, 10);
        params.distortion.k1 = -0.3;
        filter.cam_params_mut().set_value(params);
        filter.apply(gradient(20, 10)).unwrap();
        assert_eq!(filter.map_builds(), 2);
        filter.apply(gradient(20, 10)).unwrap();
        assert_eq!(filter.map_builds(), 2);
    }

    #[test]
    fn size_change_rebuilds_table() {
        let mut filter = CalibFilter::new();
        filter.apply(gradient(20, 10)).unwrap();
        filter.apply(gradient(10, 20)).unwrap();
        assert_eq!(filter.map_builds(), 2);
        assert_eq!(filter.remap_table().unwrap().dimensions(), (10, 20));
    }

    #[test]
    fn pincushion_moves_corners_outside() {
        let mut filter = CalibFilter::new();
        let mut params = centered(21, 21);
        params.distortion.k1 = 5.0;
        filter.cam_params_mut().set_value(params);
        let img = Frame::filled(21, 21, 3, 200).unwrap();
        let out = filter.apply(img).unwrap().clone();
        // The center maps onto itself, corners sample outside and read the zero border.
        assert_eq!(out.pixel(10, 10), &[200, 200, 200]);
        assert_eq!(out.pixel(0, 0), &[0, 0, 0]);
        let table = filter.remap_table().unwrap();
        let [sx, sy] = table.source(0, 0);
        assert!(sx < 0.0 && sy < 0.0);
    }
}
