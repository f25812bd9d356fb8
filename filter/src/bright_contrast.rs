use pedtrack_common::Frame;
use tracing::debug;

use crate::error::FilterError;
use crate::parameter::Parameter;
use crate::traits::{Filter, FilterCore};

/// Brightness / contrast adjustment as an affine intensity remap.
///
/// Positive contrast steepens the ramp around mid-gray, negative contrast
/// flattens it. Both branches yield `a = 1, b = brightness` at zero contrast.
pub struct BrightContrastFilter {
    core: FilterCore,
    brightness: Parameter<f64>,
    contrast: Parameter<f64>,
}

impl Default for BrightContrastFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl BrightContrastFilter {
    pub fn new() -> Self {
        let core = FilterCore::new();
        let brightness = Parameter::with_range(core.notifier(), -100.0, 100.0, 0.0);
        let contrast = Parameter::with_range(core.notifier(), -100.0, 100.0, 0.0);
        Self {
            core,
            brightness,
            contrast,
        }
    }

    pub fn brightness(&self) -> &Parameter<f64> {
        &self.brightness
    }

    pub fn brightness_mut(&mut self) -> &mut Parameter<f64> {
        &mut self.brightness
    }

    pub fn contrast(&self) -> &Parameter<f64> {
        &self.contrast
    }

    pub fn contrast_mut(&mut self) -> &mut Parameter<f64> {
        &mut self.contrast
    }

    /// Gain and offset of the intensity remap.
    pub fn coefficients(&self) -> (f64, f64) {
        affine_coefficients(self.brightness.value(), self.contrast.value())
    }

    fn lookup_table(&self) -> [u8; 256] {
        let (a, b) = self.coefficients();
        debug!(a, b, "bright/contrast coefficients");
        let mut lut = [0u8; 256];
        for (i, entry) in lut.iter_mut().enumerate() {
            *entry = saturate_u8(a * i as f64 + b);
        }
        lut
    }
}

/// Algorithm by Werner D. Streidt.
pub fn affine_coefficients(brightness: f64, contrast: f64) -> (f64, f64) {
    if contrast > 0.0 {
        let delta = 127.0 * contrast / 100.0;
        let a = 255.0 / (255.0 - 2.0 * delta);
        let b = a * (brightness - delta);
        (a, b)
    } else {
        let delta = -128.0 * contrast / 100.0;
        let a = (256.0 - 2.0 * delta) / 256.0;
        let b = a * brightness + delta;
        (a, b)
    }
}

/// Round half to even and clamp into the 8-bit range.
fn saturate_u8(v: f64) -> u8 {
    if v.is_nan() {
        return 0;
    }
    v.round_ties_even().clamp(0.0, 255.0) as u8
}

impl Filter for BrightContrastFilter {
    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FilterCore {
        &mut self.core
    }

    fn act(&mut self, img: &Frame, res: &mut Frame) -> Result<(), FilterError> {
        let lut = self.lookup_table();
        if !res.same_shape(img) {
            *res = Frame::blank_like(img);
        }
        for (dst, src) in res.data_mut().iter_mut().zip(img.data()) {
            *dst = lut[*src as usize];
        }
        Ok(())
    }

    fn act_in_place(&mut self, img: &mut Frame) -> Result<(), FilterError> {
        let lut = self.lookup_table();
        for v in img.data_mut() {
            *v = lut[*v as usize];
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "bright_contrast"
    }
}
