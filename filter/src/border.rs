use pedtrack_common::Frame;

use crate::error::FilterError;
use crate::parameter::Parameter;
use crate::traits::{Filter, FilterCore};

/// Pads the image on all four sides with a constant color.
pub struct BorderFilter {
    core: FilterCore,
    size: Parameter<i32>,
    red: Parameter<i32>,
    green: Parameter<i32>,
    blue: Parameter<i32>,
}

impl Default for BorderFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl BorderFilter {
    pub fn new() -> Self {
        let mut core = FilterCore::new();
        let size = Parameter::with_range(core.notifier(), 0, 200, 0);
        let red = Parameter::with_range(core.notifier(), 0, 200, 0);
        let green = Parameter::with_range(core.notifier(), 0, 200, 0);
        let blue = Parameter::with_range(core.notifier(), 0, 200, 0);
        core.set_on_copy(false);
        Self {
            core,
            size,
            red,
            green,
            blue,
        }
    }

    pub fn size(&self) -> &Parameter<i32> {
        &self.size
    }

    pub fn size_mut(&mut self) -> &mut Parameter<i32> {
        &mut self.size
    }

    pub fn red(&self) -> &Parameter<i32> {
        &self.red
    }

    pub fn red_mut(&mut self) -> &mut Parameter<i32> {
        &mut self.red
    }

    pub fn green(&self) -> &Parameter<i32> {
        &self.green
    }

    pub fn green_mut(&mut self) -> &mut Parameter<i32> {
        &mut self.green
    }

    pub fn blue(&self) -> &Parameter<i32> {
        &self.blue
    }

    pub fn blue_mut(&mut self) -> &mut Parameter<i32> {
        &mut self.blue
    }

    /// Fill samples in frame channel order; gray frames take the blue value.
    fn fill(&self, channels: u8) -> Vec<u8> {
        let to_u8 = |v: i32| v.clamp(0, 255) as u8;
        let bgra = [
            to_u8(self.blue.value()),
            to_u8(self.green.value()),
            to_u8(self.red.value()),
            0,
        ];
        bgra[..channels as usize].to_vec()
    }
}

impl Filter for BorderFilter {
    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FilterCore {
        &mut self.core
    }

    fn act(&mut self, img: &Frame, res: &mut Frame) -> Result<(), FilterError> {
        let s = self.size.value();
        if s < 0 {
            return Err(FilterError::InvalidParameter {
                name: "border size",
                value: s.to_string(),
            });
        }
        let s = s as u32;
        let channels = img.channels();
        let width = img.width() + 2 * s;
        let height = img.height() + 2 * s;

        let fill = self.fill(channels);
        let mut data = Vec::with_capacity(width as usize * height as usize * channels as usize);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&fill);
        }
        let mut out = Frame::from_raw(width, height, channels, data)?;

        let src_stride = img.stride();
        let dst_stride = out.stride();
        let left = s as usize * channels as usize;
        for y in 0..img.height() as usize {
            let src = &img.data()[y * src_stride..(y + 1) * src_stride];
            let row = (y + s as usize) * dst_stride + left;
            out.data_mut()[row..row + src_stride].copy_from_slice(src);
        }
        *res = out;
        Ok(())
    }

    fn act_in_place(&mut self, img: &mut Frame) -> Result<(), FilterError> {
        // The output never fits the input buffer, so "in place" means replacing it.
        let mut res = Frame::blank_like(img);
        self.act(img, &mut res)?;
        *img = res;
        Ok(())
    }

    fn name(&self) -> &str {
        "border"
    }
}
