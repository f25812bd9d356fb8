use pedtrack_common::Frame;

use crate::error::FilterError;
use crate::parameter::Parameter;
use crate::traits::{Filter, FilterCore};

/// Mirrors the image horizontally, vertically or both, for cameras mounted
/// upside down or seen through a mirror.
pub struct SwapFilter {
    core: FilterCore,
    horizontally: Parameter<bool>,
    vertically: Parameter<bool>,
}

impl Default for SwapFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl SwapFilter {
    pub fn new() -> Self {
        let core = FilterCore::new();
        let horizontally = Parameter::with_range(core.notifier(), false, true, false);
        let vertically = Parameter::with_range(core.notifier(), false, true, false);
        Self {
            core,
            horizontally,
            vertically,
        }
    }

    pub fn horizontally(&self) -> &Parameter<bool> {
        &self.horizontally
    }

    pub fn horizontally_mut(&mut self) -> &mut Parameter<bool> {
        &mut self.horizontally
    }

    pub fn vertically(&self) -> &Parameter<bool> {
        &self.vertically
    }

    pub fn vertically_mut(&mut self) -> &mut Parameter<bool> {
        &mut self.vertically
    }
}

fn flip_rows(img: &mut Frame) {
    let stride = img.stride();
    let height = img.height() as usize;
    let data = img.data_mut();
    for y in 0..height / 2 {
        let (top, bottom) = data.split_at_mut((height - 1 - y) * stride);
        top[y * stride..(y + 1) * stride].swap_with_slice(&mut bottom[..stride]);
    }
}

fn flip_columns(img: &mut Frame) {
    let stride = img.stride();
    let channels = img.channels() as usize;
    if stride == 0 {
        return;
    }
    for row in img.data_mut().chunks_exact_mut(stride) {
        let width = row.len() / channels;
        for x in 0..width / 2 {
            let (left, right) = row.split_at_mut((width - 1 - x) * channels);
            left[x * channels..(x + 1) * channels].swap_with_slice(&mut right[..channels]);
        }
    }
}

impl Filter for SwapFilter {
    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FilterCore {
        &mut self.core
    }

    fn act(&mut self, img: &Frame, res: &mut Frame) -> Result<(), FilterError> {
        *res = img.clone();
        self.act_in_place(res)
    }

    fn act_in_place(&mut self, img: &mut Frame) -> Result<(), FilterError> {
        if self.horizontally.value() {
            flip_columns(img);
        }
        if self.vertically.value() {
            flip_rows(img);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "swap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Frame {
        Frame::from_raw(3, 2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap()
    }

    fn swap(h: bool, v: bool) -> SwapFilter {
        let mut filter = SwapFilter::new();
        filter.horizontally_mut().set_value(h);
        filter.vertically_mut().set_value(v);
        filter
    }

    #[test]
    fn defaults_do_nothing() {
        let mut filter = SwapFilter::new();
        assert!(filter.on_copy());
        assert!(!filter.horizontally().value());
        assert!(filter.vertically().maximum());
        assert_eq!(filter.apply(ramp()).unwrap(), &ramp());
    }

    #[test]
    fn horizontal() {
        let mut filter = swap(true, false);
        assert_eq!(filter.apply(ramp()).unwrap().data(), &[3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn vertical() {
        let mut filter = swap(false, true);
        assert_eq!(filter.apply(ramp()).unwrap().data(), &[4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn both_is_rotation() {
        let mut filter = swap(true, true);
        filter.set_on_copy(false);
        assert_eq!(filter.apply(ramp()).unwrap().data(), &[6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn keeps_color_samples_together() {
        let mut filter = swap(true, false);
        let img = Frame::from_raw(2, 1, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(filter.apply(img).unwrap().data(), &[4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn odd_height_keeps_middle_row() {
        let mut filter = swap(false, true);
        let img = Frame::from_raw(1, 3, 1, vec![1, 2, 3]).unwrap();
        assert_eq!(filter.apply(img).unwrap().data(), &[3, 2, 1]);
    }
}
