use pedtrack_common::config::FiltersConfig;
use pedtrack_common::Frame;
use tracing::{debug, warn};

use crate::background::BackgroundFilter;
use crate::border::BorderFilter;
use crate::bright_contrast::BrightContrastFilter;
use crate::calib::CalibFilter;
use crate::error::FilterError;
use crate::swap::SwapFilter;
use crate::traits::Filter;

/// The fixed preprocessing pipeline every frame goes through before tracking:
/// swap, brightness/contrast, border, undistortion, background subtraction.
///
/// Stages whose input and settings are unchanged since the last call hand
/// out their cached result instead of recomputing it.
pub struct FilterChain {
    swap: SwapFilter,
    bright_contrast: BrightContrastFilter,
    border: BorderFilter,
    calib: CalibFilter,
    background: BackgroundFilter,
    output: Option<Frame>,
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterChain {
    /// A chain with every filter disabled.
    pub fn new() -> Self {
        let mut chain = Self {
            swap: SwapFilter::new(),
            bright_contrast: BrightContrastFilter::new(),
            border: BorderFilter::new(),
            calib: CalibFilter::new(),
            background: BackgroundFilter::new(),
            output: None,
        };
        chain.swap.disable();
        chain.bright_contrast.disable();
        chain.border.disable();
        chain.calib.disable();
        chain.background.disable();
        chain
    }

    pub fn from_config(cfg: &FiltersConfig) -> Self {
        let mut chain = Self::new();

        chain.swap.set_enabled(cfg.swap.enabled);
        chain.swap.horizontally_mut().set_value(cfg.swap.horizontally);
        chain.swap.vertically_mut().set_value(cfg.swap.vertically);

        chain.bright_contrast.set_enabled(cfg.bright_contrast.enabled);
        chain
            .bright_contrast
            .brightness_mut()
            .set_value(cfg.bright_contrast.brightness);
        chain
            .bright_contrast
            .contrast_mut()
            .set_value(cfg.bright_contrast.contrast);

        chain.border.set_enabled(cfg.border.enabled);
        chain.border.size_mut().set_value(cfg.border.size);
        chain.border.red_mut().set_value(cfg.border.red);
        chain.border.green_mut().set_value(cfg.border.green);
        chain.border.blue_mut().set_value(cfg.border.blue);

        chain.calib.set_enabled(cfg.calib.enabled);
        chain.calib.cam_params_mut().set_value(cfg.calib.intrinsics);

        chain.background.set_enabled(cfg.background.enabled);
        chain.background.set_update(cfg.background.update);
        chain
            .background
            .set_min_foreground_area(cfg.background.min_foreground_area);

        chain
    }

    pub fn swap(&self) -> &SwapFilter {
        &self.swap
    }

    pub fn swap_mut(&mut self) -> &mut SwapFilter {
        &mut self.swap
    }

    pub fn bright_contrast(&self) -> &BrightContrastFilter {
        &self.bright_contrast
    }

    pub fn bright_contrast_mut(&mut self) -> &mut BrightContrastFilter {
        &mut self.bright_contrast
    }

    pub fn border(&self) -> &BorderFilter {
        &self.border
    }

    pub fn border_mut(&mut self) -> &mut BorderFilter {
        &mut self.border
    }

    pub fn calib(&self) -> &CalibFilter {
        &self.calib
    }

    pub fn calib_mut(&mut self) -> &mut CalibFilter {
        &mut self.calib
    }

    pub fn background(&self) -> &BackgroundFilter {
        &self.background
    }

    pub fn background_mut(&mut self) -> &mut BackgroundFilter {
        &mut self.background
    }

    /// Output of the most recent `process` call.
    pub fn output(&self) -> Option<&Frame> {
        self.output.as_ref()
    }

    /// Run `frame` through the chain. `frame_changed` tells whether it differs
    /// from the frame passed last time.
    pub fn process(&mut self, frame: Frame, frame_changed: bool) -> Result<&Frame, FilterError> {
        let upstream = [
            self.swap.changed(),
            self.bright_contrast.changed(),
            self.border.changed(),
            self.calib.changed(),
        ];

        if upstream.iter().any(|&c| c) {
            if let Some(path) = self.background.filename() {
                warn!(
                    path = %path.display(),
                    "preprocessing changed, keeping explicitly loaded background model"
                );
            } else if self.background.model().is_some() {
                debug!("preprocessing changed, resetting background model");
                self.background.reset();
            }
        }

        let mut dirty = frame_changed;
        dirty |= upstream[0];
        let img = run_stage(&mut self.swap, frame, dirty)?;
        dirty |= upstream[1];
        let img = run_stage(&mut self.bright_contrast, img, dirty)?;
        dirty |= upstream[2];
        let img = run_stage(&mut self.border, img, dirty)?;
        dirty |= upstream[3];
        let img = run_stage(&mut self.calib, img, dirty)?;

        let img = if frame_changed || self.background.changed() {
            self.background.apply(img)?.clone()
        } else {
            img
        };
        Ok(self.output.insert(img))
    }
}

fn run_stage<F: Filter>(filter: &mut F, img: Frame, rerun: bool) -> Result<Frame, FilterError> {
    if !rerun {
        if let Some(cached) = filter.last_result() {
            return Ok(cached.clone());
        }
    }
    debug!(filter = filter.name(), enabled = filter.enabled(), "applying filter");
    filter.apply(img).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pedtrack_common::config::Config;

    fn gray(value: u8) -> Frame {
        Frame::filled(40, 40, 1, value).unwrap()
    }

    #[test]
    fn disabled_chain_is_identity() {
        let mut chain = FilterChain::new();
        let img = Frame::from_raw(2, 1, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(chain.process(img.clone(), true).unwrap(), &img);
        assert!(!chain.swap().enabled());
        assert!(!chain.background().enabled());
    }

    #[test]
    fn stages_run_in_order() {
        let mut chain = FilterChain::new();
        chain.bright_contrast_mut().enable();
        chain.bright_contrast_mut().brightness_mut().set_value(20.0);
        chain.border_mut().enable();
        chain.border_mut().size_mut().set_value(1);
        chain.border_mut().blue_mut().set_value(7);

        let out = chain.process(Frame::filled(2, 2, 1, 100).unwrap(), true).unwrap();
        assert_eq!(out.dimensions(), (4, 4));
        // The border is added after the brightness shift.
        assert_eq!(out.pixel(0, 0), &[7]);
        assert_eq!(out.pixel(1, 1), &[120]);
    }

    #[test]
    fn unchanged_input_reuses_cached_results() {
        let mut chain = FilterChain::new();
        chain.calib_mut().enable();
        chain.process(gray(50), true).unwrap();
        assert_eq!(chain.calib().map_builds(), 1);

        // Same frame flag, nothing changed: the cached result comes back even
        // though a different buffer was passed in.
        let out = chain.process(gray(90), false).unwrap().clone();
        assert_eq!(out, gray(50));

        // A changed stage re-runs on the cached output of the stages before it.
        chain.bright_contrast_mut().enable();
        let out = chain.process(gray(90), false).unwrap().clone();
        assert_eq!(out, gray(50));
        assert_eq!(chain.calib().map_builds(), 1);

        let out = chain.process(gray(90), true).unwrap().clone();
        assert_eq!(out, gray(90));
        assert_eq!(chain.calib().map_builds(), 1);
    }

    #[test]
    fn upstream_change_resets_background() {
        let mut chain = FilterChain::new();
        chain.background_mut().enable();
        chain.background_mut().set_min_foreground_area(20);
        for _ in 0..5 {
            chain.process(gray(80), true).unwrap();
        }
        assert_eq!(chain.background().model().unwrap().frames_seen(), 5);

        chain.bright_contrast_mut().enable();
        chain.bright_contrast_mut().brightness_mut().set_value(10.0);
        chain.process(gray(80), false).unwrap();
        assert_eq!(chain.background().model().unwrap().frames_seen(), 1);
    }

    #[test]
    fn loaded_background_survives_upstream_change() {
        let path = std::env::temp_dir().join(format!("pedtrack-chain-{}.json", std::process::id()));
        let mut chain = FilterChain::new();
        chain.background_mut().enable();
        for _ in 0..3 {
            chain.process(gray(80), true).unwrap();
        }
        chain.background_mut().save(Some(&path)).unwrap();

        chain.border_mut().enable();
        chain.border_mut().size_mut().set_value(0);
        chain.process(gray(80), true).unwrap();
        assert_eq!(chain.background().model().unwrap().frames_seen(), 4);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn background_idles_without_new_frames() {
        let mut chain = FilterChain::new();
        chain.background_mut().enable();
        chain.process(gray(80), true).unwrap();
        chain.process(gray(80), true).unwrap();
        chain.process(gray(80), false).unwrap();
        assert_eq!(chain.background().model().unwrap().frames_seen(), 2);
    }

    #[test]
    fn built_from_config() {
        let config = Config::parse(
            r#"
            [input]
            dir = "in"

            [filters.swap]
            enabled = true
            vertically = true

            [filters.border]
            enabled = true
            size = 3

            [filters.background]
            enabled = true
            update = false
            min_foreground_area = 50
            "#,
        )
        .unwrap();
        let chain = FilterChain::from_config(&config.filters);
        assert!(chain.swap().enabled());
        assert!(chain.swap().vertically().value());
        assert!(!chain.swap().horizontally().value());
        assert!(!chain.bright_contrast().enabled());
        assert_eq!(chain.border().size().value(), 3);
        assert!(!chain.calib().enabled());
        assert!(chain.background().enabled());
        assert!(!chain.background().update());
        assert_eq!(chain.background().min_foreground_area(), 50);
    }
}
