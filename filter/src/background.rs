use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{dilate, erode};
use imageproc::region_labelling::{connected_components, Connectivity};
use pedtrack_common::Frame;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::FilterError;
use crate::traits::{Filter, FilterCore};

const MASK_ON: u8 = 255;
/// Enclosed background regions below this size are treated as holes in a person.
const MAX_HOLE_AREA: u32 = 400;
const MASK_BLUR_SIGMA: f32 = 3.5;
const MASK_THRESHOLD: u8 = 20;

/// Tuning of the per-pixel Gaussian mixture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixtureParams {
    /// Frames after which the learning rate stops decreasing.
    pub history: u32,
    pub max_modes: usize,
    /// Squared Mahalanobis distance below which a sample counts as background.
    pub var_threshold: f32,
    /// Squared Mahalanobis distance below which a sample updates an existing mode.
    pub var_threshold_gen: f32,
    /// Share of total weight that makes up the background.
    pub background_ratio: f32,
    pub var_init: f32,
    pub var_min: f32,
    pub var_max: f32,
    /// Weight decay pushing rarely seen modes out.
    pub complexity_reduction: f32,
}

impl Default for MixtureParams {
    fn default() -> Self {
        Self {
            history: 500,
            max_modes: 5,
            var_threshold: 16.0,
            var_threshold_gen: 9.0,
            background_ratio: 0.9,
            var_init: 15.0,
            var_min: 4.0,
            var_max: 75.0,
            complexity_reduction: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Mode {
    weight: f32,
    variance: f32,
    mean: [f32; 4],
}

impl Mode {
    fn dist2(&self, sample: &[f32]) -> f32 {
        sample
            .iter()
            .zip(self.mean.iter())
            .map(|(x, m)| (x - m) * (x - m))
            .sum()
    }
}

/// Adaptive mixture-of-Gaussians background model, one mixture per pixel,
/// modes kept sorted by descending weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundModel {
    width: u32,
    height: u32,
    channels: u8,
    frames_seen: u64,
    params: MixtureParams,
    pixels: Vec<Vec<Mode>>,
}

impl BackgroundModel {
    pub fn new(width: u32, height: u32, channels: u8, params: MixtureParams) -> Self {
        Self {
            width,
            height,
            channels,
            frames_seen: 0,
            params,
            pixels: vec![Vec::new(); width as usize * height as usize],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    fn fits(&self, img: &Frame) -> bool {
        self.width == img.width()
            && self.height == img.height()
            && self.channels == img.channels()
    }

    fn validate(&self) -> Result<(), FilterError> {
        let expected = self.width as usize * self.height as usize;
        if self.pixels.len() != expected {
            return Err(FilterError::ModelCorrupt(format!(
                "{} pixel mixtures for a {}x{} image",
                self.pixels.len(),
                self.width,
                self.height
            )));
        }
        let max_modes = self.params.max_modes;
        if max_modes == 0 || self.pixels.iter().any(|m| m.len() > max_modes) {
            return Err(FilterError::ModelCorrupt("mode count exceeds limit".into()));
        }
        Ok(())
    }

    /// Classify every pixel of `img` into `mask` (255 = foreground). With
    /// `learn` set the model also adapts to the frame.
    pub fn process(&mut self, img: &Frame, learn: bool, mask: &mut GrayImage) {
        let channels = img.channels() as usize;
        let alpha = if learn {
            self.frames_seen += 1;
            if self.frames_seen == 1 {
                1.0
            } else {
                1.0 / (2 * self.frames_seen).min(self.params.history.max(1) as u64) as f32
            }
        } else {
            0.0
        };

        let params = self.params;
        let mut sample = [0.0f32; 4];
        for ((modes, px), out) in self
            .pixels
            .iter_mut()
            .zip(img.data().chunks_exact(channels))
            .zip(mask.iter_mut())
        {
            for (s, v) in sample.iter_mut().zip(px) {
                *s = *v as f32;
            }
            let sample = &sample[..channels];
            let background = if learn {
                update_pixel(modes, sample, alpha, &params)
            } else {
                classify_pixel(modes, sample, &params)
            };
            *out = if background { 0 } else { MASK_ON };
        }
    }
}

fn classify_pixel(modes: &[Mode], sample: &[f32], p: &MixtureParams) -> bool {
    let mut total = 0.0;
    for mode in modes {
        let d2 = mode.dist2(sample);
        if total < p.background_ratio && d2 < p.var_threshold * mode.variance {
            return true;
        }
        if d2 < p.var_threshold_gen * mode.variance {
            return false;
        }
        total += mode.weight;
    }
    false
}

/// One learning step for a single pixel. Returns whether the sample is background.
fn update_pixel(modes: &mut Vec<Mode>, sample: &[f32], alpha: f32, p: &MixtureParams) -> bool {
    let prune = -alpha * p.complexity_reduction;
    let mut background = false;
    let mut fits = false;
    let mut total = 0.0f32;

    let mut i = 0;
    while i < modes.len() {
        let mut weight = (1.0 - alpha) * modes[i].weight + prune;
        if !fits {
            let d2 = modes[i].dist2(sample);
            let var = modes[i].variance;
            if total < p.background_ratio && d2 < p.var_threshold * var {
                background = true;
            }
            if d2 < p.var_threshold_gen * var {
                fits = true;
                weight += alpha;
                let k = if weight > 0.0 { alpha / weight } else { 0.0 };
                let mode = &mut modes[i];
                for (m, x) in mode.mean.iter_mut().zip(sample) {
                    *m += k * (x - *m);
                }
                mode.variance = (var + k * (d2 - var)).clamp(p.var_min, p.var_max);
                mode.weight = weight;
                let mut idx = i;
                while idx > 0 && modes[idx - 1].weight < weight {
                    modes.swap(idx, idx - 1);
                    idx -= 1;
                }
                total += weight;
                i += 1;
                continue;
            }
        }
        if weight < -prune || weight <= 0.0 {
            modes.remove(i);
            continue;
        }
        modes[i].weight = weight;
        total += weight;
        i += 1;
    }

    if total > 0.0 {
        for mode in modes.iter_mut() {
            mode.weight /= total;
        }
    }

    if !fits {
        if modes.len() >= p.max_modes {
            modes.pop();
        }
        let weight = if modes.is_empty() { 1.0 } else { alpha };
        for mode in modes.iter_mut() {
            mode.weight *= 1.0 - alpha;
        }
        let mut mean = [0.0f32; 4];
        mean[..sample.len()].copy_from_slice(sample);
        modes.push(Mode {
            weight,
            variance: p.var_init,
            mean,
        });
        let mut idx = modes.len() - 1;
        while idx > 0 && modes[idx - 1].weight < weight {
            modes.swap(idx, idx - 1);
            idx -= 1;
        }
    }
    background
}

/// Erode, dilate, blur and threshold the raw mask, then drop blobs smaller
/// than `min_area` and fill small holes in the ones left.
fn clean_mask(mask: &GrayImage, min_area: u32) -> GrayImage {
    let opened = dilate(&erode(mask, Norm::LInf, 1), Norm::LInf, 2);
    let blurred = gaussian_blur_f32(&opened, MASK_BLUR_SIGMA);
    let mut cleaned = GrayImage::from_fn(blurred.width(), blurred.height(), |x, y| {
        if blurred.get_pixel(x, y).0[0] > MASK_THRESHOLD {
            Luma([MASK_ON])
        } else {
            Luma([0])
        }
    });

    let blobs = region_stats(&cleaned);
    for (x, y, px) in cleaned.enumerate_pixels_mut() {
        let label = blobs.labels.get_pixel(x, y).0[0];
        if px.0[0] != 0 && blobs.regions[label as usize].area < min_area {
            px.0[0] = 0;
        }
    }

    // Holes: background regions that do not touch the image border.
    let inverted = GrayImage::from_fn(cleaned.width(), cleaned.height(), |x, y| {
        Luma([MASK_ON - cleaned.get_pixel(x, y).0[0]])
    });
    let holes = region_stats(&inverted);
    for (x, y, px) in cleaned.enumerate_pixels_mut() {
        let label = holes.labels.get_pixel(x, y).0[0];
        let region = &holes.regions[label as usize];
        if px.0[0] == 0 && !region.touches_border && region.area < MAX_HOLE_AREA {
            px.0[0] = MASK_ON;
        }
    }
    cleaned
}

#[derive(Debug, Clone, Copy, Default)]
struct Region {
    area: u32,
    touches_border: bool,
}

struct RegionStats {
    labels: image::ImageBuffer<Luma<u32>, Vec<u32>>,
    regions: Vec<Region>,
}

fn region_stats(mask: &GrayImage) -> RegionStats {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let count = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut regions = vec![Region::default(); count + 1];
    let (w, h) = labels.dimensions();
    for (x, y, p) in labels.enumerate_pixels() {
        let region = &mut regions[p.0[0] as usize];
        region.area += 1;
        if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
            region.touches_border = true;
        }
    }
    RegionStats { labels, regions }
}

/// Foreground detection by adaptive background subtraction.
///
/// The image itself passes through unchanged; the result of interest is the
/// foreground mask queried with `foreground` / `is_foreground`.
pub struct BackgroundFilter {
    core: FilterCore,
    update: bool,
    params: MixtureParams,
    min_foreground_area: u32,
    model: Option<BackgroundModel>,
    foreground: Option<GrayImage>,
    last_file: Option<PathBuf>,
}

impl Default for BackgroundFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundFilter {
    pub fn new() -> Self {
        let mut core = FilterCore::new();
        core.set_on_copy(false);
        Self {
            core,
            update: true,
            params: MixtureParams::default(),
            min_foreground_area: 1000,
            model: None,
            foreground: None,
            last_file: None,
        }
    }

    pub fn update(&self) -> bool {
        self.update
    }

    /// Whether frames after the first keep adapting the model.
    pub fn set_update(&mut self, update: bool) {
        self.update = update;
    }

    pub fn min_foreground_area(&self) -> u32 {
        self.min_foreground_area
    }

    pub fn set_min_foreground_area(&mut self, area: u32) {
        self.min_foreground_area = area;
    }

    pub fn filename(&self) -> Option<&Path> {
        self.last_file.as_deref()
    }

    /// Remember the model file used by `save(None)` and `load(None)`.
    pub fn set_filename(&mut self, path: Option<PathBuf>) {
        self.last_file = path;
    }

    pub fn model(&self) -> Option<&BackgroundModel> {
        self.model.as_ref()
    }

    pub fn foreground(&self) -> Option<&GrayImage> {
        self.foreground.as_ref()
    }

    /// Foreground test for a single pixel; false without a mask or outside it.
    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        match &self.foreground {
            Some(mask) if x < mask.width() && y < mask.height() => mask.get_pixel(x, y).0[0] != 0,
            _ => false,
        }
    }

    /// Forget everything learned so far.
    pub fn reset(&mut self) {
        if let Some(mask) = self.foreground.as_mut() {
            mask.fill(0);
        }
        self.model = None;
        self.core.set_changed(true);
    }

    /// Write the model as JSON to `dest`, or to the remembered file.
    pub fn save(&mut self, dest: Option<&Path>) -> Result<PathBuf, FilterError> {
        let path = self.resolve_path(dest)?;
        let model = self.model.as_ref().ok_or(FilterError::NoModel)?;
        let file = File::create(&path).map_err(|e| FilterError::ModelIo(path.clone(), e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, model)?;
        writer
            .flush()
            .map_err(|e| FilterError::ModelIo(path.clone(), e))?;
        info!(
            path = %path.display(),
            frames_seen = model.frames_seen,
            "saved background model"
        );
        self.last_file = Some(path.clone());
        Ok(path)
    }

    /// Replace the model with one read from `dest`, or from the remembered file.
    pub fn load(&mut self, dest: Option<&Path>) -> Result<PathBuf, FilterError> {
        let path = self.resolve_path(dest)?;
        if self.model.is_some() {
            warn!("replacing existing background model");
        }
        let file = File::open(&path).map_err(|e| FilterError::ModelIo(path.clone(), e))?;
        let model: BackgroundModel = serde_json::from_reader(BufReader::new(file))?;
        model.validate()?;
        info!(
            path = %path.display(),
            width = model.width,
            height = model.height,
            frames_seen = model.frames_seen,
            "loaded background model"
        );
        self.foreground = Some(GrayImage::new(model.width, model.height));
        self.params = model.params;
        self.model = Some(model);
        self.last_file = Some(path.clone());
        self.core.set_changed(true);
        Ok(path)
    }

    fn resolve_path(&self, dest: Option<&Path>) -> Result<PathBuf, FilterError> {
        dest.map(Path::to_path_buf)
            .or_else(|| self.last_file.clone())
            .ok_or(FilterError::NoModelFile)
    }

    fn detect(&mut self, img: &Frame) {
        let (mut model, learn) = match self.model.take() {
            Some(model) if model.fits(img) => (model, self.update),
            stale => {
                if stale.is_some() {
                    debug!(
                        width = img.width(),
                        height = img.height(),
                        "frame shape changed, rebuilding background model"
                    );
                } else {
                    debug!(
                        width = img.width(),
                        height = img.height(),
                        "initialising background model"
                    );
                }
                (
                    BackgroundModel::new(img.width(), img.height(), img.channels(), self.params),
                    true,
                )
            }
        };
        let mut raw = GrayImage::new(img.width(), img.height());
        model.process(img, learn, &mut raw);
        self.model = Some(model);
        self.foreground = Some(clean_mask(&raw, self.min_foreground_area));
    }
}

impl Filter for BackgroundFilter {
    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FilterCore {
        &mut self.core
    }

    fn act(&mut self, img: &Frame, res: &mut Frame) -> Result<(), FilterError> {
        if res.same_shape(img) {
            res.data_mut().copy_from_slice(img.data());
        } else {
            *res = img.clone();
        }
        self.detect(img);
        Ok(())
    }

    fn act_in_place(&mut self, img: &mut Frame) -> Result<(), FilterError> {
        self.detect(img);
        Ok(())
    }

    fn name(&self) -> &str {
        "background"
    }
}
