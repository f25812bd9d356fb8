use std::path::{Path, PathBuf};

use pedtrack_common::config::{Config, InputConfig};
use pedtrack_common::{Frame, FrameError};
use pedtrack_filter::{Filter, FilterChain, FilterError};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to list input directory {0}: {1}")]
    ListInput(PathBuf, std::io::Error),
    #[error("failed to create output directory {0}: {1}")]
    CreateOutput(PathBuf, std::io::Error),
    #[error("frame {0}: {1}")]
    Frame(PathBuf, FrameError),
    #[error("failed to write foreground mask {0}: {1}")]
    Mask(PathBuf, image::ImageError),
    #[error(transparent)]
    Filter(#[from] FilterError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: usize,
    pub masks: usize,
}

/// Push every frame of the input directory through the filter chain and
/// write the results.
pub fn run(config: &Config) -> Result<RunSummary, RunnerError> {
    let mut chain = FilterChain::from_config(&config.filters);
    let bg = &config.filters.background;
    if bg.load_from.is_some() {
        chain.background_mut().set_filename(bg.load_from.clone());
        chain.background_mut().load(None)?;
    }

    let out_dir = &config.output.dir;
    std::fs::create_dir_all(out_dir).map_err(|e| RunnerError::CreateOutput(out_dir.clone(), e))?;

    let frames = list_frames(&config.input)?;
    if frames.is_empty() {
        warn!(dir = %config.input.dir.display(), "no input frames found");
    }

    let mut summary = RunSummary::default();
    for path in &frames {
        let frame = Frame::open(path).map_err(|e| RunnerError::Frame(path.clone(), e))?;
        debug!(
            path = %path.display(),
            width = frame.width(),
            height = frame.height(),
            channels = frame.channels(),
            "processing frame"
        );
        let out = chain.process(frame, true)?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("frame{:06}", summary.frames));
        let out_path = out_dir.join(format!("{stem}.png"));
        out.save_png(&out_path)
            .map_err(|e| RunnerError::Frame(out_path.clone(), e))?;

        if config.output.write_foreground && chain.background().enabled() {
            if let Some(mask) = chain.background().foreground() {
                let mask_path = out_dir.join(format!("{stem}_fg.png"));
                mask.save_with_format(&mask_path, image::ImageFormat::Png)
                    .map_err(|e| RunnerError::Mask(mask_path, e))?;
                summary.masks += 1;
            }
        }
        summary.frames += 1;
        if summary.frames % 100 == 0 {
            info!(frames = summary.frames, total = frames.len(), "progress");
        }
    }

    if let Some(path) = &bg.save_to {
        if bg.enabled {
            chain.background_mut().save(Some(path))?;
        } else {
            warn!(path = %path.display(), "background filter disabled, no model to save");
        }
    }
    Ok(summary)
}

/// Files in the input directory with an accepted extension, sorted by name.
pub fn list_frames(input: &InputConfig) -> Result<Vec<PathBuf>, RunnerError> {
    let entries =
        std::fs::read_dir(&input.dir).map_err(|e| RunnerError::ListInput(input.dir.clone(), e))?;
    let mut frames = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| RunnerError::ListInput(input.dir.clone(), e))?
            .path();
        if path.is_file() && has_extension(&path, &input.extensions) {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
}
