use image::{DynamicImage, GrayImage, ImageReader, RgbImage, RgbaImage};
use std::path::Path;

/// An 8-bit, interleaved, row-major pixel buffer.
///
/// Channel layouts:
///   1 channel  -> gray
///   3 channels -> blue, green, red
///   4 channels -> blue, green, red, alpha
///
/// The blue-first order is the order camera sources deliver and the order
/// filter colors (e.g. the border fill) are expressed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

const SUPPORTED_CHANNELS: [u8; 3] = [1, 3, 4];

impl Frame {
    /// Create a zero-filled frame.
    pub fn new(width: u32, height: u32, channels: u8) -> Result<Self, FrameError> {
        Self::filled(width, height, channels, 0)
    }

    /// Create a frame with every sample set to `value`.
    pub fn filled(width: u32, height: u32, channels: u8, value: u8) -> Result<Self, FrameError> {
        check_channels(channels)?;
        let len = width as usize * height as usize * channels as usize;
        Ok(Self {
            width,
            height,
            channels,
            data: vec![value; len],
        })
    }

    /// Wrap an existing sample buffer. The length must match the shape exactly.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        check_channels(channels)?;
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                got: data.len(),
                expected,
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// A zeroed frame with the same shape as `other`.
    pub fn blank_like(other: &Frame) -> Self {
        Self {
            width: other.width,
            height: other.height,
            channels: other.channels,
            data: vec![0; other.data.len()],
        }
    }

    // -- Accessors --------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn same_shape(&self, other: &Frame) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.channels == other.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Samples of the pixel at (x, y). Panics when out of bounds, like slice indexing.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let start = self.offset(x, y);
        &self.data[start..start + self.channels as usize]
    }

    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let start = self.offset(x, y);
        let end = start + self.channels as usize;
        &mut self.data[start..end]
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.stride() + x as usize * self.channels as usize
    }

    // -- Conversion -------------------------------------------------------------

    /// Convert a decoded image. Color images are reordered to blue-first.
    pub fn from_dynamic(img: &DynamicImage) -> Self {
        match img {
            DynamicImage::ImageLuma8(gray) => Self {
                width: gray.width(),
                height: gray.height(),
                channels: 1,
                data: gray.as_raw().clone(),
            },
            DynamicImage::ImageRgba8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageRgba16(_) => {
                let rgba = img.to_rgba8();
                let (width, height) = rgba.dimensions();
                let mut data = rgba.into_raw();
                for px in data.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
                Self {
                    width,
                    height,
                    channels: 4,
                    data,
                }
            }
            _ => {
                let rgb = img.to_rgb8();
                let (width, height) = rgb.dimensions();
                let mut data = rgb.into_raw();
                for px in data.chunks_exact_mut(3) {
                    px.swap(0, 2);
                }
                Self {
                    width,
                    height,
                    channels: 3,
                    data,
                }
            }
        }
    }

    /// Convert back to an `image` crate buffer (red-first for color frames).
    pub fn to_dynamic(&self) -> Result<DynamicImage, FrameError> {
        let size_err = || FrameError::BufferSize {
            got: self.data.len(),
            expected: self.width as usize * self.height as usize * self.channels as usize,
        };
        match self.channels {
            1 => GrayImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(size_err),
            3 => {
                let mut data = self.data.clone();
                for px in data.chunks_exact_mut(3) {
                    px.swap(0, 2);
                }
                RgbImage::from_raw(self.width, self.height, data)
                    .map(DynamicImage::ImageRgb8)
                    .ok_or_else(size_err)
            }
            4 => {
                let mut data = self.data.clone();
                for px in data.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
                RgbaImage::from_raw(self.width, self.height, data)
                    .map(DynamicImage::ImageRgba8)
                    .ok_or_else(size_err)
            }
            other => Err(FrameError::UnsupportedChannels(other)),
        }
    }

    /// Read and decode an image file.
    pub fn open(path: &Path) -> Result<Self, FrameError> {
        let img = ImageReader::open(path)
            .map_err(FrameError::Io)?
            .with_guessed_format()
            .map_err(FrameError::Io)?
            .decode()?;
        Ok(Self::from_dynamic(&img))
    }

    /// Write the frame as PNG.
    pub fn save_png(&self, path: &Path) -> Result<(), FrameError> {
        self.to_dynamic()?
            .save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

fn check_channels(channels: u8) -> Result<(), FrameError> {
    if SUPPORTED_CHANNELS.contains(&channels) {
        Ok(())
    } else {
        Err(FrameError::UnsupportedChannels(channels))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("unsupported channel count {0}, expected 1, 3 or 4")]
    UnsupportedChannels(u8),
    #[error("pixel buffer has {got} bytes, expected {expected}")]
    BufferSize { got: usize, expected: usize },
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("io error: {0}")]
    Io(std::io::Error),
}
