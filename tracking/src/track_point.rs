use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Quality above which a point counts as a real detection rather than a
/// tracked or interpolated guess.
pub const MIN_DETECTION_QUAL: i32 = 80;
pub const BEST_DETECTION_QUAL: i32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    pub fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

/// Position of one person in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub pixel: Point2<f64>,
    /// 0 for interpolated or extrapolated points, up to 100 for markers.
    pub quality: i32,
    pub marker_id: Option<i32>,
    pub color: Option<Color>,
}

impl Default for TrackPoint {
    fn default() -> Self {
        Self {
            pixel: Point2::origin(),
            quality: 0,
            marker_id: None,
            color: None,
        }
    }
}

impl TrackPoint {
    pub fn new(x: f64, y: f64, quality: i32) -> Self {
        Self {
            pixel: Point2::new(x, y),
            quality,
            ..Self::default()
        }
    }

    pub fn x(&self) -> f64 {
        self.pixel.x
    }

    pub fn y(&self) -> f64 {
        self.pixel.y
    }

    pub fn is_detection(&self) -> bool {
        self.quality > MIN_DETECTION_QUAL
    }

    pub fn distance_to(&self, other: &Point2<f64>) -> f64 {
        nalgebra::distance(&self.pixel, other)
    }

    /// Copy moved by `offset`, keeping all other attributes.
    pub fn shifted(&self, offset: Vector2<f64>) -> Self {
        Self {
            pixel: self.pixel + offset,
            ..self.clone()
        }
    }
}
