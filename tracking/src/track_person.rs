use std::collections::VecDeque;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::track_point::{Color, TrackPoint, BEST_DETECTION_QUAL};

/// A new edge point further than this many last steps away from the
/// extrapolated position is treated as a tracking error.
pub const EXTRAPOLATE_FACTOR: f64 = 3.0;
/// Height of a person nothing is known about yet.
pub const MIN_HEIGHT: f64 = -100_000.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackError {
    #[error("frames [{start}, {end}] exceed the stored range [{first}, {last}]")]
    OutOfRange {
        start: i64,
        end: i64,
        first: i64,
        last: i64,
    },
    #[error("removing frames [{start}, {end}] would leave a gap in the trajectory")]
    NonContiguous { start: i64, end: i64 },
    #[error("frame range [{start}, {end}] is reversed")]
    Reversed { start: i64, end: i64 },
}

/// Trajectory of one pedestrian: one point per frame, without gaps, from
/// `first_frame` through `last_frame`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackPerson {
    nr: u32,
    marker_id: Option<i32>,
    height: f64,
    height_count: u32,
    first_frame: i64,
    new_reco: bool,
    color: Color,
    color_count: u32,
    comment: String,
    nr_in_bg: u32,
    points: VecDeque<TrackPoint>,
}

impl TrackPerson {
    /// Start a trajectory with `point` at `frame`.
    pub fn new(nr: u32, frame: i64, point: TrackPoint) -> Self {
        Self {
            nr,
            marker_id: point.marker_id,
            height: MIN_HEIGHT,
            height_count: 0,
            first_frame: frame,
            new_reco: true,
            color: point.color.unwrap_or_default(),
            color_count: 1,
            comment: String::new(),
            nr_in_bg: 0,
            points: VecDeque::from([point]),
        }
    }

    pub fn nr(&self) -> u32 {
        self.nr
    }

    pub fn first_frame(&self) -> i64 {
        self.first_frame
    }

    pub fn last_frame(&self) -> i64 {
        self.first_frame + self.points.len() as i64 - 1
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Add `point` at `last_frame() + 1`.
    pub fn append(&mut self, point: TrackPoint) {
        self.points.push_back(point);
    }

    pub fn track_point_exist(&self, frame: i64) -> bool {
        frame >= self.first_frame && frame <= self.last_frame()
    }

    pub fn track_point_at(&self, frame: i64) -> Result<&TrackPoint, TrackError> {
        self.index_of(frame)
            .map(|i| &self.points[i])
            .ok_or(TrackError::OutOfRange {
                start: frame,
                end: frame,
                first: self.first_frame,
                last: self.last_frame(),
            })
    }

    /// Point `i` frames after `first_frame`.
    pub fn at(&self, i: usize) -> Option<&TrackPoint> {
        self.points.get(i)
    }

    pub fn first(&self) -> Option<&TrackPoint> {
        self.points.front()
    }

    pub fn last(&self) -> Option<&TrackPoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackPoint> + '_ {
        self.points.iter()
    }

    /// Overwrite the point stored at `frame`.
    pub fn replace_track_point(&mut self, frame: i64, point: TrackPoint) -> Result<(), TrackError> {
        let first = self.first_frame;
        let last = self.last_frame();
        let i = self.index_of(frame).ok_or(TrackError::OutOfRange {
            start: frame,
            end: frame,
            first,
            last,
        })?;
        self.points[i] = point;
        Ok(())
    }

    /// Remove the inclusive frame range `[start, end]`. Only a prefix, a
    /// suffix or the whole trajectory may be removed.
    pub fn remove_frames_between(&mut self, start: i64, end: i64) -> Result<(), TrackError> {
        if start > end {
            return Err(TrackError::Reversed { start, end });
        }
        let first = self.first_frame;
        let last = self.last_frame();
        if start < first || end > last {
            return Err(TrackError::OutOfRange {
                start,
                end,
                first,
                last,
            });
        }
        if start != first && end != last {
            return Err(TrackError::NonContiguous { start, end });
        }

        let from = (start - first) as usize;
        let to = (end - first) as usize + 1;
        self.points.drain(from..to);
        if start == first {
            self.first_frame = end + 1;
        }
        Ok(())
    }

    /// Absolute pixel distance between the points at `frame` and `frame + 1`.
    pub fn distance_to_next_frame(&self, frame: i64) -> Option<f64> {
        let here = self.track_point_at(frame).ok()?;
        let next = self.track_point_at(frame + 1).ok()?;
        Some(here.distance_to(&next.pixel))
    }

    /// Insert a point coming from tracking or recognition.
    ///
    /// Outside the stored range the trajectory grows up to `frame`, linearly
    /// interpolating skipped frames with quality 0. With `extrapolate` set, a
    /// point adjacent to the range that jumps far away from the extrapolated
    /// position is replaced by that position (quality 0), or rejected when the
    /// two edge points are already extrapolated. Inside the range the point
    /// only replaces the stored one if its quality is strictly better.
    ///
    /// Returns whether the trajectory was modified.
    pub fn insert_at_frame(&mut self, frame: i64, point: TrackPoint, extrapolate: bool) -> bool {
        if self.points.is_empty() {
            self.first_frame = frame;
            self.points.push_back(point);
            return true;
        }
        if frame > self.last_frame() {
            self.insert_after(frame, point, extrapolate)
        } else if frame < self.first_frame {
            self.insert_before(frame, point, extrapolate)
        } else {
            self.insert_inside(frame, point)
        }
    }

    fn insert_after(&mut self, frame: i64, point: TrackPoint, extrapolate: bool) -> bool {
        let last_frame = self.last_frame();
        let gap = frame - last_frame;
        let Some(edge) = self.points.back().cloned() else {
            return false;
        };

        if gap > 1 {
            for filler in interpolate(&edge, &point, gap) {
                self.points.push_back(filler);
            }
            self.points.push_back(point);
            return true;
        }

        if extrapolate && self.points.len() > 1 {
            let inner = &self.points[self.points.len() - 2];
            match self.check_jump(&edge, inner, &point) {
                Jump::Plausible => {}
                Jump::Extrapolated(guess) => {
                    warn!(
                        person = self.nr,
                        from = last_frame,
                        to = frame,
                        "large jump in speed and direction, extrapolating instead of tracking"
                    );
                    self.points.push_back(guess);
                    return true;
                }
                Jump::Rejected => {
                    warn!(
                        person = self.nr,
                        frame, "third large jump in a row, track point not inserted"
                    );
                    return false;
                }
            }
        }
        self.points.push_back(point);
        true
    }

    fn insert_before(&mut self, frame: i64, point: TrackPoint, extrapolate: bool) -> bool {
        let gap = self.first_frame - frame;
        let Some(edge) = self.points.front().cloned() else {
            return false;
        };

        if gap > 1 {
            for filler in interpolate(&edge, &point, gap) {
                self.points.push_front(filler);
            }
            self.points.push_front(point);
            self.first_frame = frame;
            return true;
        }

        if extrapolate && self.points.len() > 1 {
            let inner = &self.points[1];
            match self.check_jump(&edge, inner, &point) {
                Jump::Plausible => {}
                Jump::Extrapolated(guess) => {
                    warn!(
                        person = self.nr,
                        from = self.first_frame,
                        to = frame,
                        "large jump in speed and direction, extrapolating instead of tracking"
                    );
                    self.points.push_front(guess);
                    self.first_frame = frame;
                    return true;
                }
                Jump::Rejected => {
                    warn!(
                        person = self.nr,
                        frame, "third large jump in a row, track point not inserted"
                    );
                    return false;
                }
            }
        }
        self.points.push_front(point);
        self.first_frame = frame;
        true
    }

    /// Compare `point` against the position extrapolated from the step
    /// `inner -> edge`.
    fn check_jump(&self, edge: &TrackPoint, inner: &TrackPoint, point: &TrackPoint) -> Jump {
        let step = edge.pixel - inner.pixel;
        let guess = edge.shifted(step);
        let distance = guess.distance_to(&point.pixel);
        if distance <= EXTRAPOLATE_FACTOR * step.norm() || distance <= 3.0 {
            return Jump::Plausible;
        }
        if edge.quality == 0 && inner.quality == 0 {
            return Jump::Rejected;
        }
        Jump::Extrapolated(TrackPoint {
            quality: 0,
            ..guess
        })
    }

    fn insert_inside(&mut self, frame: i64, point: TrackPoint) -> bool {
        let Some(i) = self.index_of(frame) else {
            return false;
        };
        if point.quality <= self.points[i].quality {
            return false;
        }

        let step = if i > 0 {
            Some(self.points[i].pixel - self.points[i - 1].pixel)
        } else if i + 1 < self.points.len() {
            Some(self.points[i + 1].pixel - self.points[i].pixel)
        } else {
            None
        };
        if let Some(step) = step {
            let distance = self.points[i].distance_to(&point.pixel);
            if distance > 1.5 * step.norm() && distance > 3.0 {
                warn!(
                    person = self.nr,
                    frame, "replacing track point moves the trajectory abruptly"
                );
                self.fade_quality_towards(i);
            }
        }

        let mut point = point;
        point.quality = point.quality.min(BEST_DETECTION_QUAL);
        self.points[i] = point;
        true
    }

    /// Lower the quality of the tracked (non-detection) points leading to and
    /// from index `i`, proportionally to their distance from the next detection.
    fn fade_quality_towards(&mut self, i: usize) {
        let mut back = 1;
        while back <= i && !self.points[i - back].is_detection() {
            back += 1;
        }
        for k in 1..back.saturating_sub(1) {
            let q = &mut self.points[i - k].quality;
            *q = (k as i32 * *q) / back as i32;
        }

        let mut ahead = 1;
        while i + ahead < self.points.len() && !self.points[i + ahead].is_detection() {
            ahead += 1;
        }
        for k in 1..ahead.saturating_sub(1) {
            let q = &mut self.points[i + k].quality;
            *q = (k as i32 * *q) / ahead as i32;
        }
    }

    fn index_of(&self, frame: i64) -> Option<usize> {
        self.track_point_exist(frame)
            .then(|| (frame - self.first_frame) as usize)
    }

    // -- Attributes -------------------------------------------------------------

    pub fn marker_id(&self) -> Option<i32> {
        self.marker_id
    }

    pub fn set_marker_id(&mut self, marker_id: Option<i32>) {
        info!(person = self.nr, ?marker_id, "set person marker id");
        self.marker_id = marker_id;
    }

    /// Adopt the marker id seen on a track point, reporting conflicting ids.
    pub fn sync_marker_id(&mut self, seen: Option<i32>) {
        let Some(seen) = seen else {
            return;
        };
        if self.marker_id.is_none() {
            self.set_marker_id(Some(seen));
        }
        if self.marker_id != Some(seen) {
            error!(
                person = self.nr,
                track_point = seen,
                person_marker = ?self.marker_id,
                "two marker ids found for one trajectory"
            );
        }
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn set_height(&mut self, height: f64) {
        self.height = height;
    }

    /// Fold in one height measurement: `z` is the distance to the camera,
    /// `altitude` the camera height above the floor.
    pub fn set_height_from(&mut self, z: f64, altitude: f64) {
        let count = self.height_count as f64;
        self.height = (self.height * count + (altitude - z)) / (count + 1.0);
        self.height_count += 1;
    }

    pub fn reset_height(&mut self) {
        self.height = MIN_HEIGHT;
        self.height_count = 0;
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn color_count(&self) -> u32 {
        self.color_count
    }

    /// Running average over every color added so far.
    pub fn add_color(&mut self, color: Color) {
        let n = self.color_count;
        let avg = |old: u8, new: u8| ((n * old as u32 + new as u32) / (n + 1)) as u8;
        self.color = Color {
            red: avg(self.color.red, color.red),
            green: avg(self.color.green, color.green),
            blue: avg(self.color.blue, color.blue),
        };
        self.color_count += 1;
    }

    pub fn new_reco(&self) -> bool {
        self.new_reco
    }

    pub fn set_new_reco(&mut self, new_reco: bool) {
        self.new_reco = new_reco;
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    /// Successive frames the person has been classified as background.
    pub fn nr_in_bg(&self) -> u32 {
        self.nr_in_bg
    }

    pub fn set_nr_in_bg(&mut self, n: u32) {
        self.nr_in_bg = n;
    }
}

enum Jump {
    Plausible,
    Extrapolated(TrackPoint),
    Rejected,
}

/// The `steps - 1` points strictly between `from` and `to`, ordered
/// from `from` outwards, all with quality 0.
fn interpolate(from: &TrackPoint, to: &TrackPoint, steps: i64) -> Vec<TrackPoint> {
    let step: Vector2<f64> = (to.pixel - from.pixel) / steps as f64;
    (1..steps)
        .map(|k| TrackPoint {
            quality: 0,
            ..from.shifted(step * k as f64)
        })
        .collect()
}
