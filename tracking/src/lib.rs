pub mod track_person;
pub mod track_point;

pub use track_person::{TrackError, TrackPerson};
pub use track_point::{Color, TrackPoint};
