//! Map geometry
//!
//! Positions and viewport bounds shared by the live map and trip playback.

use serde::{Deserialize, Serialize};

/// A WGS84 coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude
    pub lat: f64,
    /// Longitude
    pub lng: f64,
}

impl Position {
    /// Create a new position
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check if `other` lies further than `epsilon` degrees away on either axis
    pub fn moved_beyond(&self, other: &Position, epsilon: f64) -> bool {
        (self.lat - other.lat).abs() > epsilon || (self.lng - other.lng).abs() > epsilon
    }
}

/// Viewport rectangle the map should be fitted to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Minimum latitude / longitude corner
    pub south_west: Position,
    /// Maximum latitude / longitude corner
    pub north_east: Position,
    /// Relative padding the renderer applies around the rectangle
    pub padding: f64,
}

impl Bounds {
    /// Smallest rectangle enclosing all `positions`, or `None` if there are none
    pub fn enclosing<'a, I>(positions: I, padding: f64) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Position>,
    {
        let mut iter = positions.into_iter();
        let first = *iter.next()?;

        let (south_west, north_east) = iter.fold((first, first), |(sw, ne), p| {
            (
                Position::new(sw.lat.min(p.lat), sw.lng.min(p.lng)),
                Position::new(ne.lat.max(p.lat), ne.lng.max(p.lng)),
            )
        });

        Some(Self {
            south_west,
            north_east,
            padding,
        })
    }

    /// Check whether a position lies inside the (unpadded) rectangle
    pub fn contains(&self, p: &Position) -> bool {
        p.lat >= self.south_west.lat
            && p.lat <= self.north_east.lat
            && p.lng >= self.south_west.lng
            && p.lng <= self.north_east.lng
    }
}
