//! Geodesy utilities: great-circle distance, forward azimuth, compass labels.
//!
//! Pure functions over [`Position`] snapshots; no device access.

use crate::location::Position;

/// Mean Earth radius in meters (haversine).
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two positions in meters.
pub fn distance_meters(a: &Position, b: &Position) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Initial bearing (forward azimuth) from `a` to `b`, in degrees [0, 360).
pub fn bearing_degrees(a: &Position, b: &Position) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// One of the eight cardinal/ordinal compass directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compass {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Compass {
    /// Lowercase label suitable for spoken instructions.
    pub fn label(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::NorthEast => "north-east",
            Self::East => "east",
            Self::SouthEast => "south-east",
            Self::South => "south",
            Self::SouthWest => "south-west",
            Self::West => "west",
            Self::NorthWest => "north-west",
        }
    }
}

impl std::fmt::Display for Compass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Map a bearing in degrees to the nearest of the eight compass directions.
///
/// Uses `round(bearing / 45) mod 8`, so 0° and 360° both map to north.
pub fn bearing_to_compass(bearing: f64) -> Compass {
    const DIRECTIONS: [Compass; 8] = [
        Compass::North,
        Compass::NorthEast,
        Compass::East,
        Compass::SouthEast,
        Compass::South,
        Compass::SouthWest,
        Compass::West,
        Compass::NorthWest,
    ];
    let sector = (bearing.rem_euclid(360.0) / 45.0).round() as usize % 8;
    DIRECTIONS[sector]
}
