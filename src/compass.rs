//! Translates bearings to 4/8/16-point compass directions. (N, NE, E, etc.)

use serde::{Deserialize, Serialize};

use crate::geodesy::normalize_degrees;

/// Represents a 16-point compass rose, clockwise from north.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    N,   // north
    NNE, // north-northeast
    NE,  // northeast
    ENE, // east-northeast
    E,   // east
    ESE, // east-southeast
    SE,  // southeast
    SSE, // south-southeast
    S,   // south
    SSW, // south-southwest
    SW,  // southwest
    WSW, // west-southwest
    W,   // west
    WNW, // west-northwest
    NW,  // northwest
    NNW, // north-northwest
}

const ROSE: [Direction; 16] = [
    Direction::N,
    Direction::NNE,
    Direction::NE,
    Direction::ENE,
    Direction::E,
    Direction::ESE,
    Direction::SE,
    Direction::SSE,
    Direction::S,
    Direction::SSW,
    Direction::SW,
    Direction::WSW,
    Direction::W,
    Direction::WNW,
    Direction::NW,
    Direction::NNW,
];

/// How finely the rose is divided when labelling a bearing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompassResolution {
    Four,
    Eight,
    Sixteen,
}

impl CompassResolution {
    pub fn points(&self) -> usize {
        match self {
            CompassResolution::Four => 4,
            CompassResolution::Eight => 8,
            CompassResolution::Sixteen => 16,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

impl Direction {
    /// Label a bearing (any finite value, normalized first) at the given
    /// resolution. Each sector is centered on its direction, so with 16
    /// points north covers [348.75, 11.25).
    pub fn from_bearing(bearing: f64, resolution: CompassResolution) -> Direction {
        let points = resolution.points();
        let sector = 360.0 / points as f64;
        let index = ((normalize_degrees(bearing) / sector) + 0.5).floor() as usize % points;

        ROSE[index * (16 / points)]
    }

    /// Center of this direction's sector in degrees.
    pub fn degrees(&self) -> f64 {
        let index = ROSE.iter().position(|d| d == self).unwrap_or(0);
        index as f64 * 22.5
    }

    pub fn name(&self) -> &str {
        match self {
            Direction::N => "north",
            Direction::NNE => "north-northeast",
            Direction::NE => "northeast",
            Direction::ENE => "east-northeast",
            Direction::E => "east",
            Direction::ESE => "east-southeast",
            Direction::SE => "southeast",
            Direction::SSE => "south-southeast",
            Direction::S => "south",
            Direction::SSW => "south-southwest",
            Direction::SW => "southwest",
            Direction::WSW => "west-southwest",
            Direction::W => "west",
            Direction::WNW => "west-northwest",
            Direction::NW => "northwest",
            Direction::NNW => "north-northwest",
        }
    }

    pub fn abbreviation(&self) -> &str {
        match self {
            Direction::N => "N",
            Direction::NNE => "NNE",
            Direction::NE => "NE",
            Direction::ENE => "ENE",
            Direction::E => "E",
            Direction::ESE => "ESE",
            Direction::SE => "SE",
            Direction::SSE => "SSE",
            Direction::S => "S",
            Direction::SSW => "SSW",
            Direction::SW => "SW",
            Direction::WSW => "WSW",
            Direction::W => "W",
            Direction::WNW => "WNW",
            Direction::NW => "NW",
            Direction::NNW => "NNW",
        }
    }
}
