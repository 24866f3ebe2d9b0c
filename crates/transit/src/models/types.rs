//! Core data types and enums for transit data.

use std::fmt;

// ============================================================================
// Enums
// ============================================================================

/// The kind of vehicle a route is served by.
///
/// Governs default colors, zoom thresholds and offset eligibility. Variants
/// are declared from highest to lowest render priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum VehicleClass {
    Metro,
    Regional,
    Tram,
    Bus,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 4] = [Self::Metro, Self::Regional, Self::Tram, Self::Bus];

    /// Built-in display color, used when neither the route nor the static
    /// feed supply one.
    pub fn default_color(self) -> Rgb {
        match self {
            Self::Metro => Rgb::new(0, 114, 206),
            Self::Regional => Rgb::new(130, 20, 160),
            Self::Tram => Rgb::new(120, 190, 32),
            Self::Bus => Rgb::new(255, 130, 0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metro => "metro",
            Self::Regional => "regional",
            Self::Tram => "tram",
            Self::Bus => "bus",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GTFS-realtime occupancy status (codes 0-8)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Occupancy {
    Empty = 0,
    ManySeatsAvailable = 1,
    FewSeatsAvailable = 2,
    StandingRoomOnly = 3,
    CrushedStandingRoomOnly = 4,
    Full = 5,
    NotAcceptingPassengers = 6,
    NoDataAvailable = 7,
    NotBoardable = 8,
}

impl Occupancy {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Empty),
            1 => Some(Self::ManySeatsAvailable),
            2 => Some(Self::FewSeatsAvailable),
            3 => Some(Self::StandingRoomOnly),
            4 => Some(Self::CrushedStandingRoomOnly),
            5 => Some(Self::Full),
            6 => Some(Self::NotAcceptingPassengers),
            7 => Some(Self::NoDataAvailable),
            8 => Some(Self::NotBoardable),
            _ => None,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// 8-bit RGB display color
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a 6-digit hex color as found in GTFS (`"FF8000"`, optionally `#`-prefixed)
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }

        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
        Some(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn to_hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}

pub type Result<T> = std::result::Result<T, TransitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_class_priority_order() {
        assert!(VehicleClass::Metro < VehicleClass::Regional);
        assert!(VehicleClass::Tram < VehicleClass::Bus);
    }

    #[test]
    fn test_rgb_hex() {
        assert_eq!(Rgb::from_hex("FF8000"), Some(Rgb::new(255, 128, 0)));
        assert_eq!(Rgb::from_hex("#0072ce"), Some(Rgb::new(0, 114, 206)));
        assert_eq!(Rgb::from_hex("FFF"), None);
        assert_eq!(Rgb::from_hex("GG0000"), None);
        assert_eq!(Rgb::new(0, 114, 206).to_hex(), "0072CE");
    }

    #[test]
    fn test_occupancy_codes() {
        assert_eq!(Occupancy::from_code(0), Some(Occupancy::Empty));
        assert_eq!(Occupancy::from_code(8), Some(Occupancy::NotBoardable));
        assert_eq!(Occupancy::from_code(9), None);
    }
}
