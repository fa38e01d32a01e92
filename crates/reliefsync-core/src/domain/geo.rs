//! Geographic value types
//!
//! Coordinates and axis-aligned bounding boxes used by spatial-bounded sync
//! and by the local bounding-box query.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Mean Earth radius used for great-circle distances
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometres per degree of latitude (close enough everywhere)
const KM_PER_DEGREE_LAT: f64 = 111.32;

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Create coordinates, validating the ranges
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, DomainError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(DomainError::InvalidCoordinates(format!(
                "({latitude}, {longitude}) is out of range"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Great-circle (haversine) distance in kilometres
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// An axis-aligned latitude/longitude box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Create a bounding box; edges must not be inverted
    pub fn new(south: f64, north: f64, west: f64, east: f64) -> Result<Self, DomainError> {
        if south > north {
            return Err(DomainError::InvalidBounds(format!(
                "south {south} is above north {north}"
            )));
        }
        if west > east {
            return Err(DomainError::InvalidBounds(format!(
                "west {west} is east of {east}"
            )));
        }
        Ok(Self {
            south,
            north,
            west,
            east,
        })
    }

    /// Square box of `radius_km` around `center`, clamped to valid ranges
    pub fn around(center: &Coordinates, radius_km: f64) -> Self {
        let d_lat = radius_km / KM_PER_DEGREE_LAT;
        let cos_lat = center.latitude.to_radians().cos().abs().max(0.01);
        let d_lon = radius_km / (KM_PER_DEGREE_LAT * cos_lat);

        Self {
            south: (center.latitude - d_lat).max(-90.0),
            north: (center.latitude + d_lat).min(90.0),
            west: (center.longitude - d_lon).max(-180.0),
            east: (center.longitude + d_lon).min(180.0),
        }
    }

    pub fn center(&self) -> Coordinates {
        Coordinates {
            latitude: (self.south + self.north) / 2.0,
            longitude: (self.west + self.east) / 2.0,
        }
    }

    pub fn lat_span(&self) -> f64 {
        self.north - self.south
    }

    pub fn lon_span(&self) -> f64 {
        self.east - self.west
    }

    /// Half-open containment: south/west edges inclusive, north/east exclusive
    ///
    /// Adjacent grid cells therefore never both claim a point on their shared
    /// edge.
    pub fn contains(&self, point: &Coordinates) -> bool {
        point.latitude >= self.south
            && point.latitude < self.north
            && point.longitude >= self.west
            && point.longitude < self.east
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_validation() {
        assert!(Coordinates::new(91.0, 0.0).is_err());
        assert!(Coordinates::new(0.0, -181.0).is_err());
        assert!(Coordinates::new(29.95, -90.07).is_ok());
    }

    #[test]
    fn test_distance_is_symmetric_and_zero_on_self() {
        let a = Coordinates::new(29.95, -90.07).unwrap();
        let b = Coordinates::new(30.45, -91.19).unwrap();

        assert!(a.distance_km(&a) < 1e-9);
        assert!((a.distance_km(&b) - b.distance_km(&a)).abs() < 1e-9);
        // New Orleans to Baton Rouge is roughly 120 km
        let d = a.distance_km(&b);
        assert!(d > 100.0 && d < 130.0, "unexpected distance {d}");
    }

    #[test]
    fn test_bounding_box_rejects_inverted_edges() {
        assert!(BoundingBox::new(10.0, 5.0, 0.0, 1.0).is_err());
        assert!(BoundingBox::new(0.0, 1.0, 3.0, 2.0).is_err());
    }

    #[test]
    fn test_around_contains_center() {
        let center = Coordinates::new(35.0, -80.0).unwrap();
        let area = BoundingBox::around(&center, 25.0);

        assert!(area.contains(&center));
        let c = area.center();
        assert!((c.latitude - 35.0).abs() < 1e-9);
        assert!((c.longitude + 80.0).abs() < 1e-9);
        assert!(area.lon_span() > area.lat_span());
    }

    #[test]
    fn test_contains_is_half_open() {
        let area = BoundingBox::new(0.0, 1.0, 0.0, 1.0).unwrap();
        assert!(area.contains(&Coordinates::new(0.0, 0.0).unwrap()));
        assert!(!area.contains(&Coordinates::new(1.0, 0.5).unwrap()));
        assert!(!area.contains(&Coordinates::new(0.5, 1.0).unwrap()));
    }
}
