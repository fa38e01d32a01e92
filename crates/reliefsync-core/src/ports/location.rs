//! Location provider port
//!
//! Spatial-bounded sync centers its grid on the device location. Platforms
//! without a location service can use [`FixedLocation`].

use crate::domain::Coordinates;

/// Port trait for the device's last known location
pub trait ILocationProvider: Send + Sync {
    /// Last known location, or `None` if it was never determined
    fn current_location(&self) -> Option<Coordinates>;
}

/// A location that never changes (configured or absent)
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedLocation(Option<Coordinates>);

impl FixedLocation {
    pub fn new(location: Coordinates) -> Self {
        Self(Some(location))
    }

    pub fn unknown() -> Self {
        Self(None)
    }
}

impl ILocationProvider for FixedLocation {
    fn current_location(&self) -> Option<Coordinates> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_location() {
        let here = Coordinates::new(30.0, -90.0).unwrap();
        assert_eq!(FixedLocation::new(here).current_location(), Some(here));
        assert!(FixedLocation::unknown().current_location().is_none());
    }
}
