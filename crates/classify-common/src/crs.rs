//! Coordinate Reference System descriptor.
//!
//! The engine never transforms coordinates; the CRS is carried through from
//! the point source to the output and only consulted for the "is geographic"
//! flag used when scaling the duplicate point tolerance.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Geographic (lat/lon) codes recognised by [`Crs::from_authid`].
const GEOGRAPHIC_CODES: &[&str] = &["EPSG:4326", "CRS:84", "EPSG:4269", "EPSG:4258", "EPSG:4283"];

/// A coordinate reference system identified by its authority id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    /// Authority identifier, e.g. "EPSG:2193"
    pub authid: String,
    /// Whether coordinates are longitude/latitude in degrees
    #[serde(default)]
    pub geographic: bool,
}

impl Crs {
    pub fn new(authid: impl Into<String>, geographic: bool) -> Self {
        Self {
            authid: authid.into(),
            geographic,
        }
    }

    /// Build a CRS from an authority id, inferring the geographic flag for
    /// well-known codes.
    ///
    /// Accepts formats like "EPSG:4326", "epsg:4326" or "CRS:84".
    pub fn from_authid(authid: &str) -> Self {
        let normalized = authid.trim().to_uppercase();
        let geographic = GEOGRAPHIC_CODES.contains(&normalized.as_str());
        Self {
            authid: normalized,
            geographic,
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        self.geographic
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self {
            authid: String::new(),
            geographic: false,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.authid.is_empty() {
            write!(f, "unknown")
        } else {
            write!(f, "{}", self.authid)
        }
    }
}
