//! Site the hazard is computed for.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HazardError;

/// Location and soil properties of the site a result was computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    #[serde(rename = "name")]
    pub station_name: String,
    pub lat: f64,
    pub lon: f64,
    /// Time-averaged shear-wave velocity over the top 30 m (m/s).
    pub vs30: f64,
    /// Depth to Vs = 1.0 km/s (m).
    #[serde(default)]
    pub z1p0: Option<f64>,
    /// Depth to Vs = 2.5 km/s (km).
    #[serde(default)]
    pub z2p5: Option<f64>,
}

impl SiteInfo {
    pub fn new(
        station_name: impl Into<String>,
        lat: f64,
        lon: f64,
        vs30: f64,
    ) -> Result<Self, HazardError> {
        let site = Self {
            station_name: station_name.into(),
            lat,
            lon,
            vs30,
            z1p0: None,
            z2p5: None,
        };
        site.validate()?;
        Ok(site)
    }

    pub fn with_basin_depths(mut self, z1p0: Option<f64>, z2p5: Option<f64>) -> Self {
        self.z1p0 = z1p0;
        self.z2p5 = z2p5;
        self
    }

    pub fn validate(&self) -> Result<(), HazardError> {
        if self.station_name.trim().is_empty() {
            return Err(HazardError::Validation(
                "Station name must not be empty".into(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=360.0).contains(&self.lon) {
            return Err(HazardError::Validation(format!(
                "Station {} has invalid coordinates ({}, {})",
                self.station_name, self.lat, self.lon
            )));
        }
        if !(self.vs30.is_finite() && self.vs30 > 0.0) {
            return Err(HazardError::Validation(format!(
                "Station {} has invalid vs30 {}",
                self.station_name, self.vs30
            )));
        }
        Ok(())
    }
}

impl fmt::Display for SiteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: Option<f64>| v.map_or_else(|| "None".to_string(), |v| v.to_string());
        write!(
            f,
            "{}_{}_{}_{}_{}",
            self.lon,
            self.lat,
            self.vs30,
            opt(self.z1p0),
            opt(self.z2p5)
        )
    }
}
