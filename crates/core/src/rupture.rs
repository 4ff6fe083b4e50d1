//! Rupture rate tables.
//!
//! A [`RuptureTable`] is the immutable, index-addressable list of ruptures
//! of one branch (for one site, since distances are site specific).
//! Ground-motion data for the branch is stored in vectors aligned with the
//! table's indices, see [`crate::gm`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HazardError;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Tectonic setting of a rupture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TectonicType {
    ActiveShallow,
    SubductionInterface,
    SubductionSlab,
    Volcanic,
}

impl TectonicType {
    /// All variants, in grid-axis order.
    pub const ALL: [TectonicType; 4] = [
        Self::ActiveShallow,
        Self::SubductionInterface,
        Self::SubductionSlab,
        Self::Volcanic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ActiveShallow => "active_shallow",
            Self::SubductionInterface => "subduction_interface",
            Self::SubductionSlab => "subduction_slab",
            Self::Volcanic => "volcanic",
        }
    }

    /// Position along the tectonic-type axis of disaggregation grids.
    pub fn index(self) -> usize {
        match self {
            Self::ActiveShallow => 0,
            Self::SubductionInterface => 1,
            Self::SubductionSlab => 2,
            Self::Volcanic => 3,
        }
    }
}

impl fmt::Display for TectonicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a rupture comes from a modelled fault or distributed seismicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[serde(alias = "flt")]
    Fault,
    #[serde(alias = "ds")]
    Distributed,
}

impl SourceType {
    pub const ALL: [SourceType; 2] = [Self::Fault, Self::Distributed];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fault => "fault",
            Self::Distributed => "distributed",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Fault => 0,
            Self::Distributed => 1,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Rupture
// ---------------------------------------------------------------------------

/// A single rupture with its annual recurrence rate and site distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rupture {
    pub id: String,
    pub name: String,
    pub annual_rate: f64,
    pub magnitude: f64,
    pub tectonic_type: TectonicType,
    pub source_type: SourceType,
    /// Source-to-site distance (rrup, km).
    pub distance: f64,
}

// ---------------------------------------------------------------------------
// RuptureTable
// ---------------------------------------------------------------------------

/// Immutable table of ruptures with unique ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "Vec<Rupture>", try_from = "Vec<Rupture>")]
pub struct RuptureTable {
    ruptures: Vec<Rupture>,
    index: HashMap<String, usize>,
}

impl RuptureTable {
    /// Validate and index `ruptures`.
    ///
    /// Rejects duplicate or empty ids, negative or non-finite rates, and
    /// non-finite magnitudes or distances.
    pub fn new(ruptures: Vec<Rupture>) -> Result<Self, HazardError> {
        let mut index = HashMap::with_capacity(ruptures.len());
        for (i, rup) in ruptures.iter().enumerate() {
            if rup.id.is_empty() {
                return Err(HazardError::Validation(format!(
                    "Rupture at index {i} has an empty id"
                )));
            }
            if !rup.annual_rate.is_finite() || rup.annual_rate < 0.0 {
                return Err(HazardError::DataIntegrity(format!(
                    "Rupture {} has invalid annual rate {}",
                    rup.id, rup.annual_rate
                )));
            }
            if !rup.magnitude.is_finite() {
                return Err(HazardError::DataIntegrity(format!(
                    "Rupture {} has invalid magnitude {}",
                    rup.id, rup.magnitude
                )));
            }
            if !rup.distance.is_finite() || rup.distance < 0.0 {
                return Err(HazardError::DataIntegrity(format!(
                    "Rupture {} has invalid distance {}",
                    rup.id, rup.distance
                )));
            }
            if index.insert(rup.id.clone(), i).is_some() {
                return Err(HazardError::Validation(format!(
                    "Duplicate rupture id \"{}\"",
                    rup.id
                )));
            }
        }
        Ok(Self { ruptures, index })
    }

    pub fn len(&self) -> usize {
        self.ruptures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ruptures.is_empty()
    }

    pub fn ruptures(&self) -> &[Rupture] {
        &self.ruptures
    }

    pub fn get(&self, idx: usize) -> Option<&Rupture> {
        self.ruptures.get(idx)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rupture> {
        self.ruptures.iter()
    }

    /// Sum of annual rates over all ruptures.
    pub fn total_rate(&self) -> f64 {
        self.ruptures.iter().map(|r| r.annual_rate).sum()
    }
}

impl From<RuptureTable> for Vec<Rupture> {
    fn from(table: RuptureTable) -> Self {
        table.ruptures
    }
}

impl TryFrom<Vec<Rupture>> for RuptureTable {
    type Error = HazardError;

    fn try_from(ruptures: Vec<Rupture>) -> Result<Self, Self::Error> {
        Self::new(ruptures)
    }
}

// ---------------------------------------------------------------------------
// Source model helpers
// ---------------------------------------------------------------------------

/// Annual rate of a fault rupture from its median recurrence interval.
pub fn fault_rupture_rate(recurrence_interval: f64) -> Result<f64, HazardError> {
    if !(recurrence_interval > 0.0 && recurrence_interval.is_finite()) {
        return Err(HazardError::Validation(format!(
            "Recurrence interval must be positive, got {recurrence_interval}"
        )));
    }
    Ok(1.0 / recurrence_interval)
}

/// Name of a distributed seismicity point source.
pub fn distributed_fault_name(lat: f64, lon: f64, depth: f64) -> String {
    format!("{lat:?}_{lon:?}_{depth:?}")
}

/// Unique name of one magnitude bin of a distributed seismicity source.
pub fn distributed_rupture_name(
    lat: f64,
    lon: f64,
    depth: f64,
    magnitude: f64,
    tectonic_type: TectonicType,
) -> String {
    format!(
        "{}--{magnitude:?}_{tectonic_type}",
        distributed_fault_name(lat, lon, depth)
    )
}

/// A Gutenberg-Richter point source of distributed seismicity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedSource {
    pub lat: f64,
    pub lon: f64,
    pub depth: f64,
    /// Gutenberg-Richter b-value.
    pub b: f64,
    pub m_min: f64,
    pub m_cutoff: f64,
    pub n_mags: usize,
    /// Total cumulative annual rate of events above `m_min`.
    pub total_cumulative_rate: f64,
    pub tectonic_type: TectonicType,
    pub distance: f64,
}

impl DistributedSource {
    /// Discretise the source into one rupture per magnitude.
    ///
    /// Magnitudes are evenly spaced over `[m_min, m_cutoff]`. Each bin gets
    /// the trapezoidal average of the G-R density at its edges (the density
    /// is zero above the last magnitude), rescaled so the bin rates sum to
    /// `total_cumulative_rate`.
    pub fn to_ruptures(&self) -> Result<Vec<Rupture>, HazardError> {
        if self.n_mags == 0 {
            return Err(HazardError::Validation(
                "Distributed source needs at least one magnitude".into(),
            ));
        }
        if self.m_cutoff < self.m_min {
            return Err(HazardError::Validation(format!(
                "m_cutoff ({}) must be >= m_min ({})",
                self.m_cutoff, self.m_min
            )));
        }
        if !self.total_cumulative_rate.is_finite() || self.total_cumulative_rate < 0.0 {
            return Err(HazardError::DataIntegrity(format!(
                "Invalid total cumulative rate {}",
                self.total_cumulative_rate
            )));
        }

        let mags: Vec<f64> = if self.n_mags == 1 {
            vec![self.m_min]
        } else {
            let step = (self.m_cutoff - self.m_min) / (self.n_mags - 1) as f64;
            (0..self.n_mags)
                .map(|i| self.m_min + step * i as f64)
                .collect()
        };

        let mut density: Vec<f64> = mags
            .iter()
            .map(|m| 10f64.powf(-self.b * (m - self.m_min)))
            .collect();
        density.push(0.0);

        let raw: Vec<f64> = density.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
        let raw_total: f64 = raw.iter().sum();

        Ok(mags
            .iter()
            .zip(raw)
            .map(|(&mag, r)| {
                let name = distributed_rupture_name(
                    self.lat,
                    self.lon,
                    self.depth,
                    mag,
                    self.tectonic_type,
                );
                let annual_rate = if raw_total > 0.0 {
                    self.total_cumulative_rate * r / raw_total
                } else {
                    0.0
                };
                Rupture {
                    id: name.clone(),
                    name,
                    annual_rate,
                    magnitude: mag,
                    tectonic_type: self.tectonic_type,
                    source_type: SourceType::Distributed,
                    distance: self.distance,
                }
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn rupture(id: &str, rate: f64) -> Rupture {
        Rupture {
            id: id.to_string(),
            name: id.to_string(),
            annual_rate: rate,
            magnitude: 7.0,
            tectonic_type: TectonicType::ActiveShallow,
            source_type: SourceType::Fault,
            distance: 12.0,
        }
    }

    // -- RuptureTable --

    #[test]
    fn table_indexes_ids() {
        let table = RuptureTable::new(vec![rupture("a", 0.01), rupture("b", 0.02)]).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.index_of("b"), Some(1));
        assert_eq!(table.index_of("c"), None);
        assert!((table.total_rate() - 0.03).abs() < 1e-12);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let result = RuptureTable::new(vec![rupture("a", 0.01), rupture("a", 0.02)]);
        assert_matches!(result, Err(HazardError::Validation(_)));
    }

    #[test]
    fn negative_rate_is_integrity_error() {
        let result = RuptureTable::new(vec![rupture("a", -0.01)]);
        assert_matches!(result, Err(HazardError::DataIntegrity(_)));
    }

    #[test]
    fn table_deserializes_with_validation() {
        let json = serde_json::json!([
            {"id": "x", "name": "x", "annual_rate": 0.1, "magnitude": 6.5,
             "tectonic_type": "volcanic", "source_type": "ds", "distance": 30.0}
        ]);
        let table: RuptureTable = serde_json::from_value(json).unwrap();
        assert_eq!(table.get(0).unwrap().source_type, SourceType::Distributed);

        let dup = serde_json::json!([
            {"id": "x", "name": "x", "annual_rate": 0.1, "magnitude": 6.5,
             "tectonic_type": "volcanic", "source_type": "fault", "distance": 30.0},
            {"id": "x", "name": "x", "annual_rate": 0.1, "magnitude": 6.5,
             "tectonic_type": "volcanic", "source_type": "fault", "distance": 30.0}
        ]);
        assert!(serde_json::from_value::<RuptureTable>(dup).is_err());
    }

    // -- source helpers --

    #[test]
    fn fault_rate_is_reciprocal() {
        assert!((fault_rupture_rate(500.0).unwrap() - 0.002).abs() < 1e-15);
        assert!(fault_rupture_rate(0.0).is_err());
    }

    #[test]
    fn distributed_names() {
        let name = distributed_rupture_name(-43.5, 172.5, 10.0, 5.0, TectonicType::ActiveShallow);
        assert_eq!(name, "-43.5_172.5_10.0--5.0_active_shallow");
    }

    #[test]
    fn gutenberg_richter_rates_sum_to_total() {
        let source = DistributedSource {
            lat: -43.5,
            lon: 172.5,
            depth: 10.0,
            b: 1.0,
            m_min: 5.0,
            m_cutoff: 7.0,
            n_mags: 21,
            total_cumulative_rate: 0.05,
            tectonic_type: TectonicType::ActiveShallow,
            distance: 15.0,
        };
        let ruptures = source.to_ruptures().unwrap();
        assert_eq!(ruptures.len(), 21);
        let total: f64 = ruptures.iter().map(|r| r.annual_rate).sum();
        assert!((total - 0.05).abs() < 1e-12);
        // Rates decrease with magnitude.
        assert!(ruptures.windows(2).all(|w| w[0].annual_rate > w[1].annual_rate));
        assert!((ruptures[20].magnitude - 7.0).abs() < 1e-12);
        assert!(RuptureTable::new(ruptures).is_ok());
    }

    #[test]
    fn single_magnitude_source_takes_full_rate() {
        let source = DistributedSource {
            lat: 0.0,
            lon: 0.0,
            depth: 5.0,
            b: 1.1,
            m_min: 6.0,
            m_cutoff: 6.0,
            n_mags: 1,
            total_cumulative_rate: 0.01,
            tectonic_type: TectonicType::Volcanic,
            distance: 5.0,
        };
        let ruptures = source.to_ruptures().unwrap();
        assert_eq!(ruptures.len(), 1);
        assert!((ruptures[0].annual_rate - 0.01).abs() < 1e-15);
    }
}
