//! Intensity measure value objects.
//!
//! An [`Im`] is an [`ImType`] plus an [`ImComponent`]. Spectral
//! acceleration carries its oscillator period inside the variant, so an IM
//! can never exist with a period it should not have (or without one it
//! needs).
//!
//! Canonical strings follow the `PGA` / `pSA_0.5` convention; the file
//! format swaps `.` for `p` (`pSA_0p5`) and the OpenQuake form is
//! `SA(0.5)`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HazardError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default pSA periods (seconds) used for spectra and project generation.
pub const DEFAULT_PSA_PERIODS: &[f64] = &[
    0.01, 0.02, 0.03, 0.04, 0.05, 0.075, 0.1, 0.12, 0.15, 0.17, 0.2, 0.25, 0.3, 0.4, 0.5, 0.6,
    0.7, 0.75, 0.8, 0.9, 1.0, 1.25, 1.5, 2.0, 2.5, 3.0, 4.0, 5.0, 6.0, 7.5, 10.0,
];

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

/// Oscillator period in seconds. Always finite and strictly positive.
#[derive(Debug, Clone, Copy)]
pub struct Period(f64);

impl Period {
    pub fn new(seconds: f64) -> Result<Self, HazardError> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(HazardError::UnsupportedIm {
                im: format!("pSA_{seconds}"),
                reason: "pSA period must be a finite positive number of seconds".into(),
            });
        }
        Ok(Self(seconds))
    }

    pub fn seconds(self) -> f64 {
        self.0
    }
}

impl PartialEq for Period {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Period {}

impl Hash for Period {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Period {
    /// Whole periods keep one decimal (`1.0`), matching the stored IM names.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.fract() == 0.0 {
            write!(f, "{:.1}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

// ---------------------------------------------------------------------------
// ImType
// ---------------------------------------------------------------------------

/// Kind of intensity measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImType {
    Pga,
    Pgv,
    PSa(Period),
    Cav,
    Ai,
    Asi,
    Dsi,
    Si,
    Ds575,
    Ds595,
}

impl ImType {
    /// Name without the period, e.g. `"pSA"` or `"Ds575"`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Pga => "PGA",
            Self::Pgv => "PGV",
            Self::PSa(_) => "pSA",
            Self::Cav => "CAV",
            Self::Ai => "AI",
            Self::Asi => "ASI",
            Self::Dsi => "DSI",
            Self::Si => "SI",
            Self::Ds575 => "Ds575",
            Self::Ds595 => "Ds595",
        }
    }

    pub fn period(self) -> Option<Period> {
        match self {
            Self::PSa(period) => Some(period),
            _ => None,
        }
    }

    /// Components a ground-motion model can provide for this type.
    pub fn supported_components(self) -> &'static [ImComponent] {
        match self {
            Self::Pga | Self::PSa(_) => &[
                ImComponent::RotD50,
                ImComponent::RotD100,
                ImComponent::Larger,
            ],
            Self::Pgv
            | Self::Cav
            | Self::Ai
            | Self::Asi
            | Self::Dsi
            | Self::Si
            | Self::Ds575
            | Self::Ds595 => &[ImComponent::RotD50],
        }
    }

    fn from_name(name: &str, period: Option<Period>) -> Option<Self> {
        let im_type = match (name, period) {
            ("pSA", Some(p)) => Self::PSa(p),
            (_, Some(_)) => return None,
            ("PGA", None) => Self::Pga,
            ("PGV", None) => Self::Pgv,
            ("CAV", None) => Self::Cav,
            ("AI", None) => Self::Ai,
            ("ASI", None) => Self::Asi,
            ("DSI", None) => Self::Dsi,
            ("SI", None) => Self::Si,
            ("Ds575", None) => Self::Ds575,
            ("Ds595", None) => Self::Ds595,
            _ => return None,
        };
        Some(im_type)
    }
}

impl fmt::Display for ImType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PSa(period) => write!(f, "pSA_{period}"),
            other => f.write_str(other.name()),
        }
    }
}

// ---------------------------------------------------------------------------
// ImComponent
// ---------------------------------------------------------------------------

/// Horizontal component definition of the ground motion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImComponent {
    #[default]
    RotD50,
    RotD100,
    Larger,
}

impl ImComponent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RotD50 => "RotD50",
            Self::RotD100 => "RotD100",
            Self::Larger => "Larger",
        }
    }
}

impl fmt::Display for ImComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImComponent {
    type Err = HazardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RotD50" => Ok(Self::RotD50),
            "RotD100" => Ok(Self::RotD100),
            "Larger" => Ok(Self::Larger),
            other => Err(HazardError::UnsupportedIm {
                im: other.to_string(),
                reason: "unknown IM component, expected RotD50, RotD100 or Larger".into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Im
// ---------------------------------------------------------------------------

/// An intensity measure: type (with period for pSA) and component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "ImRecord", try_from = "ImRecord")]
pub struct Im {
    im_type: ImType,
    component: ImComponent,
}

impl Im {
    /// RotD50 IM of the given type.
    pub fn new(im_type: ImType) -> Self {
        Self {
            im_type,
            component: ImComponent::RotD50,
        }
    }

    pub fn pga() -> Self {
        Self::new(ImType::Pga)
    }

    /// RotD50 spectral acceleration at `period` seconds.
    pub fn psa(period: f64) -> Result<Self, HazardError> {
        Ok(Self::new(ImType::PSa(Period::new(period)?)))
    }

    /// Same IM with another component, validated against the type.
    pub fn with_component(self, component: ImComponent) -> Result<Self, HazardError> {
        if !self.im_type.supported_components().contains(&component) {
            return Err(HazardError::UnsupportedIm {
                im: self.to_string(),
                reason: format!("component {component} is not available for this IM"),
            });
        }
        Ok(Self { component, ..self })
    }

    pub fn im_type(&self) -> ImType {
        self.im_type
    }

    pub fn component(&self) -> ImComponent {
        self.component
    }

    pub fn period(&self) -> Option<f64> {
        self.im_type.period().map(Period::seconds)
    }

    pub fn is_psa(&self) -> bool {
        matches!(self.im_type, ImType::PSa(_))
    }

    /// Canonical string with `.` replaced by `p`, safe for file names.
    pub fn file_format(&self) -> String {
        self.to_string().replace('.', "p")
    }

    /// OpenQuake spelling: `SA(0.5)` for spectral acceleration.
    pub fn oq_str(&self) -> String {
        match self.im_type {
            ImType::PSa(period) => format!("SA({period})"),
            other => other.name().to_string(),
        }
    }

    /// Parse an OpenQuake IM string (`PGA` or `SA(<period>)`).
    pub fn from_oq_str(s: &str) -> Result<Self, HazardError> {
        if s == "PGA" {
            return Ok(Self::pga());
        }
        let period = s
            .strip_prefix("SA(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|p| p.trim().parse::<f64>().ok())
            .ok_or_else(|| HazardError::UnsupportedIm {
                im: s.to_string(),
                reason: "unsupported OpenQuake IM string".into(),
            })?;
        Self::psa(period)
    }

    /// Parse a canonical IM string together with a component name.
    pub fn from_str_with_component(s: &str, component: &str) -> Result<Self, HazardError> {
        s.parse::<Self>()?.with_component(component.parse()?)
    }
}

impl fmt::Display for Im {
    /// The canonical string excludes the component.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.im_type.fmt(f)
    }
}

impl FromStr for Im {
    type Err = HazardError;

    /// Accepts `PGA`, `pSA_0.5` and the file format `pSA_0p5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unsupported = |reason: &str| HazardError::UnsupportedIm {
            im: s.to_string(),
            reason: reason.to_string(),
        };

        let (name, period) = match s.split_once('_') {
            Some((name, raw_period)) => {
                let seconds: f64 = raw_period
                    .replace('p', ".")
                    .parse()
                    .map_err(|_| unsupported("period is not a number"))?;
                (name, Some(Period::new(seconds)?))
            }
            None => (s, None),
        };

        if name == "pSA" && period.is_none() {
            return Err(unsupported("pSA requires a period, e.g. pSA_0.5"));
        }

        ImType::from_name(name, period)
            .map(Self::new)
            .ok_or_else(|| unsupported("unknown IM type"))
    }
}

/// Serialized form of an [`Im`]: canonical string plus component.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImRecord {
    im: String,
    #[serde(default)]
    component: ImComponent,
}

impl From<Im> for ImRecord {
    fn from(im: Im) -> Self {
        Self {
            im: im.to_string(),
            component: im.component,
        }
    }
}

impl TryFrom<ImRecord> for Im {
    type Error = HazardError;

    fn try_from(record: ImRecord) -> Result<Self, Self::Error> {
        record.im.parse::<Im>()?.with_component(record.component)
    }
}

/// Canonical strings of a list of IMs.
pub fn to_string_list(ims: &[Im]) -> Vec<String> {
    ims.iter().map(Im::to_string).collect()
}

/// Parse a list of canonical IM strings.
pub fn to_im_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Im>, HazardError> {
    names.iter().map(|n| n.as_ref().parse()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
