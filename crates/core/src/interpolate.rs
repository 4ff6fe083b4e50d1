//! IM level ↔ exceedance rate interpolation on a single hazard curve.
//!
//! Interpolation is linear in `ln(rate)` over `ln(level)`. Inputs outside
//! the tabulated range are rejected with [`HazardError::Domain`]; the tails
//! are never extrapolated. A segment ending in a zero rate has no
//! log-space representation and is interpolated linearly in rate (still
//! over `ln(level)`), in both directions, so the two stay inverses.

use crate::error::{HazardError, Quantity};

/// Relative slack allowed when checking that rates never increase.
const MONOTONIC_RTOL: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Return periods
// ---------------------------------------------------------------------------

/// Poisson probability of at least one exceedance in `t` years for a
/// return period of `rp` years.
pub fn rp_to_prob(rp: f64, t: f64) -> f64 {
    1.0 - (-t / rp).exp()
}

/// Inverse of [`rp_to_prob`].
pub fn prob_to_rp(prob: f64, t: f64) -> f64 {
    -t / (1.0 - prob).ln()
}

/// Annual exceedance rate of a return period.
pub fn rp_to_exceedance(rp: f64) -> f64 {
    1.0 / rp
}

/// Return period of an annual exceedance rate.
pub fn exceedance_to_rp(exceedance: f64) -> f64 {
    1.0 / exceedance
}

// ---------------------------------------------------------------------------
// HazardCurve
// ---------------------------------------------------------------------------

/// Validated exceedance curve: strictly increasing positive IM levels and
/// non-negative, non-increasing annual exceedance rates.
#[derive(Debug, Clone, PartialEq)]
pub struct HazardCurve {
    im_levels: Vec<f64>,
    rates: Vec<f64>,
}

impl HazardCurve {
    pub fn new(im_levels: Vec<f64>, rates: Vec<f64>) -> Result<Self, HazardError> {
        validate_im_levels(&im_levels)?;
        if rates.len() != im_levels.len() {
            return Err(HazardError::Validation(format!(
                "Curve has {} IM levels but {} rates",
                im_levels.len(),
                rates.len()
            )));
        }
        validate_rates(&rates)?;
        Ok(Self { im_levels, rates })
    }

    pub fn im_levels(&self) -> &[f64] {
        &self.im_levels
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    /// `[min, max]` IM level.
    pub fn level_domain(&self) -> (f64, f64) {
        (self.im_levels[0], self.im_levels[self.im_levels.len() - 1])
    }

    /// `[min, max]` exceedance rate.
    pub fn rate_domain(&self) -> (f64, f64) {
        self.rates
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                (lo.min(r), hi.max(r))
            })
    }

    /// Exceedance rate at `level`.
    pub fn im_to_exceedance(&self, level: f64) -> Result<f64, HazardError> {
        let (min, max) = self.level_domain();
        if !(min..=max).contains(&level) {
            return Err(HazardError::Domain {
                quantity: Quantity::ImLevel,
                value: level,
                min,
                max,
            });
        }

        let j = self.im_levels.partition_point(|&l| l < level);
        if self.im_levels[j] == level {
            return Ok(self.rates[j]);
        }
        let i = j - 1;

        let (x_i, x_j) = (self.im_levels[i].ln(), self.im_levels[j].ln());
        let t = (level.ln() - x_i) / (x_j - x_i);
        let (r_i, r_j) = (self.rates[i], self.rates[j]);

        if r_i > 0.0 && r_j > 0.0 {
            Ok((r_i.ln() + t * (r_j.ln() - r_i.ln())).exp())
        } else {
            Ok(r_i + t * (r_j - r_i))
        }
    }

    /// IM level at which the curve reaches `rate`.
    ///
    /// Flat segments resolve to the lowest IM level carrying that rate.
    pub fn exceedance_to_im(&self, rate: f64) -> Result<f64, HazardError> {
        let (min, max) = self.rate_domain();
        if !(min..=max).contains(&rate) {
            return Err(HazardError::Domain {
                quantity: Quantity::ExceedanceRate,
                value: rate,
                min,
                max,
            });
        }

        // The domain check guarantees a match (the minimum itself).
        let Some(j) = self.rates.iter().position(|&r| r <= rate) else {
            return Err(HazardError::DataIntegrity(
                "Curve minimum not found during inversion".into(),
            ));
        };
        if j == 0 || self.rates[j] == rate {
            return Ok(self.im_levels[j]);
        }
        let i = j - 1;

        let (r_i, r_j) = (self.rates[i], self.rates[j]);
        let t = if r_j > 0.0 {
            (rate.ln() - r_i.ln()) / (r_j.ln() - r_i.ln())
        } else {
            (rate - r_i) / (r_j - r_i)
        };

        let (x_i, x_j) = (self.im_levels[i].ln(), self.im_levels[j].ln());
        Ok((x_i + t * (x_j - x_i)).exp())
    }

    /// IM level for a return period in years.
    pub fn rp_to_im(&self, rp: f64) -> Result<f64, HazardError> {
        self.exceedance_to_im(rp_to_exceedance(rp))
    }

    /// Re-express the curve on another grid inside its level domain.
    pub fn resample(&self, im_levels: &[f64]) -> Result<HazardCurve, HazardError> {
        let rates = im_levels
            .iter()
            .map(|&level| self.im_to_exceedance(level))
            .collect::<Result<Vec<_>, _>>()?;
        HazardCurve::new(im_levels.to_vec(), rates)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// At least two finite, positive, strictly increasing levels.
pub fn validate_im_levels(im_levels: &[f64]) -> Result<(), HazardError> {
    if im_levels.len() < 2 {
        return Err(HazardError::Validation(format!(
            "A hazard curve needs at least 2 IM levels, got {}",
            im_levels.len()
        )));
    }
    if let Some(bad) = im_levels.iter().find(|l| !(l.is_finite() && **l > 0.0)) {
        return Err(HazardError::Validation(format!(
            "IM level {bad} must be finite and positive"
        )));
    }
    if let Some(w) = im_levels.windows(2).find(|w| w[1] <= w[0]) {
        return Err(HazardError::Validation(format!(
            "IM levels must be strictly increasing, found {} followed by {}",
            w[0], w[1]
        )));
    }
    Ok(())
}

/// Finite, non-negative and non-increasing (within [`MONOTONIC_RTOL`]).
pub fn validate_rates(rates: &[f64]) -> Result<(), HazardError> {
    if let Some((i, bad)) = rates
        .iter()
        .enumerate()
        .find(|(_, r)| !(r.is_finite() && **r >= 0.0))
    {
        return Err(HazardError::DataIntegrity(format!(
            "Exceedance rate {bad} at index {i} is not a finite non-negative value"
        )));
    }
    if let Some(i) = (1..rates.len()).find(|&i| rates[i] > rates[i - 1] * (1.0 + MONOTONIC_RTOL)) {
        return Err(HazardError::DataIntegrity(format!(
            "Exceedance rates increase from {} to {} at index {i}",
            rates[i - 1],
            rates[i]
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
