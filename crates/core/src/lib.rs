//! `hazard-core`: probabilistic seismic hazard aggregation and
//! disaggregation.
//!
//! Pure domain logic with no I/O. Branch curves are built from rupture
//! rates and ground-motion outputs ([`exceedance`]), combined into
//! ensemble statistics ([`ensemble`]), inverted between IM level and
//! exceedance rate ([`interpolate`]), disaggregated into rupture
//! contributions ([`disagg`], [`disagg_grid`]) and assembled into uniform
//! hazard spectra ([`uhs`]).

pub mod disagg;
pub mod disagg_grid;
pub mod ensemble;
pub mod error;
pub mod exceedance;
pub mod gm;
pub mod im;
pub mod im_levels;
pub mod interpolate;
pub mod rupture;
pub mod site;
pub mod uhs;

pub use error::HazardError;
