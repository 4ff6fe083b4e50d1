//! `hazard-store`: directory persistence of hazard results and the
//! result cache port.
//!
//! Every result is saved into its own directory as a `metadata.json`
//! record (IM, component, site) plus a tabular statistics file, and is
//! fully reconstructible from those two files.

pub mod cache;
pub mod error;
pub mod naming;
pub mod persist;

pub use error::StoreError;
pub use persist::Persist;
