//! Directory names of saved results under a station's output directory.
//!
//! Decimal points are written as `p` so names stay filesystem friendly,
//! e.g. `hazard_pSA_0p1`, `disagg_PGA_2500`, `uhs_475`.

use hazard_core::im::Im;

/// Return period in years as it appears in a directory name.
pub fn rp_label(rp: f64) -> String {
    rp.to_string().replace('.', "p")
}

pub fn hazard_dir_name(im: &Im) -> String {
    format!("hazard_{}", im.file_format())
}

pub fn disagg_dir_name(im: &Im, rp: f64) -> String {
    format!("disagg_{}_{}", im.file_format(), rp_label(rp))
}

pub fn disagg_grid_dir_name(im: &Im, rp: f64) -> String {
    format!("disagg_grid_{}_{}", im.file_format(), rp_label(rp))
}

pub fn uhs_dir_name(rp: f64) -> String {
    format!("uhs_{}", rp_label(rp))
}
