use std::path::PathBuf;

use hazard_core::im_levels::DEFAULT_N_IM_LEVELS;
use hazard_core::uhs::DEFAULT_UHS_RPS;

use crate::error::ConfigError;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// JSON project input.
    pub project_file: PathBuf,
    /// Root of the per-station result directories.
    pub output_dir: PathBuf,
    /// Maximum number of units computed at once.
    pub n_workers: usize,
    pub n_im_levels: usize,
    pub calc_percentiles: bool,
    /// Return periods (years) to disaggregate for every (station, IM).
    pub disagg_return_periods: Vec<f64>,
    /// Return periods (years) of the per-station UHS.
    pub uhs_return_periods: Vec<f64>,
    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                                  |
    /// |-------------------------|------------------------------------------|
    /// | `PROJECT_FILE`          | required                                 |
    /// | `OUTPUT_DIR`            | `results`                                |
    /// | `N_WORKERS`             | available parallelism                    |
    /// | `N_IM_LEVELS`           | `100`                                    |
    /// | `CALC_PERCENTILES`      | `true`                                   |
    /// | `DISAGG_RETURN_PERIODS` | empty                                    |
    /// | `UHS_RETURN_PERIODS`    | `25,50,100,150,250,500,1000,2500,5000,10000` |
    /// | `LOG_FORMAT`            | `text` (`json` for JSON lines)           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let project_file = lookup("PROJECT_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("PROJECT_FILE"))?;

        let output_dir = PathBuf::from(lookup("OUTPUT_DIR").unwrap_or_else(|| "results".into()));

        let n_workers = match lookup("N_WORKERS") {
            Some(v) => parse_positive("N_WORKERS", &v)?,
            None => std::thread::available_parallelism().map_or(1, |n| n.get()),
        };

        let n_im_levels = match lookup("N_IM_LEVELS") {
            Some(v) => parse_positive("N_IM_LEVELS", &v)?,
            None => DEFAULT_N_IM_LEVELS,
        };
        if n_im_levels < 2 {
            return Err(ConfigError::Invalid {
                var: "N_IM_LEVELS",
                value: n_im_levels.to_string(),
                reason: "at least 2 levels are needed".into(),
            });
        }

        let calc_percentiles = match lookup("CALC_PERCENTILES") {
            Some(v) => parse_bool("CALC_PERCENTILES", &v)?,
            None => true,
        };

        let disagg_return_periods = match lookup("DISAGG_RETURN_PERIODS") {
            Some(v) => parse_return_periods("DISAGG_RETURN_PERIODS", &v)?,
            None => Vec::new(),
        };

        let uhs_return_periods = match lookup("UHS_RETURN_PERIODS") {
            Some(v) => parse_return_periods("UHS_RETURN_PERIODS", &v)?,
            None => DEFAULT_UHS_RPS.to_vec(),
        };

        let json_logs = match lookup("LOG_FORMAT").as_deref() {
            None | Some("text") => false,
            Some("json") => true,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected text or json".into(),
                })
            }
        };

        Ok(Self {
            project_file,
            output_dir,
            n_workers,
            n_im_levels,
            calc_percentiles,
            disagg_return_periods,
            uhs_return_periods,
            json_logs,
        })
    }
}

fn parse_positive(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be a positive integer".into(),
        }),
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be true or false".into(),
        }),
    }
}

/// Comma-separated positive years; blank entries are ignored.
fn parse_return_periods(var: &'static str, value: &str) -> Result<Vec<f64>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<f64>() {
            Ok(rp) if rp.is_finite() && rp > 0.0 => Ok(rp),
            _ => Err(ConfigError::Invalid {
                var,
                value: value.to_string(),
                reason: format!("\"{s}\" is not a positive return period"),
            }),
        })
        .collect()
}
