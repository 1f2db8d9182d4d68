//! Configuration types for the tracking engine.
//!
//! All options are rejected up front by `validate()`; no component starts
//! work on an invalid configuration. Configurations round-trip through
//! YAML for use in config files.

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::errors::{CloneTraceError, Result};

/// Validate that a float lies in the closed unit interval.
pub fn validate_unit_range(value: f64, field: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(CloneTraceError::config_field(
            format!("{field} must be between 0.0 and 1.0, got {value}"),
            field,
        ));
    }
    Ok(())
}

/// Validate that an integer similarity score lies in 0–100.
pub fn validate_percent(value: u32, field: &str) -> Result<()> {
    if value > 100 {
        return Err(CloneTraceError::config_field(
            format!("{field} must be between 0 and 100, got {value}"),
            field,
        ));
    }
    Ok(())
}

/// Inclusive date range used to filter the revision stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First date admitted (inclusive)
    pub start: NaiveDate,
    /// Last date admitted (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Validate that the range is not inverted.
    pub fn validate(&self) -> Result<()> {
        if self.end < self.start {
            return Err(CloneTraceError::config_field(
                format!("date range end {} precedes start {}", self.end, self.start),
                "date_range",
            ));
        }
        Ok(())
    }
}

/// Parallelism selection for the fuzzy matching phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelMode {
    /// Parallelise only when the candidate pair count crosses
    /// `parallel_min_pairs`
    #[default]
    Auto,
    /// Always parallelise
    On,
    /// Never parallelise
    Off,
}

/// MinHash-LSH index configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LshConfig {
    /// Minimum estimated Jaccard similarity for candidates (0.0–1.0)
    pub jaccard_threshold: f64,

    /// Number of MinHash permutations (32–256)
    pub num_permutations: usize,
}

impl Default for LshConfig {
    fn default() -> Self {
        Self {
            jaccard_threshold: 0.7,
            num_permutations: 128,
        }
    }
}

impl LshConfig {
    /// Validate LSH parameters.
    pub fn validate(&self) -> Result<()> {
        if !(32..=256).contains(&self.num_permutations) {
            return Err(CloneTraceError::config_field(
                format!(
                    "num_permutations must be between 32 and 256, got {}",
                    self.num_permutations
                ),
                "lsh.num_permutations",
            ));
        }
        validate_unit_range(self.jaccard_threshold, "lsh.jaccard_threshold")?;
        Ok(())
    }

    /// Derive the (bands, rows-per-band) split whose S-curve inflection
    /// `(1/b)^(1/r)` lies nearest the Jaccard threshold.
    ///
    /// Ties prefer more bands, which biases towards recall over precision.
    pub fn band_layout(&self) -> (usize, usize) {
        let n = self.num_permutations;
        let mut best = (1, n);
        let mut best_err = f64::MAX;

        for bands in 1..=n {
            if n % bands != 0 {
                continue;
            }
            let rows = n / bands;
            let inflection = (1.0 / bands as f64).powf(1.0 / rows as f64);
            let err = (inflection - self.jaccard_threshold).abs();
            if err < best_err || (err == best_err && bands > best.0) {
                best_err = err;
                best = (bands, rows);
            }
        }

        best
    }
}

/// Configuration for cross-revision method matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Minimum similarity score (0–100) to declare a fuzzy match
    pub similarity_threshold: u32,

    /// Skip candidate pairs whose token-length difference ratio exceeds this
    pub length_skip_ratio: f64,

    /// Skip candidate pairs whose token-set Jaccard falls below this
    pub jaccard_prefilter: f64,

    /// Replace the plain LCS with the banded, early-terminating variant
    pub banded_lcs: bool,

    /// Restrict candidate generation to LSH query results
    pub use_lsh: bool,

    /// LSH index parameters (only consulted when `use_lsh` is set)
    pub lsh: LshConfig,

    /// When LSH is enabled, evaluate only the top-k candidates per source,
    /// ranked by quick n-gram score
    pub top_k: usize,

    /// Multi-pass matching thresholds, strictly decreasing, ending at
    /// `similarity_threshold` (e.g. `[90, 80, 70]`)
    pub progressive_thresholds: Option<Vec<u32>>,

    /// Parallelism selection for fuzzy-phase scoring
    pub parallel: ParallelMode,

    /// Candidate pair count above which `Auto` enables parallelism
    pub parallel_min_pairs: usize,

    /// Worker thread cap; `None` uses the rayon default
    pub max_workers: Option<usize>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 70,
            length_skip_ratio: 0.3,
            jaccard_prefilter: 0.3,
            banded_lcs: false,
            use_lsh: false,
            lsh: LshConfig::default(),
            top_k: 20,
            progressive_thresholds: None,
            parallel: ParallelMode::Auto,
            parallel_min_pairs: 100_000,
            max_workers: None,
        }
    }
}

impl MatcherConfig {
    /// Validate matcher parameters.
    pub fn validate(&self) -> Result<()> {
        validate_percent(self.similarity_threshold, "similarity_threshold")?;
        validate_unit_range(self.length_skip_ratio, "length_skip_ratio")?;
        validate_unit_range(self.jaccard_prefilter, "jaccard_prefilter")?;
        self.lsh.validate()?;

        if self.top_k == 0 {
            return Err(CloneTraceError::config_field(
                "top_k must be greater than 0",
                "top_k",
            ));
        }

        if let Some(thresholds) = &self.progressive_thresholds {
            if thresholds.is_empty() {
                return Err(CloneTraceError::config_field(
                    "progressive_thresholds must not be empty",
                    "progressive_thresholds",
                ));
            }
            for (i, threshold) in thresholds.iter().enumerate() {
                validate_percent(*threshold, "progressive_thresholds")?;
                if i > 0 && thresholds[i - 1] <= *threshold {
                    return Err(CloneTraceError::config_field(
                        "progressive_thresholds must be strictly decreasing",
                        "progressive_thresholds",
                    ));
                }
            }
            if *thresholds.last().expect("non-empty") != self.similarity_threshold {
                return Err(CloneTraceError::config_field(
                    "the final progressive threshold must equal similarity_threshold",
                    "progressive_thresholds",
                ));
            }
        }

        if let Some(workers) = self.max_workers {
            if workers == 0 {
                return Err(CloneTraceError::config_field(
                    "max_workers must be greater than 0",
                    "max_workers",
                ));
            }
        }

        Ok(())
    }

    /// Thresholds for the fuzzy phase: the progressive list, or the single
    /// similarity threshold.
    pub fn pass_thresholds(&self) -> Vec<u32> {
        self.progressive_thresholds
            .clone()
            .unwrap_or_else(|| vec![self.similarity_threshold])
    }
}

/// Top-level configuration for the tracking engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Method matching options; `matcher.similarity_threshold` also serves
    /// as the clone-group formation threshold
    pub matcher: MatcherConfig,

    /// Minimum member-overlap ratio for a cross-revision group match
    pub overlap_threshold: f64,

    /// Relative group-size change tolerated before a matched group is
    /// classified grown or shrunk
    pub group_size_tolerance: f64,

    /// Optional inclusive date filter on the revision stream
    pub date_range: Option<DateRange>,

    /// Matching rate below which a per-pair warning is emitted
    pub match_rate_floor: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            matcher: MatcherConfig::default(),
            overlap_threshold: 0.5,
            group_size_tolerance: 0.10,
            date_range: None,
            match_rate_floor: 0.5,
        }
    }
}

impl TrackingConfig {
    /// Validate the complete configuration.
    pub fn validate(&self) -> Result<()> {
        self.matcher.validate()?;
        validate_unit_range(self.overlap_threshold, "overlap_threshold")?;
        validate_unit_range(self.match_rate_floor, "match_rate_floor")?;

        if self.group_size_tolerance < 0.0 {
            return Err(CloneTraceError::config_field(
                "group_size_tolerance must be non-negative",
                "group_size_tolerance",
            ));
        }

        if let Some(range) = &self.date_range {
            range.validate()?;
        }

        Ok(())
    }

    /// Apply the optimisation preset: LSH candidate generation, banded LCS,
    /// and progressive thresholds `[90, 80, similarity_threshold]`.
    pub fn optimized(mut self) -> Self {
        self.matcher.use_lsh = true;
        self.matcher.banded_lcs = true;
        let floor = self.matcher.similarity_threshold;
        let mut thresholds: Vec<u32> = [90, 80]
            .into_iter()
            .filter(|threshold| *threshold > floor)
            .collect();
        thresholds.push(floor);
        self.matcher.progressive_thresholds = Some(thresholds);
        self
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| CloneTraceError::Io {
            message: format!("Failed to read config file: {}", path.display()),
            source: e,
        })?;
        serde_yaml::from_str(&content).map_err(Into::into)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml_file(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content).map_err(|e| CloneTraceError::Io {
            message: format!("Failed to write config file: {}", path.display()),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TrackingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut config = TrackingConfig::default();
        config.matcher.similarity_threshold = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_date_range_rejected() {
        let mut config = TrackingConfig::default();
        config.date_range = Some(DateRange {
            start: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_progressive_thresholds_must_decrease_to_floor() {
        let mut config = TrackingConfig::default();
        config.matcher.progressive_thresholds = Some(vec![90, 90, 70]);
        assert!(config.validate().is_err());

        config.matcher.progressive_thresholds = Some(vec![90, 80]);
        assert!(config.validate().is_err());

        config.matcher.progressive_thresholds = Some(vec![90, 80, 70]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_optimized_preset() {
        let config = TrackingConfig::default().optimized();
        assert!(config.matcher.use_lsh);
        assert!(config.matcher.banded_lcs);
        assert_eq!(
            config.matcher.progressive_thresholds,
            Some(vec![90, 80, 70])
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_optimized_preset_with_high_floor() {
        let mut config = TrackingConfig::default();
        config.matcher.similarity_threshold = 85;
        let config = config.optimized();
        assert_eq!(config.matcher.progressive_thresholds, Some(vec![90, 85]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_band_layout_near_threshold() {
        let config = LshConfig::default();
        let (bands, rows) = config.band_layout();
        assert_eq!(bands * rows, config.num_permutations);

        let inflection = (1.0 / bands as f64).powf(1.0 / rows as f64);
        assert!((inflection - config.jaccard_threshold).abs() < 0.15);
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracking.yml");

        let config = TrackingConfig::default().optimized();
        config.to_yaml_file(&path).unwrap();

        let loaded = TrackingConfig::from_yaml_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
