//! Static planting rules: growth-stage table, crop-type duration factors and
//! soil-specific irrigation intervals.
//!
//! A built-in sugarcane table is embedded at compile time from
//! `stages.toml`. Operators can supply their own file with the same layout;
//! its crop adjustments and soil intervals are merged over the defaults.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::PlanningError;

/// Interval used when a soil texture is unknown or configured as non-positive.
pub const DEFAULT_IRRIGATION_INTERVAL: u32 = 3;

/// Largest accepted crop-type duration multiplier.
pub const MAX_CROP_FACTOR: f64 = 10.0;

/// Longest accepted adjusted cycle, in days, under any crop factor.
pub const MAX_CYCLE_DAYS: u64 = 36_500;

static BUILTIN_TOML: &str = include_str!("stages.toml");

/// One row of the stage table.
#[derive(Debug, Clone, PartialEq)]
pub struct StageDefinition {
    pub name: String,
    /// Nominal duration before crop adjustment.
    pub days: u32,
    pub water_mm_per_day: f64,
    pub interval_days: u32,
    pub notes: String,
}

/// The rule table the stage engine and expander run against.
#[derive(Debug, Clone)]
pub struct RuleTable {
    stages: Vec<StageDefinition>,
    crop_adjustments: HashMap<String, f64>,
    soil_intervals: HashMap<String, u32>,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    stages: Vec<StageRow>,
    #[serde(default)]
    crop_adjustments: HashMap<String, f64>,
    #[serde(default)]
    soil_intervals: HashMap<String, i64>,
}

#[derive(Debug, Deserialize)]
struct StageRow {
    name: String,
    days: i64,
    #[serde(default)]
    water_mm_per_day: f64,
    #[serde(default)]
    interval_days: Option<i64>,
    #[serde(default)]
    notes: String,
}

fn default_crop_adjustments() -> HashMap<String, f64> {
    HashMap::from([("new_plant".to_owned(), 1.0), ("ratoon".to_owned(), 0.95)])
}

fn default_soil_intervals() -> HashMap<String, u32> {
    HashMap::from([
        ("sand".to_owned(), 2),
        ("loam".to_owned(), 3),
        ("clay".to_owned(), 4),
    ])
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

impl RuleTable {
    /// Build a table from explicit parts, merging the maps over the defaults.
    ///
    /// Fails with [`PlanningError::Configuration`] when `stages` is empty,
    /// when a crop factor exceeds [`MAX_CROP_FACTOR`], or when the adjusted
    /// cycle under any factor would exceed [`MAX_CYCLE_DAYS`].
    pub fn new(
        stages: Vec<StageDefinition>,
        crop_adjustments: HashMap<String, f64>,
        soil_intervals: HashMap<String, u32>,
    ) -> Result<Self, PlanningError> {
        if stages.is_empty() {
            return Err(PlanningError::Configuration(
                "stage table must contain at least one stage".to_owned(),
            ));
        }

        let mut adjustments = default_crop_adjustments();
        adjustments.extend(
            crop_adjustments
                .into_iter()
                .map(|(k, v)| (normalize_key(&k), v)),
        );
        let mut intervals = default_soil_intervals();
        intervals.extend(soil_intervals.into_iter().map(|(k, v)| (normalize_key(&k), v)));

        let mut widest = 1.0_f64;
        for (crop, factor) in &adjustments {
            if !(factor.is_finite() && *factor > 0.0) {
                continue;
            }
            if *factor > MAX_CROP_FACTOR {
                return Err(PlanningError::Configuration(format!(
                    "crop adjustment for {crop} is {factor}, above the maximum of {MAX_CROP_FACTOR}"
                )));
            }
            widest = widest.max(*factor);
        }

        let nominal: u64 = stages.iter().map(|s| u64::from(s.days)).sum();
        let span = (nominal as f64 * widest).round();
        if span > MAX_CYCLE_DAYS as f64 {
            return Err(PlanningError::Configuration(format!(
                "stage table spans {span} adjusted days, above the maximum of {MAX_CYCLE_DAYS}"
            )));
        }

        Ok(Self {
            stages,
            crop_adjustments: adjustments,
            soil_intervals: intervals,
        })
    }

    /// The embedded sugarcane table.
    pub fn builtin() -> Result<Self, PlanningError> {
        Self::from_toml_str(BUILTIN_TOML)
    }

    /// Parse a rule file.
    ///
    /// Stage rows with a non-positive `days` are skipped. A missing or
    /// non-positive `interval_days` becomes [`DEFAULT_IRRIGATION_INTERVAL`].
    pub fn from_toml_str(input: &str) -> Result<Self, PlanningError> {
        let file: RuleFile = toml::from_str(input)
            .map_err(|e| PlanningError::Configuration(format!("invalid rule file: {e}")))?;

        let stages = file
            .stages
            .into_iter()
            .filter_map(|row| {
                let days = u32::try_from(row.days).ok().filter(|d| *d > 0)?;
                let interval_days = row
                    .interval_days
                    .and_then(|v| u32::try_from(v).ok())
                    .filter(|v| *v > 0)
                    .unwrap_or(DEFAULT_IRRIGATION_INTERVAL);
                Some(StageDefinition {
                    name: row.name.trim().to_owned(),
                    days,
                    water_mm_per_day: row.water_mm_per_day,
                    interval_days,
                    notes: row.notes.trim().to_owned(),
                })
            })
            .collect();

        // Non-positive overrides fall through to the default interval at
        // lookup time.
        let soil_intervals = file
            .soil_intervals
            .into_iter()
            .map(|(k, v)| (k, u32::try_from(v).unwrap_or(0)))
            .collect();

        Self::new(stages, file.crop_adjustments, soil_intervals)
    }

    /// Read and parse a rule file from disk.
    pub fn load(path: &Path) -> Result<Self, PlanningError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PlanningError::Configuration(format!(
                "failed to read rule file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Duration multiplier for a crop type; 1.0 when unknown or non-positive.
    pub fn crop_factor(&self, crop_type: &str) -> f64 {
        self.crop_adjustments
            .get(&normalize_key(crop_type))
            .copied()
            .filter(|f| f.is_finite() && *f > 0.0)
            .unwrap_or(1.0)
    }

    /// Irrigation interval in days for a soil texture; never zero.
    pub fn soil_interval(&self, soil_texture: &str) -> u32 {
        self.soil_intervals
            .get(&normalize_key(soil_texture))
            .copied()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_IRRIGATION_INTERVAL)
    }

    /// Sum of nominal stage durations.
    pub fn nominal_days(&self) -> u32 {
        self.stages.iter().map(|s| s.days).sum()
    }
}
