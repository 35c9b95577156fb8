//! Per-tier configuration and its TOML representation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    FairnessRule, OutputBounds, ParamRange, SpawnKind, SpawnWeightTable, StressBand, KIND_BOMB,
    KIND_DECOY, KIND_HEAL, KIND_NORMAL, KIND_SHIELD,
};

/// Difficulty tier selected by the player before a session starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Forgiving timings and large targets.
    Easy,
    /// Baseline tuning.
    #[default]
    Normal,
    /// Tight timings and small targets.
    Hard,
}

/// Starting parameters the director adapts from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaseParams {
    /// Delay between spawns in milliseconds.
    pub spawn_interval_ms: f32,
    /// Target lifetime in milliseconds.
    pub time_to_live_ms: f32,
    /// Multiplier applied to the base target size.
    pub size_mul: f32,
    /// Unscaled target diameter in pixels.
    pub target_size_px: f32,
    /// Multiplier applied to the weights of disruptive kinds.
    pub hazard_weight: f32,
    /// Aim-assist lock radius in pixels.
    pub lock_assist_px: f32,
}

impl BaseParams {
    /// Canonical starting parameters for a tier.
    #[must_use]
    pub const fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Easy => Self {
                spawn_interval_ms: 900.0,
                time_to_live_ms: 1750.0,
                size_mul: 1.05,
                target_size_px: 110.0,
                hazard_weight: 1.0,
                lock_assist_px: 102.0,
            },
            Tier::Normal => Self {
                spawn_interval_ms: 780.0,
                time_to_live_ms: 1600.0,
                size_mul: 1.0,
                target_size_px: 100.0,
                hazard_weight: 1.0,
                lock_assist_px: 96.0,
            },
            Tier::Hard => Self {
                spawn_interval_ms: 680.0,
                time_to_live_ms: 1450.0,
                size_mul: 0.92,
                target_size_px: 90.0,
                hazard_weight: 1.0,
                lock_assist_px: 88.0,
            },
        }
    }

    /// Output bounds derived from the base values.
    #[must_use]
    pub fn derived_bounds(&self) -> OutputBounds {
        OutputBounds {
            spawn_interval_ms: ParamRange::new(
                self.spawn_interval_ms * 1.08,
                self.spawn_interval_ms * 0.78,
            ),
            time_to_live_ms: ParamRange::new(
                self.time_to_live_ms * 1.10,
                self.time_to_live_ms * 0.82,
            ),
            size_mul: ParamRange::new(self.size_mul * 1.06, self.size_mul * 0.92),
            hazard_weight: ParamRange::new(0.85, 1.25),
            lock_assist_px: ParamRange::new(
                self.lock_assist_px * 1.10,
                self.lock_assist_px * 0.86,
            ),
        }
    }

    fn named(&self) -> [(&'static str, f32); 6] {
        [
            ("spawn_interval_ms", self.spawn_interval_ms),
            ("time_to_live_ms", self.time_to_live_ms),
            ("size_mul", self.size_mul),
            ("target_size_px", self.target_size_px),
            ("hazard_weight", self.hazard_weight),
            ("lock_assist_px", self.lock_assist_px),
        ]
    }
}

/// Errors raised while loading or validating a tier configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("failed to parse tier configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// The spawn weight table lists no kinds.
    #[error("spawn weight table is empty")]
    EmptyWeights,
    /// A spawn weight is negative or not finite.
    #[error("spawn weight for `{kind}` must be finite and non-negative, got {weight}")]
    InvalidWeight {
        /// Kind carrying the offending weight.
        kind: SpawnKind,
        /// Offending weight.
        weight: f32,
    },
    /// The stress band is inverted or leaves `[0, 1]`.
    #[error("stress band [{min}, {max}] must satisfy 0 <= min <= max <= 1")]
    InvalidStressBand {
        /// Configured lower edge.
        min: f32,
        /// Configured upper edge.
        max: f32,
    },
    /// A parameter range endpoint is not finite.
    #[error("parameter range `{name}` has a non-finite endpoint")]
    NonFiniteRange {
        /// Name of the offending range.
        name: &'static str,
    },
    /// A base parameter is not finite or not positive.
    #[error("base parameter `{name}` must be finite and positive, got {value}")]
    InvalidBase {
        /// Name of the offending parameter.
        name: &'static str,
        /// Offending value.
        value: f32,
    },
}

/// Complete, static configuration of a difficulty tier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Tier the configuration describes.
    pub tier: Tier,
    /// Starting parameters.
    pub base: BaseParams,
    /// Bounds every output parameter is clamped to.
    pub bounds: OutputBounds,
    /// Base spawn weights.
    pub weights: SpawnWeightTable,
    /// Consecutive-occurrence caps on disruptive kinds.
    pub fairness: Vec<FairnessRule>,
    /// Stress interval the adaptive controller targets.
    pub stress_band: StressBand,
    /// Kinds whose weights scale with the hazard weight and grow with intensity.
    pub disruptive_kinds: Vec<SpawnKind>,
    /// Kinds whose weights grow as intensity drops.
    pub helpful_kinds: Vec<SpawnKind>,
    /// Kinds whose hit reaction times feed the reaction features.
    pub reaction_kinds: Vec<SpawnKind>,
}

impl TierConfig {
    /// Built-in configuration for the provided tier.
    #[must_use]
    pub fn preset(tier: Tier) -> Self {
        let base = BaseParams::for_tier(tier);
        let weights = match tier {
            Tier::Easy => [72.0, 8.0, 5.0, 9.0, 6.0],
            Tier::Normal => [66.0, 11.0, 9.0, 8.0, 6.0],
            Tier::Hard => [60.0, 14.0, 12.0, 8.0, 6.0],
        };
        let kinds = [KIND_NORMAL, KIND_DECOY, KIND_BOMB, KIND_HEAL, KIND_SHIELD];
        let pairs: Vec<(&str, f32)> = kinds.into_iter().zip(weights).collect();

        Self {
            tier,
            base,
            bounds: base.derived_bounds(),
            weights: SpawnWeightTable::from_pairs(&pairs),
            fairness: vec![
                FairnessRule::new(KIND_BOMB, 1),
                FairnessRule::new(KIND_DECOY, 2).with_damping(0.20),
            ],
            stress_band: StressBand::new(0.45, 0.55),
            disruptive_kinds: vec![SpawnKind::from(KIND_DECOY), SpawnKind::from(KIND_BOMB)],
            helpful_kinds: vec![SpawnKind::from(KIND_HEAL), SpawnKind::from(KIND_SHIELD)],
            reaction_kinds: vec![
                SpawnKind::from(KIND_NORMAL),
                SpawnKind::from(KIND_HEAL),
                SpawnKind::from(KIND_SHIELD),
            ],
        }
    }

    /// Parses a tier configuration from TOML.
    ///
    /// Omitted sections are taken from the preset of the declared tier (or the
    /// normal tier when none is declared). Omitted bounds are derived from the
    /// resulting base parameters. The result is validated before it is returned.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: TierConfigFile = toml::from_str(source)?;
        let tier = file.tier.unwrap_or_default();
        let preset = Self::preset(tier);
        let base = file.base.unwrap_or(preset.base);

        let config = Self {
            tier,
            base,
            bounds: file.bounds.unwrap_or_else(|| base.derived_bounds()),
            weights: file.weights.unwrap_or(preset.weights),
            fairness: file.fairness.unwrap_or(preset.fairness),
            stress_band: file.stress_band.unwrap_or(preset.stress_band),
            disruptive_kinds: file.disruptive_kinds.unwrap_or(preset.disruptive_kinds),
            helpful_kinds: file.helpful_kinds.unwrap_or(preset.helpful_kinds),
            reaction_kinds: file.reaction_kinds.unwrap_or(preset.reaction_kinds),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in self.base.named() {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidBase { name, value });
            }
        }

        for (name, range) in self.bounds.named() {
            if !range.is_finite() {
                return Err(ConfigError::NonFiniteRange { name });
            }
        }

        if self.weights.is_empty() {
            return Err(ConfigError::EmptyWeights);
        }
        if let Some(entry) = self
            .weights
            .entries()
            .iter()
            .find(|entry| !entry.weight.is_finite() || entry.weight < 0.0)
        {
            return Err(ConfigError::InvalidWeight {
                kind: entry.kind.clone(),
                weight: entry.weight,
            });
        }

        let band = self.stress_band;
        let ordered = band.min.is_finite() && band.max.is_finite() && band.min <= band.max;
        if !ordered || band.min < 0.0 || band.max > 1.0 {
            return Err(ConfigError::InvalidStressBand {
                min: band.min,
                max: band.max,
            });
        }

        Ok(())
    }

    /// Reports whether `kind` is disruptive.
    #[must_use]
    pub fn is_disruptive(&self, kind: &SpawnKind) -> bool {
        self.disruptive_kinds.contains(kind)
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self::preset(Tier::Normal)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TierConfigFile {
    tier: Option<Tier>,
    base: Option<BaseParams>,
    bounds: Option<OutputBounds>,
    weights: Option<SpawnWeightTable>,
    fairness: Option<Vec<FairnessRule>>,
    stress_band: Option<StressBand>,
    disruptive_kinds: Option<Vec<SpawnKind>>,
    helpful_kinds: Option<Vec<SpawnKind>>,
    reaction_kinds: Option<Vec<SpawnKind>>,
}
