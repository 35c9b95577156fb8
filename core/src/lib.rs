#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the reflex director engine.
//!
//! This crate defines the message surface that connects host games, the
//! authoritative session, and the pure systems. Hosts submit [`Command`]
//! values carrying timer ticks and judged player actions, the session applies
//! them and broadcasts [`Event`] values describing what changed. Systems never
//! talk to each other directly; they exchange the immutable snapshots and
//! parameter bundles defined here.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

pub mod config;
pub mod memory;
pub mod rng;

pub use config::{BaseParams, ConfigError, Tier, TierConfig};
pub use memory::RollingMemory;
pub use rng::{DeterministicRng, Seed};

/// Number of scalar features packed by [`FeatureSnapshot::to_vector`].
pub const FEATURE_COUNT: usize = 11;

/// Regular target the player is expected to hit.
pub const KIND_NORMAL: &str = "normal";
/// Fake target that punishes an indiscriminate hit.
pub const KIND_DECOY: &str = "decoy";
/// Hazard the player must avoid touching.
pub const KIND_BOMB: &str = "bomb";
/// Helpful pickup restoring health.
pub const KIND_HEAL: &str = "heal";
/// Helpful pickup granting temporary protection.
pub const KIND_SHIELD: &str = "shield";

/// Selects whether difficulty adapts to the player or follows a fixed schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Adaptive play: live performance drives the difficulty control loop.
    Play,
    /// Reproducible study sessions: difficulty depends only on elapsed time and seed.
    Research,
}

/// Categorical name of a spawnable target such as `normal` or `bomb`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpawnKind(String);

impl SpawnKind {
    /// Creates a spawn kind from its name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name of the kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SpawnKind {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for SpawnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index of a spawn zone within the playfield zone grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(u8);

impl ZoneId {
    /// Creates a new zone identifier.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Retrieves the numeric zone index.
    #[must_use]
    pub const fn get(&self) -> u8 {
        self.0
    }
}

/// Timing grade attached to a successful hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HitGrade {
    /// Hit landed inside the tightest timing window.
    Perfect,
    /// Hit landed inside the intermediate window.
    Great,
    /// Hit landed but outside the tighter windows.
    Good,
}

impl HitGrade {
    /// Quality of the grade mapped onto `[0, 1]`.
    #[must_use]
    pub const fn quality(self) -> f32 {
        match self {
            Self::Perfect => 1.0,
            Self::Great => 0.7,
            Self::Good => 0.4,
        }
    }
}

/// Result of a single judged player action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionOutcome {
    /// The player touched the target.
    Hit {
        /// Optional timing grade reported by the host.
        grade: Option<HitGrade>,
    },
    /// The target was not touched before it expired or the player whiffed.
    Miss {
        /// `false` when the miss is harmless, such as letting a decoy expire.
        real: bool,
    },
}

/// Immutable record of a judged player action consumed once by the session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Whether the target was hit or missed.
    pub outcome: ActionOutcome,
    /// Kind of target the action concerned.
    pub target: SpawnKind,
    /// Reaction time between spawn and hit, when the host measured one.
    pub reaction_time_ms: Option<f32>,
    /// Zone the target was spawned in, when known.
    pub zone: Option<ZoneId>,
    /// Host timestamp of the action in milliseconds.
    pub timestamp_ms: u64,
}

impl ActionEvent {
    /// Creates an ungraded hit on the provided target.
    #[must_use]
    pub fn hit(target: impl Into<SpawnKind>, reaction_time_ms: Option<f32>) -> Self {
        Self {
            outcome: ActionOutcome::Hit { grade: None },
            target: target.into(),
            reaction_time_ms,
            zone: None,
            timestamp_ms: 0,
        }
    }

    /// Creates a real miss on the provided target.
    #[must_use]
    pub fn miss(target: impl Into<SpawnKind>) -> Self {
        Self {
            outcome: ActionOutcome::Miss { real: true },
            target: target.into(),
            reaction_time_ms: None,
            zone: None,
            timestamp_ms: 0,
        }
    }

    /// Creates a harmless expiry that is recorded but not judged as a failure.
    #[must_use]
    pub fn expired(target: impl Into<SpawnKind>) -> Self {
        Self {
            outcome: ActionOutcome::Miss { real: false },
            ..Self::miss(target)
        }
    }

    /// Attaches a timing grade; ignored for misses.
    #[must_use]
    pub fn with_grade(mut self, grade: HitGrade) -> Self {
        if let ActionOutcome::Hit { .. } = self.outcome {
            self.outcome = ActionOutcome::Hit { grade: Some(grade) };
        }
        self
    }

    /// Attaches the zone the target occupied.
    #[must_use]
    pub fn with_zone(mut self, zone: ZoneId) -> Self {
        self.zone = Some(zone);
        self
    }

    /// Attaches the host timestamp.
    #[must_use]
    pub fn at(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Reports whether the action was a hit.
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Hit { .. })
    }

    /// Reports whether the action was a miss the player is accountable for.
    #[must_use]
    pub const fn is_real_miss(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Miss { real: true })
    }
}

/// Optional game state the host forwards with every timer tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameContext {
    /// Current boss phase where zero means no boss is active.
    pub boss_phase: Option<u8>,
    /// Remaining player health as a fraction of the maximum.
    pub hp_fraction: Option<f32>,
    /// Remaining session time as a fraction of the total.
    pub time_left_fraction: Option<f32>,
}

/// Reason attached to the weakest zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeakZoneReason {
    /// The zone accumulates a disproportionate share of misses.
    Misses,
    /// Hits land in the zone, but slowly.
    SlowReaction,
}

/// Zone where the player currently performs worst.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeakZone {
    /// Zone identifier.
    pub zone: ZoneId,
    /// Weakness score in `[0, 1]`.
    pub score: f32,
    /// Dominant cause of the weakness.
    pub reason: WeakZoneReason,
}

/// Normalized player-model features; every scalar lies in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    /// Fast reaction-time average anchored between the good and bad thresholds.
    pub reaction: f32,
    /// How much the fast reaction average lags behind the slow one.
    pub slowdown: f32,
    /// Smoothed share of recent actions that were real misses.
    pub miss_rate: f32,
    /// Smoothed absolute deviation of reaction times from their slow mean.
    pub volatility: f32,
    /// Consecutive real misses relative to the streak anchor.
    pub miss_streak: f32,
    /// Consecutive hits relative to the combo anchor.
    pub hit_streak: f32,
    /// Smoothed share of recent actions that touched a disruptive kind.
    pub hazard: f32,
    /// Smoothed timing-grade quality of recent hits.
    pub precision: f32,
    /// Recent actions per second relative to the tempo anchor.
    pub tempo: f32,
    /// Situational pressure from boss phase, low health, time and miss streak.
    pub pressure: f32,
    /// Composite index of how well the player is in control.
    pub control: f32,
    /// Weakest zone once enough per-zone samples exist.
    pub weak_zone: Option<WeakZone>,
    /// Number of judged actions observed so far (not normalized).
    pub judged: u32,
}

impl FeatureSnapshot {
    /// Packs the scalar features into the predictor's input order.
    #[must_use]
    pub fn to_vector(&self) -> [f32; FEATURE_COUNT] {
        [
            self.reaction,
            self.slowdown,
            self.miss_rate,
            self.volatility,
            self.miss_streak,
            self.hit_streak,
            self.hazard,
            self.precision,
            self.tempo,
            self.pressure,
            self.control,
        ]
    }
}

/// Base weight assigned to one spawn kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    /// Kind the weight applies to.
    pub kind: SpawnKind,
    /// Relative, non-negative sampling weight.
    pub weight: f32,
}

impl WeightEntry {
    /// Creates a new weight entry.
    #[must_use]
    pub fn new(kind: impl Into<SpawnKind>, weight: f32) -> Self {
        Self {
            kind: kind.into(),
            weight,
        }
    }

    /// Weight with negative and non-finite values treated as zero.
    #[must_use]
    pub fn usable_weight(&self) -> f32 {
        if self.weight.is_finite() && self.weight > 0.0 {
            self.weight
        } else {
            0.0
        }
    }
}

/// Ordered base weights over the spawnable kinds.
///
/// Tables are static per tier and are copied before every transformation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpawnWeightTable {
    entries: Vec<WeightEntry>,
}

impl SpawnWeightTable {
    /// Creates a table from the provided entries.
    #[must_use]
    pub fn new(entries: Vec<WeightEntry>) -> Self {
        Self { entries }
    }

    /// Creates a table from `(kind, weight)` pairs.
    #[must_use]
    pub fn from_pairs(pairs: &[(&str, f32)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(kind, weight)| WeightEntry::new(*kind, *weight))
                .collect(),
        )
    }

    /// Entries in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[WeightEntry] {
        &self.entries
    }

    /// Reports whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Usable weight of `kind`, if the table declares it.
    #[must_use]
    pub fn weight_of(&self, kind: &SpawnKind) -> Option<f32> {
        self.entries
            .iter()
            .find(|entry| &entry.kind == kind)
            .map(WeightEntry::usable_weight)
    }

    /// Usable weight of `kind`, or `fallback` when the table does not declare it.
    #[must_use]
    pub fn weight_or(&self, kind: &SpawnKind, fallback: f32) -> f32 {
        self.weight_of(kind).unwrap_or(fallback)
    }

    /// Weight assumed for a referenced kind the table does not declare.
    ///
    /// This is the mean usable weight, or one for an empty table.
    #[must_use]
    pub fn uniform_weight(&self) -> f32 {
        if self.entries.is_empty() {
            1.0
        } else {
            self.total() / self.entries.len() as f32
        }
    }

    /// Sum of all usable weights.
    #[must_use]
    pub fn total(&self) -> f32 {
        self.entries.iter().map(WeightEntry::usable_weight).sum()
    }

    /// Returns a copy with every listed kind's weight multiplied by `factor`.
    #[must_use]
    pub fn scaled(&self, kinds: &[SpawnKind], factor: f32) -> Self {
        let factor = if factor.is_finite() { factor.max(0.0) } else { 1.0 };
        let entries = self
            .entries
            .iter()
            .map(|entry| {
                let weight = if kinds.contains(&entry.kind) {
                    entry.usable_weight() * factor
                } else {
                    entry.usable_weight()
                };
                WeightEntry::new(entry.kind.clone(), weight)
            })
            .collect();
        Self { entries }
    }
}

/// Caps how many times in a row a disruptive kind may be drawn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FairnessRule {
    /// Kind the rule constrains.
    pub kind: SpawnKind,
    /// Consecutive occurrences after which the kind is suppressed.
    pub max_consecutive: u32,
    /// Multiplier applied to the kind's weight once the cap is reached.
    #[serde(default = "default_fairness_damping")]
    pub damping: f32,
    /// Ceiling on the suppressed kind's share relative to every other kind.
    #[serde(default = "default_fairness_residual_share")]
    pub residual_share: f32,
}

impl FairnessRule {
    /// Creates a rule with the default damping and residual share.
    #[must_use]
    pub fn new(kind: impl Into<SpawnKind>, max_consecutive: u32) -> Self {
        Self {
            kind: kind.into(),
            max_consecutive,
            damping: default_fairness_damping(),
            residual_share: default_fairness_residual_share(),
        }
    }

    /// Overrides the damping factor.
    #[must_use]
    pub fn with_damping(mut self, damping: f32) -> Self {
        self.damping = damping;
        self
    }
}

fn default_fairness_damping() -> f32 {
    0.15
}

fn default_fairness_residual_share() -> f32 {
    0.005
}

/// Range an output parameter may take, from its easiest to its hardest value.
///
/// `easy` may be larger or smaller than `hard`; spawn intervals shrink as the
/// game gets harder while hazard weights grow.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    /// Value used at difficulty level zero.
    pub easy: f32,
    /// Value used at difficulty level one.
    pub hard: f32,
}

impl ParamRange {
    /// Creates a new range.
    #[must_use]
    pub const fn new(easy: f32, hard: f32) -> Self {
        Self { easy, hard }
    }

    /// Interpolates the parameter at a difficulty level in `[0, 1]`.
    #[must_use]
    pub fn at(&self, level: f32) -> f32 {
        let level = clamp_unit(level);
        self.easy + (self.hard - self.easy) * level
    }

    /// Smaller of the two endpoints.
    #[must_use]
    pub fn min(&self) -> f32 {
        self.easy.min(self.hard)
    }

    /// Larger of the two endpoints.
    #[must_use]
    pub fn max(&self) -> f32 {
        self.easy.max(self.hard)
    }

    /// Clamps a value into the range; non-finite values collapse to the easy end.
    #[must_use]
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_finite() {
            value.clamp(self.min(), self.max())
        } else {
            self.easy
        }
    }

    /// Reports whether both endpoints are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.easy.is_finite() && self.hard.is_finite()
    }
}

/// Bounds for every field of [`DifficultyOutput`] that the director tunes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputBounds {
    /// Delay between spawns in milliseconds.
    pub spawn_interval_ms: ParamRange,
    /// Target lifetime in milliseconds.
    pub time_to_live_ms: ParamRange,
    /// Multiplier applied to the base target size.
    pub size_mul: ParamRange,
    /// Multiplier applied to the weights of disruptive kinds.
    pub hazard_weight: ParamRange,
    /// Aim-assist lock radius in pixels.
    pub lock_assist_px: ParamRange,
}

impl OutputBounds {
    /// Named view over every range, used for validation and reporting.
    #[must_use]
    pub fn named(&self) -> [(&'static str, ParamRange); 5] {
        [
            ("spawn_interval_ms", self.spawn_interval_ms),
            ("time_to_live_ms", self.time_to_live_ms),
            ("size_mul", self.size_mul),
            ("hazard_weight", self.hazard_weight),
            ("lock_assist_px", self.lock_assist_px),
        ]
    }
}

/// Stress interval the adaptive controller tries to keep the player inside.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StressBand {
    /// Lower edge; stress below it makes the game harder.
    pub min: f32,
    /// Upper edge; stress above it makes the game easier.
    pub max: f32,
}

impl StressBand {
    /// Creates a new band.
    #[must_use]
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Signed distance from the band; zero inside it.
    #[must_use]
    pub fn error(&self, stress: f32) -> f32 {
        if stress > self.max {
            stress - self.max
        } else if stress < self.min {
            stress - self.min
        } else {
            0.0
        }
    }
}

/// Lifecycle of the difficulty director.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectorState {
    /// No tick has been observed yet.
    Idle,
    /// Ticks are flowing but too few actions have been judged to adapt.
    Warming,
    /// Adaptive control is active.
    Steady,
    /// The fixed research schedule drives the output.
    Research,
}

/// Coarse classification of the smoothed risk score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskBand {
    /// The player is comfortable.
    Low,
    /// Misses are becoming likely.
    Mid,
    /// A miss is the expected outcome.
    High,
}

/// Direction of the most recent difficulty decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Adjustment {
    /// Parameters moved toward their easy ends.
    Easier,
    /// Parameters moved toward their hard ends.
    Harder,
    /// Parameters were held.
    Hold,
}

/// Input signal that contributed to a difficulty decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// Online predictor risk.
    Predictor,
    /// Smoothed miss rate.
    MissRate,
    /// Current miss streak.
    MissStreak,
    /// Hazard exposure.
    Hazard,
    /// Reaction-time slowdown.
    Slowdown,
    /// Absolute reaction time.
    Reaction,
    /// Research schedule position.
    Schedule,
}

/// Weighted contribution of a single signal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// Signal that contributed.
    pub signal: Signal,
    /// Weighted value added to the stress estimate.
    pub value: f32,
}

/// Human-readable rationale attached to each difficulty output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// Director state when the output was produced.
    pub state: DirectorState,
    /// Direction of the decision.
    pub adjustment: Adjustment,
    /// Largest contributors, strongest first.
    pub top: Vec<Contribution>,
}

impl Explanation {
    /// Explanation for an output that has not been adapted.
    #[must_use]
    pub fn held(state: DirectorState) -> Self {
        Self {
            state,
            adjustment: Adjustment::Hold,
            top: Vec::new(),
        }
    }
}

/// Parameter bundle the host applies to its own spawner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifficultyOutput {
    /// Delay between spawns in milliseconds.
    pub spawn_interval_ms: f32,
    /// Target lifetime in milliseconds.
    pub time_to_live_ms: f32,
    /// Multiplier applied to the base target size.
    pub size_mul: f32,
    /// Multiplier applied to the weights of disruptive kinds.
    pub hazard_weight: f32,
    /// Aim-assist lock radius in pixels.
    pub lock_assist_px: f32,
    /// Estimated near-term risk of an undesirable outcome in `[0, 1]`.
    pub risk_score: f32,
    /// Rationale for the current values.
    pub explain: Explanation,
}

impl DifficultyOutput {
    /// Output holding the tier defaults, clamped into the tier bounds.
    #[must_use]
    pub fn from_base(base: &BaseParams, bounds: &OutputBounds, state: DirectorState) -> Self {
        Self {
            spawn_interval_ms: bounds.spawn_interval_ms.clamp(base.spawn_interval_ms),
            time_to_live_ms: bounds.time_to_live_ms.clamp(base.time_to_live_ms),
            size_mul: bounds.size_mul.clamp(base.size_mul),
            hazard_weight: bounds.hazard_weight.clamp(base.hazard_weight),
            lock_assist_px: bounds.lock_assist_px.clamp(base.lock_assist_px),
            risk_score: 0.0,
            explain: Explanation::held(state),
        }
    }
}

/// Named spatial choreography emitted by the pattern sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PatternKind {
    /// Serpentine pass across every zone.
    Sweep,
    /// Alternation between mirrored zones.
    Mirror,
    /// Visit of the four corner zones.
    Corners,
    /// Rapid cluster around the centre.
    Burst,
    /// Helpful lure followed by a disruptive target.
    Bait,
}

/// Problem found while sanitizing an ingested command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputIssue {
    /// Reaction time was negative, non-finite or implausibly large.
    ReactionTimeRejected,
    /// Zone identifier is outside the configured zone grid.
    ZoneOutOfRange,
    /// A context fraction was non-finite.
    ContextRejected,
}

/// Commands that express every permissible session mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Advances the session clock and refreshes the game context.
    Tick {
        /// Duration of host time that elapsed since the previous tick.
        dt: Duration,
        /// Game state observed at the tick.
        context: GameContext,
    },
    /// Records a judged player action.
    RecordAction {
        /// Action to record.
        action: ActionEvent,
    },
}

/// Events broadcast by the session after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A decision tick produced a new parameter bundle.
    DifficultyAdjusted {
        /// Bundle after the decision.
        output: DifficultyOutput,
    },
    /// The director moved to a new lifecycle state.
    StateChanged {
        /// State before the transition.
        from: DirectorState,
        /// State after the transition.
        to: DirectorState,
    },
    /// A spatial pattern was queued.
    PatternStarted {
        /// Pattern that was selected.
        pattern: PatternKind,
        /// Number of queued steps.
        steps: u8,
    },
    /// Part of an ingested command was dropped.
    ActionIgnored {
        /// Problem that was found.
        reason: InputIssue,
    },
}

/// Clamps a value into `[0, 1]`, mapping non-finite input to zero.
#[must_use]
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Maps `value` linearly from `[low, high]` onto `[0, 1]` and clamps.
#[must_use]
pub fn normalize(value: f32, low: f32, high: f32) -> f32 {
    let span = high - low;
    if !span.is_finite() || span.abs() <= f32::EPSILON {
        return 0.0;
    }
    clamp_unit((value - low) / span)
}

/// Cubic smoothstep on `[0, 1]`.
#[must_use]
pub fn softstep(value: f32) -> f32 {
    let x = clamp_unit(value);
    x * x * (3.0 - 2.0 * x)
}

/// Linear interpolation between `from` and `to`.
#[must_use]
pub fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_range_interpolates_in_either_direction() {
        let spawn = ParamRange::new(840.0, 600.0);
        assert!((spawn.at(0.0) - 840.0).abs() < f32::EPSILON);
        assert!((spawn.at(1.0) - 600.0).abs() < f32::EPSILON);
        assert!((spawn.at(2.0) - 600.0).abs() < f32::EPSILON);
        assert!((spawn.clamp(10_000.0) - 840.0).abs() < f32::EPSILON);
        assert!((spawn.clamp(f32::NAN) - 840.0).abs() < f32::EPSILON);
    }

    #[test]
    fn stress_band_error_is_zero_inside() {
        let band = StressBand::new(0.45, 0.55);
        assert_eq!(band.error(0.5), 0.0);
        assert!(band.error(0.75) > 0.0);
        assert!(band.error(0.1) < 0.0);
    }

    #[test]
    fn weight_table_scaling_copies_and_ignores_bad_weights() {
        let table = SpawnWeightTable::from_pairs(&[("normal", 10.0), ("bomb", 2.0), ("odd", -3.0)]);
        let scaled = table.scaled(&[SpawnKind::from(KIND_BOMB)], 2.0);
        assert_eq!(scaled.weight_of(&SpawnKind::from(KIND_BOMB)), Some(4.0));
        assert_eq!(table.weight_of(&SpawnKind::from(KIND_BOMB)), Some(2.0));
        assert_eq!(scaled.weight_of(&SpawnKind::from("odd")), Some(0.0));
        assert_eq!(table.weight_or(&SpawnKind::from("missing"), 1.0), 1.0);
    }

    #[test]
    fn undeclared_kinds_default_to_the_mean_weight() {
        let table = SpawnWeightTable::from_pairs(&[("normal", 9.0), ("bomb", 3.0), ("odd", -3.0)]);
        assert!((table.uniform_weight() - 4.0).abs() < f32::EPSILON);
        assert_eq!(SpawnWeightTable::default().uniform_weight(), 1.0);
    }

    #[test]
    fn normalize_clamps_extremes() {
        assert_eq!(normalize(100.0, 220.0, 750.0), 0.0);
        assert_eq!(normalize(9_000.0, 220.0, 750.0), 1.0);
        assert_eq!(normalize(f32::INFINITY, 220.0, 750.0), 0.0);
        assert_eq!(normalize(5.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn grade_is_ignored_on_misses() {
        let action = ActionEvent::miss(KIND_NORMAL).with_grade(HitGrade::Perfect);
        assert!(action.is_real_miss());
        assert!(!ActionEvent::expired(KIND_DECOY).is_real_miss());
    }

    #[test]
    fn recorded_action_logs_decode_unchanged() {
        let log = vec![
            ActionEvent::hit(KIND_NORMAL, Some(240.0))
                .with_grade(HitGrade::Good)
                .with_zone(ZoneId::new(3))
                .at(1_250),
            ActionEvent::miss(KIND_BOMB).at(1_900),
            ActionEvent::expired(KIND_DECOY),
        ];
        let bytes = bincode::serialize(&log).expect("log serializes");
        let decoded: Vec<ActionEvent> = bincode::deserialize(&bytes).expect("log decodes");
        assert_eq!(decoded, log);
        assert_eq!(bincode::serialize(&decoded).expect("log serializes"), bytes);
    }
}
