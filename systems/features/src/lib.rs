#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Player-model feature extraction.
//!
//! The tracker folds every judged action into constant-size exponentially
//! weighted averages, streak counters and per-zone statistics. Snapshots map
//! those raw aggregates through fixed linear anchors into `[0, 1]` so the
//! predictor and the director can consume them without knowing any units.

use std::time::Duration;

use reflex_director_core::{
    clamp_unit, normalize, ActionEvent, ActionOutcome, FeatureSnapshot, GameContext, HitGrade,
    InputIssue, SpawnKind, TierConfig, WeakZone, WeakZoneReason, ZoneId,
};
use tracing::trace;

/// Tuning knobs for the feature tracker.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureTuning {
    /// Smoothing factor of the fast reaction-time average.
    pub fast_alpha: f32,
    /// Smoothing factor of the slow reaction-time average.
    pub slow_alpha: f32,
    /// Smoothing factor of the absolute deviation from the slow average.
    pub deviation_alpha: f32,
    /// Smoothing factor of the miss-rate and hazard-exposure averages.
    pub outcome_alpha: f32,
    /// Smoothing factor of the grade precision average.
    pub precision_alpha: f32,
    /// Reaction time mapped to a normalized value of zero.
    pub reaction_good_ms: f32,
    /// Reaction time mapped to a normalized value of one.
    pub reaction_bad_ms: f32,
    /// Reaction time assumed until the first eligible hit.
    pub reaction_neutral_ms: f32,
    /// Deviation mapped to full volatility.
    pub volatility_anchor_ms: f32,
    /// Fast-over-slow lag mapped to full slowdown.
    pub slowdown_anchor_ms: f32,
    /// Miss streak length mapped to a full streak feature.
    pub miss_streak_anchor: u32,
    /// Hit streak length mapped to a full combo feature.
    pub hit_streak_anchor: u32,
    /// Precision assumed until the first graded hit.
    pub precision_neutral: f32,
    /// Length of the window used to measure action tempo.
    pub tempo_window: Duration,
    /// Actions per second mapped to full tempo.
    pub tempo_anchor: f32,
    /// Smoothing factor applied to each closed tempo window.
    pub tempo_alpha: f32,
    /// Number of zones tracked for weak-zone analysis.
    pub zone_count: u8,
    /// Samples a zone needs before it may be reported as weak.
    pub zone_min_samples: u32,
    /// Reaction times above this value are discarded as implausible.
    pub max_reaction_ms: f32,
    /// Contribution weights of the pressure index.
    pub pressure: PressureWeights,
}

impl Default for FeatureTuning {
    fn default() -> Self {
        Self {
            fast_alpha: 0.2,
            slow_alpha: 0.08,
            deviation_alpha: 0.08,
            outcome_alpha: 0.12,
            precision_alpha: 0.15,
            reaction_good_ms: 220.0,
            reaction_bad_ms: 750.0,
            reaction_neutral_ms: 420.0,
            volatility_anchor_ms: 250.0,
            slowdown_anchor_ms: 200.0,
            miss_streak_anchor: 5,
            hit_streak_anchor: 10,
            precision_neutral: 0.5,
            tempo_window: Duration::from_millis(600),
            tempo_anchor: 4.0,
            tempo_alpha: 0.3,
            zone_count: 6,
            zone_min_samples: 4,
            max_reaction_ms: 5_000.0,
            pressure: PressureWeights::default(),
        }
    }
}

/// Weights combining context signals into the pressure index.
#[derive(Clone, Debug, PartialEq)]
pub struct PressureWeights {
    /// Weight of the boss phase, normalized against `boss_phase_anchor`.
    pub boss: f32,
    /// Boss phase mapped to full boss pressure.
    pub boss_phase_anchor: f32,
    /// Weight of missing health.
    pub low_health: f32,
    /// Weight of elapsed session time.
    pub time: f32,
    /// Weight of the miss streak feature.
    pub miss_streak: f32,
}

impl Default for PressureWeights {
    fn default() -> Self {
        Self {
            boss: 0.35,
            boss_phase_anchor: 3.0,
            low_health: 0.35,
            time: 0.15,
            miss_streak: 0.15,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct ReactionStats {
    fast: f32,
    slow: f32,
    deviation: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct ZoneStats {
    hits: u32,
    misses: u32,
    reaction: Option<f32>,
}

impl ZoneStats {
    fn samples(&self) -> u32 {
        self.hits + self.misses
    }
}

/// Maintains smoothed player-performance aggregates for one session.
#[derive(Clone, Debug)]
pub struct FeatureTracker {
    tuning: FeatureTuning,
    reaction_kinds: Vec<SpawnKind>,
    disruptive_kinds: Vec<SpawnKind>,
    reaction: Option<ReactionStats>,
    miss_rate: f32,
    hazard: f32,
    precision: f32,
    miss_streak: u32,
    hit_streak: u32,
    judged: u32,
    window_actions: u32,
    window_elapsed: Duration,
    tempo: f32,
    context: GameContext,
    zones: Vec<ZoneStats>,
}

impl FeatureTracker {
    /// Creates a tracker for the kinds declared by the tier configuration.
    #[must_use]
    pub fn new(tuning: FeatureTuning, config: &TierConfig) -> Self {
        let zones = vec![ZoneStats::default(); usize::from(tuning.zone_count)];
        Self {
            precision: tuning.precision_neutral,
            reaction_kinds: config.reaction_kinds.clone(),
            disruptive_kinds: config.disruptive_kinds.clone(),
            reaction: None,
            miss_rate: 0.0,
            hazard: 0.0,
            miss_streak: 0,
            hit_streak: 0,
            judged: 0,
            window_actions: 0,
            window_elapsed: Duration::ZERO,
            tempo: 0.0,
            context: GameContext::default(),
            zones,
            tuning,
        }
    }

    /// Number of judged actions folded in so far.
    #[must_use]
    pub const fn judged(&self) -> u32 {
        self.judged
    }

    /// Advances time-based aggregates and stores the latest game context.
    ///
    /// Non-finite context fractions are dropped and reported through `issues`.
    pub fn tick(&mut self, dt: Duration, context: &GameContext, issues: &mut Vec<InputIssue>) {
        self.window_elapsed = self.window_elapsed.saturating_add(dt);
        if !self.tuning.tempo_window.is_zero() && self.window_elapsed >= self.tuning.tempo_window {
            let seconds = self.window_elapsed.as_secs_f32();
            let rate = self.window_actions as f32 / seconds;
            self.tempo += self.tuning.tempo_alpha * (rate - self.tempo);
            self.window_actions = 0;
            self.window_elapsed = Duration::ZERO;
        }

        let (context, rejected) = sanitize_context(context);
        if rejected {
            issues.push(InputIssue::ContextRejected);
        }
        self.context = context;
    }

    /// Folds a judged action into the aggregates.
    pub fn record(&mut self, action: &ActionEvent, issues: &mut Vec<InputIssue>) {
        let zone = self.accept_zone(action.zone, issues);
        match action.outcome {
            ActionOutcome::Hit { grade } => {
                self.on_hit(&action.target, action.reaction_time_ms, grade, zone, issues);
            }
            ActionOutcome::Miss { real } => self.on_miss(&action.target, real, zone),
        }
    }

    /// Records a hit on `target`.
    ///
    /// Only hits on reaction-eligible kinds update the reaction averages.
    /// Touching a disruptive kind counts as hazard exposure and breaks the combo.
    pub fn on_hit(
        &mut self,
        target: &SpawnKind,
        reaction_time_ms: Option<f32>,
        grade: Option<HitGrade>,
        zone: Option<ZoneId>,
        issues: &mut Vec<InputIssue>,
    ) {
        self.begin_action();
        let alpha = self.tuning.outcome_alpha;
        self.miss_rate += alpha * (0.0 - self.miss_rate);
        self.miss_streak = 0;

        if self.disruptive_kinds.contains(target) {
            self.hazard += alpha * (1.0 - self.hazard);
            self.hit_streak = 0;
            return;
        }
        self.hazard += alpha * (0.0 - self.hazard);
        self.hit_streak = self.hit_streak.saturating_add(1);

        if let Some(grade) = grade {
            self.precision += self.tuning.precision_alpha * (grade.quality() - self.precision);
        }

        let reaction = if self.reaction_kinds.contains(target) {
            self.accept_reaction(reaction_time_ms, issues)
        } else {
            None
        };
        if let Some(sample) = reaction {
            self.fold_reaction(sample);
        }

        if let Some(stats) = zone.and_then(|zone| self.zones.get_mut(usize::from(zone.get()))) {
            stats.hits += 1;
            if let Some(sample) = reaction {
                let previous = stats.reaction.unwrap_or(sample);
                stats.reaction = Some(previous + self.tuning.fast_alpha * (sample - previous));
            }
        }
    }

    /// Records a miss on `target`.
    ///
    /// Harmless misses, such as letting a decoy expire, count as judged but
    /// leave the miss statistics untouched.
    pub fn on_miss(&mut self, target: &SpawnKind, real: bool, zone: Option<ZoneId>) {
        self.begin_action();
        let alpha = self.tuning.outcome_alpha;
        self.hazard += alpha * (0.0 - self.hazard);
        if !real {
            self.miss_rate += alpha * (0.0 - self.miss_rate);
            trace!(kind = %target, "harmless miss recorded");
            return;
        }

        self.miss_rate += alpha * (1.0 - self.miss_rate);
        self.miss_streak = self.miss_streak.saturating_add(1);
        self.hit_streak = 0;
        if let Some(stats) = zone.and_then(|zone| self.zones.get_mut(usize::from(zone.get()))) {
            stats.misses += 1;
        }
    }

    /// Computes the normalized feature snapshot.
    ///
    /// `context` overrides the context stored by the latest tick. Reading a
    /// snapshot never mutates the tracker.
    #[must_use]
    pub fn snapshot(&self, context: Option<&GameContext>) -> FeatureSnapshot {
        let tuning = &self.tuning;
        let context = context.map_or(self.context, |context| sanitize_context(context).0);

        let fast = self
            .reaction
            .map_or(tuning.reaction_neutral_ms, |stats| stats.fast);
        let reaction = normalize(fast, tuning.reaction_good_ms, tuning.reaction_bad_ms);
        let (slowdown, volatility) = self.reaction.map_or((0.0, 0.0), |stats| {
            (
                normalize(stats.fast - stats.slow, 0.0, tuning.slowdown_anchor_ms),
                normalize(stats.deviation, 0.0, tuning.volatility_anchor_ms),
            )
        });
        let miss_rate = clamp_unit(self.miss_rate);
        let miss_streak = normalize(
            self.miss_streak as f32,
            0.0,
            tuning.miss_streak_anchor as f32,
        );
        let hit_streak = normalize(self.hit_streak as f32, 0.0, tuning.hit_streak_anchor as f32);
        let precision = clamp_unit(self.precision);

        let weights = &tuning.pressure;
        let boss = context
            .boss_phase
            .map_or(0.0, |phase| normalize(f32::from(phase), 0.0, weights.boss_phase_anchor));
        let low_health = context.hp_fraction.map_or(0.0, |hp| 1.0 - clamp_unit(hp));
        let late = context
            .time_left_fraction
            .map_or(0.0, |left| 1.0 - clamp_unit(left));
        let pressure = clamp_unit(
            weights.boss * boss
                + weights.low_health * low_health
                + weights.time * late
                + weights.miss_streak * miss_streak,
        );

        let control = clamp_unit(
            0.4 * (1.0 - miss_rate)
                + 0.25 * (1.0 - volatility)
                + 0.2 * precision
                + 0.15 * (1.0 - reaction),
        );

        FeatureSnapshot {
            reaction,
            slowdown,
            miss_rate,
            volatility,
            miss_streak,
            hit_streak,
            hazard: clamp_unit(self.hazard),
            precision,
            tempo: normalize(self.tempo, 0.0, tuning.tempo_anchor),
            pressure,
            control,
            weak_zone: self.weak_zone(),
            judged: self.judged,
        }
    }

    fn begin_action(&mut self) {
        self.judged = self.judged.saturating_add(1);
        self.window_actions = self.window_actions.saturating_add(1);
    }

    fn accept_zone(&self, zone: Option<ZoneId>, issues: &mut Vec<InputIssue>) -> Option<ZoneId> {
        let zone = zone?;
        if zone.get() < self.tuning.zone_count {
            Some(zone)
        } else {
            issues.push(InputIssue::ZoneOutOfRange);
            None
        }
    }

    fn accept_reaction(&self, sample: Option<f32>, issues: &mut Vec<InputIssue>) -> Option<f32> {
        let sample = sample?;
        if sample.is_finite() && (0.0..=self.tuning.max_reaction_ms).contains(&sample) {
            Some(sample)
        } else {
            trace!(sample, "ignored reaction time sample");
            issues.push(InputIssue::ReactionTimeRejected);
            None
        }
    }

    fn fold_reaction(&mut self, sample: f32) {
        let tuning = &self.tuning;
        let stats = match self.reaction {
            None => ReactionStats {
                fast: sample,
                slow: sample,
                deviation: 0.0,
            },
            Some(stats) => {
                let deviation = (sample - stats.slow).abs();
                ReactionStats {
                    fast: stats.fast + tuning.fast_alpha * (sample - stats.fast),
                    slow: stats.slow + tuning.slow_alpha * (sample - stats.slow),
                    deviation: stats.deviation
                        + tuning.deviation_alpha * (deviation - stats.deviation),
                }
            }
        };
        self.reaction = Some(stats);
    }

    fn weak_zone(&self) -> Option<WeakZone> {
        let tuning = &self.tuning;
        let mut weakest: Option<WeakZone> = None;
        for (index, stats) in self.zones.iter().enumerate() {
            if stats.samples() < tuning.zone_min_samples {
                continue;
            }
            let miss_share = stats.misses as f32 / stats.samples() as f32;
            let slowness = stats.reaction.map_or(0.0, |reaction| {
                normalize(reaction, tuning.reaction_good_ms, tuning.reaction_bad_ms)
            });
            let (score, reason) = if miss_share >= slowness {
                (miss_share, WeakZoneReason::Misses)
            } else {
                (slowness, WeakZoneReason::SlowReaction)
            };
            if score <= 0.0 || weakest.is_some_and(|current| current.score >= score) {
                continue;
            }
            let Ok(zone) = u8::try_from(index) else {
                continue;
            };
            weakest = Some(WeakZone {
                zone: ZoneId::new(zone),
                score: clamp_unit(score),
                reason,
            });
        }
        weakest
    }
}

fn sanitize_context(context: &GameContext) -> (GameContext, bool) {
    let mut rejected = false;
    let mut fraction = |value: Option<f32>| match value {
        Some(value) if !value.is_finite() => {
            rejected = true;
            None
        }
        other => other,
    };
    let hp_fraction = fraction(context.hp_fraction);
    let time_left_fraction = fraction(context.time_left_fraction);
    (
        GameContext {
            boss_phase: context.boss_phase,
            hp_fraction,
            time_left_fraction,
        },
        rejected,
    )
}
