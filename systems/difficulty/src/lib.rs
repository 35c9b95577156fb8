#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Difficulty control loop.
//!
//! In play mode the director blends live features and the predictor score
//! into a stress estimate once per decision interval, nudges a scalar
//! difficulty level toward the configured stress band by a bounded step, and
//! eases every output parameter toward that level. In research mode the level
//! follows a seed-perturbed piecewise-linear schedule over elapsed time and
//! never looks at player performance.

use std::time::Duration;

use reflex_director_core::{
    clamp_unit, lerp, Adjustment, BaseParams, Contribution, DeterministicRng, DifficultyOutput,
    DirectorState, Event, Explanation, FeatureSnapshot, Mode, OutputBounds, ParamRange, Signal,
    StressBand, TierConfig,
};
use tracing::debug;

/// Relative weight of every signal in the stress estimate.
#[derive(Clone, Debug, PartialEq)]
pub struct StressWeights {
    /// Predictor risk score.
    pub predictor: f32,
    /// Smoothed miss rate.
    pub miss_rate: f32,
    /// Miss streak feature.
    pub miss_streak: f32,
    /// Hazard exposure.
    pub hazard: f32,
    /// Reaction-time slowdown.
    pub slowdown: f32,
    /// Absolute reaction time.
    pub reaction: f32,
}

impl Default for StressWeights {
    fn default() -> Self {
        Self {
            predictor: 0.3,
            miss_rate: 0.3,
            miss_streak: 0.2,
            hazard: 0.1,
            slowdown: 0.05,
            reaction: 0.05,
        }
    }
}

/// Point of the research schedule.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduleKnot {
    /// Elapsed session time at which the level applies.
    pub at: Duration,
    /// Difficulty level in `[0, 1]`.
    pub level: f32,
}

impl ScheduleKnot {
    /// Creates a knot.
    #[must_use]
    pub const fn new(at: Duration, level: f32) -> Self {
        Self { at, level }
    }
}

/// Difficulty-versus-time curve followed in research mode.
#[derive(Clone, Debug, PartialEq)]
pub struct ResearchSchedule {
    /// Knots ordered by time; warm-up, mid and late segments lie between them.
    pub knots: Vec<ScheduleKnot>,
    /// Maximum seed-driven perturbation applied to every knot level.
    pub jitter: f32,
}

impl Default for ResearchSchedule {
    fn default() -> Self {
        Self {
            knots: vec![
                ScheduleKnot::new(Duration::ZERO, 0.2),
                ScheduleKnot::new(Duration::from_secs(20), 0.4),
                ScheduleKnot::new(Duration::from_secs(45), 0.65),
                ScheduleKnot::new(Duration::from_secs(90), 0.85),
            ],
            jitter: 0.05,
        }
    }
}

/// Tuning knobs for the difficulty director.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectorTuning {
    /// Time between two adaptive decisions.
    pub decision_interval: Duration,
    /// Judged actions required before the director adapts.
    pub min_samples: u32,
    /// Share of the new target blended into each output per decision.
    pub smoothing: f32,
    /// Multiplier turning stress error into a level step.
    pub gain: f32,
    /// Largest level change per decision.
    pub max_step: f32,
    /// Difficulty level at session start.
    pub initial_level: f32,
    /// Extra lock-assist radius granted to a struggling player.
    pub assist_boost_px: f32,
    /// Weight of the miss rate in the struggle signal.
    pub assist_miss_rate: f32,
    /// Weight of the miss streak in the struggle signal.
    pub assist_miss_streak: f32,
    /// Signal weights of the stress estimate.
    pub weights: StressWeights,
    /// Curve followed in research mode.
    pub schedule: ResearchSchedule,
}

impl Default for DirectorTuning {
    fn default() -> Self {
        Self {
            decision_interval: Duration::from_millis(1_000),
            min_samples: 5,
            smoothing: 0.3,
            gain: 2.0,
            max_step: 0.12,
            initial_level: 0.5,
            assist_boost_px: 14.0,
            assist_miss_rate: 0.65,
            assist_miss_streak: 0.35,
            weights: StressWeights::default(),
            schedule: ResearchSchedule::default(),
        }
    }
}

/// Live signals read by an adaptive decision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectorSignals {
    /// Current feature snapshot.
    pub features: FeatureSnapshot,
    /// Predictor risk score, when a predictor is available.
    pub prediction: Option<f32>,
}

/// Stress estimate and the weighted contributions it was built from.
#[derive(Clone, Debug, PartialEq)]
pub struct StressEstimate {
    /// Normalized stress in `[0, 1]`.
    pub stress: f32,
    /// Normalized contributions, strongest first.
    pub contributions: Vec<Contribution>,
}

/// Combines the live signals into a stress estimate.
///
/// Without a prediction, the remaining weights are renormalized.
#[must_use]
pub fn estimate_stress(weights: &StressWeights, signals: &DirectorSignals) -> StressEstimate {
    let features = &signals.features;
    let mut terms = vec![
        (Signal::MissRate, weights.miss_rate, features.miss_rate),
        (Signal::MissStreak, weights.miss_streak, features.miss_streak),
        (Signal::Hazard, weights.hazard, features.hazard),
        (Signal::Slowdown, weights.slowdown, features.slowdown),
        (Signal::Reaction, weights.reaction, features.reaction),
    ];
    if let Some(prediction) = signals.prediction {
        terms.insert(0, (Signal::Predictor, weights.predictor, prediction));
    }

    let total: f32 = terms.iter().map(|(_, weight, _)| weight.max(0.0)).sum();
    if !total.is_finite() || total <= 0.0 {
        return StressEstimate {
            stress: 0.0,
            contributions: Vec::new(),
        };
    }

    let mut contributions: Vec<Contribution> = terms
        .into_iter()
        .map(|(signal, weight, value)| Contribution {
            signal,
            value: weight.max(0.0) * clamp_unit(value) / total,
        })
        .collect();
    let stress = clamp_unit(contributions.iter().map(|c| c.value).sum());
    contributions.sort_by(|a, b| b.value.total_cmp(&a.value));
    StressEstimate {
        stress,
        contributions,
    }
}

/// Produces the difficulty parameter bundle for one session.
#[derive(Clone, Debug)]
pub struct DifficultyDirector {
    tuning: DirectorTuning,
    mode: Mode,
    base: BaseParams,
    bounds: OutputBounds,
    band: StressBand,
    state: DirectorState,
    level: f32,
    output: DifficultyOutput,
    elapsed: Duration,
    since_decision: Duration,
    schedule: Vec<ScheduleKnot>,
}

impl DifficultyDirector {
    /// Creates an adaptive director holding the tier defaults.
    #[must_use]
    pub fn play(tuning: DirectorTuning, config: &TierConfig) -> Self {
        let output = DifficultyOutput::from_base(&config.base, &config.bounds, DirectorState::Idle);
        Self {
            level: clamp_unit(tuning.initial_level),
            mode: Mode::Play,
            base: config.base,
            bounds: config.bounds,
            band: config.stress_band,
            state: DirectorState::Idle,
            output,
            elapsed: Duration::ZERO,
            since_decision: Duration::ZERO,
            schedule: Vec::new(),
            tuning,
        }
    }

    /// Creates a research director whose schedule is perturbed by `rng`.
    ///
    /// `rng` should be a stream dedicated to the schedule so the perturbation
    /// depends on the seed alone.
    #[must_use]
    pub fn research(tuning: DirectorTuning, config: &TierConfig, rng: &mut DeterministicRng) -> Self {
        let schedule = perturb_schedule(&tuning.schedule, rng);
        let mut director = Self {
            level: schedule.first().map_or(0.0, |knot| knot.level),
            mode: Mode::Research,
            base: config.base,
            bounds: config.bounds,
            band: config.stress_band,
            state: DirectorState::Research,
            output: DifficultyOutput::from_base(
                &config.base,
                &config.bounds,
                DirectorState::Research,
            ),
            elapsed: Duration::ZERO,
            since_decision: Duration::ZERO,
            schedule,
            tuning,
        };
        director.output = director.research_output_at(Duration::ZERO);
        director
    }

    /// Mode selected at construction.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> DirectorState {
        self.state
    }

    /// Current difficulty level in `[0, 1]`.
    #[must_use]
    pub const fn level(&self) -> f32 {
        self.level
    }

    /// Session time observed so far.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Latest parameter bundle.
    #[must_use]
    pub fn output(&self) -> &DifficultyOutput {
        &self.output
    }

    /// Starting parameters of the tier.
    #[must_use]
    pub fn base(&self) -> &BaseParams {
        &self.base
    }

    /// Advances the director by `dt`.
    ///
    /// `signals` is consulted only in play mode, and only when a decision is
    /// due. Research mode recomputes its output from elapsed time on every
    /// tick and reports it once per decision interval.
    pub fn tick<F>(&mut self, dt: Duration, signals: F, out: &mut Vec<Event>)
    where
        F: FnOnce() -> DirectorSignals,
    {
        self.elapsed = self.elapsed.saturating_add(dt);
        self.since_decision = self.since_decision.saturating_add(dt);
        let due = self.since_decision >= self.tuning.decision_interval;
        if due {
            self.since_decision = self.since_decision.saturating_sub(self.tuning.decision_interval);
            if self.since_decision >= self.tuning.decision_interval {
                self.since_decision = Duration::ZERO;
            }
        }

        match self.mode {
            Mode::Research => {
                self.output = self.research_output_at(self.elapsed);
                self.level = self.research_level_at(self.elapsed);
                if due {
                    out.push(Event::DifficultyAdjusted {
                        output: self.output.clone(),
                    });
                }
            }
            Mode::Play => {
                if self.state == DirectorState::Idle {
                    self.transition(DirectorState::Warming, out);
                }
                if due {
                    self.decide(&signals(), out);
                }
            }
        }
    }

    /// Research-mode difficulty level at `elapsed`.
    #[must_use]
    pub fn research_level_at(&self, elapsed: Duration) -> f32 {
        let Some(first) = self.schedule.first() else {
            return 0.0;
        };
        if elapsed <= first.at {
            return first.level;
        }
        for pair in self.schedule.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            if elapsed < to.at {
                let span = (to.at - from.at).as_secs_f32();
                let t = (elapsed - from.at).as_secs_f32() / span;
                return clamp_unit(lerp(from.level, to.level, t));
            }
        }
        self.schedule
            .last()
            .map_or(first.level, |knot| knot.level)
    }

    /// Research-mode parameter bundle at `elapsed`.
    ///
    /// A pure function of the elapsed time and the seed-perturbed schedule.
    #[must_use]
    pub fn research_output_at(&self, elapsed: Duration) -> DifficultyOutput {
        let level = self.research_level_at(elapsed);
        let later = self.research_level_at(elapsed.saturating_add(self.tuning.decision_interval));
        let adjustment = if later > level {
            Adjustment::Harder
        } else {
            Adjustment::Hold
        };
        let bounds = &self.bounds;
        DifficultyOutput {
            spawn_interval_ms: bounds.spawn_interval_ms.clamp(bounds.spawn_interval_ms.at(level)),
            time_to_live_ms: bounds.time_to_live_ms.clamp(bounds.time_to_live_ms.at(level)),
            size_mul: bounds.size_mul.clamp(bounds.size_mul.at(level)),
            hazard_weight: bounds.hazard_weight.clamp(bounds.hazard_weight.at(level)),
            lock_assist_px: bounds.lock_assist_px.clamp(bounds.lock_assist_px.at(level)),
            risk_score: 0.5,
            explain: Explanation {
                state: DirectorState::Research,
                adjustment,
                top: vec![Contribution {
                    signal: Signal::Schedule,
                    value: level,
                }],
            },
        }
    }

    fn decide(&mut self, signals: &DirectorSignals, out: &mut Vec<Event>) {
        let estimate = estimate_stress(&self.tuning.weights, signals);

        if signals.features.judged < self.tuning.min_samples {
            let mut held =
                DifficultyOutput::from_base(&self.base, &self.bounds, DirectorState::Warming);
            held.risk_score = estimate.stress;
            debug!(
                judged = signals.features.judged,
                stress = estimate.stress,
                "holding tier defaults until enough actions are judged"
            );
            self.publish(held, out);
            return;
        }
        if self.state != DirectorState::Steady {
            self.transition(DirectorState::Steady, out);
        }

        let tuning = &self.tuning;
        let error = self.band.error(estimate.stress);
        let step = (error * tuning.gain).clamp(-tuning.max_step, tuning.max_step);
        self.level = clamp_unit(self.level - step);
        let adjustment = if step < 0.0 {
            Adjustment::Harder
        } else if step > 0.0 {
            Adjustment::Easier
        } else {
            Adjustment::Hold
        };

        let features = &signals.features;
        let struggle = clamp_unit(
            tuning.assist_miss_rate * features.miss_rate
                + tuning.assist_miss_streak * features.miss_streak,
        );
        let bounds = &self.bounds;
        let level = self.level;
        let blend = clamp_unit(tuning.smoothing);
        let ease = |range: ParamRange, previous: f32, extra: f32| {
            range.clamp(lerp(previous, range.at(level) + extra, blend))
        };
        let previous = &self.output;
        let output = DifficultyOutput {
            spawn_interval_ms: ease(bounds.spawn_interval_ms, previous.spawn_interval_ms, 0.0),
            time_to_live_ms: ease(bounds.time_to_live_ms, previous.time_to_live_ms, 0.0),
            size_mul: ease(bounds.size_mul, previous.size_mul, 0.0),
            hazard_weight: ease(bounds.hazard_weight, previous.hazard_weight, 0.0),
            lock_assist_px: ease(
                bounds.lock_assist_px,
                previous.lock_assist_px,
                struggle * tuning.assist_boost_px,
            ),
            risk_score: estimate.stress,
            explain: Explanation {
                state: DirectorState::Steady,
                adjustment,
                top: estimate.contributions.into_iter().take(2).collect(),
            },
        };

        debug!(
            stress = output.risk_score,
            level,
            spawn_interval_ms = output.spawn_interval_ms,
            ?adjustment,
            "difficulty decision"
        );
        self.publish(output, out);
    }

    fn publish(&mut self, output: DifficultyOutput, out: &mut Vec<Event>) {
        if output != self.output {
            self.output = output;
            out.push(Event::DifficultyAdjusted {
                output: self.output.clone(),
            });
        }
    }

    fn transition(&mut self, to: DirectorState, out: &mut Vec<Event>) {
        let from = self.state;
        self.state = to;
        self.output.explain.state = to;
        out.push(Event::StateChanged { from, to });
    }
}

fn perturb_schedule(schedule: &ResearchSchedule, rng: &mut DeterministicRng) -> Vec<ScheduleKnot> {
    let jitter = schedule.jitter.abs();
    let mut knots = schedule.knots.clone();
    knots.sort_by_key(|knot| knot.at);
    let mut floor = 0.0f32;
    for knot in &mut knots {
        let offset = rng.range(-jitter, jitter);
        knot.level = clamp_unit(knot.level + offset).max(floor);
        floor = knot.level;
    }
    knots
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_director_core::{Seed, Tier};

    fn features(miss_rate: f32, judged: u32) -> FeatureSnapshot {
        FeatureSnapshot {
            reaction: 0.2,
            slowdown: 0.0,
            miss_rate,
            volatility: 0.0,
            miss_streak: 0.0,
            hit_streak: 0.0,
            hazard: 0.0,
            precision: 0.5,
            tempo: 0.0,
            pressure: 0.0,
            control: 0.5,
            weak_zone: None,
            judged,
        }
    }

    fn signals(miss_rate: f32, judged: u32, prediction: Option<f32>) -> DirectorSignals {
        DirectorSignals {
            features: features(miss_rate, judged),
            prediction,
        }
    }

    #[test]
    fn stress_renormalizes_without_prediction() {
        let weights = StressWeights::default();
        let estimate = estimate_stress(&weights, &signals(1.0, 10, None));
        assert!((estimate.stress - (0.3 + 0.05 * 0.2) / 0.7).abs() < 1e-5);
        assert_eq!(estimate.contributions[0].signal, Signal::MissRate);
        assert!(estimate
            .contributions
            .iter()
            .all(|contribution| contribution.signal != Signal::Predictor));
    }

    #[test]
    fn first_tick_leaves_idle_and_warming_holds_defaults() {
        let config = TierConfig::preset(Tier::Normal);
        let mut director = DifficultyDirector::play(DirectorTuning::default(), &config);
        assert_eq!(director.state(), DirectorState::Idle);

        let mut events = Vec::new();
        for _ in 0..5 {
            director.tick(
                Duration::from_millis(500),
                || signals(1.0, 3, Some(0.9)),
                &mut events,
            );
        }
        assert_eq!(director.state(), DirectorState::Warming);
        assert_eq!(
            events[0],
            Event::StateChanged {
                from: DirectorState::Idle,
                to: DirectorState::Warming
            }
        );
        assert_eq!(director.output().spawn_interval_ms, 780.0);
        assert_eq!(director.output().time_to_live_ms, 1600.0);
    }

    #[test]
    fn signals_are_read_only_when_a_decision_is_due() {
        let config = TierConfig::default();
        let mut director = DifficultyDirector::play(DirectorTuning::default(), &config);
        let mut events = Vec::new();
        let mut reads = 0;
        for _ in 0..10 {
            director.tick(
                Duration::from_millis(250),
                || {
                    reads += 1;
                    signals(0.0, 10, Some(0.1))
                },
                &mut events,
            );
        }
        assert_eq!(reads, 2);
    }

    #[test]
    fn low_stress_makes_the_game_harder() {
        let config = TierConfig::default();
        let mut director = DifficultyDirector::play(DirectorTuning::default(), &config);
        let mut events = Vec::new();
        let mut previous = director.output().spawn_interval_ms;
        for _ in 0..30 {
            director.tick(
                Duration::from_secs(1),
                || signals(0.0, 50, Some(0.05)),
                &mut events,
            );
            let current = director.output().spawn_interval_ms;
            assert!(current <= previous + 1e-3);
            previous = current;
        }
        assert_eq!(director.state(), DirectorState::Steady);
        assert_eq!(director.output().explain.adjustment, Adjustment::Harder);
        assert!((previous - config.bounds.spawn_interval_ms.hard).abs() < 5.0);
    }

    #[test]
    fn high_stress_makes_the_game_easier_and_boosts_assist() {
        let config = TierConfig::default();
        let mut director = DifficultyDirector::play(DirectorTuning::default(), &config);
        let mut events = Vec::new();
        for _ in 0..30 {
            director.tick(
                Duration::from_secs(1),
                || {
                    let mut signals = signals(1.0, 50, Some(0.95));
                    signals.features.miss_streak = 1.0;
                    signals
                },
                &mut events,
            );
        }
        let output = director.output();
        assert_eq!(output.explain.adjustment, Adjustment::Easier);
        assert!(output.risk_score > 0.55);
        assert!((output.spawn_interval_ms - config.bounds.spawn_interval_ms.easy).abs() < 5.0);
        assert!((output.lock_assist_px - config.bounds.lock_assist_px.max()).abs() < 1e-3);
        assert_eq!(output.explain.top.len(), 2);
    }

    #[test]
    fn stress_inside_the_band_holds_the_level() {
        let config = TierConfig::default();
        let mut director = DifficultyDirector::play(DirectorTuning::default(), &config);
        let mut events = Vec::new();
        director.tick(
            Duration::from_secs(1),
            || DirectorSignals {
                features: FeatureSnapshot {
                    reaction: 0.5,
                    slowdown: 0.5,
                    miss_rate: 0.5,
                    miss_streak: 0.5,
                    hazard: 0.5,
                    ..features(0.5, 20)
                },
                prediction: Some(0.5),
            },
            &mut events,
        );
        assert_eq!(director.level(), 0.5);
        assert_eq!(director.output().explain.adjustment, Adjustment::Hold);
    }

    #[test]
    fn research_schedule_is_monotone_and_bounded() {
        let config = TierConfig::preset(Tier::Hard);
        let mut rng = DeterministicRng::new(&Seed::from("schedule"));
        let director = DifficultyDirector::research(DirectorTuning::default(), &config, &mut rng);
        let mut previous = 0.0;
        for second in 0..200 {
            let level = director.research_level_at(Duration::from_secs(second));
            assert!((0.0..=1.0).contains(&level));
            assert!(level >= previous);
            previous = level;
        }
        let early = director.research_level_at(Duration::ZERO);
        assert!((early - 0.2).abs() <= 0.05 + 1e-6);
    }

    #[test]
    fn research_output_ignores_signals() {
        let config = TierConfig::default();
        let mut rng = DeterministicRng::new(&Seed::from("isolation"));
        let mut director = DifficultyDirector::research(DirectorTuning::default(), &config, &mut rng);
        let mut events = Vec::new();
        for _ in 0..12 {
            director.tick(
                Duration::from_millis(750),
                || panic!("research mode must not read live signals"),
                &mut events,
            );
        }
        assert_eq!(director.state(), DirectorState::Research);
        assert_eq!(
            director.output(),
            &director.research_output_at(Duration::from_millis(9_000))
        );
        assert!(events
            .iter()
            .all(|event| matches!(event, Event::DifficultyAdjusted { .. })));
    }
}
