#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative per-session state for the reflex director engine.
//!
//! A [`Session`] owns exactly one instance of every system, forks one random
//! stream per stochastic subsystem from the session seed, applies ingest
//! commands, and answers the host's queries. Sessions never share state; dropping
//! one ends all adaptation for that player.

use std::{mem, time::Duration};

use glam::Vec2;
use reflex_director_core::{
    ActionEvent, Command, ConfigError, DeterministicRng, DifficultyOutput, Event, GameContext,
    Mode, PatternKind, Seed, SpawnKind, Tier, TierConfig, ZoneId, KIND_NORMAL,
};
use reflex_director_system_difficulty::{DifficultyDirector, DirectorSignals, DirectorTuning};
use reflex_director_system_features::{FeatureTracker, FeatureTuning};
use reflex_director_system_patterns::{PatternContext, PatternSequencer, PatternTuning};
use reflex_director_system_placement::{AreaRect, PlacementTuning, SpatialPlacement};
use reflex_director_system_predictor::{OnlinePredictor, PredictorTuning, RiskSmoother};
use reflex_director_system_selection::{SelectorTuning, WeightedSelector};
use tracing::{info, warn};

/// Seed used by research sessions constructed without an explicit seed.
pub const RESEARCH_DEFAULT_SEED: &str = "research-default-seed";

/// Tuning of every subsystem owned by a session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineTuning {
    /// Feature extraction.
    pub features: FeatureTuning,
    /// Online predictor.
    pub predictor: PredictorTuning,
    /// Weighted selector.
    pub selector: SelectorTuning,
    /// Spatial placement.
    pub placement: PlacementTuning,
    /// Difficulty director.
    pub director: DirectorTuning,
    /// Pattern sequencer.
    pub patterns: PatternTuning,
}

/// Everything fixed at session construction.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Tier configuration.
    pub tier: TierConfig,
    /// Subsystem tuning.
    pub tuning: EngineTuning,
    /// Adaptive or research mode.
    pub mode: Mode,
    /// Session seed; play sessions without one draw from OS entropy.
    pub seed: Option<Seed>,
    /// Rectangle spawns are placed in.
    pub play_area: AreaRect,
}

impl SessionConfig {
    /// Play-mode configuration for a built-in tier.
    #[must_use]
    pub fn new(tier: Tier) -> Self {
        Self {
            tier: TierConfig::preset(tier),
            tuning: EngineTuning::default(),
            mode: Mode::Play,
            seed: None,
            play_area: AreaRect::new(0.0, 0.0, 1_280.0, 720.0),
        }
    }

    /// Selects the session mode.
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Fixes the session seed.
    #[must_use]
    pub fn with_seed(mut self, seed: impl Into<Seed>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    /// Replaces the play area.
    #[must_use]
    pub fn with_play_area(mut self, play_area: AreaRect) -> Self {
        self.play_area = play_area;
        self
    }

    /// Replaces the subsystem tuning.
    #[must_use]
    pub fn with_tuning(mut self, tuning: EngineTuning) -> Self {
        self.tuning = tuning;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(Tier::Normal)
    }
}

/// Everything the host spawner needs to create the next target.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnDecision {
    /// Kind to spawn.
    pub kind: SpawnKind,
    /// Centre of the target in play-area pixels.
    pub position: Vec2,
    /// Zone containing the position.
    pub zone: ZoneId,
    /// Size multiplier applied to the tier's base target size.
    pub size_mul: f32,
    /// Resulting target diameter in pixels.
    pub size_px: f32,
    /// Lifetime of the target in milliseconds.
    pub time_to_live_ms: f32,
    /// Pattern the spawn belongs to, if any.
    pub pattern: Option<PatternKind>,
}

/// Explicit per-player engine instance.
#[derive(Debug)]
pub struct Session {
    config: TierConfig,
    mode: Mode,
    seed_state: u32,
    play_area: AreaRect,
    features: FeatureTracker,
    predictor: Option<OnlinePredictor>,
    risk: RiskSmoother,
    director: DifficultyDirector,
    selector: WeightedSelector,
    placement: SpatialPlacement,
    patterns: PatternSequencer,
    selector_rng: DeterministicRng,
    placement_rng: DeterministicRng,
    pattern_rng: DeterministicRng,
    outbox: Vec<Event>,
}

impl Session {
    /// Creates a session, replacing an invalid tier configuration with its preset.
    #[must_use]
    pub fn new(mut config: SessionConfig) -> Self {
        if let Err(error) = config.tier.validate() {
            warn!(%error, tier = ?config.tier.tier, "invalid tier configuration, using preset");
            config.tier = TierConfig::preset(config.tier.tier);
        }
        Self::build(config)
    }

    /// Creates a session, rejecting an invalid tier configuration.
    pub fn try_new(config: SessionConfig) -> Result<Self, ConfigError> {
        config.tier.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SessionConfig) -> Self {
        let SessionConfig {
            tier,
            tuning,
            mode,
            seed,
            play_area,
        } = config;
        let seed = seed.unwrap_or_else(|| match mode {
            Mode::Play => Seed::fresh(),
            Mode::Research => Seed::from(RESEARCH_DEFAULT_SEED),
        });
        let root = DeterministicRng::new(&seed);

        // Zone statistics follow the placement grid.
        let mut feature_tuning = tuning.features;
        feature_tuning.zone_count = tuning.placement.grid.count();
        let zone_count = feature_tuning.zone_count;

        let (predictor, director) = match mode {
            Mode::Play => {
                let mut stream = root.fork("predictor");
                (
                    Some(OnlinePredictor::new(&tuning.predictor, &mut stream)),
                    DifficultyDirector::play(tuning.director, &tier),
                )
            }
            Mode::Research => {
                let mut stream = root.fork("research");
                (
                    None,
                    DifficultyDirector::research(tuning.director, &tier, &mut stream),
                )
            }
        };

        info!(
            ?mode,
            tier = ?tier.tier,
            seed = root.origin(),
            "session created"
        );

        Self {
            features: FeatureTracker::new(feature_tuning, &tier),
            risk: RiskSmoother::new(tuning.predictor.risk),
            selector: WeightedSelector::new(tuning.selector, &tier),
            placement: SpatialPlacement::new(tuning.placement),
            patterns: PatternSequencer::new(tuning.patterns, zone_count),
            selector_rng: root.fork("selector"),
            placement_rng: root.fork("placement"),
            pattern_rng: root.fork("pattern"),
            seed_state: root.origin(),
            outbox: Vec::new(),
            config: tier,
            mode,
            play_area,
            predictor,
            director,
        }
    }

    /// Advances the session clock and refreshes the game context.
    pub fn tick(&mut self, dt: Duration, context: GameContext) {
        let mut events = mem::take(&mut self.outbox);
        apply(self, Command::Tick { dt, context }, &mut events);
        self.outbox = events;
    }

    /// Records a judged player action.
    pub fn on_action(&mut self, action: ActionEvent) {
        let mut events = mem::take(&mut self.outbox);
        apply(self, Command::RecordAction { action }, &mut events);
        self.outbox = events;
    }

    /// Drains every event emitted since the previous call.
    #[must_use]
    pub fn take_events(&mut self) -> Vec<Event> {
        mem::take(&mut self.outbox)
    }

    /// Chooses the kind, position and size of the next spawn.
    ///
    /// Queued pattern steps take precedence over single-step selection.
    pub fn choose_next_spawn(&mut self) -> SpawnDecision {
        let output = self.director.output().clone();
        let pressure = match self.mode {
            Mode::Play => self.features.snapshot(None).pressure,
            Mode::Research => 0.0,
        };
        let context = PatternContext {
            level: self.director.level(),
            pressure,
            size_mul: output.size_mul,
        };
        let base_size = self.director.base().target_size_px;

        if let Some(step) = self
            .patterns
            .next_step(&context, &mut self.pattern_rng, &mut self.outbox)
        {
            // Undeclared kinds count at the mean weight; zero-weighted or capped
            // kinds fall back to the selector.
            let fallback = self.config.weights.uniform_weight();
            let forced = step.kind.filter(|kind| {
                self.config.weights.weight_or(kind, fallback) > 0.0
                    && !self.selector.is_capped(kind, &self.config.fairness)
            });
            let kind = match forced {
                Some(kind) => {
                    self.selector.observe(&kind);
                    kind
                }
                None => self.select_kind(&output),
            };
            let size_px = base_size * step.size_mul;
            let position = self.placement.choose_in_zone(
                &self.play_area,
                step.zone,
                size_px,
                &mut self.placement_rng,
            );
            return SpawnDecision {
                kind,
                position,
                zone: step.zone,
                size_mul: step.size_mul,
                size_px,
                time_to_live_ms: output.time_to_live_ms,
                pattern: Some(step.pattern),
            };
        }

        let kind = self.select_kind(&output);
        let size_px = base_size * output.size_mul;
        let position =
            self.placement
                .choose_position(&self.play_area, size_px, &mut self.placement_rng);
        let zone = self.placement.grid().zone_of(&self.play_area, position);
        self.patterns.note_zone(zone);
        SpawnDecision {
            kind,
            position,
            zone,
            size_mul: output.size_mul,
            size_px,
            time_to_live_ms: output.time_to_live_ms,
            pattern: None,
        }
    }

    fn select_kind(&mut self, output: &DifficultyOutput) -> SpawnKind {
        let weights = self
            .config
            .weights
            .scaled(&self.config.disruptive_kinds, output.hazard_weight);
        self.selector
            .choose(
                &weights,
                &self.config.fairness,
                self.director.level(),
                &mut self.selector_rng,
            )
            .unwrap_or_else(|| SpawnKind::from(KIND_NORMAL))
    }

    fn is_undesirable(&self, action: &ActionEvent) -> bool {
        action.is_real_miss() || (action.is_hit() && self.config.is_disruptive(&action.target))
    }
}

/// Applies a command to the session, appending the resulting events to `out_events`.
pub fn apply(session: &mut Session, command: Command, out_events: &mut Vec<Event>) {
    let mut issues = Vec::new();
    match command {
        Command::Tick { dt, context } => {
            session.features.tick(dt, &context, &mut issues);
            let features = &session.features;
            let predictor = &session.predictor;
            session.director.tick(
                dt,
                || {
                    let snapshot = features.snapshot(None);
                    DirectorSignals {
                        prediction: predictor
                            .as_ref()
                            .map(|predictor| predictor.predict(&snapshot.to_vector())),
                        features: snapshot,
                    }
                },
                out_events,
            );
            if let Some(predictor) = session.predictor.as_ref() {
                let features = session.features.snapshot(None).to_vector();
                let _ = session.risk.observe(predictor.predict(&features));
            }
        }
        Command::RecordAction { action } => {
            let label = session.is_undesirable(&action);
            if let Some(predictor) = session.predictor.as_mut() {
                let before = session.features.snapshot(None).to_vector();
                let _ = predictor.train(&before, label);
            }
            session.features.record(&action, &mut issues);
        }
    }
    out_events.extend(
        issues
            .into_iter()
            .map(|reason| Event::ActionIgnored { reason }),
    );
}

/// Query functions that provide read-only access to the session state.
pub mod query {
    use std::time::Duration;

    use super::Session;
    use reflex_director_core::{
        DifficultyOutput, DirectorState, FeatureSnapshot, Mode, RiskBand, TierConfig,
    };

    /// Latest difficulty parameter bundle.
    #[must_use]
    pub fn difficulty_output(session: &Session) -> &DifficultyOutput {
        session.director.output()
    }

    /// Current normalized player features.
    #[must_use]
    pub fn feature_snapshot(session: &Session) -> FeatureSnapshot {
        session.features.snapshot(None)
    }

    /// Predictor risk for the current features; `None` in research mode.
    #[must_use]
    pub fn predicted_risk(session: &Session) -> Option<f32> {
        let features = session.features.snapshot(None).to_vector();
        session
            .predictor
            .as_ref()
            .map(|predictor| predictor.predict(&features))
    }

    /// Predicted risk smoothed across ticks; `None` in research mode or before the first tick.
    #[must_use]
    pub fn smoothed_risk(session: &Session) -> Option<f32> {
        session.risk.score()
    }

    /// Band of the smoothed risk; `None` whenever [`smoothed_risk`] is.
    #[must_use]
    pub fn risk_band(session: &Session) -> Option<RiskBand> {
        session.risk.band()
    }

    /// Lifecycle state of the difficulty director.
    #[must_use]
    pub fn director_state(session: &Session) -> DirectorState {
        session.director.state()
    }

    /// Session time observed so far.
    #[must_use]
    pub fn elapsed(session: &Session) -> Duration {
        session.director.elapsed()
    }

    /// Mode selected at construction.
    #[must_use]
    pub fn mode(session: &Session) -> Mode {
        session.mode
    }

    /// 32-bit state the session seed reduced to.
    #[must_use]
    pub fn seed_state(session: &Session) -> u32 {
        session.seed_state
    }

    /// Tier configuration in effect.
    #[must_use]
    pub fn tier_config(session: &Session) -> &TierConfig {
        &session.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_director_core::{BaseParams, DirectorState, InputIssue, SpawnWeightTable, StressBand};

    #[test]
    fn unseeded_research_sessions_use_the_default_seed() {
        let session = Session::new(SessionConfig::default().with_mode(Mode::Research));
        assert_eq!(
            query::seed_state(&session),
            Seed::from(RESEARCH_DEFAULT_SEED).state()
        );
        assert_eq!(query::director_state(&session), DirectorState::Research);
        assert_eq!(query::predicted_risk(&session), None);
    }

    #[test]
    fn smoothed_risk_starts_at_the_first_prediction() {
        let mut session = Session::new(SessionConfig::default().with_seed(21u32));
        assert_eq!(query::smoothed_risk(&session), None);
        session.on_action(ActionEvent::hit(KIND_NORMAL, Some(320.0)));
        session.tick(Duration::from_millis(200), GameContext::default());
        assert_eq!(query::smoothed_risk(&session), query::predicted_risk(&session));
        assert!(query::risk_band(&session).is_some());

        let mut research = Session::new(SessionConfig::default().with_mode(Mode::Research));
        research.tick(Duration::from_millis(200), GameContext::default());
        assert_eq!(query::smoothed_risk(&research), None);
        assert_eq!(query::risk_band(&research), None);
    }

    #[test]
    fn invalid_configuration_falls_back_to_preset() {
        let mut config = SessionConfig::new(Tier::Hard).with_seed(1u32);
        config.tier.stress_band = StressBand::new(0.9, 0.1);
        config.tier.weights = SpawnWeightTable::default();

        assert!(Session::try_new(config.clone()).is_err());
        let session = Session::new(config);
        assert_eq!(query::tier_config(&session), &TierConfig::preset(Tier::Hard));
    }

    #[test]
    fn initial_output_holds_tier_defaults() {
        let session = Session::new(SessionConfig::new(Tier::Easy).with_seed("defaults"));
        let output = query::difficulty_output(&session);
        let base = BaseParams::for_tier(Tier::Easy);
        assert_eq!(output.spawn_interval_ms, base.spawn_interval_ms);
        assert_eq!(output.time_to_live_ms, base.time_to_live_ms);
        assert_eq!(output.lock_assist_px, base.lock_assist_px);
        assert_eq!(query::director_state(&session), DirectorState::Idle);
    }

    #[test]
    fn malformed_actions_are_reported_and_still_counted() {
        let mut session = Session::new(SessionConfig::default().with_seed(12u32));
        session.on_action(
            ActionEvent::hit(KIND_NORMAL, Some(f32::NAN)).with_zone(ZoneId::new(99)),
        );
        assert_eq!(
            session.take_events(),
            vec![
                Event::ActionIgnored {
                    reason: InputIssue::ZoneOutOfRange
                },
                Event::ActionIgnored {
                    reason: InputIssue::ReactionTimeRejected
                },
            ]
        );
        assert_eq!(query::feature_snapshot(&session).judged, 1);
        assert!(session.take_events().is_empty());
    }

    #[test]
    fn undesirable_outcomes_include_disruptive_hits() {
        let session = Session::new(SessionConfig::default().with_seed(3u32));
        assert!(session.is_undesirable(&ActionEvent::miss(KIND_NORMAL)));
        assert!(session.is_undesirable(&ActionEvent::hit("bomb", None)));
        assert!(!session.is_undesirable(&ActionEvent::hit(KIND_NORMAL, Some(250.0))));
        assert!(!session.is_undesirable(&ActionEvent::expired("decoy")));
    }
}
