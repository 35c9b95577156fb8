#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Short spatial choreographies layered over single-step selection.

use std::collections::VecDeque;

use reflex_director_core::{
    clamp_unit, lerp, DeterministicRng, Event, PatternKind, SpawnKind, ZoneId, KIND_BOMB,
    KIND_DECOY, KIND_HEAL, KIND_NORMAL,
};
use reflex_director_system_selection::pick_weighted;
use tracing::debug;

/// Fixed description of one named pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternTemplate {
    /// Pattern the template expands.
    pub kind: PatternKind,
    /// Zone permutation visited in order, wrapping when the pattern is longer.
    pub zones: Vec<u8>,
    /// Kinds forced onto the steps in order; empty leaves the choice to the selector.
    pub kinds: Vec<SpawnKind>,
    /// Multiplier applied on top of the current size multiplier.
    pub size_factor: f32,
    /// Selection weight at difficulty level zero.
    pub weight: f32,
    /// Additional selection weight reached at difficulty level one.
    pub level_weight: f32,
    /// Whether the permutation may be walked backwards.
    pub reversible: bool,
}

impl PatternTemplate {
    fn new(kind: PatternKind, zones: &[u8], weight: f32, level_weight: f32) -> Self {
        Self {
            kind,
            zones: zones.to_vec(),
            kinds: Vec::new(),
            size_factor: 1.0,
            weight,
            level_weight,
            reversible: false,
        }
    }

    /// Built-in templates for a three by two zone grid.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                reversible: true,
                ..Self::new(PatternKind::Sweep, &[0, 1, 2, 5, 4, 3], 1.0, 0.0)
            },
            Self::new(PatternKind::Mirror, &[0, 2, 3, 5, 1, 4], 0.9, 0.2),
            Self::new(PatternKind::Corners, &[0, 2, 5, 3], 0.8, 0.2),
            Self {
                size_factor: 0.9,
                ..Self::new(PatternKind::Burst, &[4, 1, 3, 5, 4], 0.4, 0.8)
            },
            Self {
                kinds: [KIND_HEAL, KIND_DECOY, KIND_NORMAL, KIND_BOMB]
                    .into_iter()
                    .map(SpawnKind::from)
                    .collect(),
                ..Self::new(PatternKind::Bait, &[1, 4, 0, 2], 0.3, 0.7)
            },
        ]
    }

    fn weight_at(&self, level: f32) -> f32 {
        self.weight + self.level_weight * clamp_unit(level)
    }
}

/// Tuning knobs for the pattern sequencer.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternTuning {
    /// Trigger probability with no pressure.
    pub base_probability: f32,
    /// Trigger probability added at full pressure.
    pub pressure_gain: f32,
    /// Upper limit on the trigger probability.
    pub max_probability: f32,
    /// Single-step spawns required between two patterns.
    pub cooldown_spawns: u32,
    /// Steps in a pattern at difficulty level zero.
    pub min_steps: u8,
    /// Steps in a pattern at difficulty level one.
    pub max_steps: u8,
    /// Weight multiplier applied to the previously played pattern.
    pub repeat_penalty: f32,
    /// Probability that a step repeating the previous zone is moved elsewhere.
    pub zone_avoidance: f32,
    /// Templates available for selection.
    pub templates: Vec<PatternTemplate>,
}

impl Default for PatternTuning {
    fn default() -> Self {
        Self {
            base_probability: 0.12,
            pressure_gain: 0.25,
            max_probability: 0.6,
            cooldown_spawns: 4,
            min_steps: 3,
            max_steps: 7,
            repeat_penalty: 0.55,
            zone_avoidance: 0.9,
            templates: PatternTemplate::defaults(),
        }
    }
}

/// Difficulty signals that parameterize pattern selection and expansion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatternContext {
    /// Difficulty level in `[0, 1]`.
    pub level: f32,
    /// Situational pressure in `[0, 1]`.
    pub pressure: f32,
    /// Current target size multiplier.
    pub size_mul: f32,
}

/// One queued spawn of a pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternStep {
    /// Pattern the step belongs to.
    pub pattern: PatternKind,
    /// Forced kind, or `None` to let the selector decide.
    pub kind: Option<SpawnKind>,
    /// Zone the step spawns in.
    pub zone: ZoneId,
    /// Size multiplier for the step.
    pub size_mul: f32,
}

/// Queues named patterns and serves them one step at a time.
#[derive(Clone, Debug)]
pub struct PatternSequencer {
    tuning: PatternTuning,
    zone_count: u8,
    queue: VecDeque<PatternStep>,
    last_pattern: Option<PatternKind>,
    last_zone: Option<ZoneId>,
    cooldown: u32,
}

impl PatternSequencer {
    /// Creates a sequencer for a grid with `zone_count` zones.
    #[must_use]
    pub fn new(tuning: PatternTuning, zone_count: u8) -> Self {
        Self {
            cooldown: tuning.cooldown_spawns,
            tuning,
            zone_count: zone_count.max(1),
            queue: VecDeque::new(),
            last_pattern: None,
            last_zone: None,
        }
    }

    /// Steps still queued.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Records the zone of a spawn placed outside of a pattern.
    pub fn note_zone(&mut self, zone: ZoneId) {
        self.last_zone = Some(zone);
    }

    /// Serves the next queued step, possibly starting a new pattern first.
    ///
    /// Returns `None` when the caller should fall back to single-step selection.
    pub fn next_step(
        &mut self,
        context: &PatternContext,
        rng: &mut DeterministicRng,
        out: &mut Vec<Event>,
    ) -> Option<PatternStep> {
        if self.queue.is_empty() {
            if self.cooldown > 0 {
                self.cooldown -= 1;
                return None;
            }
            let probability = (self.tuning.base_probability
                + self.tuning.pressure_gain * clamp_unit(context.pressure))
            .min(self.tuning.max_probability);
            if !rng.chance(probability) {
                return None;
            }
            self.start(context, rng, out)?;
        }

        let step = self.queue.pop_front()?;
        self.last_zone = Some(step.zone);
        if self.queue.is_empty() {
            self.cooldown = self.tuning.cooldown_spawns;
        }
        Some(step)
    }

    /// Selects a template and queues its expansion.
    fn start(
        &mut self,
        context: &PatternContext,
        rng: &mut DeterministicRng,
        out: &mut Vec<Event>,
    ) -> Option<()> {
        let weights: Vec<f32> = self
            .tuning
            .templates
            .iter()
            .map(|template| {
                let weight = template.weight_at(context.level);
                if Some(template.kind) == self.last_pattern {
                    weight * self.tuning.repeat_penalty
                } else {
                    weight
                }
            })
            .collect();
        let index = pick_weighted(&weights, rng)?;
        let template = self.tuning.templates.get(index)?.clone();
        if template.zones.is_empty() {
            return None;
        }

        let span = f32::from(self.tuning.max_steps.saturating_sub(self.tuning.min_steps));
        let length = self.tuning.min_steps + lerp(0.0, span, clamp_unit(context.level)).round() as u8;
        let length = length.max(1);

        let mut zones = template.zones.clone();
        if template.reversible && rng.chance(0.5) {
            zones.reverse();
        }

        let size_mul = context.size_mul * template.size_factor;
        let mut previous = self.last_zone;
        for position in 0..usize::from(length) {
            let mut zone = ZoneId::new(zones[position % zones.len()] % self.zone_count);
            if Some(zone) == previous && self.zone_count > 1 && rng.chance(self.tuning.zone_avoidance) {
                let count = usize::from(self.zone_count);
                let shifted = (usize::from(zone.get()) + 1 + rng.index(count - 1)) % count;
                zone = ZoneId::new(u8::try_from(shifted).unwrap_or_default());
            }
            let kind = if template.kinds.is_empty() {
                None
            } else {
                template.kinds.get(position % template.kinds.len()).cloned()
            };
            self.queue.push_back(PatternStep {
                pattern: template.kind,
                kind,
                zone,
                size_mul,
            });
            previous = Some(zone);
        }

        self.last_pattern = Some(template.kind);
        debug!(pattern = ?template.kind, steps = length, "pattern started");
        out.push(Event::PatternStarted {
            pattern: template.kind,
            steps: length,
        });
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_director_core::Seed;

    fn context(level: f32, pressure: f32) -> PatternContext {
        PatternContext {
            level,
            pressure,
            size_mul: 1.0,
        }
    }

    fn always() -> PatternTuning {
        PatternTuning {
            base_probability: 1.0,
            max_probability: 1.0,
            cooldown_spawns: 0,
            ..PatternTuning::default()
        }
    }

    #[test]
    fn length_scales_with_level() {
        let mut rng = DeterministicRng::new(&Seed::from("length"));
        for (level, expected) in [(0.0, 3u8), (0.5, 5), (1.0, 7)] {
            let mut sequencer = PatternSequencer::new(always(), 6);
            let mut events = Vec::new();
            let _ = sequencer.next_step(&context(level, 0.0), &mut rng, &mut events);
            match events.as_slice() {
                [Event::PatternStarted { steps, .. }] => assert_eq!(*steps, expected),
                other => panic!("unexpected events {other:?}"),
            }
            assert_eq!(sequencer.pending(), usize::from(expected) - 1);
        }
    }

    #[test]
    fn cooldown_blocks_back_to_back_patterns() {
        let tuning = PatternTuning {
            base_probability: 1.0,
            max_probability: 1.0,
            ..PatternTuning::default()
        };
        let mut sequencer = PatternSequencer::new(tuning, 6);
        let mut rng = DeterministicRng::new(&Seed::from(4u32));
        let mut events = Vec::new();
        let served: Vec<bool> = (0..12)
            .map(|_| {
                sequencer
                    .next_step(&context(0.0, 0.0), &mut rng, &mut events)
                    .is_some()
            })
            .collect();
        assert_eq!(
            served,
            vec![false, false, false, false, true, true, true, false, false, false, false, true]
        );
    }

    #[test]
    fn adjacent_steps_rarely_repeat_zones() {
        let mut sequencer = PatternSequencer::new(always(), 6);
        let mut rng = DeterministicRng::new(&Seed::from("zones"));
        let mut events = Vec::new();
        let mut previous = None;
        let mut repeats = 0;
        for _ in 0..2_000 {
            let step = sequencer
                .next_step(&context(1.0, 1.0), &mut rng, &mut events)
                .expect("patterns always trigger");
            assert!(step.zone.get() < 6);
            if Some(step.zone) == previous {
                repeats += 1;
            }
            previous = Some(step.zone);
        }
        assert!(repeats < 100, "{repeats} adjacent zone repeats");
    }

    #[test]
    fn bait_forces_its_kinds() {
        let tuning = PatternTuning {
            templates: PatternTemplate::defaults()
                .into_iter()
                .filter(|template| template.kind == PatternKind::Bait)
                .collect(),
            ..always()
        };
        let mut sequencer = PatternSequencer::new(tuning, 6);
        let mut rng = DeterministicRng::new(&Seed::from(8u32));
        let mut events = Vec::new();
        let kinds: Vec<Option<SpawnKind>> = (0..4)
            .filter_map(|_| sequencer.next_step(&context(0.2, 0.0), &mut rng, &mut events))
            .map(|step| step.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                Some(SpawnKind::from(KIND_HEAL)),
                Some(SpawnKind::from(KIND_DECOY)),
                Some(SpawnKind::from(KIND_NORMAL)),
                Some(SpawnKind::from(KIND_BOMB)),
            ]
        );
    }

    #[test]
    fn burst_shrinks_targets() {
        let tuning = PatternTuning {
            templates: PatternTemplate::defaults()
                .into_iter()
                .filter(|template| template.kind == PatternKind::Burst)
                .collect(),
            ..always()
        };
        let mut sequencer = PatternSequencer::new(tuning, 6);
        let mut rng = DeterministicRng::new(&Seed::from(8u32));
        let mut events = Vec::new();
        let step = sequencer
            .next_step(
                &PatternContext {
                    level: 0.5,
                    pressure: 0.0,
                    size_mul: 1.2,
                },
                &mut rng,
                &mut events,
            )
            .expect("pattern triggers");
        assert!((step.size_mul - 1.08).abs() < 1e-6);
        assert_eq!(step.pattern, PatternKind::Burst);
    }
}
