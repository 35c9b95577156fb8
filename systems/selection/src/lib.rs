#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Fair weighted selection of spawn kinds.
//!
//! Each draw copies the base table, penalizes recently seen kinds, applies
//! intensity-driven boosts and enforces fairness caps before sampling with a
//! single cumulative-weight draw. The base table is never mutated.

use reflex_director_core::{
    lerp, softstep, DeterministicRng, FairnessRule, RollingMemory, SpawnKind, SpawnWeightTable,
    TierConfig, WeightEntry,
};
use tracing::debug;

/// Tuning knobs for the weighted selector.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectorTuning {
    /// Multiplier applied once per occurrence of a kind in recent memory.
    pub repeat_penalty: f32,
    /// Number of recent picks remembered.
    pub memory: usize,
    /// Multiplier reached by disruptive kinds at full intensity.
    pub disruptive_boost: f32,
    /// Multiplier reached by helpful kinds at zero intensity.
    pub helpful_boost: f32,
    /// Total weight below which the table counts as collapsed.
    pub collapse_epsilon: f32,
}

impl Default for SelectorTuning {
    fn default() -> Self {
        Self {
            repeat_penalty: 0.55,
            memory: 7,
            disruptive_boost: 1.25,
            helpful_boost: 1.2,
            collapse_epsilon: 1e-6,
        }
    }
}

/// Samples an index proportionally to `weights` using one draw from `rng`.
///
/// Negative and non-finite weights count as zero. Returns `None` when no
/// weight is positive, without consuming from the stream.
pub fn pick_weighted(weights: &[f32], rng: &mut DeterministicRng) -> Option<usize> {
    let usable = |weight: f32| {
        if weight.is_finite() && weight > 0.0 {
            weight
        } else {
            0.0
        }
    };
    let total: f32 = weights.iter().copied().map(usable).sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }

    let target = rng.next_unit() * total;
    let mut cumulative = 0.0;
    let mut last_positive = None;
    for (index, weight) in weights.iter().copied().map(usable).enumerate() {
        if weight <= 0.0 {
            continue;
        }
        cumulative += weight;
        last_positive = Some(index);
        if target < cumulative {
            return Some(index);
        }
    }
    last_positive
}

/// Chooses spawn kinds while keeping sequences fair and varied.
#[derive(Clone, Debug)]
pub struct WeightedSelector {
    tuning: SelectorTuning,
    recent: RollingMemory<SpawnKind>,
    streak: Option<(SpawnKind, u32)>,
    disruptive: Vec<SpawnKind>,
    helpful: Vec<SpawnKind>,
}

impl WeightedSelector {
    /// Creates a selector for the kind groups declared by the tier.
    #[must_use]
    pub fn new(tuning: SelectorTuning, config: &TierConfig) -> Self {
        Self {
            recent: RollingMemory::with_capacity(tuning.memory),
            streak: None,
            disruptive: config.disruptive_kinds.clone(),
            helpful: config.helpful_kinds.clone(),
            tuning,
        }
    }

    /// Recently chosen kinds, oldest first.
    #[must_use]
    pub fn recent(&self) -> &RollingMemory<SpawnKind> {
        &self.recent
    }

    /// Kind at the head of the current streak and its length.
    #[must_use]
    pub fn streak(&self) -> Option<(&SpawnKind, u32)> {
        self.streak.as_ref().map(|(kind, count)| (kind, *count))
    }

    /// Reports whether choosing `kind` next would extend its streak past a fairness cap.
    #[must_use]
    pub fn is_capped(&self, kind: &SpawnKind, rules: &[FairnessRule]) -> bool {
        let Some((current, count)) = &self.streak else {
            return false;
        };
        current == kind
            && rules
                .iter()
                .any(|rule| &rule.kind == kind && *count >= rule.max_consecutive)
    }

    /// Effective weights the next draw would use.
    ///
    /// `intensity` in `[0, 1]` shifts mass toward disruptive kinds as it rises
    /// and toward helpful kinds as it falls.
    #[must_use]
    pub fn effective_weights(
        &self,
        base: &SpawnWeightTable,
        rules: &[FairnessRule],
        intensity: f32,
    ) -> Vec<WeightEntry> {
        let tuning = &self.tuning;
        let hard = softstep(intensity);
        let mut entries: Vec<WeightEntry> = base
            .entries()
            .iter()
            .map(|entry| {
                let mut weight = entry.usable_weight();
                let seen = self.recent.occurrences(&entry.kind);
                if seen > 0 {
                    weight *= tuning.repeat_penalty.powi(seen as i32);
                }
                if self.disruptive.contains(&entry.kind) {
                    weight *= lerp(1.0, tuning.disruptive_boost, hard);
                }
                if self.helpful.contains(&entry.kind) {
                    weight *= lerp(1.0, tuning.helpful_boost, 1.0 - hard);
                }
                WeightEntry::new(entry.kind.clone(), weight)
            })
            .collect();

        if let Some((kind, count)) = &self.streak {
            for rule in rules.iter().filter(|rule| &rule.kind == kind) {
                if *count < rule.max_consecutive {
                    continue;
                }
                let others: f32 = entries
                    .iter()
                    .filter(|entry| &entry.kind != kind)
                    .map(WeightEntry::usable_weight)
                    .sum();
                let ceiling = others * rule.residual_share.max(0.0);
                for entry in entries.iter_mut().filter(|entry| &entry.kind == kind) {
                    entry.weight = (entry.usable_weight() * rule.damping.max(0.0)).min(ceiling);
                }
            }
        }

        entries
    }

    /// Draws the next kind and records it.
    ///
    /// Returns `None` only when the base table is empty. When every effective
    /// weight collapses, the draw falls back to a uniform pick over the base kinds.
    pub fn choose(
        &mut self,
        base: &SpawnWeightTable,
        rules: &[FairnessRule],
        intensity: f32,
        rng: &mut DeterministicRng,
    ) -> Option<SpawnKind> {
        if base.is_empty() {
            return None;
        }
        let entries = self.effective_weights(base, rules, intensity);
        let weights: Vec<f32> = entries.iter().map(WeightEntry::usable_weight).collect();
        let total: f32 = weights.iter().sum();

        let index = if total > self.tuning.collapse_epsilon {
            pick_weighted(&weights, rng)
        } else {
            None
        };
        let index = index.unwrap_or_else(|| {
            debug!(kinds = entries.len(), "weight table collapsed, drawing uniformly");
            rng.index(entries.len())
        });

        let kind = entries.get(index)?.kind.clone();
        self.observe(&kind);
        Some(kind)
    }

    /// Records a kind chosen outside of [`WeightedSelector::choose`], such as a pattern step.
    pub fn observe(&mut self, kind: &SpawnKind) {
        let count = match &self.streak {
            Some((current, count)) if current == kind => count.saturating_add(1),
            _ => 1,
        };
        self.streak = Some((kind.clone(), count));
        self.recent.push(kind.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_director_core::{Seed, KIND_BOMB, KIND_DECOY, KIND_HEAL, KIND_NORMAL};

    fn selector() -> WeightedSelector {
        WeightedSelector::new(SelectorTuning::default(), &TierConfig::default())
    }

    fn weight_of(entries: &[WeightEntry], kind: &str) -> f32 {
        entries
            .iter()
            .find(|entry| entry.kind.as_str() == kind)
            .map_or(0.0, |entry| entry.weight)
    }

    #[test]
    fn pick_weighted_follows_cumulative_order() {
        let mut rng = DeterministicRng::new(&Seed::from(5u32));
        let mut counts = [0usize; 3];
        for _ in 0..4_000 {
            let index = pick_weighted(&[1.0, 0.0, 3.0], &mut rng).expect("positive weights");
            counts[index] += 1;
        }
        assert_eq!(counts[1], 0);
        let share = counts[2] as f32 / 4_000.0;
        assert!((share - 0.75).abs() < 0.04, "share was {share}");
    }

    #[test]
    fn pick_weighted_rejects_empty_mass() {
        let mut rng = DeterministicRng::new(&Seed::from(5u32));
        let before = rng.clone();
        assert_eq!(pick_weighted(&[0.0, -1.0, f32::NAN], &mut rng), None);
        assert_eq!(rng, before);
    }

    #[test]
    fn recent_kinds_are_penalized() {
        let mut selector = selector();
        let table = SpawnWeightTable::from_pairs(&[(KIND_NORMAL, 1.0), (KIND_HEAL, 1.0)]);
        selector.observe(&SpawnKind::from(KIND_NORMAL));
        selector.observe(&SpawnKind::from(KIND_NORMAL));

        let entries = selector.effective_weights(&table, &[], 0.5);
        assert!((weight_of(&entries, KIND_NORMAL) - 0.55 * 0.55).abs() < 1e-6);
        assert_eq!(table.weight_of(&SpawnKind::from(KIND_NORMAL)), Some(1.0));
    }

    #[test]
    fn intensity_shifts_mass_between_groups() {
        let selector = selector();
        let table = TierConfig::default().weights;
        let calm = selector.effective_weights(&table, &[], 0.0);
        let intense = selector.effective_weights(&table, &[], 1.0);
        assert!(weight_of(&intense, KIND_BOMB) > weight_of(&calm, KIND_BOMB));
        assert!(weight_of(&calm, KIND_HEAL) > weight_of(&intense, KIND_HEAL));
    }

    #[test]
    fn capped_kind_is_limited_to_residual_share() {
        let mut selector = selector();
        let table = SpawnWeightTable::from_pairs(&[(KIND_NORMAL, 1.0), (KIND_BOMB, 1_000.0)]);
        let rules = [FairnessRule::new(KIND_BOMB, 1)];
        selector.observe(&SpawnKind::from(KIND_BOMB));

        let entries = selector.effective_weights(&table, &rules, 0.5);
        assert!(weight_of(&entries, KIND_BOMB) <= 0.005 * weight_of(&entries, KIND_NORMAL) + 1e-6);
    }

    #[test]
    fn collapsed_table_falls_back_to_uniform() {
        let mut selector = selector();
        let table = SpawnWeightTable::from_pairs(&[(KIND_NORMAL, 0.0), (KIND_HEAL, 0.0)]);
        let mut rng = DeterministicRng::new(&Seed::from("collapse"));
        let mut seen = Vec::new();
        for _ in 0..50 {
            let kind = selector
                .choose(&table, &[], 0.5, &mut rng)
                .expect("non-empty table");
            if !seen.contains(&kind) {
                seen.push(kind);
            }
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn empty_table_yields_nothing() {
        let mut selector = selector();
        let mut rng = DeterministicRng::new(&Seed::from(1u32));
        assert_eq!(
            selector.choose(&SpawnWeightTable::default(), &[], 0.5, &mut rng),
            None
        );
    }

    #[test]
    fn capped_streaks_are_reported_per_rule() {
        let mut selector = selector();
        let rules = TierConfig::default().fairness;
        let bomb = SpawnKind::from(KIND_BOMB);
        let decoy = SpawnKind::from(KIND_DECOY);
        assert!(!selector.is_capped(&bomb, &rules));

        selector.observe(&bomb);
        assert!(selector.is_capped(&bomb, &rules));
        assert!(!selector.is_capped(&decoy, &rules));

        selector.observe(&decoy);
        assert!(!selector.is_capped(&decoy, &rules));
        selector.observe(&decoy);
        assert!(selector.is_capped(&decoy, &rules));
        assert!(!selector.is_capped(&SpawnKind::from(KIND_NORMAL), &rules));
    }

    #[test]
    fn streak_tracks_consecutive_kinds() {
        let mut selector = selector();
        selector.observe(&SpawnKind::from(KIND_BOMB));
        selector.observe(&SpawnKind::from(KIND_BOMB));
        assert_eq!(selector.streak(), Some((&SpawnKind::from(KIND_BOMB), 2)));
        selector.observe(&SpawnKind::from(KIND_NORMAL));
        assert_eq!(selector.streak(), Some((&SpawnKind::from(KIND_NORMAL), 1)));
    }
}
