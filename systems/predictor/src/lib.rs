#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Tiny online-trained risk predictor.
//!
//! A dense network with at most two hidden layers maps a feature vector to the
//! probability of an undesirable near-term outcome. Every labelled outcome
//! performs exactly one step of stochastic gradient descent on the binary
//! cross-entropy loss with L2 weight decay. The network never persists and
//! never shares state across sessions.

use rand_distr::{Distribution, Normal};
use reflex_director_core::{DeterministicRng, RiskBand, FEATURE_COUNT};
use tracing::warn;

/// Maximum number of hidden layers.
pub const MAX_HIDDEN_LAYERS: usize = 2;
/// Maximum number of units in one hidden layer.
pub const MAX_HIDDEN_UNITS: usize = 16;

/// Nonlinearity applied after every hidden layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    /// Rectified linear unit.
    Relu,
    /// Hyperbolic tangent.
    Tanh,
}

impl Activation {
    fn apply(self, value: f32) -> f32 {
        match self {
            Self::Relu => value.max(0.0),
            Self::Tanh => value.tanh(),
        }
    }

    /// Derivative expressed through the activated output.
    fn derivative(self, activated: f32) -> f32 {
        match self {
            Self::Relu => {
                if activated > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Tanh => 1.0 - activated * activated,
        }
    }
}

/// Fully connected layer with row-major weights (`outputs × inputs`).
#[derive(Clone, Debug, PartialEq)]
pub struct DenseLayer {
    inputs: usize,
    outputs: usize,
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl DenseLayer {
    /// Creates a layer from explicit parameters.
    ///
    /// Returns `None` when the weight or bias counts do not match the shape.
    #[must_use]
    pub fn new(inputs: usize, outputs: usize, weights: Vec<f32>, biases: Vec<f32>) -> Option<Self> {
        if inputs == 0 || outputs == 0 {
            return None;
        }
        if weights.len() != inputs * outputs || biases.len() != outputs {
            return None;
        }
        Some(Self {
            inputs,
            outputs,
            weights,
            biases,
        })
    }

    /// Layer filled with a constant weight and zero biases.
    #[must_use]
    pub fn filled(inputs: usize, outputs: usize, weight: f32) -> Self {
        Self {
            inputs,
            outputs,
            weights: vec![weight; inputs * outputs],
            biases: vec![0.0; outputs],
        }
    }

    /// Number of inputs.
    #[must_use]
    pub const fn inputs(&self) -> usize {
        self.inputs
    }

    /// Number of outputs.
    #[must_use]
    pub const fn outputs(&self) -> usize {
        self.outputs
    }

    /// Row-major weights.
    #[must_use]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Per-output biases.
    #[must_use]
    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    fn weight(&self, output: usize, input: usize) -> f32 {
        self.weights[output * self.inputs + input]
    }

    fn is_finite(&self) -> bool {
        self.weights.iter().chain(&self.biases).all(|value| value.is_finite())
    }

    fn pre_activation(&self, input: &[f32]) -> Vec<f32> {
        self.biases
            .iter()
            .enumerate()
            .map(|(output, bias)| {
                let row = &self.weights[output * self.inputs..(output + 1) * self.inputs];
                bias + row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>()
            })
            .collect()
    }
}

/// Complete parameter set used to substitute deterministic weights.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictorWeights {
    /// Hidden layers followed by the single-output layer.
    pub layers: Vec<DenseLayer>,
}

impl PredictorWeights {
    fn check(&self, input_dim: usize) -> Result<(), &'static str> {
        let Some((output, hidden)) = self.layers.split_last() else {
            return Err("no layers");
        };
        if hidden.len() > MAX_HIDDEN_LAYERS {
            return Err("too many hidden layers");
        }
        if hidden.iter().any(|layer| layer.outputs > MAX_HIDDEN_UNITS) {
            return Err("hidden layer too wide");
        }
        if output.outputs != 1 {
            return Err("output layer must have exactly one unit");
        }
        let mut expected = input_dim;
        for layer in &self.layers {
            if layer.inputs != expected {
                return Err("layer shapes do not chain");
            }
            expected = layer.outputs;
        }
        if !self.layers.iter().all(DenseLayer::is_finite) {
            return Err("non-finite parameter");
        }
        Ok(())
    }
}

/// Strategy used to initialize the network parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum WeightInit {
    /// Zero-mean Gaussian weights drawn from the predictor stream.
    Gaussian {
        /// Standard deviation of every weight.
        std_dev: f32,
        /// Initial bias of the output unit.
        output_bias: f32,
    },
    /// Caller-provided parameters.
    Explicit(PredictorWeights),
}

/// Tuning knobs for the online predictor.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictorTuning {
    /// Expected length of the feature vector.
    pub input_dim: usize,
    /// Units per hidden layer.
    pub hidden: Vec<usize>,
    /// Nonlinearity applied after hidden layers.
    pub activation: Activation,
    /// Gradient descent step size.
    pub learning_rate: f32,
    /// L2 weight decay coefficient.
    pub l2: f32,
    /// Score returned whenever the input cannot be evaluated.
    pub neutral_score: f32,
    /// Parameter initialization strategy.
    pub init: WeightInit,
    /// Smoothing and banding of the reported risk.
    pub risk: RiskTuning,
}

impl Default for PredictorTuning {
    fn default() -> Self {
        Self {
            input_dim: FEATURE_COUNT,
            hidden: vec![8],
            activation: Activation::Relu,
            learning_rate: 0.02,
            l2: 0.0008,
            neutral_score: 0.5,
            init: WeightInit::Gaussian {
                std_dev: 0.1,
                output_bias: -1.0,
            },
            risk: RiskTuning::default(),
        }
    }
}

/// Exponential smoothing and band thresholds for the reported risk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RiskTuning {
    /// Share of the previous smoothed score kept on every update.
    pub retain: f32,
    /// Smoothed score at which the band becomes [`RiskBand::Mid`].
    pub mid: f32,
    /// Smoothed score at which the band becomes [`RiskBand::High`].
    pub high: f32,
}

impl Default for RiskTuning {
    fn default() -> Self {
        Self {
            retain: 0.72,
            mid: 0.45,
            high: 0.68,
        }
    }
}

/// Maps a risk score onto its band.
#[must_use]
pub fn classify(tuning: &RiskTuning, score: f32) -> RiskBand {
    if score >= tuning.high {
        RiskBand::High
    } else if score >= tuning.mid {
        RiskBand::Mid
    } else {
        RiskBand::Low
    }
}

/// Exponentially smoothed view of successive predictions.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskSmoother {
    tuning: RiskTuning,
    score: Option<f32>,
}

impl RiskSmoother {
    /// Creates a smoother that has seen no predictions.
    #[must_use]
    pub const fn new(tuning: RiskTuning) -> Self {
        Self {
            tuning,
            score: None,
        }
    }

    /// Folds in a new prediction and returns the smoothed score.
    ///
    /// The first finite prediction seeds the score; non-finite ones are skipped.
    pub fn observe(&mut self, prediction: f32) -> Option<f32> {
        if !prediction.is_finite() {
            return self.score;
        }
        let retain = self.tuning.retain.clamp(0.0, 1.0);
        let next = match self.score {
            Some(previous) => retain * previous + (1.0 - retain) * prediction,
            None => prediction,
        };
        self.score = Some(next.clamp(0.0, 1.0));
        self.score
    }

    /// Smoothed score, once a prediction has been observed.
    #[must_use]
    pub const fn score(&self) -> Option<f32> {
        self.score
    }

    /// Band of the smoothed score, once a prediction has been observed.
    #[must_use]
    pub fn band(&self) -> Option<RiskBand> {
        self.score.map(|score| classify(&self.tuning, score))
    }
}

/// Online-trained feed-forward risk estimator.
#[derive(Clone, Debug)]
pub struct OnlinePredictor {
    layers: Vec<DenseLayer>,
    input_dim: usize,
    activation: Activation,
    learning_rate: f32,
    l2: f32,
    neutral_score: f32,
    updates: u64,
}

impl OnlinePredictor {
    /// Builds a predictor, drawing Gaussian parameters from `rng` when requested.
    ///
    /// Hidden layer shapes are clamped into the supported limits. Explicit
    /// weights that do not fit `input_dim` are rejected in favour of the
    /// default Gaussian initialization.
    #[must_use]
    pub fn new(tuning: &PredictorTuning, rng: &mut DeterministicRng) -> Self {
        let input_dim = tuning.input_dim.max(1);
        let layers = match &tuning.init {
            WeightInit::Explicit(weights) => match weights.check(input_dim) {
                Ok(()) => weights.layers.clone(),
                Err(reason) => {
                    warn!(reason, "rejected explicit predictor weights");
                    gaussian_layers(input_dim, &clamp_hidden(&tuning.hidden), 0.1, -1.0, rng)
                }
            },
            WeightInit::Gaussian {
                std_dev,
                output_bias,
            } => gaussian_layers(
                input_dim,
                &clamp_hidden(&tuning.hidden),
                *std_dev,
                *output_bias,
                rng,
            ),
        };

        Self {
            layers,
            input_dim,
            activation: tuning.activation,
            learning_rate: finite_or(tuning.learning_rate, 0.02),
            l2: finite_or(tuning.l2, 0.0).max(0.0),
            neutral_score: finite_or(tuning.neutral_score, 0.5).clamp(0.0, 1.0),
            updates: 0,
        }
    }

    /// Current parameters.
    #[must_use]
    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    /// Number of gradient steps applied so far.
    #[must_use]
    pub const fn updates(&self) -> u64 {
        self.updates
    }

    /// Score returned for inputs that cannot be evaluated.
    #[must_use]
    pub const fn neutral_score(&self) -> f32 {
        self.neutral_score
    }

    /// Estimates the risk of an undesirable outcome in `[0, 1]`.
    ///
    /// Inputs with the wrong length or non-finite values yield the neutral score.
    #[must_use]
    pub fn predict(&self, features: &[f32]) -> f32 {
        if !self.accepts(features) {
            return self.neutral_score;
        }
        self.forward(features)
            .last()
            .and_then(|output| output.first().copied())
            .filter(|score| score.is_finite())
            .unwrap_or(self.neutral_score)
    }

    /// Performs one gradient step toward `label` and returns the pre-update score.
    ///
    /// Returns `None`, leaving the parameters untouched, when the input cannot
    /// be evaluated or the step would produce non-finite parameters.
    pub fn train(&mut self, features: &[f32], label: bool) -> Option<f32> {
        if !self.accepts(features) {
            return None;
        }
        let activations = self.forward(features);
        let score = *activations.last()?.first()?;
        let target = if label { 1.0 } else { 0.0 };

        // Sigmoid and cross-entropy cancel into `score - target` at the output.
        let mut deltas: Vec<Vec<f32>> = vec![Vec::new(); self.layers.len()];
        let last = self.layers.len() - 1;
        deltas[last] = vec![score - target];
        for index in (1..self.layers.len()).rev() {
            let layer = &self.layers[index];
            let below = &activations[index];
            let propagated: Vec<f32> = (0..layer.inputs)
                .map(|input| {
                    let upstream: f32 = deltas[index]
                        .iter()
                        .enumerate()
                        .map(|(output, delta)| layer.weight(output, input) * delta)
                        .sum();
                    upstream * self.activation.derivative(below[input])
                })
                .collect();
            deltas[index - 1] = propagated;
        }

        let mut updated = self.layers.clone();
        for (index, layer) in updated.iter_mut().enumerate() {
            let input = &activations[index];
            for output in 0..layer.outputs {
                let delta = deltas[index][output];
                for column in 0..layer.inputs {
                    let slot = output * layer.inputs + column;
                    let gradient = delta * input[column] + self.l2 * layer.weights[slot];
                    layer.weights[slot] -= self.learning_rate * gradient;
                }
                layer.biases[output] -= self.learning_rate * delta;
            }
        }

        if !updated.iter().all(DenseLayer::is_finite) {
            return None;
        }
        self.layers = updated;
        self.updates += 1;
        Some(score)
    }

    fn accepts(&self, features: &[f32]) -> bool {
        features.len() == self.input_dim && features.iter().all(|value| value.is_finite())
    }

    /// Activations per layer, starting with the input itself.
    fn forward(&self, features: &[f32]) -> Vec<Vec<f32>> {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(features.to_vec());
        let last = self.layers.len().saturating_sub(1);
        for (index, layer) in self.layers.iter().enumerate() {
            let Some(input) = activations.last() else {
                break;
            };
            let z = layer.pre_activation(input);
            let activated = if index == last {
                z.into_iter().map(sigmoid).collect()
            } else {
                z.into_iter()
                    .map(|value| self.activation.apply(value))
                    .collect()
            };
            activations.push(activated);
        }
        activations
    }
}

fn clamp_hidden(hidden: &[usize]) -> Vec<usize> {
    let clamped: Vec<usize> = hidden
        .iter()
        .take(MAX_HIDDEN_LAYERS)
        .map(|units| (*units).clamp(1, MAX_HIDDEN_UNITS))
        .collect();
    if clamped.is_empty() {
        vec![8]
    } else {
        clamped
    }
}

fn gaussian_layers(
    input_dim: usize,
    hidden: &[usize],
    std_dev: f32,
    output_bias: f32,
    rng: &mut DeterministicRng,
) -> Vec<DenseLayer> {
    let normal = Normal::new(0.0, std_dev)
        .or_else(|_| Normal::new(0.0, 0.1))
        .ok();
    let mut layers = Vec::with_capacity(hidden.len() + 1);
    let mut inputs = input_dim;
    for outputs in hidden.iter().copied().chain(std::iter::once(1)) {
        let weights = (0..inputs * outputs)
            .map(|_| normal.map_or(0.0, |normal| normal.sample(&mut *rng)))
            .collect();
        layers.push(DenseLayer {
            inputs,
            outputs,
            weights,
            biases: vec![0.0; outputs],
        });
        inputs = outputs;
    }
    if let Some(output) = layers.last_mut() {
        output.biases[0] = finite_or(output_bias, 0.0);
    }
    layers
}

fn sigmoid(value: f32) -> f32 {
    if value >= 0.0 {
        1.0 / (1.0 + (-value).exp())
    } else {
        let e = value.exp();
        e / (1.0 + e)
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_director_core::Seed;

    fn rng() -> DeterministicRng {
        DeterministicRng::new(&Seed::from("predictor"))
    }

    fn explicit(weight: f32, output_bias: f32) -> PredictorTuning {
        let mut output = DenseLayer::filled(4, 1, weight);
        output.biases[0] = output_bias;
        PredictorTuning {
            input_dim: 3,
            init: WeightInit::Explicit(PredictorWeights {
                layers: vec![DenseLayer::filled(3, 4, weight), output],
            }),
            ..PredictorTuning::default()
        }
    }

    #[test]
    fn smoothing_seeds_then_blends() {
        let mut smoother = RiskSmoother::new(RiskTuning::default());
        assert_eq!(smoother.score(), None);
        assert_eq!(smoother.band(), None);

        assert_eq!(smoother.observe(0.2), Some(0.2));
        let blended = smoother.observe(1.0).unwrap_or_default();
        assert!((blended - (0.72 * 0.2 + 0.28)).abs() < 1e-6);
        assert_eq!(smoother.observe(f32::NAN), Some(blended));
    }

    #[test]
    fn bands_follow_the_thresholds() {
        let tuning = RiskTuning::default();
        assert_eq!(classify(&tuning, 0.1), RiskBand::Low);
        assert_eq!(classify(&tuning, 0.45), RiskBand::Mid);
        assert_eq!(classify(&tuning, 0.679), RiskBand::Mid);
        assert_eq!(classify(&tuning, 0.68), RiskBand::High);

        let mut smoother = RiskSmoother::new(tuning);
        let _ = smoother.observe(0.3);
        assert_eq!(smoother.band(), Some(RiskBand::Low));
        for _ in 0..40 {
            let _ = smoother.observe(0.95);
        }
        assert_eq!(smoother.band(), Some(RiskBand::High));
    }

    #[test]
    fn explicit_weights_produce_known_scores() {
        let predictor = OnlinePredictor::new(&explicit(0.0, 0.0), &mut rng());
        assert!((predictor.predict(&[0.3, 0.9, 0.1]) - 0.5).abs() < 1e-6);

        let predictor = OnlinePredictor::new(&explicit(0.5, -1.0), &mut rng());
        // Each hidden unit sees 0.5 * (1 + 1 + 0) = 1.0; output is sigmoid(4 * 0.5 - 1).
        let expected = 1.0 / (1.0 + (-1.0f32).exp());
        assert!((predictor.predict(&[1.0, 1.0, 0.0]) - expected).abs() < 1e-6);
    }

    #[test]
    fn malformed_inputs_yield_neutral_score() {
        let predictor = OnlinePredictor::new(&PredictorTuning::default(), &mut rng());
        assert_eq!(predictor.predict(&[0.2; 3]), 0.5);
        let mut poisoned = [0.1; FEATURE_COUNT];
        poisoned[4] = f32::NAN;
        assert_eq!(predictor.predict(&poisoned), 0.5);
    }

    #[test]
    fn training_moves_score_toward_label() {
        let mut predictor = OnlinePredictor::new(&PredictorTuning::default(), &mut rng());
        let features = [0.6; FEATURE_COUNT];
        let before = predictor.predict(&features);
        for _ in 0..200 {
            let _ = predictor.train(&features, true);
        }
        assert!(predictor.predict(&features) > before + 0.2);
        assert_eq!(predictor.updates(), 200);

        for _ in 0..600 {
            let _ = predictor.train(&features, false);
        }
        assert!(predictor.predict(&features) < 0.3);
    }

    #[test]
    fn tanh_network_learns_as_well() {
        let tuning = PredictorTuning {
            activation: Activation::Tanh,
            hidden: vec![6, 4],
            ..PredictorTuning::default()
        };
        let mut predictor = OnlinePredictor::new(&tuning, &mut rng());
        assert_eq!(predictor.layers().len(), 3);
        let features = [0.4; FEATURE_COUNT];
        let before = predictor.predict(&features);
        for _ in 0..100 {
            let _ = predictor.train(&features, true);
        }
        assert!(predictor.predict(&features) > before);
    }

    #[test]
    fn train_rejects_bad_dimensions_without_mutation() {
        let mut predictor = OnlinePredictor::new(&PredictorTuning::default(), &mut rng());
        let layers = predictor.layers().to_vec();
        assert_eq!(predictor.train(&[0.5; 2], true), None);
        assert_eq!(predictor.layers(), layers.as_slice());
        assert_eq!(predictor.updates(), 0);
    }

    #[test]
    fn oversized_shapes_are_clamped() {
        let tuning = PredictorTuning {
            hidden: vec![64, 64, 64],
            ..PredictorTuning::default()
        };
        let predictor = OnlinePredictor::new(&tuning, &mut rng());
        let hidden: Vec<usize> = predictor
            .layers()
            .iter()
            .map(DenseLayer::outputs)
            .collect();
        assert_eq!(hidden, vec![MAX_HIDDEN_UNITS, MAX_HIDDEN_UNITS, 1]);
    }

    #[test]
    fn mismatched_explicit_weights_fall_back_to_gaussian() {
        let mut tuning = explicit(0.5, 0.0);
        tuning.input_dim = FEATURE_COUNT;
        let predictor = OnlinePredictor::new(&tuning, &mut rng());
        assert_eq!(predictor.layers()[0].inputs(), FEATURE_COUNT);
        assert_eq!(predictor.layers()[0].outputs(), 8);
    }

    #[test]
    fn identical_streams_produce_identical_trajectories() {
        let run = || {
            let mut predictor = OnlinePredictor::new(&PredictorTuning::default(), &mut rng());
            for step in 0..50 {
                let features = [step as f32 / 50.0; FEATURE_COUNT];
                let _ = predictor.train(&features, step % 3 == 0);
            }
            predictor.layers().to_vec()
        };
        assert_eq!(run(), run());
    }
}
