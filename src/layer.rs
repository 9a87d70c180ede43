use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::{
    Activation, Element, Error, LayerConfig, MissingPolicy, Parameters, ParametersCopy,
    ParametersMut, Result,
};

/// Weight initialization scheme, expressed as a uniform limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    /// Xavier/Glorot: `sqrt(6 / (inputs + outputs))`.
    Xavier,
    /// He/Kaiming (uniform): `sqrt(6 / inputs)`.
    He,
    /// Fixed limit.
    Uniform { limit: f64 },
}

impl Init {
    /// Default initializer for an activation.
    ///
    /// - `tanh` / `sigmoid` / `identity`: Xavier/Glorot
    /// - `relu` / `leaky relu`: He/Kaiming
    pub fn for_activation(activation: Activation) -> Self {
        match activation {
            Activation::Identity
            | Activation::Tanh
            | Activation::ScaledTanh
            | Activation::Sigmoid => Init::Xavier,
            Activation::ReLU | Activation::LeakyReLU { .. } => Init::He,
        }
    }

    pub fn limit(self, inputs: usize, outputs: usize) -> f64 {
        match self {
            Init::Xavier => (6.0 / (inputs + outputs) as f64).sqrt(),
            Init::He => (6.0 / inputs as f64).sqrt(),
            Init::Uniform { limit } => limit.abs(),
        }
    }
}

/// A fully-connected layer: `y = activation(b + x W)`, with a policy for NaN inputs.
///
/// Storage is exclusively owned; `clone()` is a deep copy.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer<F> {
    name: String,
    inputs: usize,
    outputs: usize,
    activation: Activation,
    policy: MissingPolicy,
    /// Row-major matrix with shape (inputs, outputs).
    weights: Vec<F>,
    bias: Vec<F>,
    /// One learned value per input; empty unless the policy is `Input`.
    missing_replacements: Vec<F>,
    /// Row-major (inputs, outputs); empty unless the policy is `Dense`.
    missing_activations: Vec<F>,
}

impl<F: Element> DenseLayer<F> {
    /// Zero-initialized layer.
    pub fn new(
        name: impl Into<String>,
        inputs: usize,
        outputs: usize,
        activation: Activation,
        policy: MissingPolicy,
    ) -> Result<Self> {
        Self::from_config(&LayerConfig::new(name, inputs, outputs, activation, policy))
    }

    /// Layer initialized with the activation's default [`Init`], from a seed.
    pub fn new_with_seed(
        name: impl Into<String>,
        inputs: usize,
        outputs: usize,
        activation: Activation,
        policy: MissingPolicy,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new_with_rng(name, inputs, outputs, activation, policy, &mut rng)
    }

    /// Layer initialized with the activation's default [`Init`].
    pub fn new_with_rng<R: Rng + ?Sized>(
        name: impl Into<String>,
        inputs: usize,
        outputs: usize,
        activation: Activation,
        policy: MissingPolicy,
        rng: &mut R,
    ) -> Result<Self> {
        let mut layer = Self::new(name, inputs, outputs, activation, policy)?;
        layer.initialize(Init::for_activation(activation), rng)?;
        Ok(layer)
    }

    pub fn from_config(config: &LayerConfig) -> Result<Self> {
        config.validate()?;
        let (ni, no) = (config.inputs, config.outputs);
        debug!(
            name = %config.name,
            inputs = ni,
            outputs = no,
            policy = config.policy.name(),
            "allocating dense layer"
        );
        Ok(Self {
            name: config.name.clone(),
            inputs: ni,
            outputs: no,
            activation: config.activation,
            policy: config.policy,
            weights: vec![F::zero(); ni * no],
            bias: vec![F::zero(); no],
            missing_replacements: vec![F::zero(); config.policy.replacements_len(ni)],
            missing_activations: vec![F::zero(); config.policy.activations_len(ni, no)],
        })
    }

    /// Build a layer from explicit parameter arrays.
    ///
    /// Every array length is checked against `config`; `missing_replacements` and
    /// `missing_activations` must be empty unless the policy owns them.
    pub fn from_parts(
        config: &LayerConfig,
        weights: Vec<F>,
        bias: Vec<F>,
        missing_replacements: Vec<F>,
        missing_activations: Vec<F>,
    ) -> Result<Self> {
        config.validate()?;
        let (ni, no) = (config.inputs, config.outputs);
        let checks = [
            ("weights", weights.len(), ni * no),
            ("bias", bias.len(), no),
            (
                "missing_replacements",
                missing_replacements.len(),
                config.policy.replacements_len(ni),
            ),
            (
                "missing_activations",
                missing_activations.len(),
                config.policy.activations_len(ni, no),
            ),
        ];
        for (what, actual, expected) in checks {
            if actual != expected {
                return Err(Error::InvalidConfig(format!(
                    "{what} length {actual} does not match {expected} for a {ni} x {no} layer \
                     with policy `{}`",
                    config.policy.name()
                )));
            }
        }

        Ok(Self {
            name: config.name.clone(),
            inputs: ni,
            outputs: no,
            activation: config.activation,
            policy: config.policy,
            weights,
            bias,
            missing_replacements,
            missing_activations,
        })
    }

    pub fn config(&self) -> LayerConfig {
        LayerConfig::new(
            self.name.clone(),
            self.inputs,
            self.outputs,
            self.activation,
            self.policy,
        )
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    #[inline]
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn policy(&self) -> MissingPolicy {
        self.policy
    }

    #[inline]
    pub fn weights(&self) -> &[F] {
        &self.weights
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut [F] {
        &mut self.weights
    }

    /// Weight applied to input `i` for output `o`.
    #[inline]
    pub fn weight(&self, i: usize, o: usize) -> F {
        self.weights[i * self.outputs + o]
    }

    #[inline]
    pub fn weight_mut(&mut self, i: usize, o: usize) -> &mut F {
        &mut self.weights[i * self.outputs + o]
    }

    #[inline]
    pub fn bias(&self) -> &[F] {
        &self.bias
    }

    #[inline]
    pub fn bias_mut(&mut self) -> &mut [F] {
        &mut self.bias
    }

    #[inline]
    pub fn missing_replacements(&self) -> &[F] {
        &self.missing_replacements
    }

    #[inline]
    pub fn missing_replacements_mut(&mut self) -> &mut [F] {
        &mut self.missing_replacements
    }

    #[inline]
    pub fn missing_activations(&self) -> &[F] {
        &self.missing_activations
    }

    #[inline]
    pub fn missing_activations_mut(&mut self) -> &mut [F] {
        &mut self.missing_activations
    }

    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.weights.len()
            + self.bias.len()
            + self.missing_replacements.len()
            + self.missing_activations.len()
    }

    /// Zero-copy view: weights, bias, then the policy's auxiliary array.
    pub fn parameters(&self) -> Parameters<'_, F> {
        Parameters::from_segments(vec![
            &self.weights[..],
            &self.bias[..],
            &self.missing_replacements[..],
            &self.missing_activations[..],
        ])
    }

    pub fn parameters_mut(&mut self) -> ParametersMut<'_, F> {
        ParametersMut::from_segments(vec![
            &mut self.weights[..],
            &mut self.bias[..],
            &mut self.missing_replacements[..],
            &mut self.missing_activations[..],
        ])
    }

    /// A zeroed gradient accumulator laid out like [`DenseLayer::parameters`].
    pub fn gradients(&self) -> ParametersCopy<F> {
        ParametersCopy::zeros(self.parameter_count())
    }

    /// Re-draw every parameter independently from `[-|limit|, |limit|]`.
    pub fn random_fill<R: Rng + ?Sized>(&mut self, limit: F, rng: &mut R) -> Result<()> {
        if !limit.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "random fill limit must be finite, got {limit}"
            )));
        }
        let limit = limit.abs();
        debug!(name = %self.name, %limit, "randomizing dense layer parameters");

        let mut params = self.parameters_mut();
        if limit == F::zero() {
            params.fill(F::zero());
            return Ok(());
        }
        for p in params.iter_mut() {
            *p = rng.gen_range(-limit..=limit);
        }
        Ok(())
    }

    pub fn initialize<R: Rng + ?Sized>(&mut self, init: Init, rng: &mut R) -> Result<()> {
        let limit = F::from_f64(init.limit(self.inputs, self.outputs));
        self.random_fill(limit, rng)
    }

    /// Forward pass for a single sample.
    pub fn apply(&self, input: &[F]) -> Result<Vec<F>> {
        let mut out = vec![F::zero(); self.outputs];
        self.apply_into(input, &mut out)?;
        Ok(out)
    }

    /// Non-allocating [`DenseLayer::apply`]; `out.len()` must equal `outputs()`.
    pub fn apply_into(&self, input: &[F], out: &mut [F]) -> Result<()> {
        Error::check_len(self.inputs, input.len())?;
        Error::check_len(self.outputs, out.len())?;

        self.preactivate(input, out)?;
        for y in out.iter_mut() {
            *y = self.activation.eval(*y);
        }
        Ok(())
    }

    /// Minimum scratch length for [`DenseLayer::fprop`]: a copy of the input
    /// followed by the pre-activations.
    #[inline]
    pub fn fprop_temporary_space_required(&self) -> usize {
        self.inputs + self.outputs
    }

    /// A scratch buffer of exactly the required size.
    pub fn scratch(&self) -> Vec<F> {
        vec![F::zero(); self.fprop_temporary_space_required()]
    }

    /// Same result as [`DenseLayer::apply`], keeping what `bprop` needs in `scratch`.
    pub fn fprop(&self, input: &[F], scratch: &mut [F]) -> Result<Vec<F>> {
        let mut out = vec![F::zero(); self.outputs];
        self.fprop_into(input, scratch, &mut out)?;
        Ok(out)
    }

    pub fn fprop_into(&self, input: &[F], scratch: &mut [F], out: &mut [F]) -> Result<()> {
        Error::check_len(self.inputs, input.len())?;
        Error::check_len(self.outputs, out.len())?;
        self.check_scratch(scratch.len())?;

        let (saved_input, rest) = scratch.split_at_mut(self.inputs);
        let z = &mut rest[..self.outputs];

        self.preactivate(input, z)?;
        saved_input.copy_from_slice(input);
        for (y, &zo) in out.iter_mut().zip(z.iter()) {
            *y = self.activation.eval(zo);
        }
        Ok(())
    }

    /// Backward pass for the sample most recently passed to `fprop` with `scratch`.
    ///
    /// Adds `example_weight`-scaled gradients into `gradient`, which is laid out
    /// like [`DenseLayer::parameters`] and must have `parameter_count()` entries.
    /// Nothing in `gradient` is overwritten.
    ///
    /// When `input_errors` is given (length `inputs()`), it is overwritten with
    /// `dL/dx` for every present input and zero for missing ones. Pass `None` for
    /// the first layer of a stack, where nobody consumes it.
    pub fn bprop(
        &self,
        output_errors: &[F],
        scratch: &[F],
        gradient: &mut [F],
        input_errors: Option<&mut [F]>,
        example_weight: F,
    ) -> Result<()> {
        Error::check_len(self.outputs, output_errors.len())?;
        self.check_scratch(scratch.len())?;
        let count = self.parameter_count();
        if gradient.len() != count {
            return Err(Error::ParameterCountMismatch {
                expected: count,
                actual: gradient.len(),
            });
        }
        let mut input_errors = input_errors;
        if let Some(errors) = input_errors.as_deref_mut() {
            Error::check_len(self.inputs, errors.len())?;
            errors.fill(F::zero());
        }

        let (ni, no) = (self.inputs, self.outputs);
        let (input, rest) = scratch.split_at(ni);
        let z = &rest[..no];

        let (g_weights, rest) = gradient.split_at_mut(self.weights.len());
        let (g_bias, g_missing) = rest.split_at_mut(no);

        for o in 0..no {
            let zo = z[o];
            let d = output_errors[o] * self.activation.derivative(zo, self.activation.eval(zo));
            let wd = example_weight * d;
            g_bias[o] = g_bias[o] + wd;

            for (i, &x) in input.iter().enumerate() {
                let idx = i * no + o;
                if !x.is_nan() {
                    g_weights[idx] = g_weights[idx] + wd * x;
                    if let Some(errors) = input_errors.as_deref_mut() {
                        errors[i] = self.weights[idx].mul_add(d, errors[i]);
                    }
                    continue;
                }
                match self.policy {
                    // `None` never gets this far: fprop rejects the NaN.
                    MissingPolicy::None | MissingPolicy::Zero => {}
                    MissingPolicy::Input => {
                        let r = self.missing_replacements[i];
                        g_weights[idx] = g_weights[idx] + wd * r;
                        g_missing[i] = g_missing[i] + wd * self.weights[idx];
                    }
                    MissingPolicy::Dense => {
                        g_missing[idx] = g_missing[idx] + wd;
                    }
                }
            }
        }
        Ok(())
    }

    /// Exact equality, including NaN payloads and signed zeros.
    pub fn bitwise_eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.inputs == other.inputs
            && self.outputs == other.outputs
            && self.activation == other.activation
            && self.policy == other.policy
            && crate::element::bitwise_eq(&self.weights, &other.weights)
            && crate::element::bitwise_eq(&self.bias, &other.bias)
            && crate::element::bitwise_eq(&self.missing_replacements, &other.missing_replacements)
            && crate::element::bitwise_eq(&self.missing_activations, &other.missing_activations)
    }

    #[inline]
    fn check_scratch(&self, provided: usize) -> Result<()> {
        let required = self.fprop_temporary_space_required();
        if provided < required {
            return Err(Error::InsufficientScratchSpace { required, provided });
        }
        Ok(())
    }

    /// Writes `z = b + x W` (plus the policy's handling of NaN inputs) into `z`.
    ///
    /// Inputs are folded in increasing index order with fused multiply-add, so
    /// every caller gets bit-identical pre-activations.
    fn preactivate(&self, input: &[F], z: &mut [F]) -> Result<()> {
        if self.policy == MissingPolicy::None {
            if let Some(index) = input.iter().position(|x| x.is_nan()) {
                return Err(Error::MissingValueNotAllowed { index });
            }
        }

        let no = self.outputs;
        z.copy_from_slice(&self.bias);
        for (i, &x) in input.iter().enumerate() {
            let row = &self.weights[i * no..(i + 1) * no];
            if !x.is_nan() {
                axpy(x, row, z);
                continue;
            }
            match self.policy {
                MissingPolicy::None | MissingPolicy::Zero => {}
                MissingPolicy::Input => axpy(self.missing_replacements[i], row, z),
                MissingPolicy::Dense => {
                    let correction = &self.missing_activations[i * no..(i + 1) * no];
                    for (zo, &c) in z.iter_mut().zip(correction) {
                        *zo = *zo + c;
                    }
                }
            }
        }
        Ok(())
    }
}

/// `z += x * w`
#[inline]
fn axpy<F: Element>(x: F, w: &[F], z: &mut [F]) {
    for (zo, &wo) in z.iter_mut().zip(w) {
        *zo = wo.mul_add(x, *zo);
    }
}
