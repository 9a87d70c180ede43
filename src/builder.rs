//! Stack builder.
//!
//! `StackBuilder` is the recommended way to define a stack of dense layers.
//!
//! It makes the structure explicit (output sizes, activations, missing-value
//! policies) and chooses a default weight initializer for each activation
//! (see [`crate::Init::for_activation`]). Layers are named `layer0`, `layer1`, ...
//!
//! The resulting `LayerStack` still supports the low-level, allocation-free hot
//! path: reuse one scratch buffer and one gradient accumulator per sample.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{
    Activation, DenseLayer, Element, Error, Init, LayerConfig, LayerStack, MissingPolicy, Result,
};

#[derive(Debug, Clone, Copy)]
struct LayerSpec {
    outputs: usize,
    activation: Activation,
    policy: MissingPolicy,
    init: Option<Init>,
}

/// Builder for a `LayerStack`.
///
/// Example:
///
/// ```rust
/// use rust_dense::{Activation, LayerStack, MissingPolicy, StackBuilder};
///
/// # fn main() -> rust_dense::Result<()> {
/// let stack: LayerStack<f32> = StackBuilder::new(4)?
///     .add_layer(8, Activation::ReLU, MissingPolicy::Input)?
///     .add_layer(1, Activation::Sigmoid, MissingPolicy::None)?
///     .build_with_seed(0)?;
/// assert_eq!(stack.num_layers(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StackBuilder {
    name: String,
    inputs: usize,
    layers: Vec<LayerSpec>,
}

impl StackBuilder {
    /// Start building a stack that accepts inputs of length `inputs`.
    pub fn new(inputs: usize) -> Result<Self> {
        if inputs == 0 {
            return Err(Error::InvalidConfig("inputs must be > 0".to_owned()));
        }
        Ok(Self {
            name: "stack".to_owned(),
            inputs,
            layers: Vec::new(),
        })
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a dense layer with `outputs` units, initialized for `activation`.
    pub fn add_layer(
        self,
        outputs: usize,
        activation: Activation,
        policy: MissingPolicy,
    ) -> Result<Self> {
        self.push_spec(LayerSpec {
            outputs,
            activation,
            policy,
            init: None,
        })
    }

    /// Like [`StackBuilder::add_layer`], with an explicit initializer.
    pub fn add_layer_with_init(
        self,
        outputs: usize,
        activation: Activation,
        policy: MissingPolicy,
        init: Init,
    ) -> Result<Self> {
        if let Init::Uniform { limit } = init {
            if !limit.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "uniform init limit must be finite, got {limit}"
                )));
            }
        }
        self.push_spec(LayerSpec {
            outputs,
            activation,
            policy,
            init: Some(init),
        })
    }

    /// Build a zero-initialized stack from explicit layer configurations.
    ///
    /// Configurations keep their own names; consecutive shapes must chain.
    pub fn from_configs<F: Element>(
        name: impl Into<String>,
        configs: &[LayerConfig],
    ) -> Result<LayerStack<F>> {
        let layers = configs
            .iter()
            .map(DenseLayer::from_config)
            .collect::<Result<Vec<_>>>()?;
        LayerStack::from_layers(name, layers)
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed<F: Element>(self, seed: u64) -> Result<LayerStack<F>> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    pub fn build_with_rng<F: Element, R: Rng + ?Sized>(self, rng: &mut R) -> Result<LayerStack<F>> {
        if self.layers.is_empty() {
            return Err(Error::InvalidConfig(
                "stack must have at least one layer".to_owned(),
            ));
        }

        let mut layers = Vec::with_capacity(self.layers.len());
        let mut inputs = self.inputs;
        for (idx, spec) in self.layers.into_iter().enumerate() {
            let config = LayerConfig::new(
                format!("layer{idx}"),
                inputs,
                spec.outputs,
                spec.activation,
                spec.policy,
            );
            let mut layer = DenseLayer::from_config(&config)?;
            let init = spec
                .init
                .unwrap_or_else(|| Init::for_activation(spec.activation));
            layer.initialize(init, rng)?;
            layers.push(layer);
            inputs = spec.outputs;
        }

        LayerStack::from_layers(self.name, layers)
    }

    fn push_spec(mut self, spec: LayerSpec) -> Result<Self> {
        if spec.outputs == 0 {
            return Err(Error::InvalidConfig("layer outputs must be > 0".to_owned()));
        }
        spec.activation.validate()?;
        self.layers.push(spec);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_chained_named_layers() {
        let stack: LayerStack<f32> = StackBuilder::new(3)
            .unwrap()
            .name("net")
            .add_layer(5, Activation::ReLU, MissingPolicy::Dense)
            .unwrap()
            .add_layer(2, Activation::Identity, MissingPolicy::None)
            .unwrap()
            .build_with_seed(7)
            .unwrap();

        assert_eq!(stack.name(), "net");
        assert_eq!(stack.inputs(), 3);
        assert_eq!(stack.outputs(), 2);
        assert_eq!(stack.layers()[0].name(), "layer0");
        assert_eq!(stack.layers()[1].name(), "layer1");
        assert_eq!(stack.layers()[0].policy(), MissingPolicy::Dense);
        assert_eq!(stack.layers()[1].inputs(), 5);
    }

    #[test]
    fn seeded_build_is_deterministic() {
        let build = || {
            StackBuilder::new(2)
                .unwrap()
                .add_layer(3, Activation::Tanh, MissingPolicy::Input)
                .unwrap()
                .build_with_seed::<f64>(123)
                .unwrap()
        };
        assert!(build().bitwise_eq(&build()));
    }

    #[test]
    fn explicit_init_bounds_parameters() {
        let stack: LayerStack<f64> = StackBuilder::new(4)
            .unwrap()
            .add_layer_with_init(
                4,
                Activation::Tanh,
                MissingPolicy::Input,
                Init::Uniform { limit: 0.01 },
            )
            .unwrap()
            .build_with_seed(1)
            .unwrap();
        assert!(stack.parameters().iter().all(|p| p.abs() <= 0.01));

        let err = StackBuilder::new(4)
            .unwrap()
            .add_layer_with_init(
                4,
                Activation::Tanh,
                MissingPolicy::None,
                Init::Uniform { limit: f64::NAN },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_invalid_definitions() {
        assert!(StackBuilder::new(0).is_err());
        assert!(StackBuilder::new(2)
            .unwrap()
            .add_layer(0, Activation::Tanh, MissingPolicy::None)
            .is_err());
        assert!(StackBuilder::new(2)
            .unwrap()
            .add_layer(1, Activation::LeakyReLU { alpha: f32::NAN }, MissingPolicy::None)
            .is_err());
        assert!(StackBuilder::new(2)
            .unwrap()
            .build_with_seed::<f32>(0)
            .is_err());
    }

    #[test]
    fn from_configs_checks_chaining() {
        let configs = [
            LayerConfig::new("in", 3, 4, Activation::Tanh, MissingPolicy::Zero),
            LayerConfig::new("out", 4, 1, Activation::Sigmoid, MissingPolicy::None),
        ];
        let stack = StackBuilder::from_configs::<f32>("cfg", &configs).unwrap();
        assert_eq!(stack.layers()[0].name(), "in");
        assert!(stack.parameters().iter().all(|p| p == 0.0));

        let broken = [
            LayerConfig::new("in", 3, 4, Activation::Tanh, MissingPolicy::Zero),
            LayerConfig::new("out", 5, 1, Activation::Sigmoid, MissingPolicy::None),
        ];
        assert!(StackBuilder::from_configs::<f32>("cfg", &broken).is_err());
    }
}
