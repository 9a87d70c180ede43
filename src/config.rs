//! Layer configuration.
//!
//! `LayerConfig` is the plain-data description of a dense layer: everything that
//! fixes its shape and behavior, but none of its parameter values. With the `serde`
//! feature it can be read from JSON, e.g. to describe a whole stack in a file.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Activation, Error, MissingPolicy, Result};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct LayerConfig {
    pub name: String,
    pub inputs: usize,
    pub outputs: usize,
    pub activation: Activation,
    #[cfg_attr(feature = "serde", serde(default))]
    pub policy: MissingPolicy,
}

impl LayerConfig {
    pub fn new(
        name: impl Into<String>,
        inputs: usize,
        outputs: usize,
        activation: Activation,
        policy: MissingPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            activation,
            policy,
        }
    }

    /// Check that the configuration describes a layer that can be allocated.
    pub fn validate(&self) -> Result<()> {
        if self.inputs == 0 || self.outputs == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer `{}` dims must be > 0, got inputs={} outputs={}",
                self.name, self.inputs, self.outputs
            )));
        }
        if self.checked_parameter_count().is_none() {
            return Err(Error::InvalidConfig(format!(
                "layer `{}` parameter count for {} x {} with {:?} overflows",
                self.name, self.inputs, self.outputs, self.policy
            )));
        }
        self.activation.validate()?;
        Ok(())
    }

    /// Total number of learnable scalars a layer with this configuration owns.
    ///
    /// Saturates at `usize::MAX` for shapes that `validate` rejects as overflowing.
    pub fn parameter_count(&self) -> usize {
        self.checked_parameter_count().unwrap_or(usize::MAX)
    }

    fn checked_parameter_count(&self) -> Option<usize> {
        let weights = self.inputs.checked_mul(self.outputs)?;
        // Bounded by `weights` or `inputs` once the product fits.
        let extra = self.policy.extra_parameters(self.inputs, self.outputs);
        weights.checked_add(self.outputs)?.checked_add(extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_overflowing_shapes() {
        let ok = LayerConfig::new("l", 2, 3, Activation::Tanh, MissingPolicy::Zero);
        assert!(ok.validate().is_ok());

        let zero_in = LayerConfig::new("l", 0, 3, Activation::Tanh, MissingPolicy::Zero);
        assert!(matches!(zero_in.validate(), Err(Error::InvalidConfig(_))));

        let zero_out = LayerConfig::new("l", 3, 0, Activation::Tanh, MissingPolicy::Zero);
        assert!(zero_out.validate().is_err());

        let huge = LayerConfig::new("l", usize::MAX, 2, Activation::Tanh, MissingPolicy::None);
        assert!(huge.validate().is_err());

        // The weight product fits; the extra per-output corrections push it over.
        let half = usize::MAX / 2;
        let fits = LayerConfig::new("l", half, 1, Activation::Tanh, MissingPolicy::None);
        assert!(fits.validate().is_ok());
        assert_eq!(fits.parameter_count(), half + 1);
        let dense = LayerConfig::new("l", half, 1, Activation::Tanh, MissingPolicy::Dense);
        assert!(matches!(dense.validate(), Err(Error::InvalidConfig(_))));
        assert_eq!(dense.parameter_count(), usize::MAX);

        let bad_act = LayerConfig::new(
            "l",
            2,
            2,
            Activation::LeakyReLU { alpha: -1.0 },
            MissingPolicy::None,
        );
        assert!(bad_act.validate().is_err());
    }

    #[test]
    fn parameter_count_includes_policy_arrays() {
        let none = LayerConfig::new("l", 2, 1, Activation::Identity, MissingPolicy::None);
        assert_eq!(none.parameter_count(), 3);

        let dense = LayerConfig::new("l", 20, 40, Activation::Identity, MissingPolicy::Dense);
        assert_eq!(dense.parameter_count(), 20 * 40 + 40 + 800);

        let input = LayerConfig::new("l", 20, 40, Activation::Tanh, MissingPolicy::Input);
        assert_eq!(input.parameter_count(), 20 * 40 + 40 + 20);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn parses_from_json_with_default_policy() {
        let json = r#"{"name":"hidden","inputs":4,"outputs":2,"activation":{"kind":"tanh"}}"#;
        let cfg: LayerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.policy, MissingPolicy::None);
        assert_eq!(cfg.activation, Activation::Tanh);
        cfg.validate().unwrap();
    }
}
