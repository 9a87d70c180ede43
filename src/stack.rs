//! Sequential composition of dense layers.
//!
//! A `LayerStack` feeds each layer's output into the next. It follows the same
//! contracts as a single layer:
//!
//! - one flat parameter sequence (layer 0's parameters, then layer 1's, ...)
//! - one caller-owned scratch buffer for `fprop`/`bprop`
//!
//! Scratch layout, one region per layer in order:
//!
//! ```text
//! [ layer scratch (ni + no) | layer output (no) | layer input errors (ni) ]
//! ```
//!
//! `bprop` walks the regions in reverse: each layer reads the input errors of the
//! layer above it as its output errors.

use tracing::debug;

use crate::{DenseLayer, Element, Error, Parameters, ParametersCopy, ParametersMut, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct LayerStack<F> {
    name: String,
    layers: Vec<DenseLayer<F>>,
}

/// Scratch length owned by one layer inside a stack.
#[inline]
fn region_len<F: Element>(layer: &DenseLayer<F>) -> usize {
    layer.fprop_temporary_space_required() + layer.outputs() + layer.inputs()
}

impl<F: Element> LayerStack<F> {
    /// Chain `layers` in order. Every layer's inputs must equal the previous
    /// layer's outputs.
    pub fn from_layers(name: impl Into<String>, layers: Vec<DenseLayer<F>>) -> Result<Self> {
        let name = name.into();
        if layers.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "stack `{name}` must have at least one layer"
            )));
        }
        for (idx, pair) in layers.windows(2).enumerate() {
            check_link(&pair[0], &pair[1], idx + 1)?;
        }
        debug!(
            name = %name,
            layers = layers.len(),
            inputs = layers[0].inputs(),
            outputs = layers[layers.len() - 1].outputs(),
            "assembled layer stack"
        );
        Ok(Self { name, layers })
    }

    /// Append a layer on top of the stack.
    pub fn push(&mut self, layer: DenseLayer<F>) -> Result<()> {
        check_link(self.last(), &layer, self.layers.len())?;
        self.layers.push(layer);
        Ok(())
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn inputs(&self) -> usize {
        self.layers[0].inputs()
    }

    #[inline]
    pub fn outputs(&self) -> usize {
        self.last().outputs()
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layers(&self) -> &[DenseLayer<F>] {
        &self.layers
    }

    pub fn layer(&self, idx: usize) -> Option<&DenseLayer<F>> {
        self.layers.get(idx)
    }

    /// Mutable access to one layer's parameters. The shape cannot change, so the
    /// stack stays consistent.
    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut DenseLayer<F>> {
        self.layers.get_mut(idx)
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(DenseLayer::parameter_count).sum()
    }

    pub fn parameters(&self) -> Parameters<'_, F> {
        let mut view = Parameters::from_segments(Vec::new());
        for layer in &self.layers {
            view.append(layer.parameters());
        }
        view
    }

    pub fn parameters_mut(&mut self) -> ParametersMut<'_, F> {
        let mut view = ParametersMut::from_segments(Vec::new());
        for layer in &mut self.layers {
            view.append(layer.parameters_mut());
        }
        view
    }

    /// A zeroed gradient accumulator laid out like [`LayerStack::parameters`].
    pub fn gradients(&self) -> ParametersCopy<F> {
        ParametersCopy::zeros(self.parameter_count())
    }

    pub fn apply(&self, input: &[F]) -> Result<Vec<F>> {
        let mut x = self.layers[0].apply(input)?;
        for layer in &self.layers[1..] {
            x = layer.apply(&x)?;
        }
        Ok(x)
    }

    pub fn fprop_temporary_space_required(&self) -> usize {
        self.layers.iter().map(region_len).sum()
    }

    pub fn scratch(&self) -> Vec<F> {
        vec![F::zero(); self.fprop_temporary_space_required()]
    }

    pub fn fprop(&self, input: &[F], scratch: &mut [F]) -> Result<Vec<F>> {
        let mut out = vec![F::zero(); self.outputs()];
        self.fprop_into(input, scratch, &mut out)?;
        Ok(out)
    }

    pub fn fprop_into(&self, input: &[F], scratch: &mut [F], out: &mut [F]) -> Result<()> {
        Error::check_len(self.inputs(), input.len())?;
        Error::check_len(self.outputs(), out.len())?;
        self.check_scratch(scratch.len())?;

        let mut offset = 0;
        // Position of the previous layer's output inside `scratch`.
        let mut prev: Option<(usize, usize)> = None;
        for layer in &self.layers {
            let (done, todo) = scratch.split_at_mut(offset);
            let layer_input: &[F] = match prev {
                None => input,
                Some((start, len)) => &done[start..start + len],
            };

            let own = layer.fprop_temporary_space_required();
            let (layer_scratch, rest) = todo.split_at_mut(own);
            let layer_out = &mut rest[..layer.outputs()];
            layer.fprop_into(layer_input, layer_scratch, layer_out)?;

            prev = Some((offset + own, layer.outputs()));
            offset += region_len(layer);
        }

        if let Some((start, len)) = prev {
            out.copy_from_slice(&scratch[start..start + len]);
        }
        Ok(())
    }

    /// Backward pass for the sample most recently passed to `fprop` with `scratch`.
    ///
    /// `gradient` has `parameter_count()` entries in [`LayerStack::parameters`]
    /// order; each layer accumulates into its own slice. `input_errors`, when
    /// given, receives the errors with respect to the stack's input.
    pub fn bprop(
        &self,
        output_errors: &[F],
        scratch: &mut [F],
        gradient: &mut [F],
        input_errors: Option<&mut [F]>,
        example_weight: F,
    ) -> Result<()> {
        Error::check_len(self.outputs(), output_errors.len())?;
        self.check_scratch(scratch.len())?;
        let count = self.parameter_count();
        if gradient.len() != count {
            return Err(Error::ParameterCountMismatch {
                expected: count,
                actual: gradient.len(),
            });
        }
        // Checked up front so an error never leaves `gradient` half accumulated.
        if let Some(errors) = input_errors.as_deref() {
            Error::check_len(self.inputs(), errors.len())?;
        }

        let mut region_end = self.fprop_temporary_space_required();
        let mut grad_end = count;
        let mut input_errors = input_errors;
        for (idx, layer) in self.layers.iter().enumerate().rev() {
            let region_start = region_end - region_len(layer);
            let grad_start = grad_end - layer.parameter_count();

            let (below, above) = scratch.split_at_mut(region_end);
            let region = &mut below[region_start..];
            let own = layer.fprop_temporary_space_required();
            let (layer_scratch, rest) = region.split_at_mut(own);
            let layer_input_errors = &mut rest[layer.outputs()..];

            // The layer above wrote its input errors at the end of its region.
            let layer_output_errors: &[F] = if idx + 1 == self.layers.len() {
                output_errors
            } else {
                let next = &self.layers[idx + 1];
                let next_errors_start = region_len(next) - next.inputs();
                &above[next_errors_start..next_errors_start + next.inputs()]
            };

            let layer_gradient = &mut gradient[grad_start..grad_end];
            if idx == 0 {
                layer.bprop(
                    layer_output_errors,
                    layer_scratch,
                    layer_gradient,
                    input_errors.as_deref_mut(),
                    example_weight,
                )?;
            } else {
                layer.bprop(
                    layer_output_errors,
                    layer_scratch,
                    layer_gradient,
                    Some(layer_input_errors),
                    example_weight,
                )?;
            }

            region_end = region_start;
            grad_end = grad_start;
        }
        Ok(())
    }

    /// Exact equality, including NaN payloads and signed zeros.
    pub fn bitwise_eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.layers.len() == other.layers.len()
            && self
                .layers
                .iter()
                .zip(&other.layers)
                .all(|(a, b)| a.bitwise_eq(b))
    }

    #[inline]
    fn last(&self) -> &DenseLayer<F> {
        &self.layers[self.layers.len() - 1]
    }

    #[inline]
    fn check_scratch(&self, provided: usize) -> Result<()> {
        let required = self.fprop_temporary_space_required();
        if provided < required {
            return Err(Error::InsufficientScratchSpace { required, provided });
        }
        Ok(())
    }
}

fn check_link<F: Element>(below: &DenseLayer<F>, above: &DenseLayer<F>, idx: usize) -> Result<()> {
    if below.outputs() != above.inputs() {
        return Err(Error::InvalidConfig(format!(
            "layer {idx} (`{}`) expects {} inputs but the layer below produces {}",
            above.name(),
            above.inputs(),
            below.outputs()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Activation, MissingPolicy};

    fn two_layer(policy: MissingPolicy) -> LayerStack<f64> {
        let a = DenseLayer::new_with_seed("a", 3, 4, Activation::Tanh, policy, 11).unwrap();
        let b = DenseLayer::new_with_seed("b", 4, 2, Activation::Sigmoid, MissingPolicy::None, 12)
            .unwrap();
        LayerStack::from_layers("stack", vec![a, b]).unwrap()
    }

    fn half_squared_error(stack: &LayerStack<f64>, input: &[f64], target: &[f64]) -> f64 {
        let y = stack.apply(input).unwrap();
        y.iter()
            .zip(target)
            .map(|(y, t)| 0.5 * (y - t) * (y - t))
            .sum()
    }

    #[test]
    fn rejects_mismatched_layers() {
        let a = DenseLayer::<f32>::new("a", 3, 4, Activation::Tanh, MissingPolicy::None).unwrap();
        let b = DenseLayer::<f32>::new("b", 5, 2, Activation::Tanh, MissingPolicy::None).unwrap();
        let err = LayerStack::from_layers("s", vec![a.clone(), b.clone()]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let mut stack = LayerStack::from_layers("s", vec![a]).unwrap();
        assert!(stack.push(b).is_err());
        assert_eq!(stack.num_layers(), 1);

        assert!(LayerStack::<f32>::from_layers("s", Vec::new()).is_err());
    }

    #[test]
    fn output_matches_manually_chained_layers() {
        let stack = two_layer(MissingPolicy::Input);
        let input = [0.3, f64::NAN, -1.2];

        let hidden = stack.layers()[0].apply(&input).unwrap();
        let manual = stack.layers()[1].apply(&hidden).unwrap();
        assert_eq!(stack.apply(&input).unwrap(), manual);

        let mut scratch = stack.scratch();
        let out = stack.fprop(&input, &mut scratch).unwrap();
        assert!(crate::element::bitwise_eq(&out, &manual));
    }

    #[test]
    fn parameters_concatenate_layers_in_order() {
        let stack = two_layer(MissingPolicy::Dense);
        let first = stack.layers()[0].parameter_count();
        assert_eq!(stack.parameter_count(), first + stack.layers()[1].parameter_count());

        let all = stack.parameters().to_copy();
        assert_eq!(&all.values()[..first], stack.layers()[0].parameters().to_copy().values());
        assert_eq!(&all.values()[first..], stack.layers()[1].parameters().to_copy().values());
    }

    #[test]
    fn gradient_slices_equal_per_layer_gradients() {
        let stack = two_layer(MissingPolicy::Zero);
        let input = [0.5, -0.25, f64::NAN];
        let errors = [0.1, -0.3];

        let mut scratch = stack.scratch();
        stack.fprop(&input, &mut scratch).unwrap();
        let mut grads = stack.gradients();
        stack
            .bprop(&errors, &mut scratch, grads.values_mut(), None, 1.0)
            .unwrap();

        let (a, b) = (&stack.layers()[0], &stack.layers()[1]);
        let mut sa = a.scratch();
        let hidden = a.fprop(&input, &mut sa).unwrap();
        let mut sb = b.scratch();
        b.fprop(&hidden, &mut sb).unwrap();

        let mut gb = b.gradients();
        let mut hidden_errors = vec![0.0; b.inputs()];
        b.bprop(&errors, &sb, gb.values_mut(), Some(&mut hidden_errors), 1.0)
            .unwrap();
        let mut ga = a.gradients();
        a.bprop(&hidden_errors, &sa, ga.values_mut(), None, 1.0)
            .unwrap();

        let split = a.parameter_count();
        assert_eq!(&grads.values()[..split], ga.values());
        assert_eq!(&grads.values()[split..], gb.values());
    }

    #[test]
    fn bprop_matches_numeric_gradients() {
        for policy in [MissingPolicy::Zero, MissingPolicy::Input, MissingPolicy::Dense] {
            let mut stack = two_layer(policy);
            let input = [0.4, f64::NAN, -0.7];
            let target = [0.2, 0.9];

            let mut scratch = stack.scratch();
            let y = stack.fprop(&input, &mut scratch).unwrap();
            let errors: Vec<f64> = y.iter().zip(&target).map(|(y, t)| y - t).collect();
            let mut grads = stack.gradients();
            stack
                .bprop(&errors, &mut scratch, grads.values_mut(), None, 1.0)
                .unwrap();

            let base = stack.parameters().to_copy();
            let eps = 1e-6;
            for p in 0..base.len() {
                let mut probe = base.clone();
                probe.values_mut()[p] += eps;
                stack.parameters_mut().set(&probe).unwrap();
                let plus = half_squared_error(&stack, &input, &target);
                probe.values_mut()[p] -= 2.0 * eps;
                stack.parameters_mut().set(&probe).unwrap();
                let minus = half_squared_error(&stack, &input, &target);

                let numeric = (plus - minus) / (2.0 * eps);
                approx::assert_abs_diff_eq!(grads.values()[p], numeric, epsilon = 1e-6);
            }
            stack.parameters_mut().set(&base).unwrap();
        }
    }

    #[test]
    fn input_errors_match_numeric_derivative() {
        let stack = two_layer(MissingPolicy::None);
        let input = [0.4, 0.1, -0.7];
        let target = [0.2, 0.9];

        let mut scratch = stack.scratch();
        let y = stack.fprop(&input, &mut scratch).unwrap();
        let errors: Vec<f64> = y.iter().zip(&target).map(|(y, t)| y - t).collect();
        let mut grads = stack.gradients();
        let mut input_errors = [0.0; 3];
        stack
            .bprop(
                &errors,
                &mut scratch,
                grads.values_mut(),
                Some(&mut input_errors),
                1.0,
            )
            .unwrap();

        let eps = 1e-6;
        for i in 0..input.len() {
            let mut x = input;
            x[i] += eps;
            let plus = half_squared_error(&stack, &x, &target);
            x[i] -= 2.0 * eps;
            let minus = half_squared_error(&stack, &x, &target);
            approx::assert_abs_diff_eq!(input_errors[i], (plus - minus) / (2.0 * eps), epsilon = 1e-6);
        }
    }

    #[test]
    fn validates_buffers() {
        let stack = two_layer(MissingPolicy::None);
        let mut short = vec![0.0; stack.fprop_temporary_space_required() - 1];
        let err = stack.fprop(&[0.0; 3], &mut short).unwrap_err();
        assert!(matches!(err, Error::InsufficientScratchSpace { .. }));

        let mut scratch = stack.scratch();
        stack.fprop(&[0.0; 3], &mut scratch).unwrap();
        let mut grads = ParametersCopy::zeros(3);
        let err = stack
            .bprop(&[0.0; 2], &mut scratch, grads.values_mut(), None, 1.0)
            .unwrap_err();
        assert!(matches!(err, Error::ParameterCountMismatch { .. }));
    }

    #[test]
    fn bad_input_errors_leave_gradient_untouched() {
        let stack = two_layer(MissingPolicy::Dense);
        let mut scratch = stack.scratch();
        stack.fprop(&[0.4, f64::NAN, -0.9], &mut scratch).unwrap();

        let mut grads = stack.gradients();
        let mut too_long = [0.0; 5];
        let err = stack
            .bprop(&[0.7, -0.2], &mut scratch, grads.values_mut(), Some(&mut too_long), 1.0)
            .unwrap_err();
        assert!(matches!(err, Error::InputSizeMismatch { expected: 3, actual: 5 }));
        assert!(grads.values().iter().all(|&g| g == 0.0));
        assert!(too_long.iter().all(|&e| e == 0.0));
    }
}
