//! Optimizers.
//!
//! Small, allocation-free-per-step optimizers that update any parameter view
//! (a single `DenseLayer` or a whole `LayerStack`) from a gradient accumulator.
//!
//! Design notes:
//! - Optimizer *state* (momentum/Adam moments) lives outside the model, as flat
//!   vectors in parameter order.
//! - The caller owns the optimizer state and reuses it across steps; there is no
//!   training loop here.
//! - Updates descend: `param -= lr * direction`.

use crate::{Element, Error, ParametersCopy, ParametersMut, Result};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
/// Optimizer choice.
pub enum Optimizer {
    /// Plain SGD.
    #[default]
    Sgd,
    /// SGD with momentum.
    SgdMomentum { momentum: f32 },
    /// Adam (bias-corrected).
    Adam { beta1: f32, beta2: f32, eps: f32 },
}

impl Optimizer {
    /// Adam with the usual defaults.
    pub const ADAM: Optimizer = Optimizer::Adam {
        beta1: 0.9,
        beta2: 0.999,
        eps: 1e-8,
    };

    /// Validate optimizer hyperparameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Optimizer::Sgd => Ok(()),
            Optimizer::SgdMomentum { momentum } => {
                if !(momentum.is_finite() && (0.0..1.0).contains(&momentum)) {
                    return Err(Error::InvalidConfig(format!(
                        "momentum must be finite and in [0,1), got {momentum}"
                    )));
                }
                Ok(())
            }
            Optimizer::Adam { beta1, beta2, eps } => {
                if !(beta1.is_finite() && (0.0..1.0).contains(&beta1)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta1 must be finite and in [0,1), got {beta1}"
                    )));
                }
                if !(beta2.is_finite() && (0.0..1.0).contains(&beta2)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta2 must be finite and in [0,1), got {beta2}"
                    )));
                }
                if !(eps.is_finite() && eps > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "adam eps must be finite and > 0, got {eps}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Allocate optimizer state for `count` parameters.
    pub fn state<F: Element>(self, count: usize) -> Result<OptimizerState<F>> {
        self.validate()?;

        let state = match self {
            Optimizer::Sgd => OptimizerState::Sgd,
            Optimizer::SgdMomentum { momentum } => OptimizerState::SgdMomentum {
                momentum: F::from_f64(f64::from(momentum)),
                velocity: vec![F::zero(); count],
            },
            Optimizer::Adam { beta1, beta2, eps } => OptimizerState::Adam {
                beta1: F::from_f64(f64::from(beta1)),
                beta2: F::from_f64(f64::from(beta2)),
                eps: F::from_f64(f64::from(eps)),
                t: 0,
                beta1_pow: F::one(),
                beta2_pow: F::one(),
                m: vec![F::zero(); count],
                v: vec![F::zero(); count],
            },
        };
        Ok(state)
    }
}

#[derive(Debug, Clone, Default)]
/// Owned optimizer state.
pub enum OptimizerState<F> {
    /// Plain SGD (no state).
    #[default]
    Sgd,
    /// SGD with momentum state.
    SgdMomentum { momentum: F, velocity: Vec<F> },
    /// Adam state.
    Adam {
        beta1: F,
        beta2: F,
        eps: F,
        t: u64,
        beta1_pow: F,
        beta2_pow: F,
        m: Vec<F>,
        v: Vec<F>,
    },
}

impl<F: Element> OptimizerState<F> {
    /// Apply one optimizer step to `params` using `grads`.
    ///
    /// `grads` must be laid out like `params` (e.g. from `gradients()` on the same
    /// layer or stack). Nothing is updated if any size is off.
    pub fn step(
        &mut self,
        mut params: ParametersMut<'_, F>,
        grads: &ParametersCopy<F>,
        lr: F,
    ) -> Result<()> {
        if !(lr.is_finite() && lr > F::zero()) {
            return Err(Error::InvalidConfig(format!(
                "lr must be finite and > 0, got {lr}"
            )));
        }
        let count = params.parameter_count();
        check_count(count, grads.len())?;

        let g = grads.values();
        match self {
            OptimizerState::Sgd => {
                params.update(|i, p| *p = *p - lr * g[i]);
            }
            OptimizerState::SgdMomentum { momentum, velocity } => {
                check_count(count, velocity.len())?;
                let momentum = *momentum;
                params.update(|i, p| {
                    velocity[i] = momentum * velocity[i] + g[i];
                    *p = *p - lr * velocity[i];
                });
            }
            OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                t,
                beta1_pow,
                beta2_pow,
                m,
                v,
            } => {
                check_count(count, m.len())?;
                check_count(count, v.len())?;

                *t += 1;
                *beta1_pow = *beta1_pow * *beta1;
                *beta2_pow = *beta2_pow * *beta2;

                let (beta1, beta2, eps) = (*beta1, *beta2, *eps);
                let one_minus_beta1 = F::one() - beta1;
                let one_minus_beta2 = F::one() - beta2;
                let corr1 = F::one() - *beta1_pow;
                let corr2 = F::one() - *beta2_pow;

                params.update(|i, p| {
                    let gi = g[i];
                    m[i] = beta1 * m[i] + one_minus_beta1 * gi;
                    v[i] = beta2 * v[i] + one_minus_beta2 * (gi * gi);

                    let m_hat = m[i] / corr1;
                    let v_hat = v[i] / corr2;
                    *p = *p - lr * m_hat / (v_hat.sqrt() + eps);
                });
            }
        }
        Ok(())
    }
}

fn check_count(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::ParameterCountMismatch { expected, actual });
    }
    Ok(())
}
