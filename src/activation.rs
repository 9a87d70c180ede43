//! Activation functions.
//!
//! A dense layer computes a pre-activation value `z = b + x W` and then applies an
//! activation function element-wise: `y = activation(z)`.
//!
//! The scratch buffer filled by `fprop` keeps the pre-activations `z`, so the
//! derivative is given both `z` and the recomputed `y` and uses whichever is
//! cheaper and numerically better for the variant.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Element, Error, Result};

/// Element-wise activation function.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    Identity,
    Tanh,
    /// LeCun's scaled tanh: `1.7159 * tanh(2z / 3)`.
    ScaledTanh,
    /// Logistic sigmoid.
    Sigmoid,
    #[cfg_attr(feature = "serde", serde(rename = "relu"))]
    ReLU,
    #[cfg_attr(feature = "serde", serde(rename = "leaky_relu"))]
    LeakyReLU { alpha: f32 },
}

const SCALED_TANH_A: f64 = 1.7159;
const SCALED_TANH_B: f64 = 2.0 / 3.0;

impl Activation {
    /// Validate activation parameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Activation::LeakyReLU { alpha } => {
                if !(alpha.is_finite() && alpha >= 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "leaky ReLU alpha must be finite and >= 0, got {alpha}"
                    )));
                }
            }
            Activation::Identity
            | Activation::Tanh
            | Activation::ScaledTanh
            | Activation::Sigmoid
            | Activation::ReLU => {}
        }

        Ok(())
    }

    #[inline]
    pub fn eval<F: Element>(self, z: F) -> F {
        match self {
            Activation::Identity => z,
            Activation::Tanh => z.tanh(),
            Activation::ScaledTanh => {
                F::from_f64(SCALED_TANH_A) * (F::from_f64(SCALED_TANH_B) * z).tanh()
            }
            Activation::Sigmoid => sigmoid(z),
            Activation::ReLU => z.max(F::zero()),
            Activation::LeakyReLU { alpha } => {
                if z > F::zero() {
                    z
                } else {
                    F::from_f64(f64::from(alpha)) * z
                }
            }
        }
    }

    /// `dy/dz` at pre-activation `z`, where `y == self.eval(z)`.
    #[inline]
    pub fn derivative<F: Element>(self, z: F, y: F) -> F {
        match self {
            Activation::Identity => F::one(),
            Activation::Tanh => F::one() - y * y,
            Activation::ScaledTanh => {
                let a = F::from_f64(SCALED_TANH_A);
                let b = F::from_f64(SCALED_TANH_B);
                b * (a - y * y / a)
            }
            Activation::Sigmoid => y * (F::one() - y),
            Activation::ReLU => {
                if z > F::zero() {
                    F::one()
                } else {
                    F::zero()
                }
            }
            Activation::LeakyReLU { alpha } => {
                if z > F::zero() {
                    F::one()
                } else {
                    F::from_f64(f64::from(alpha))
                }
            }
        }
    }

    /// Stable one-byte tag used by the binary format.
    pub fn tag(self) -> u8 {
        match self {
            Activation::Identity => 0,
            Activation::Tanh => 1,
            Activation::ScaledTanh => 2,
            Activation::Sigmoid => 3,
            Activation::ReLU => 4,
            Activation::LeakyReLU { .. } => 5,
        }
    }

    /// Inverse of [`Activation::tag`]. `alpha` is only read for leaky ReLU.
    pub fn from_tag(tag: u8, alpha: f32) -> Option<Self> {
        Some(match tag {
            0 => Activation::Identity,
            1 => Activation::Tanh,
            2 => Activation::ScaledTanh,
            3 => Activation::Sigmoid,
            4 => Activation::ReLU,
            5 => Activation::LeakyReLU { alpha },
            _ => return None,
        })
    }

    pub(crate) fn alpha(self) -> f32 {
        match self {
            Activation::LeakyReLU { alpha } => alpha,
            _ => 0.0,
        }
    }
}

#[inline]
fn sigmoid<F: Element>(x: F) -> F {
    // Numerically stable sigmoid.
    if x >= F::zero() {
        let z = (-x).exp();
        F::one() / (F::one() + z)
    } else {
        let z = x.exp();
        z / (F::one() + z)
    }
}
