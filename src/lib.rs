//! Dense neural-network layers with pluggable missing-value handling.
//!
//! `rust-dense` implements a fully-connected layer, `y = activation(b + x W)`,
//! generic over `f32` and `f64`, that knows what to do when some inputs are NaN.
//! It is designed to be easy to read while keeping the per-sample hot path
//! allocation-free.
//!
//! # Design goals
//!
//! - Predictable performance: the caller owns scratch and gradient buffers and
//!   reuses them; `fprop_into` + `bprop` never allocate.
//! - Clear contracts: shapes are explicit and validated at the API boundary; every
//!   misuse is reported through [`Error`], never a panic.
//! - Optimizer-agnostic: every learnable scalar is reachable through one flat,
//!   order-stable [`Parameters`] view.
//!
//! # Missing values
//!
//! A layer's [`MissingPolicy`] decides what a NaN input means:
//!
//! - `None`: it is an error ([`Error::MissingValueNotAllowed`]).
//! - `Zero`: the input contributes nothing.
//! - `Input`: the input is replaced by a learned per-input value.
//! - `Dense`: each output receives a learned per-(input, output) correction instead
//!   of the weighted input.
//!
//! # Data layout and shapes
//!
//! - Weights are row-major with shape `(inputs, outputs)`.
//! - Parameter order: weights, bias, then the policy's auxiliary array.
//! - Scratch for a layer is `inputs + outputs` scalars (see
//!   [`DenseLayer::fprop_temporary_space_required`]).
//!
//! # MSRV
//!
//! This crate's minimum supported Rust version (MSRV) is specified in `Cargo.toml`.

//! # Quick start
//!
//! ```rust
//! use rust_dense::{Activation, DenseLayer, MissingPolicy};
//!
//! # fn main() -> rust_dense::Result<()> {
//! let layer = DenseLayer::<f32>::new_with_seed(
//!     "hidden",
//!     3,
//!     2,
//!     Activation::Tanh,
//!     MissingPolicy::Input,
//!     0,
//! )?;
//! let y = layer.apply(&[0.5, f32::NAN, -1.0])?;
//! assert_eq!(y.len(), 2);
//! # Ok(())
//! # }
//! ```

//! # Allocation-free training step (advanced)
//!
//! Allocate buffers once and reuse them across samples:
//!
//! ```rust
//! use rust_dense::{Activation, MissingPolicy, Optimizer, StackBuilder};
//!
//! # fn main() -> rust_dense::Result<()> {
//! let mut stack = StackBuilder::new(3)?
//!     .add_layer(8, Activation::Tanh, MissingPolicy::Dense)?
//!     .add_layer(2, Activation::Identity, MissingPolicy::None)?
//!     .build_with_seed::<f32>(0)?;
//!
//! let mut scratch = stack.scratch();
//! let mut grads = stack.gradients();
//! let mut out = [0.0_f32; 2];
//! let mut state = Optimizer::Sgd.state(stack.parameter_count())?;
//!
//! let x = [0.1_f32, f32::NAN, 0.3];
//! let t = [0.0_f32, 1.0];
//!
//! stack.fprop_into(&x, &mut scratch, &mut out)?;
//! let errors = [out[0] - t[0], out[1] - t[1]];
//! grads.fill(0.0);
//! stack.bprop(&errors, &mut scratch, grads.values_mut(), None, 1.0)?;
//! state.step(stack.parameters_mut(), &grads, 1e-2)?;
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod builder;
pub mod config;
pub mod element;
pub mod error;
pub mod layer;
pub mod missing;
pub mod optim;
pub mod parameters;
pub mod serde_model;
pub mod stack;
pub mod store;

pub use activation::Activation;
pub use builder::StackBuilder;
pub use config::LayerConfig;
pub use element::{Element, ElementKind};
pub use error::{Error, Result};
pub use layer::{DenseLayer, Init};
pub use missing::MissingPolicy;
pub use optim::{Optimizer, OptimizerState};
pub use parameters::{Parameters, ParametersCopy, ParametersMut};
pub use serde_model::{SerializedLayer, SerializedStack};
pub use stack::LayerStack;
pub use store::{StoreReader, StoreWriter};
