//! Missing-value policies.
//!
//! A missing input is a NaN. The policy a layer is built with decides what a NaN
//! means for the weighted sum, and which extra parameters the layer has to learn
//! to deal with it.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a dense layer treats NaN inputs.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MissingPolicy {
    /// NaN inputs are rejected with [`crate::Error::MissingValueNotAllowed`].
    #[default]
    None,
    /// A missing input contributes nothing to any output.
    Zero,
    /// A missing input `i` is replaced by the learned value `missing_replacements[i]`
    /// before it is multiplied by the weights.
    Input,
    /// A missing input `i` adds the learned value `missing_activations[i][o]` to the
    /// pre-activation of output `o`, in place of its weighted contribution.
    Dense,
}

impl MissingPolicy {
    pub const ALL: [MissingPolicy; 4] = [
        MissingPolicy::None,
        MissingPolicy::Zero,
        MissingPolicy::Input,
        MissingPolicy::Dense,
    ];

    /// Length of `missing_replacements` for a layer with `ni` inputs.
    #[inline]
    pub fn replacements_len(self, ni: usize) -> usize {
        match self {
            MissingPolicy::Input => ni,
            _ => 0,
        }
    }

    /// Length of `missing_activations` for an `ni x no` layer.
    #[inline]
    pub fn activations_len(self, ni: usize, no: usize) -> usize {
        match self {
            MissingPolicy::Dense => ni * no,
            _ => 0,
        }
    }

    /// Number of learnable scalars this policy adds to an `ni x no` layer.
    #[inline]
    pub fn extra_parameters(self, ni: usize, no: usize) -> usize {
        self.replacements_len(ni) + self.activations_len(ni, no)
    }

    pub fn tag(self) -> u8 {
        match self {
            MissingPolicy::None => 0,
            MissingPolicy::Zero => 1,
            MissingPolicy::Input => 2,
            MissingPolicy::Dense => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(MissingPolicy::None),
            1 => Some(MissingPolicy::Zero),
            2 => Some(MissingPolicy::Input),
            3 => Some(MissingPolicy::Dense),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MissingPolicy::None => "none",
            MissingPolicy::Zero => "zero",
            MissingPolicy::Input => "input",
            MissingPolicy::Dense => "dense",
        }
    }
}
