//! Flat views over the learnable parameters of a layer.
//!
//! Every learnable scalar a layer owns is exposed as one order-stable sequence:
//! weights (row-major), then biases, then the policy's auxiliary array. Optimizers
//! only ever see that sequence, so they work the same for a single layer and for a
//! whole [`crate::LayerStack`].
//!
//! There are two flavours:
//!
//! - [`Parameters`] / [`ParametersMut`] borrow the layer's own storage (zero-copy).
//!   The borrow ties them to the layer, so they can never outlive it or coexist
//!   with another mutable borrow.
//! - [`ParametersCopy`] is an owned snapshot with no tie to any layer. It is also
//!   the shape of a gradient accumulator.

use crate::{Element, Error, Result};

/// Read-only, zero-copy view over a layer's parameters.
#[derive(Debug, Clone)]
pub struct Parameters<'a, F> {
    segments: Vec<&'a [F]>,
    count: usize,
}

impl<'a, F: Element> Parameters<'a, F> {
    pub(crate) fn from_segments(segments: Vec<&'a [F]>) -> Self {
        let count = segments.iter().map(|s| s.len()).sum();
        Self { segments, count }
    }

    /// Append another view's segments after this one's.
    pub(crate) fn append(&mut self, other: Parameters<'a, F>) {
        self.count += other.count;
        self.segments.extend(other.segments);
    }

    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.count
    }

    pub fn iter(&self) -> impl Iterator<Item = F> + '_ {
        self.segments.iter().flat_map(|s| s.iter().copied())
    }

    pub fn get(&self, mut index: usize) -> Option<F> {
        for segment in &self.segments {
            if index < segment.len() {
                return Some(segment[index]);
            }
            index -= segment.len();
        }
        None
    }

    /// Copy every parameter into `out`, which must have exactly
    /// `parameter_count()` elements.
    pub fn copy_into(&self, out: &mut [F]) -> Result<()> {
        if out.len() != self.count {
            return Err(Error::ParameterCountMismatch {
                expected: self.count,
                actual: out.len(),
            });
        }
        let mut offset = 0;
        for segment in &self.segments {
            out[offset..offset + segment.len()].copy_from_slice(segment);
            offset += segment.len();
        }
        Ok(())
    }

    /// Owned snapshot of the current values.
    pub fn to_copy(&self) -> ParametersCopy<F> {
        let mut values = Vec::with_capacity(self.count);
        for segment in &self.segments {
            values.extend_from_slice(segment);
        }
        ParametersCopy { values }
    }
}

/// Mutable, zero-copy view over a layer's parameters.
#[derive(Debug)]
pub struct ParametersMut<'a, F> {
    segments: Vec<&'a mut [F]>,
    count: usize,
}

impl<'a, F: Element> ParametersMut<'a, F> {
    pub(crate) fn from_segments(segments: Vec<&'a mut [F]>) -> Self {
        let count = segments.iter().map(|s| s.len()).sum();
        Self { segments, count }
    }

    pub(crate) fn append(&mut self, other: ParametersMut<'a, F>) {
        self.count += other.count;
        self.segments.extend(other.segments);
    }

    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.count
    }

    /// Overwrite the layer's parameters from a snapshot.
    ///
    /// Nothing is written unless the sizes match.
    pub fn set(&mut self, snapshot: &ParametersCopy<F>) -> Result<()> {
        self.set_from_slice(snapshot.values())
    }

    pub fn set_from_slice(&mut self, values: &[F]) -> Result<()> {
        if values.len() != self.count {
            return Err(Error::ParameterCountMismatch {
                expected: self.count,
                actual: values.len(),
            });
        }
        let mut offset = 0;
        for segment in &mut self.segments {
            let len = segment.len();
            segment.copy_from_slice(&values[offset..offset + len]);
            offset += len;
        }
        Ok(())
    }

    pub fn fill(&mut self, value: F) {
        for segment in &mut self.segments {
            segment.fill(value);
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut F> + '_ {
        self.segments.iter_mut().flat_map(|s| s.iter_mut())
    }

    /// Apply `f(index, &mut value)` to every parameter in order.
    pub fn update(&mut self, mut f: impl FnMut(usize, &mut F)) {
        for (index, value) in self.iter_mut().enumerate() {
            f(index, value);
        }
    }

    /// Read-only view of the same storage.
    pub fn as_view(&self) -> Parameters<'_, F> {
        Parameters::from_segments(self.segments.iter().map(|s| &**s).collect())
    }
}

/// Owned, dense snapshot of a parameter sequence.
///
/// Used both for parameter snapshots handed to optimizers and for gradient
/// accumulators (`DenseLayer::bprop` adds into `values_mut()`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParametersCopy<F> {
    values: Vec<F>,
}

impl<F: Element> ParametersCopy<F> {
    /// A zeroed accumulator with `count` entries.
    pub fn zeros(count: usize) -> Self {
        Self {
            values: vec![F::zero(); count],
        }
    }

    pub fn from_values(values: Vec<F>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &[F] {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [F] {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<F> {
        self.values
    }

    pub fn fill(&mut self, value: F) {
        self.values.fill(value);
    }

    pub fn scale(&mut self, factor: F) {
        for v in &mut self.values {
            *v = *v * factor;
        }
    }

    /// Element-wise `self += other`. Used to merge per-thread accumulators.
    pub fn add_assign(&mut self, other: &ParametersCopy<F>) -> Result<()> {
        if other.len() != self.len() {
            return Err(Error::ParameterCountMismatch {
                expected: self.len(),
                actual: other.len(),
            });
        }
        for (v, &o) in self.values.iter_mut().zip(&other.values) {
            *v = *v + o;
        }
        Ok(())
    }
}

impl<'a, F: Element> From<&Parameters<'a, F>> for ParametersCopy<F> {
    fn from(view: &Parameters<'a, F>) -> Self {
        view.to_copy()
    }
}
