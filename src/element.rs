//! Floating-point element types.
//!
//! Layers are generic over their scalar type. `f32` is the usual choice; `f64` is
//! available for gradient checking and for models where precision matters more than
//! memory. Both encode to little-endian bytes without loss, which is what makes
//! serialization bit-exact.

use std::fmt::{Debug, Display};
use std::io::{self, Read, Write};

use num_traits::Float;
use rand::distributions::uniform::SampleUniform;

/// Storage tag for an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    F32,
    F64,
}

impl ElementKind {
    #[inline]
    pub fn tag(self) -> u8 {
        match self {
            ElementKind::F32 => 1,
            ElementKind::F64 => 2,
        }
    }

    #[inline]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ElementKind::F32),
            2 => Some(ElementKind::F64),
            _ => None,
        }
    }

    /// Encoded width in bytes.
    #[inline]
    pub fn size(self) -> usize {
        match self {
            ElementKind::F32 => 4,
            ElementKind::F64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementKind::F32 => "f32",
            ElementKind::F64 => "f64",
        }
    }
}

/// Scalar type a layer stores its parameters in.
pub trait Element:
    Float + SampleUniform + Debug + Display + Default + Send + Sync + 'static
{
    const KIND: ElementKind;

    /// Convert a constant. Lossy for `f32`, which is fine for literals.
    fn from_f64(value: f64) -> Self;

    /// Raw bit pattern, widened to `u64`. Used for exact (NaN-aware) comparisons.
    fn bits(self) -> u64;

    fn write_le<W: Write + ?Sized>(self, writer: &mut W) -> io::Result<()>;

    fn read_le<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self>;
}

macro_rules! impl_element {
    ($ty:ty, $kind:expr, $width:expr) => {
        impl Element for $ty {
            const KIND: ElementKind = $kind;

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            #[inline]
            fn bits(self) -> u64 {
                u64::from(self.to_bits())
            }

            #[inline]
            fn write_le<W: Write + ?Sized>(self, writer: &mut W) -> io::Result<()> {
                writer.write_all(&self.to_le_bytes())
            }

            #[inline]
            fn read_le<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
                let mut buf = [0u8; $width];
                reader.read_exact(&mut buf)?;
                Ok(<$ty>::from_le_bytes(buf))
            }
        }
    };
}

impl_element!(f32, ElementKind::F32, 4);
impl_element!(f64, ElementKind::F64, 8);

/// Bitwise equality of two element slices.
///
/// Unlike `==`, this treats identical NaN payloads as equal and `0.0` / `-0.0` as
/// different, which is what a serialization round trip must preserve.
pub fn bitwise_eq<F: Element>(a: &[F], b: &[F]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.bits() == y.bits())
}
