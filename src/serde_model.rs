//! Layer and stack persistence.
//!
//! This module defines a versioned, stable format for `DenseLayer` and
//! `LayerStack`, with two encodings:
//!
//! - binary, through [`crate::store`]; always available and bit-exact for both
//!   `f32` and `f64`.
//! - JSON (feature: `serde`); floats round-trip exactly as long as they are finite.
//!
//! Design notes:
//! - We do NOT directly serialize the internal `DenseLayer` struct, so the format
//!   stays stable even if the in-memory representation changes.
//! - Deserialization goes through `DenseLayer::from_parts`, which validates every
//!   array length against the shape and policy. A reader never hands back a
//!   partially-initialized layer.
//! - Readers accept every version from 1 up to the current one.

use std::io::{Read, Write};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize, de::DeserializeOwned};
#[cfg(feature = "serde")]
use std::path::Path;

use tracing::{debug, warn};

use crate::store::{StoreReader, StoreWriter};
use crate::{
    Activation, DenseLayer, Element, ElementKind, Error, LayerConfig, LayerStack, MissingPolicy,
    Result,
};

pub const LAYER_TYPE_NAME: &str = "DenseLayer";
pub const STACK_TYPE_NAME: &str = "LayerStack";
pub const LAYER_FORMAT_VERSION: u32 = 1;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedLayer<F> {
    pub format_version: u32,
    pub name: String,
    pub inputs: usize,
    pub outputs: usize,
    pub activation: Activation,
    pub policy: MissingPolicy,
    /// Row-major (inputs, outputs).
    pub weights: Vec<F>,
    pub bias: Vec<F>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub missing_replacements: Vec<F>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub missing_activations: Vec<F>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(deserialize = "F: Deserialize<'de> + Default"))
)]
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedStack<F> {
    pub format_version: u32,
    pub name: String,
    pub layers: Vec<SerializedLayer<F>>,
}

fn check_version(version: u32) -> Result<()> {
    if version == 0 || version > LAYER_FORMAT_VERSION {
        return Err(Error::Format(format!(
            "unsupported format_version {version}; expected 1..={LAYER_FORMAT_VERSION}"
        )));
    }
    Ok(())
}

/// Anything that fails while rebuilding a layer is a format problem to the caller.
fn as_format_error(e: Error) -> Error {
    match e {
        Error::Format(_) => e,
        other => Error::Format(other.to_string()),
    }
}

impl<F: Element> From<&DenseLayer<F>> for SerializedLayer<F> {
    fn from(layer: &DenseLayer<F>) -> Self {
        Self {
            format_version: LAYER_FORMAT_VERSION,
            name: layer.name().to_owned(),
            inputs: layer.inputs(),
            outputs: layer.outputs(),
            activation: layer.activation(),
            policy: layer.policy(),
            weights: layer.weights().to_vec(),
            bias: layer.bias().to_vec(),
            missing_replacements: layer.missing_replacements().to_vec(),
            missing_activations: layer.missing_activations().to_vec(),
        }
    }
}

impl<F: Element> TryFrom<SerializedLayer<F>> for DenseLayer<F> {
    type Error = Error;

    fn try_from(value: SerializedLayer<F>) -> std::result::Result<Self, Self::Error> {
        check_version(value.format_version)?;
        let config = LayerConfig::new(
            value.name,
            value.inputs,
            value.outputs,
            value.activation,
            value.policy,
        );
        DenseLayer::from_parts(
            &config,
            value.weights,
            value.bias,
            value.missing_replacements,
            value.missing_activations,
        )
        .map_err(as_format_error)
    }
}

impl<F: Element> From<&LayerStack<F>> for SerializedStack<F> {
    fn from(stack: &LayerStack<F>) -> Self {
        Self {
            format_version: LAYER_FORMAT_VERSION,
            name: stack.name().to_owned(),
            layers: stack.layers().iter().map(SerializedLayer::from).collect(),
        }
    }
}

impl<F: Element> TryFrom<SerializedStack<F>> for LayerStack<F> {
    type Error = Error;

    fn try_from(value: SerializedStack<F>) -> std::result::Result<Self, Self::Error> {
        check_version(value.format_version)?;
        let mut layers = Vec::with_capacity(value.layers.len());
        for (i, layer) in value.layers.into_iter().enumerate() {
            let layer = DenseLayer::try_from(layer)
                .map_err(|e| Error::Format(format!("layer {i} invalid: {e}")))?;
            layers.push(layer);
        }
        LayerStack::from_layers(value.name, layers).map_err(as_format_error)
    }
}

impl<F: Element> DenseLayer<F> {
    /// Write the full layer state to `writer`.
    pub fn serialize<W: Write>(&self, writer: W) -> Result<()> {
        let mut store = StoreWriter::new(writer);
        self.serialize_to(&mut store)?;
        store.flush()
    }

    pub fn serialize_to<W: Write>(&self, store: &mut StoreWriter<W>) -> Result<()> {
        store.write_str(LAYER_TYPE_NAME)?;
        store.write_u32(LAYER_FORMAT_VERSION)?;
        store.write_str(self.name())?;
        store.write_u64(self.inputs() as u64)?;
        store.write_u64(self.outputs() as u64)?;
        store.write_u8(self.activation().tag())?;
        store.write_f32(self.activation().alpha())?;
        store.write_u8(self.policy().tag())?;
        store.write_u8(F::KIND.tag())?;
        store.write_array(self.weights())?;
        store.write_array(self.bias())?;
        store.write_array(self.missing_replacements())?;
        store.write_array(self.missing_activations())?;
        Ok(())
    }

    /// Read a layer previously written by [`DenseLayer::serialize`].
    pub fn reconstitute<R: Read>(reader: R) -> Result<Self> {
        Self::reconstitute_from(&mut StoreReader::new(reader))
    }

    pub fn reconstitute_from<R: Read>(store: &mut StoreReader<R>) -> Result<Self> {
        let layer = read_layer(store)
            .and_then(DenseLayer::try_from)
            .map_err(|e| {
                warn!(error = %e, "rejected serialized dense layer");
                e
            })?;
        debug!(
            name = layer.name(),
            inputs = layer.inputs(),
            outputs = layer.outputs(),
            "reconstituted dense layer"
        );
        Ok(layer)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    /// Parse a layer from exactly `bytes`; trailing data is an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut store = StoreReader::new(bytes);
        let layer = Self::reconstitute_from(&mut store)?;
        let rest = store.into_inner();
        if !rest.is_empty() {
            return Err(Error::Format(format!(
                "{} trailing bytes after layer",
                rest.len()
            )));
        }
        Ok(layer)
    }
}

fn read_layer<F: Element, R: Read>(store: &mut StoreReader<R>) -> Result<SerializedLayer<F>> {
    let type_name = store.read_str()?;
    if type_name != LAYER_TYPE_NAME {
        return Err(Error::Format(format!(
            "expected a {LAYER_TYPE_NAME}, found `{type_name}`"
        )));
    }
    let format_version = store.read_u32()?;
    check_version(format_version)?;

    let name = store.read_str()?;
    let inputs = read_usize(store)?;
    let outputs = read_usize(store)?;
    let activation_tag = store.read_u8()?;
    let alpha = store.read_f32()?;
    let activation = Activation::from_tag(activation_tag, alpha)
        .ok_or_else(|| Error::Format(format!("unknown activation tag {activation_tag}")))?;
    let policy_tag = store.read_u8()?;
    let policy = MissingPolicy::from_tag(policy_tag)
        .ok_or_else(|| Error::Format(format!("unknown missing-value policy tag {policy_tag}")))?;

    let element_tag = store.read_u8()?;
    match ElementKind::from_tag(element_tag) {
        Some(kind) if kind == F::KIND => {}
        Some(kind) => {
            return Err(Error::Format(format!(
                "layer stores {} parameters, expected {}",
                kind.name(),
                F::KIND.name()
            )))
        }
        None => return Err(Error::Format(format!("unknown element tag {element_tag}"))),
    }

    Ok(SerializedLayer {
        format_version,
        name,
        inputs,
        outputs,
        activation,
        policy,
        weights: store.read_array()?,
        bias: store.read_array()?,
        missing_replacements: store.read_array()?,
        missing_activations: store.read_array()?,
    })
}

fn read_usize<R: Read>(store: &mut StoreReader<R>) -> Result<usize> {
    let v = store.read_u64()?;
    usize::try_from(v).map_err(|_| Error::Format(format!("dimension {v} does not fit in usize")))
}

impl<F: Element> LayerStack<F> {
    pub fn serialize<W: Write>(&self, writer: W) -> Result<()> {
        let mut store = StoreWriter::new(writer);
        store.write_str(STACK_TYPE_NAME)?;
        store.write_u32(LAYER_FORMAT_VERSION)?;
        store.write_str(self.name())?;
        store.write_u64(self.num_layers() as u64)?;
        for layer in self.layers() {
            layer.serialize_to(&mut store)?;
        }
        store.flush()
    }

    pub fn reconstitute<R: Read>(reader: R) -> Result<Self> {
        let mut store = StoreReader::new(reader);
        let type_name = store.read_str()?;
        if type_name != STACK_TYPE_NAME {
            return Err(Error::Format(format!(
                "expected a {STACK_TYPE_NAME}, found `{type_name}`"
            )));
        }
        check_version(store.read_u32()?)?;
        let name = store.read_str()?;
        let count = read_usize(&mut store)?;

        let mut layers = Vec::with_capacity(count.min(1024));
        for i in 0..count {
            let layer = DenseLayer::reconstitute_from(&mut store)
                .map_err(|e| Error::Format(format!("layer {i} invalid: {e}")))?;
            layers.push(layer);
        }
        LayerStack::from_layers(name, layers).map_err(as_format_error)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::reconstitute(bytes)
    }
}

#[cfg(feature = "serde")]
impl<F: Element + Serialize + DeserializeOwned> DenseLayer<F> {
    /// Serialize the layer to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&SerializedLayer::from(self))
            .map_err(|e| Error::Format(format!("failed to serialize layer: {e}")))
    }

    /// Serialize the layer to a compact JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(&SerializedLayer::from(self))
            .map_err(|e| Error::Format(format!("failed to serialize layer: {e}")))
    }

    /// Parse a layer from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedLayer<F> = serde_json::from_str(s)
            .map_err(|e| Error::Format(format!("failed to parse layer json: {e}")))?;
        ser.try_into()
    }

    /// Save the layer to a JSON file (pretty-printed).
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        std::fs::write(path.as_ref(), s)?;
        Ok(())
    }

    /// Load a layer from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&s)
    }
}

#[cfg(feature = "serde")]
impl<F: Element + Serialize + DeserializeOwned> LayerStack<F> {
    pub fn to_json_string_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&SerializedStack::from(self))
            .map_err(|e| Error::Format(format!("failed to serialize stack: {e}")))
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedStack<F> = serde_json::from_str(s)
            .map_err(|e| Error::Format(format!("failed to parse stack json: {e}")))?;
        ser.try_into()
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        std::fs::write(path.as_ref(), s)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&s)
    }
}
