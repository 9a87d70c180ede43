//! Tagged binary store.
//!
//! A minimal byte-oriented sink/source. Every value is written as a one-byte type
//! tag followed by its little-endian payload, so a reader that gets out of step
//! with the writer fails on the next tag instead of silently misinterpreting bytes.
//!
//! Layout per value:
//!
//! - `u8` / `u32` / `u64` / `f32`: tag, payload
//! - string: tag, `u64` byte length, UTF-8 bytes
//! - array: tag, element tag, `u64` element count, elements

use std::io::{self, Read, Write};

use crate::{Element, ElementKind, Error, Result};

const TAG_U8: u8 = 0x01;
const TAG_U32: u8 = 0x02;
const TAG_U64: u8 = 0x03;
const TAG_F32: u8 = 0x04;
const TAG_STR: u8 = 0x05;
const TAG_ARRAY: u8 = 0x06;

/// Upper bound on a stored string, to keep corrupt lengths from allocating.
const MAX_STR_LEN: u64 = 1 << 20;

/// Elements reserved up front when reading an array; the rest grows as data
/// actually arrives, so a corrupt length fails on truncation instead of OOM.
const ARRAY_RESERVE: usize = 1 << 16;

fn tag_name(tag: u8) -> &'static str {
    match tag {
        TAG_U8 => "u8",
        TAG_U32 => "u32",
        TAG_U64 => "u64",
        TAG_F32 => "f32",
        TAG_STR => "string",
        TAG_ARRAY => "array",
        _ => "unknown",
    }
}

pub struct StoreWriter<W> {
    inner: W,
}

impl<W: Write> StoreWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.inner.write_all(&[TAG_U8, value])?;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.inner.write_all(&[TAG_U32])?;
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.inner.write_all(&[TAG_U64])?;
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.inner.write_all(&[TAG_F32])?;
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.inner.write_all(&[TAG_STR])?;
        self.inner.write_all(&(value.len() as u64).to_le_bytes())?;
        self.inner.write_all(value.as_bytes())?;
        Ok(())
    }

    pub fn write_array<F: Element>(&mut self, values: &[F]) -> Result<()> {
        self.inner.write_all(&[TAG_ARRAY, F::KIND.tag()])?;
        self.inner.write_all(&(values.len() as u64).to_le_bytes())?;
        for &v in values {
            v.write_le(&mut self.inner)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

pub struct StoreReader<R> {
    inner: R,
}

impl<R: Read> StoreReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.expect_tag(TAG_U8)?;
        self.raw_u8()
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.expect_tag(TAG_U32)?;
        let mut buf = [0u8; 4];
        self.raw(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.expect_tag(TAG_U64)?;
        self.raw_u64()
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.expect_tag(TAG_F32)?;
        let mut buf = [0u8; 4];
        self.raw(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }

    pub fn read_str(&mut self) -> Result<String> {
        self.expect_tag(TAG_STR)?;
        let len = self.raw_u64()?;
        if len > MAX_STR_LEN {
            return Err(Error::Format(format!(
                "string length {len} exceeds limit {MAX_STR_LEN}"
            )));
        }
        let mut bytes = vec![0u8; len as usize];
        self.raw(&mut bytes)?;
        String::from_utf8(bytes).map_err(|e| Error::Format(format!("invalid utf-8 string: {e}")))
    }

    /// Read an array of `F`. Fails if the stored element type is not `F`.
    pub fn read_array<F: Element>(&mut self) -> Result<Vec<F>> {
        self.expect_tag(TAG_ARRAY)?;
        let kind_tag = self.raw_u8()?;
        let kind = ElementKind::from_tag(kind_tag)
            .ok_or_else(|| Error::Format(format!("unknown element tag {kind_tag}")))?;
        if kind != F::KIND {
            return Err(Error::Format(format!(
                "array holds {} elements, expected {}",
                kind.name(),
                F::KIND.name()
            )));
        }

        let len = usize::try_from(self.raw_u64()?)
            .map_err(|_| Error::Format("array length does not fit in memory".to_owned()))?;
        let mut values = Vec::with_capacity(len.min(ARRAY_RESERVE));
        for _ in 0..len {
            values.push(F::read_le(&mut self.inner).map_err(io_to_format)?);
        }
        Ok(values)
    }

    fn expect_tag(&mut self, expected: u8) -> Result<()> {
        let tag = self.raw_u8()?;
        if tag != expected {
            return Err(Error::Format(format!(
                "expected {} (tag {expected:#04x}), found {} (tag {tag:#04x})",
                tag_name(expected),
                tag_name(tag)
            )));
        }
        Ok(())
    }

    fn raw_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.raw(&mut buf)?;
        Ok(buf[0])
    }

    fn raw_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.raw(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn raw(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(io_to_format)
    }
}

fn io_to_format(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Format("unexpected end of data".to_owned())
    } else {
        Error::Format(format!("read failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_roundtrip() {
        let mut w = StoreWriter::new(Vec::new());
        w.write_u8(7).unwrap();
        w.write_u32(0xdead_beef).unwrap();
        w.write_u64(u64::MAX - 1).unwrap();
        w.write_f32(-0.0).unwrap();
        w.write_str("layer").unwrap();
        w.write_array(&[1.5_f64, f64::MIN_POSITIVE]).unwrap();
        let bytes = w.into_inner();

        let mut r = StoreReader::new(bytes.as_slice());
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.read_u64().unwrap(), u64::MAX - 1);
        assert_eq!(r.read_f32().unwrap().to_bits(), (-0.0_f32).to_bits());
        assert_eq!(r.read_str().unwrap(), "layer");
        assert_eq!(
            r.read_array::<f64>().unwrap(),
            vec![1.5, f64::MIN_POSITIVE]
        );
    }

    #[test]
    fn mismatched_tag_is_a_format_error() {
        let mut w = StoreWriter::new(Vec::new());
        w.write_u32(1).unwrap();
        let bytes = w.into_inner();

        let err = StoreReader::new(bytes.as_slice()).read_u64().unwrap_err();
        assert!(matches!(err, Error::Format(_)));
        assert!(format!("{err}").contains("expected u64"));
    }

    #[test]
    fn wrong_element_type_is_rejected() {
        let mut w = StoreWriter::new(Vec::new());
        w.write_array(&[1.0_f32, 2.0]).unwrap();
        let bytes = w.into_inner();

        let err = StoreReader::new(bytes.as_slice())
            .read_array::<f64>()
            .unwrap_err();
        assert!(format!("{err}").contains("f32"));
    }

    #[test]
    fn truncated_array_is_a_format_error() {
        let mut w = StoreWriter::new(Vec::new());
        w.write_array(&[1.0_f32, 2.0, 3.0]).unwrap();
        let mut bytes = w.into_inner();
        bytes.truncate(bytes.len() - 2);

        let err = StoreReader::new(bytes.as_slice())
            .read_array::<f32>()
            .unwrap_err();
        assert!(format!("{err}").contains("unexpected end"));
    }

    #[test]
    fn corrupt_lengths_do_not_allocate_up_front() {
        let mut bytes = vec![TAG_ARRAY, ElementKind::F32.tag()];
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        let err = StoreReader::new(bytes.as_slice())
            .read_array::<f32>()
            .unwrap_err();
        assert!(matches!(err, Error::Format(_)));

        let mut bytes = vec![TAG_STR];
        bytes.extend_from_slice(&(MAX_STR_LEN + 1).to_le_bytes());
        assert!(StoreReader::new(bytes.as_slice()).read_str().is_err());
    }
}
