//! Analog payloads and their conversion to `f32` samples.
//!
//! Devices deliver analog data in their native encoding: integers of 1, 2, 4
//! or 8 bytes, or IEEE floats of 4 or 8 bytes, in either byte order, followed
//! by a rational scale and offset. [`to_float`] turns such a payload into the
//! host-order `f32` samples that end up in `analog-1-<n>-<k>` chunk files.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while converting an analog payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// The encoding uses a sample width this converter does not handle
    #[error("Unsupported analog encoding: unit size {unit_size}, float {is_float}")]
    UnsupportedEncoding {
        /// Bytes per sample
        unit_size: usize,
        /// Whether samples are floating point
        is_float: bool,
    },

    /// The payload holds fewer bytes than `num_samples * unit_size`
    #[error("Analog payload too short: need {expected} bytes, got {actual}")]
    ShortPayload {
        /// Bytes required by the sample count
        expected: usize,
        /// Bytes present
        actual: usize,
    },

    /// `num_samples * unit_size` does not fit in memory
    #[error("Analog sample count {num_samples} of {unit_size} bytes overflows")]
    SampleCountOverflow {
        /// Sample count declared by the payload
        num_samples: usize,
        /// Bytes per sample
        unit_size: usize,
    },

    /// A rational with a zero denominator
    #[error("Invalid {field}: denominator is zero")]
    ZeroDenominator {
        /// Which rational was invalid
        field: &'static str,
    },
}

/// Rational number `p / q`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    /// Numerator
    pub p: i64,
    /// Denominator
    pub q: u64,
}

impl Rational {
    /// Rational from numerator and denominator
    pub const fn new(p: i64, q: u64) -> Self {
        Self { p, q }
    }

    /// The value one
    pub const ONE: Rational = Rational::new(1, 1);

    /// The value zero
    pub const ZERO: Rational = Rational::new(0, 1);

    fn to_f64(self, field: &'static str) -> Result<f64, ConversionError> {
        if self.q == 0 {
            return Err(ConversionError::ZeroDenominator { field });
        }
        Ok(self.p as f64 / self.q as f64)
    }
}

/// Native encoding of analog samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalogEncoding {
    /// Bytes per sample
    pub unit_size: usize,
    /// Signed integer samples (ignored for floats)
    pub is_signed: bool,
    /// IEEE floating point samples
    pub is_float: bool,
    /// Big-endian byte order
    pub is_bigendian: bool,
    /// Multiplier applied to every raw value
    pub scale: Rational,
    /// Offset added after scaling
    pub offset: Rational,
}

impl AnalogEncoding {
    /// Host-order `f32` samples with unit scale
    pub const fn native_f32() -> Self {
        Self {
            unit_size: 4,
            is_signed: true,
            is_float: true,
            is_bigendian: cfg!(target_endian = "big"),
            scale: Rational::ONE,
            offset: Rational::ZERO,
        }
    }

    /// Integer samples of the given width, little-endian, unit scale
    pub const fn integer(unit_size: usize, is_signed: bool) -> Self {
        Self {
            unit_size,
            is_signed,
            is_float: false,
            is_bigendian: false,
            scale: Rational::ONE,
            offset: Rational::ZERO,
        }
    }

    /// Set big-endian byte order
    pub const fn big_endian(mut self) -> Self {
        self.is_bigendian = true;
        self
    }

    /// Set scale and offset
    pub const fn scaled(mut self, scale: Rational, offset: Rational) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    fn is_native_f32(&self) -> bool {
        self.is_float
            && self.unit_size == 4
            && self.is_bigendian == cfg!(target_endian = "big")
            && self.scale == Rational::ONE
            && self.offset == Rational::ZERO
    }
}

/// Analog data for a set of channels, as delivered by the device
#[derive(Debug, Clone, PartialEq)]
pub struct AnalogPayload {
    /// Global indices of the channels the samples belong to
    pub channels: Vec<usize>,
    /// Number of samples in `data`
    pub num_samples: usize,
    /// Raw sample bytes
    pub data: Vec<u8>,
    /// Encoding of `data`
    pub encoding: AnalogEncoding,
}

impl AnalogPayload {
    /// Single-channel payload of host-order `f32` samples
    pub fn from_f32(channel: usize, samples: &[f32]) -> Self {
        Self {
            channels: vec![channel],
            num_samples: samples.len(),
            data: bytemuck::cast_slice(samples).to_vec(),
            encoding: AnalogEncoding::native_f32(),
        }
    }

    /// Single-channel payload in an arbitrary encoding
    pub fn raw(channel: usize, num_samples: usize, data: Vec<u8>, encoding: AnalogEncoding) -> Self {
        Self {
            channels: vec![channel],
            num_samples,
            data,
            encoding,
        }
    }
}

/// Convert an analog payload to host-order `f32` samples
pub fn to_float(payload: &AnalogPayload) -> Result<Vec<f32>, ConversionError> {
    let enc = &payload.encoding;
    let width = enc.unit_size;
    let supported = if enc.is_float {
        matches!(width, 4 | 8)
    } else {
        matches!(width, 1 | 2 | 4 | 8)
    };
    if !supported {
        return Err(ConversionError::UnsupportedEncoding {
            unit_size: width,
            is_float: enc.is_float,
        });
    }

    let expected = payload.num_samples.checked_mul(width).ok_or(
        ConversionError::SampleCountOverflow {
            num_samples: payload.num_samples,
            unit_size: width,
        },
    )?;
    if payload.data.len() < expected {
        return Err(ConversionError::ShortPayload {
            expected,
            actual: payload.data.len(),
        });
    }
    let data = &payload.data[..expected];

    if enc.is_native_f32() {
        return Ok(data
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect());
    }

    let scale = enc.scale.to_f64("scale")?;
    let offset = enc.offset.to_f64("offset")?;

    Ok(data
        .chunks_exact(width)
        .map(|bytes| (decode(bytes, enc) * scale + offset) as f32)
        .collect())
}

fn decode(bytes: &[u8], enc: &AnalogEncoding) -> f64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    if enc.is_bigendian {
        buf[..bytes.len()].reverse();
    }
    // buf now holds the value little-endian in its low bytes
    let raw = u64::from_le_bytes(buf);

    if enc.is_float {
        return match bytes.len() {
            4 => f32::from_bits(raw as u32) as f64,
            _ => f64::from_bits(raw),
        };
    }

    if enc.is_signed {
        let shift = 64 - 8 * bytes.len() as u32;
        (((raw << shift) as i64) >> shift) as f64
    } else {
        raw as f64
    }
}
