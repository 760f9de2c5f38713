//! Bounded-range value compressors.
//!
//! A compressor maps a numeric range onto the smallest fixed-width integer
//! that can represent it, so that a position in `[0, 100]` at one decimal of
//! precision travels in 10 bits instead of 32.

use crate::error::WireError;
use crate::wire::WireBuffer;

/// Number of bits needed to hold every value in `0..=max_level`.
fn bits_for(max_level: u64) -> u32 {
    64 - max_level.leading_zeros()
}

/// Quantizes floats in `[min, max]` to a fixed number of decimal places.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatCompressor {
    min: f32,
    max: f32,
    scale: f64,
    max_level: u64,
    bits: u32,
}

impl FloatCompressor {
    /// # Panics
    ///
    /// Panics if `min > max`, either bound is not finite, or the range at the
    /// requested precision needs more than 64 bits.
    pub fn new(min: f32, max: f32, precision: u32) -> Self {
        assert!(
            min.is_finite() && max.is_finite() && min <= max,
            "invalid float range [{min}, {max}]"
        );
        let scale = 10f64.powi(precision as i32);
        let span = (max as f64 - min as f64) * scale;
        assert!(span < u64::MAX as f64, "float range too wide for precision {precision}");

        let max_level = span.round() as u64;
        Self {
            min,
            max,
            scale,
            max_level,
            bits: bits_for(max_level),
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Largest error a compress/decompress round trip can introduce.
    pub fn max_error(&self) -> f32 {
        (0.5 / self.scale) as f32
    }

    /// Clamps `value` to the range and returns its quantization level.
    /// NaN compresses to the lower bound.
    pub fn compress(&self, value: f32) -> u64 {
        if value.is_nan() {
            return 0;
        }
        let clamped = value.clamp(self.min, self.max) as f64;
        let level = ((clamped - self.min as f64) * self.scale).round() as u64;
        level.min(self.max_level)
    }

    pub fn decompress(&self, level: u64) -> f32 {
        let level = level.min(self.max_level);
        (self.min as f64 + level as f64 / self.scale) as f32
    }

    pub fn write(&self, buffer: &mut WireBuffer, value: f32) {
        buffer.write_bits(self.compress(value), self.bits);
    }

    pub fn read(&self, buffer: &mut WireBuffer) -> Result<f32, WireError> {
        let level = buffer.read_bits(self.bits)?;
        if level > self.max_level {
            return Err(WireError::InvalidValue(format!(
                "float level {level} exceeds {}",
                self.max_level
            )));
        }
        Ok(self.decompress(level))
    }
}

/// Lossless offset encoding for integers in `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntCompressor {
    min: i64,
    max: i64,
    bits: u32,
}

impl IntCompressor {
    /// # Panics
    ///
    /// Panics if `min > max`.
    pub fn new(min: i64, max: i64) -> Self {
        assert!(min <= max, "invalid integer range [{min}, {max}]");
        let range = max.wrapping_sub(min) as u64;
        Self {
            min,
            max,
            bits: bits_for(range),
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Values outside `[min, max]` are a caller error.
    pub fn compress(&self, value: i64) -> u64 {
        debug_assert!(
            (self.min..=self.max).contains(&value),
            "{value} outside [{}, {}]",
            self.min,
            self.max
        );
        value.wrapping_sub(self.min) as u64
    }

    pub fn decompress(&self, level: u64) -> i64 {
        self.min.wrapping_add(level as i64)
    }

    pub fn write(&self, buffer: &mut WireBuffer, value: i64) {
        buffer.write_bits(self.compress(value), self.bits);
    }

    pub fn read(&self, buffer: &mut WireBuffer) -> Result<i64, WireError> {
        let value = self.decompress(buffer.read_bits(self.bits)?);
        if !(self.min..=self.max).contains(&value) {
            return Err(WireError::InvalidValue(format!(
                "integer {value} outside [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(value)
    }
}
