//! Decimal codec for `confluent.type.Decimal`.
//!
//! The unscaled value is stored as a minimal big-endian two's-complement byte
//! string, next to the precision (number of unscaled digits) and the scale.

use crate::error::{ConversionError, Result};
use rust_decimal::Decimal;

/// Wire components of a decimal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalParts {
    pub value: Vec<u8>,
    pub precision: u32,
    pub scale: i32,
}

pub fn encode(decimal: &Decimal) -> DecimalParts {
    let unscaled = decimal.mantissa();
    DecimalParts {
        value: to_twos_complement(unscaled),
        precision: digit_count(unscaled),
        scale: decimal.scale() as i32,
    }
}

pub fn decode(value: &[u8], scale: i32) -> Result<Decimal> {
    let mut unscaled = from_twos_complement(value)?;
    let mut scale = scale;
    // Negative scales are legal on the wire but not in rust_decimal.
    while scale < 0 {
        unscaled = unscaled
            .checked_mul(10)
            .ok_or_else(|| ConversionError::InvalidDecimal("value out of range".to_string()))?;
        scale += 1;
    }
    Decimal::try_from_i128_with_scale(unscaled, scale as u32)
        .map_err(|e| ConversionError::InvalidDecimal(e.to_string()))
}

fn digit_count(unscaled: i128) -> u32 {
    let mut n = unscaled.unsigned_abs();
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

fn to_twos_complement(unscaled: i128) -> Vec<u8> {
    let bytes = unscaled.to_be_bytes();
    let mut start = 0;
    // Drop sign-extension bytes as long as the next byte keeps the sign bit.
    while start < bytes.len() - 1 {
        let (current, next) = (bytes[start], bytes[start + 1]);
        let redundant = (current == 0x00 && next & 0x80 == 0) || (current == 0xFF && next & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

fn from_twos_complement(bytes: &[u8]) -> Result<i128> {
    if bytes.len() > 16 {
        return Err(ConversionError::InvalidDecimal(format!(
            "unscaled value of {} bytes does not fit in 128 bits",
            bytes.len()
        )));
    }
    let Some(first) = bytes.first() else {
        return Ok(0);
    };
    let fill = if first & 0x80 != 0 { 0xFF } else { 0x00 };
    let mut buf = [fill; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    Ok(i128::from_be_bytes(buf))
}
