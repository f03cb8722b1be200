//! Tagged 8-byte value model. A single payload viewed through six lenses,
//! with a validity-flag set telling which lenses are meaningful.

use crate::error::{Error, Result};
use std::convert::TryInto;

bitflags::bitflags! {
    /// Which widths/kinds a `Value`'s payload is a valid reading of.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ValidityFlags: u16 {
        const I8   = 0b0000_0001;
        const I16  = 0b0000_0010;
        const I32  = 0b0000_0100;
        const I64  = 0b0000_1000;
        const F32  = 0b0001_0000;
        const F64  = 0b0010_0000;
        /// Reserved for a future inequality-chain fast path; unused by any
        /// predicate in this engine today.
        const INEQ_FORWARD = 0b0100_0000;
        const INEQ_REVERSE = 0b1000_0000;
    }
}

/// An 8-byte payload plus the set of widths it can be meaningfully read as.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Value {
    bytes: [u8; 8],
    pub flags: ValidityFlags,
}

impl Value {
    /// Builds a `Value` from a window of `n` valid bytes (1..=8); bytes
    /// beyond `n` are treated as absent and zeroed, and only the width
    /// flags `n` can support are considered.
    pub fn from_window(window: &[u8], n: usize) -> Self {
        debug_assert!(n <= 8 && n <= window.len());
        let mut bytes = [0u8; 8];
        bytes[..n].copy_from_slice(&window[..n]);

        // Unlike a parsed needle, a window's flags depend only on how many
        // bytes were physically read, not on whether the value's magnitude
        // happens to fit narrower widths too.
        let mut flags = ValidityFlags::empty();
        if n >= 1 {
            flags |= ValidityFlags::I8;
        }
        if n >= 2 {
            flags |= ValidityFlags::I16;
        }
        if n >= 4 {
            flags |= ValidityFlags::I32;
            flags |= ValidityFlags::F32;
        }
        if n >= 8 {
            flags |= ValidityFlags::I64;
            flags |= ValidityFlags::F64;
        }

        Self { bytes, flags }
    }

    pub fn u8(&self) -> u8 {
        self.bytes[0]
    }
    pub fn i8(&self) -> i8 {
        self.bytes[0] as i8
    }
    pub fn u16(&self) -> u16 {
        u16::from_le_bytes(self.bytes[..2].try_into().unwrap())
    }
    pub fn i16(&self) -> i16 {
        i16::from_le_bytes(self.bytes[..2].try_into().unwrap())
    }
    pub fn u32(&self) -> u32 {
        u32::from_le_bytes(self.bytes[..4].try_into().unwrap())
    }
    pub fn i32(&self) -> i32 {
        i32::from_le_bytes(self.bytes[..4].try_into().unwrap())
    }
    pub fn u64(&self) -> u64 {
        u64::from_le_bytes(self.bytes)
    }
    pub fn i64(&self) -> i64 {
        i64::from_le_bytes(self.bytes)
    }
    pub fn f32(&self) -> f32 {
        f32::from_le_bytes(self.bytes[..4].try_into().unwrap())
    }
    pub fn f64(&self) -> f64 {
        f64::from_le_bytes(self.bytes)
    }

    pub fn raw(&self) -> [u8; 8] {
        self.bytes
    }

    /// Canonical textual form: the widest signed integer reading if the
    /// payload carries no float flags, else the `f64` reading. Exists so
    /// that `parse_needle(v.canonical_text())` round-trips (invariant 4).
    pub fn canonical_text(&self) -> String {
        if self.flags.contains(ValidityFlags::F64) && !self.flags.intersects(int_flags()) {
            format!("{}", self.f64())
        } else if self.flags.contains(ValidityFlags::I64) {
            format!("{}", self.i64())
        } else if self.flags.contains(ValidityFlags::I32) {
            format!("{}", self.i32())
        } else if self.flags.contains(ValidityFlags::I16) {
            format!("{}", self.i16())
        } else if self.flags.contains(ValidityFlags::I8) {
            format!("{}", self.i8())
        } else {
            format!("{}", self.f64())
        }
    }
}

fn int_flags() -> ValidityFlags {
    ValidityFlags::I8 | ValidityFlags::I16 | ValidityFlags::I32 | ValidityFlags::I64
}

/// Does the full-width signed interpretation of `bytes` fit in a signed
/// integer of `width` bytes? Per spec: non-negative and `<= UMAX(width)`,
/// or negative and `>= IMIN(width)`.
fn fits_signed(bytes: [u8; 8], width: usize) -> bool {
    let v = i64::from_le_bytes(bytes);
    match width {
        1 => v >= i8::MIN as i64 && v <= i8::MAX as i64,
        2 => v >= i16::MIN as i64 && v <= i16::MAX as i64,
        4 => v >= i32::MIN as i64 && v <= i32::MAX as i64,
        8 => true,
        _ => unreachable!(),
    }
}

/// A `Value` parsed from a human-entered string: the integer path is tried
/// first (decimal, or `0x`/`0o`/`0b` prefixed), then the floating-point
/// path.
pub type Needle = Value;

pub fn parse_needle(text: &str) -> Result<Needle> {
    let text = text.trim();
    if let Some(v) = parse_integer_needle(text) {
        return Ok(v);
    }
    if let Some(v) = parse_float_needle(text) {
        return Ok(v);
    }
    Err(Error::NeedleParse(text.to_string()))
}

fn parse_integer_needle(text: &str) -> Option<Value> {
    let (negative, unsigned_part) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let (radix, digits) = if let Some(hex) = unsigned_part.strip_prefix("0x") {
        (16, hex)
    } else if let Some(hex) = unsigned_part.strip_prefix("0X") {
        (16, hex)
    } else if let Some(bin) = unsigned_part.strip_prefix("0b") {
        (2, bin)
    } else if let Some(oct) = unsigned_part.strip_prefix("0o") {
        (8, oct)
    } else if unsigned_part.len() > 1 && unsigned_part.starts_with('0') {
        (8, &unsigned_part[1..])
    } else {
        (10, unsigned_part)
    };

    if digits.is_empty() {
        return None;
    }

    let magnitude = u64::from_str_radix(digits, radix).ok()?;

    // Derive the full signed interpretation from the parsed magnitude and
    // sign, not from the low byte of the unsigned value.
    // `as i64` is a bit-for-bit reinterpretation, so the byte pattern is
    // correct even when `magnitude` exceeds `i64::MAX`.
    let signed: i64 = if negative {
        if magnitude > (i64::MAX as u64) + 1 {
            return None;
        }
        (magnitude as i64).wrapping_neg()
    } else {
        magnitude as i64
    };

    let bytes = signed.to_le_bytes();

    let mut flags = ValidityFlags::empty();
    if fits_signed(bytes, 1) {
        flags |= ValidityFlags::I8;
    }
    if fits_signed(bytes, 2) {
        flags |= ValidityFlags::I16;
    }
    if fits_signed(bytes, 4) {
        flags |= ValidityFlags::I32;
    }
    flags |= ValidityFlags::I64;

    Some(Value { bytes, flags })
}

fn parse_float_needle(text: &str) -> Option<Value> {
    let as_f64: f64 = text.parse().ok()?;

    let mut flags = ValidityFlags::F64;
    // f32 is set only when the single-precision parse consumes the whole
    // string, not inferred from magnitude.
    if text.parse::<f32>().is_ok() {
        flags |= ValidityFlags::F32;
    }

    Some(Value {
        bytes: as_f64.to_le_bytes(),
        flags,
    })
}
