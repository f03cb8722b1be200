//! Predicate evaluation: scan predicates compare a freshly observed value
//! against a needle; narrow predicates additionally compare against a
//! candidate's previously stored value.

use crate::error::{Error, Result};
use crate::value::{Needle, Value, ValidityFlags};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    One,
    Two,
    Four,
    Eight,
}

/// The widest width the needle's flags advertise, per §4.5's cascade:
/// `i64`/`f64` first, else `i32`/`f32`, else `i16`, else `i8`.
fn widest_width(flags: ValidityFlags) -> Width {
    if flags.intersects(ValidityFlags::I64 | ValidityFlags::F64) {
        Width::Eight
    } else if flags.intersects(ValidityFlags::I32 | ValidityFlags::F32) {
        Width::Four
    } else if flags.contains(ValidityFlags::I16) {
        Width::Two
    } else {
        Width::One
    }
}

fn int_flag_for(width: Width) -> ValidityFlags {
    match width {
        Width::One => ValidityFlags::I8,
        Width::Two => ValidityFlags::I16,
        Width::Four => ValidityFlags::I32,
        Width::Eight => ValidityFlags::I64,
    }
}

fn float_flag_for(width: Width) -> Option<ValidityFlags> {
    match width {
        Width::Four => Some(ValidityFlags::F32),
        Width::Eight => Some(ValidityFlags::F64),
        _ => None,
    }
}

/// Low `width` bytes of the payload, zero-extended to 64 bits.
fn truncated_bits(v: &Value, width: Width) -> u64 {
    let raw = v.u64();
    match width {
        Width::One => raw & 0xff,
        Width::Two => raw & 0xffff,
        Width::Four => raw & 0xffff_ffff,
        Width::Eight => raw,
    }
}

fn sign_extend(bits: u64, width: Width) -> i64 {
    match width {
        Width::One => bits as u8 as i8 as i64,
        Width::Two => bits as u16 as i16 as i64,
        Width::Four => bits as u32 as i32 as i64,
        Width::Eight => bits as i64,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ordering {
    Lt,
    Le,
    Gt,
    Ge,
}

fn int_order_holds(ord: Ordering, a: i128, b: i128) -> bool {
    match ord {
        Ordering::Lt => a < b,
        Ordering::Le => a <= b,
        Ordering::Gt => a > b,
        Ordering::Ge => a >= b,
    }
}

/// Compares `candidate` against `needle` at the needle's widest advertised
/// width. Integer orderings test both the signed and unsigned
/// interpretation of the width and succeed if either holds.
fn compare(candidate: &Value, needle: &Needle, ord: Ordering) -> bool {
    eval_at_width(candidate, needle, widest_width(needle.flags), |c_u, c_i, n_u, n_i| {
        int_order_holds(ord, c_u as i128, n_u as i128) || int_order_holds(ord, c_i as i128, n_i as i128)
    }, |c_f, n_f| match ord {
        Ordering::Lt => c_f < n_f,
        Ordering::Le => c_f <= n_f,
        Ordering::Gt => c_f > n_f,
        Ordering::Ge => c_f >= n_f,
    })
}

/// Equality tries the needle's widest advertised width first, the same as
/// `compare`, but then falls back to narrower widths. A needle whose upper
/// bytes are just zero padding from parsing (e.g. a literal that only needed
/// five significant bytes) should still hit a candidate whose narrower
/// reading matches exactly, even though the full 8-byte patterns differ.
fn equal(candidate: &Value, needle: &Needle) -> bool {
    let widest = widest_width(needle.flags);
    if float_flag_for(widest).is_some_and(|f| needle.flags.contains(f))
        && !needle.flags.contains(int_flag_for(widest))
    {
        return float_at(candidate, widest) == float_at(needle, widest);
    }
    for width in [Width::Eight, Width::Four, Width::Two, Width::One] {
        if truncated_bits(candidate, width) == truncated_bits(needle, width) {
            return true;
        }
    }
    false
}

fn float_at(v: &Value, width: Width) -> f64 {
    match width {
        Width::Eight => v.f64(),
        Width::Four => v.f32() as f64,
        _ => unreachable!("no 1/2-byte float width"),
    }
}

fn eval_at_width(
    candidate: &Value,
    needle: &Needle,
    width: Width,
    int_eval: impl Fn(u64, i64, u64, i64) -> bool,
    float_eval: impl Fn(f64, f64) -> bool,
) -> bool {
    if let Some(ff) = float_flag_for(width) {
        if needle.flags.contains(ff) && !needle.flags.contains(int_flag_for(width)) {
            return float_eval(float_at(candidate, width), float_at(needle, width));
        }
    }
    let c_u = truncated_bits(candidate, width);
    let c_i = sign_extend(c_u, width);
    let n_u = truncated_bits(needle, width);
    let n_i = sign_extend(n_u, width);
    int_eval(c_u, c_i, n_u, n_i)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeForm {
    GtLt,
    GeLt,
    GtLe,
    GeLe,
}

impl RangeForm {
    fn from_flag(flag: u8) -> Result<Self> {
        match flag {
            0 => Ok(RangeForm::GtLt),
            1 => Ok(RangeForm::GeLt),
            2 => Ok(RangeForm::GtLe),
            3 => Ok(RangeForm::GeLe),
            _ => Err(Error::InvalidRangeFlag),
        }
    }
}

/// Predicates driving a scan pass (§4.5). Dispatch always happens on the
/// needle's flags, at the widest width it advertises.
#[derive(Clone, Debug)]
pub enum ScanPredicate {
    Eq(Needle),
    Ne(Needle),
    Lt(Needle),
    Le(Needle),
    Gt(Needle),
    Ge(Needle),
    Range {
        lower: Needle,
        upper: Needle,
        form: RangeForm,
    },
}

impl ScanPredicate {
    pub fn range(lower: Needle, upper: Needle, flag: u8) -> Result<Self> {
        Ok(ScanPredicate::Range {
            lower,
            upper,
            form: RangeForm::from_flag(flag)?,
        })
    }

    pub fn eval(&self, candidate: &Value) -> bool {
        match self {
            ScanPredicate::Eq(n) => equal(candidate, n),
            ScanPredicate::Ne(n) => !equal(candidate, n),
            ScanPredicate::Lt(n) => compare(candidate, n, Ordering::Lt),
            ScanPredicate::Le(n) => compare(candidate, n, Ordering::Le),
            ScanPredicate::Gt(n) => compare(candidate, n, Ordering::Gt),
            ScanPredicate::Ge(n) => compare(candidate, n, Ordering::Ge),
            ScanPredicate::Range { lower, upper, form } => {
                let (lower_ord, upper_ord) = match form {
                    RangeForm::GtLt => (Ordering::Gt, Ordering::Lt),
                    RangeForm::GeLt => (Ordering::Ge, Ordering::Lt),
                    RangeForm::GtLe => (Ordering::Gt, Ordering::Le),
                    RangeForm::GeLe => (Ordering::Ge, Ordering::Le),
                };
                compare(candidate, lower, lower_ord) && compare(candidate, upper, upper_ord)
            }
        }
    }
}

/// Predicates driving a narrow pass (§4.6): either a scan-style needle
/// comparison against the freshly read value, or a stateful comparison
/// against the candidate's previously stored value.
#[derive(Clone, Debug)]
pub enum NarrowPredicate {
    Scan(ScanPredicate),
    Changed,
    Unchanged,
    Increased,
    Decreased,
}

impl NarrowPredicate {
    /// `stored` is the candidate's value as of the last pass; `fresh` is
    /// what was just read.
    pub fn eval(&self, stored: &Value, fresh: &Value) -> bool {
        match self {
            NarrowPredicate::Scan(p) => p.eval(fresh),
            NarrowPredicate::Changed => !raw_equal_over_stored_width(stored, fresh),
            NarrowPredicate::Unchanged => raw_equal_over_stored_width(stored, fresh),
            NarrowPredicate::Increased => any_width_holds(stored, fresh, Ordering::Gt),
            NarrowPredicate::Decreased => any_width_holds(stored, fresh, Ordering::Lt),
        }
    }
}

fn widths_present(flags: ValidityFlags) -> Vec<Width> {
    let mut out = Vec::new();
    if flags.contains(ValidityFlags::I8) {
        out.push(Width::One);
    }
    if flags.contains(ValidityFlags::I16) {
        out.push(Width::Two);
    }
    if flags.contains(ValidityFlags::I32) {
        out.push(Width::Four);
    }
    if flags.contains(ValidityFlags::I64) {
        out.push(Width::Eight);
    }
    out
}

fn widest_present(flags: ValidityFlags) -> Width {
    widths_present(flags).into_iter().last().unwrap_or(Width::One)
}

fn raw_equal_over_stored_width(stored: &Value, fresh: &Value) -> bool {
    let width = widest_present(stored.flags);
    truncated_bits(stored, width) == truncated_bits(fresh, width)
}

/// Tries every width the stored entry carries, narrowest first, and
/// succeeds as soon as one of them satisfies `ord` — so an 8-byte
/// candidate that only decreased when viewed as `i8` still counts.
fn any_width_holds(stored: &Value, fresh: &Value, ord: Ordering) -> bool {
    for width in widths_present(stored.flags) {
        let old = sign_extend(truncated_bits(stored, width), width);
        let new = sign_extend(truncated_bits(fresh, width), width);
        let holds = match ord {
            Ordering::Gt => new > old,
            Ordering::Lt => new < old,
            _ => unreachable!(),
        };
        if holds {
            return true;
        }
    }
    false
}
