//! Scalar values manipulated by rule programs.
//!
//! A [`Value`] is `Null`, a 32-bit signed integer or a 32-bit float.  Variable
//! slots keep values in packed form ([`PackedValue`]): a one-byte kind tag and
//! one 32-bit word.  Floats are stored through `f32::to_bits`, so arithmetic
//! always runs on the decoded float.
//!
//! ```text
//!   Value::Float(21.5) ──pack──▶ { tag: 2, raw: 0x41AC_0000 } ──unpack──▶ Value::Float(21.5)
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════
//  Value
// ═══════════════════════════════════════════════════════════════

/// A rule-visible scalar.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Integer(i32),
    Float(f32),
}

/// Discriminant of a [`Value`], also used as the on-slot tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueKind {
    Null = 0,
    Integer = 1,
    Float = 2,
}

impl ValueKind {
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Decode a slot tag.  Unknown tags mean the slot is corrupt.
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Null),
            1 => Some(Self::Integer),
            2 => Some(Self::Float),
            _ => None,
        }
    }
}

/// Integer-width storage form of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedValue {
    pub tag: u8,
    pub raw: u32,
}

impl PackedValue {
    /// Decode the slot.  Returns `None` when the tag is not a known kind.
    pub fn unpack(self) -> Option<Value> {
        Some(match ValueKind::from_tag(self.tag)? {
            ValueKind::Null => Value::Null,
            ValueKind::Integer => Value::Integer(self.raw as i32),
            ValueKind::Float => Value::Float(f32::from_bits(self.raw)),
        })
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

/// Comparison operators.  Results are `Integer(1)` or `Integer(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Value {
    pub fn kind(self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Integer(_) => ValueKind::Integer,
            Self::Float(_) => ValueKind::Float,
        }
    }

    pub fn pack(self) -> PackedValue {
        let raw = match self {
            Self::Null => 0,
            Self::Integer(i) => i as u32,
            Self::Float(f) => f.to_bits(),
        };
        PackedValue {
            tag: self.kind().tag(),
            raw,
        }
    }

    pub fn is_null(self) -> bool {
        matches!(self, Self::Null)
    }

    /// Wrap a float result.  NaN and infinities collapse to `Null`.
    pub fn from_float(f: f32) -> Self {
        if f.is_finite() { Self::Float(f) } else { Self::Null }
    }

    pub fn as_f32(self) -> Option<f32> {
        match self {
            Self::Null => None,
            Self::Integer(i) => Some(i as f32),
            Self::Float(f) => Some(f),
        }
    }

    pub fn as_integer(self) -> Option<i32> {
        match self {
            Self::Integer(i) => Some(i),
            _ => None,
        }
    }

    /// Condition truthiness: `Null` and zero are false.
    pub fn truthy(self) -> bool {
        match self {
            Self::Null => false,
            Self::Integer(i) => i != 0,
            Self::Float(f) => f != 0.0,
        }
    }

    /// Parse a telemetry string.
    ///
    /// Empty or unparsable text is `Null`; integral numbers become `Integer`,
    /// everything else `Float`.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return Self::Null;
        }
        if let Ok(i) = text.parse::<i32>() {
            return Self::Integer(i);
        }
        match text.parse::<f32>() {
            Ok(f) if f.is_finite() => {
                if f.fract() == 0.0 && f >= i32::MIN as f32 && f < i32::MAX as f32 {
                    Self::Integer(f as i32)
                } else {
                    Self::Float(f)
                }
            }
            _ => Self::Null,
        }
    }

    /// Apply an arithmetic operator.  Any `Null` operand, a zero divisor or
    /// a non-finite float result yields `Null`.
    pub fn arith(self, op: Arith, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Null, _) | (_, Self::Null) => Self::Null,
            (Self::Integer(a), Self::Integer(b)) => int_arith(op, a, b),
            (a, b) => {
                let (Some(a), Some(b)) = (a.as_f32(), b.as_f32()) else {
                    return Self::Null;
                };
                float_arith(op, a, b)
            }
        }
    }

    pub fn compare(self, op: Compare, rhs: Self) -> Self {
        let result = match (self, rhs) {
            (Self::Null, Self::Null) => op == Compare::Eq,
            (Self::Null, _) | (_, Self::Null) => op == Compare::Ne,
            (Self::Integer(a), Self::Integer(b)) => ordered(op, a.cmp(&b)),
            (a, b) => match (a.as_f32(), b.as_f32()) {
                (Some(a), Some(b)) => a
                    .partial_cmp(&b)
                    .is_some_and(|ord| ordered(op, ord)),
                _ => false,
            },
        };
        Self::Integer(i32::from(result))
    }

    pub fn negate(self) -> Self {
        match self {
            Self::Null => Self::Null,
            Self::Integer(i) => Self::Integer(i.wrapping_neg()),
            Self::Float(f) => Self::Float(-f),
        }
    }
}

fn int_arith(op: Arith, a: i32, b: i32) -> Value {
    match op {
        Arith::Add => Value::Integer(a.wrapping_add(b)),
        Arith::Sub => Value::Integer(a.wrapping_sub(b)),
        Arith::Mul => Value::Integer(a.wrapping_mul(b)),
        Arith::Div => {
            if b == 0 {
                Value::Null
            } else if a.wrapping_rem(b) == 0 {
                Value::Integer(a.wrapping_div(b))
            } else {
                Value::from_float(a as f32 / b as f32)
            }
        }
        Arith::Rem => {
            if b == 0 {
                Value::Null
            } else {
                Value::Integer(a.wrapping_rem(b))
            }
        }
        Arith::Pow => match u32::try_from(b) {
            Ok(exp) => Value::Integer(a.wrapping_pow(exp)),
            Err(_) => Value::from_float((a as f32).powi(b)),
        },
    }
}

fn float_arith(op: Arith, a: f32, b: f32) -> Value {
    let result = match op {
        Arith::Add => a + b,
        Arith::Sub => a - b,
        Arith::Mul => a * b,
        Arith::Div | Arith::Rem if b == 0.0 => return Value::Null,
        Arith::Div => a / b,
        Arith::Rem => a % b,
        Arith::Pow => a.powf(b),
    };
    Value::from_float(result)
}

fn ordered(op: Compare, ord: core::cmp::Ordering) -> bool {
    use core::cmp::Ordering::{Equal, Greater, Less};
    match op {
        Compare::Eq => ord == Equal,
        Compare::Ne => ord != Equal,
        Compare::Lt => ord == Less,
        Compare::Le => ord != Greater,
        Compare::Gt => ord == Greater,
        Compare::Ge => ord != Less,
    }
}

// ── Text rendering ────────────────────────────────────────────

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&format_g(*x)),
        }
    }
}

/// Render a float the way C's `%g` does (six significant digits, trailing
/// zeros removed, exponent form outside `1e-4 ..= 1e6`).
pub fn format_g(x: f32) -> String {
    if x == 0.0 {
        return "0".into();
    }
    if !x.is_finite() {
        return if x.is_nan() { "nan".into() } else if x > 0.0 { "inf".into() } else { "-inf".into() };
    }

    let x = f64::from(x);
    let sci = format!("{x:.5e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);

    if !(-4..6).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exp.unsigned_abs())
    } else {
        let decimals = (5 - exp).max(0) as usize;
        trim_fraction(&format!("{x:.decimals$}")).to_owned()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
