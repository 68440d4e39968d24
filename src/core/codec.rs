// src/core/codec.rs

//! Value-coercion rules registered on every session's codec registry.
//!
//! Each rule adapts one wire type to one application type in both directions, so
//! that callers can read and bind columns with the narrower or wider Rust type
//! they actually hold.

use crate::core::errors::CoercionError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Column types as they travel on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Timestamp,
    BigInt,
    Int,
    Decimal,
    Double,
}

/// Rust-side types a column can be read into or bound from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppType {
    I64,
    I32,
    Decimal,
    F32,
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireType::Timestamp => "timestamp",
            WireType::BigInt => "bigint",
            WireType::Int => "int",
            WireType::Decimal => "decimal",
            WireType::Double => "double",
        };
        f.write_str(name)
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppType::I64 => "i64",
            AppType::I32 => "i32",
            AppType::Decimal => "Decimal",
            AppType::F32 => "f32",
        };
        f.write_str(name)
    }
}

/// An arbitrary-precision decimal as carried by the wire format: an unscaled
/// integer and a base-10 scale, `unscaled * 10^-scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    pub unscaled: i128,
    pub scale: i32,
}

impl Decimal {
    pub fn new(unscaled: i128, scale: i32) -> Self {
        Self { unscaled, scale }
    }

    /// Converts a finite double using its shortest round-trip representation.
    pub fn from_f64(value: f64) -> Result<Self, CoercionError> {
        if !value.is_finite() {
            return Err(CoercionError::NotFinite);
        }
        let mut buffer = ryu::Buffer::new();
        buffer.format_finite(value).parse()
    }

    /// The nearest double. Saturates to infinity or zero for extreme scales.
    pub fn to_f64(&self) -> f64 {
        // Scientific notation stays short whatever the scale, and the float parser
        // rounds it correctly.
        self.scientific().parse().unwrap_or(f64::NAN)
    }

    /// Truncates toward zero.
    pub fn to_i64(&self) -> Result<i64, CoercionError> {
        if self.unscaled == 0 {
            return Ok(0);
        }
        let factor = 10i128.checked_pow(self.scale.unsigned_abs());
        let truncated = if self.scale <= 0 {
            factor.and_then(|factor| self.unscaled.checked_mul(factor))
        } else {
            // A divisor beyond i128 leaves no integer part.
            Some(factor.map_or(0, |factor| self.unscaled / factor))
        };
        truncated
            .and_then(|v| i64::try_from(v).ok())
            .ok_or_else(|| CoercionError::OutOfRange {
                value: self.scientific(),
                target: "i64",
            })
    }

    /// `unscaled` and the exponent, e.g. `1E400` or `-25E-1`.
    pub fn scientific(&self) -> String {
        format!("{}E{}", self.unscaled, -i64::from(self.scale))
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal::new(value as i128, 0)
    }
}

impl FromStr for Decimal {
    type Err = CoercionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoercionError::InvalidDecimal(s.to_string());
        let (mantissa, exponent) = match s.find(['e', 'E']) {
            Some(idx) => (
                &s[..idx],
                s[idx + 1..].parse::<i32>().map_err(|_| invalid())?,
            ),
            None => (s, 0),
        };
        let (negative, digits) = match mantissa.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let mut unscaled: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            unscaled = unscaled
                .checked_mul(10)
                .and_then(|v| v.checked_add((b - b'0') as i128))
                .ok_or_else(invalid)?;
        }
        let frac_len = i32::try_from(frac_part.len()).map_err(|_| invalid())?;
        let scale = frac_len.checked_sub(exponent).ok_or_else(invalid)?;
        Ok(Decimal::new(if negative { -unscaled } else { unscaled }, scale))
    }
}

/// Beyond this many padding zeros, decimals are displayed in scientific notation.
const MAX_PLAIN_SCALE: u32 = 64;

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale.unsigned_abs() > MAX_PLAIN_SCALE {
            return f.write_str(&self.scientific());
        }
        let sign = if self.unscaled < 0 { "-" } else { "" };
        let digits = self.unscaled.unsigned_abs().to_string();
        if self.scale <= 0 {
            let zeros = "0".repeat(self.scale.unsigned_abs() as usize);
            return write!(f, "{sign}{digits}{zeros}");
        }
        let scale = self.scale as usize;
        if digits.len() > scale {
            let (int_part, frac_part) = digits.split_at(digits.len() - scale);
            write!(f, "{sign}{int_part}.{frac_part}")
        } else {
            let zeros = "0".repeat(scale - digits.len());
            write!(f, "{sign}0.{zeros}{digits}")
        }
    }
}

/// A value decoded from, or about to be encoded to, the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Timestamp(DateTime<Utc>),
    BigInt(i64),
    Int(i32),
    Decimal(Decimal),
    Double(f64),
}

impl WireValue {
    pub fn wire_type(&self) -> WireType {
        match self {
            WireValue::Timestamp(_) => WireType::Timestamp,
            WireValue::BigInt(_) => WireType::BigInt,
            WireValue::Int(_) => WireType::Int,
            WireValue::Decimal(_) => WireType::Decimal,
            WireValue::Double(_) => WireType::Double,
        }
    }
}

/// A value on the application side of a coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum AppValue {
    I64(i64),
    I32(i32),
    Decimal(Decimal),
    F32(f32),
}

impl AppValue {
    pub fn app_type(&self) -> AppType {
        match self {
            AppValue::I64(_) => AppType::I64,
            AppValue::I32(_) => AppType::I32,
            AppValue::Decimal(_) => AppType::Decimal,
            AppValue::F32(_) => AppType::F32,
        }
    }
}

type DecodeFn = fn(&WireValue) -> Result<AppValue, CoercionError>;
type EncodeFn = fn(&AppValue) -> Result<WireValue, CoercionError>;

/// A bidirectional adapter between one wire type and one application type.
#[derive(Clone, Copy)]
pub struct CoercionRule {
    pub wire: WireType,
    pub app: AppType,
    decode: DecodeFn,
    encode: EncodeFn,
}

impl fmt::Debug for CoercionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoercionRule({} <-> {})", self.wire, self.app)
    }
}

impl CoercionRule {
    pub fn decode(&self, value: &WireValue) -> Result<AppValue, CoercionError> {
        (self.decode)(value)
    }

    pub fn encode(&self, value: &AppValue) -> Result<WireValue, CoercionError> {
        (self.encode)(value)
    }
}

fn mismatch(wire: impl fmt::Display, app: impl fmt::Display) -> CoercionError {
    CoercionError::Unsupported {
        wire: wire.to_string(),
        app: app.to_string(),
    }
}

fn out_of_range(value: impl fmt::Display, target: &'static str) -> CoercionError {
    CoercionError::OutOfRange {
        value: value.to_string(),
        target,
    }
}

/// The coercions every session registers.
pub const DEFAULT_COERCIONS: [CoercionRule; 6] = [
    CoercionRule {
        wire: WireType::Timestamp,
        app: AppType::I64,
        decode: |v| match v {
            WireValue::Timestamp(ts) => Ok(AppValue::I64(ts.timestamp_millis())),
            other => Err(mismatch(other.wire_type(), AppType::I64)),
        },
        encode: |v| match v {
            AppValue::I64(millis) => DateTime::from_timestamp_millis(*millis)
                .map(WireValue::Timestamp)
                .ok_or_else(|| out_of_range(millis, "timestamp")),
            other => Err(mismatch(WireType::Timestamp, other.app_type())),
        },
    },
    CoercionRule {
        wire: WireType::BigInt,
        app: AppType::I32,
        decode: |v| match v {
            WireValue::BigInt(n) => i32::try_from(*n)
                .map(AppValue::I32)
                .map_err(|_| out_of_range(n, "i32")),
            other => Err(mismatch(other.wire_type(), AppType::I32)),
        },
        encode: |v| match v {
            AppValue::I32(n) => Ok(WireValue::BigInt(*n as i64)),
            other => Err(mismatch(WireType::BigInt, other.app_type())),
        },
    },
    CoercionRule {
        wire: WireType::Int,
        app: AppType::I64,
        decode: |v| match v {
            WireValue::Int(n) => Ok(AppValue::I64(*n as i64)),
            other => Err(mismatch(other.wire_type(), AppType::I64)),
        },
        encode: |v| match v {
            AppValue::I64(n) => i32::try_from(*n)
                .map(WireValue::Int)
                .map_err(|_| out_of_range(n, "int")),
            other => Err(mismatch(WireType::Int, other.app_type())),
        },
    },
    CoercionRule {
        wire: WireType::Decimal,
        app: AppType::I64,
        decode: |v| match v {
            WireValue::Decimal(d) => d.to_i64().map(AppValue::I64),
            other => Err(mismatch(other.wire_type(), AppType::I64)),
        },
        encode: |v| match v {
            AppValue::I64(n) => Ok(WireValue::Decimal(Decimal::from(*n))),
            other => Err(mismatch(WireType::Decimal, other.app_type())),
        },
    },
    CoercionRule {
        wire: WireType::Double,
        app: AppType::Decimal,
        decode: |v| match v {
            WireValue::Double(x) => Decimal::from_f64(*x).map(AppValue::Decimal),
            other => Err(mismatch(other.wire_type(), AppType::Decimal)),
        },
        encode: |v| match v {
            AppValue::Decimal(d) => Ok(WireValue::Double(d.to_f64())),
            other => Err(mismatch(WireType::Double, other.app_type())),
        },
    },
    CoercionRule {
        wire: WireType::Double,
        app: AppType::F32,
        decode: |v| match v {
            WireValue::Double(x) => Ok(AppValue::F32(*x as f32)),
            other => Err(mismatch(other.wire_type(), AppType::F32)),
        },
        encode: |v| match v {
            AppValue::F32(x) => Ok(WireValue::Double(*x as f64)),
            other => Err(mismatch(WireType::Double, other.app_type())),
        },
    },
];

/// The set of coercions available to one cluster.
#[derive(Debug, Clone, Default)]
pub struct CodecRegistry {
    rules: Vec<CoercionRule>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `DEFAULT_COERCIONS`.
    pub fn with_default_coercions() -> Self {
        let mut registry = Self::new();
        registry.register(DEFAULT_COERCIONS);
        registry
    }

    /// Registers rules. A rule for an already registered type pair replaces it.
    pub fn register(&mut self, rules: impl IntoIterator<Item = CoercionRule>) {
        for rule in rules {
            self.rules
                .retain(|existing| !(existing.wire == rule.wire && existing.app == rule.app));
            self.rules.push(rule);
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn find(&self, wire: WireType, app: AppType) -> Option<&CoercionRule> {
        self.rules.iter().find(|r| r.wire == wire && r.app == app)
    }

    /// Reads a wire value as the requested application type.
    pub fn decode(&self, value: &WireValue, app: AppType) -> Result<AppValue, CoercionError> {
        self.find(value.wire_type(), app)
            .ok_or_else(|| mismatch(value.wire_type(), app))?
            .decode(value)
    }

    /// Binds an application value to a column of the given wire type.
    pub fn encode(&self, value: &AppValue, wire: WireType) -> Result<WireValue, CoercionError> {
        self.find(wire, value.app_type())
            .ok_or_else(|| mismatch(wire, value.app_type()))?
            .encode(value)
    }
}
