use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Nano-units per whole unit. Every quantity is stored as an integer count of nano-units.
const NANOS_PER_UNIT: i128 = 1_000_000_000;

/// Binary suffixes, largest first, with their multiplier in whole units.
const BINARY_SUFFIXES: [(&str, u128); 6] = [
    ("Ei", 1 << 60),
    ("Pi", 1 << 50),
    ("Ti", 1 << 40),
    ("Gi", 1 << 30),
    ("Mi", 1 << 20),
    ("Ki", 1 << 10),
];

/// Decimal suffixes, largest first, with their size in nano-units.
const DECIMAL_SUFFIXES: [(&str, u128); 10] = [
    ("E", 1_000_000_000_000_000_000_000_000_000),
    ("P", 1_000_000_000_000_000_000_000_000),
    ("T", 1_000_000_000_000_000_000_000),
    ("G", 1_000_000_000_000_000_000),
    ("M", 1_000_000_000_000_000),
    ("k", 1_000_000_000_000),
    ("", 1_000_000_000),
    ("m", 1_000_000),
    ("u", 1_000),
    ("n", 1),
];

/// How a quantity prefers to be written back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantityFormat {
    /// Powers of ten: `500m`, `5`, `2k`, `1G`.
    #[default]
    DecimalSI,
    /// Powers of two: `512Mi`, `1Gi`.
    BinarySI,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("quantity must not be empty")]
    Empty,
    #[error("invalid quantity {0:?}")]
    Invalid(String),
    #[error("quantity {0:?} is more precise than 1n")]
    TooPrecise(String),
    #[error("quantity {0:?} is out of range")]
    OutOfRange(String),
    #[error("quantity arithmetic overflowed")]
    Overflow,
}

/// An exact, signed resource amount such as `1`, `250m` or `4Gi`.
///
/// Values are held as an integer number of nano-units, so addition and
/// comparison never drift. Equality and ordering ignore the display format:
/// `1024` and `1Ki` are the same quantity.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quantity {
    nanos: i128,
    format: QuantityFormat,
}

impl Quantity {
    /// The zero quantity.
    pub const ZERO: Quantity = Quantity {
        nanos: 0,
        format: QuantityFormat::DecimalSI,
    };

    /// A whole number of units, written in decimal form.
    pub fn from_units(units: i64) -> Self {
        Self {
            nanos: units as i128 * NANOS_PER_UNIT,
            format: QuantityFormat::DecimalSI,
        }
    }

    /// A whole number of units, written in binary form (bytes, typically).
    pub fn from_binary_units(units: i64) -> Self {
        Self {
            nanos: units as i128 * NANOS_PER_UNIT,
            format: QuantityFormat::BinarySI,
        }
    }

    /// Thousandths of a unit (CPU millicores, for example).
    pub fn from_millis(millis: i64) -> Self {
        Self {
            nanos: millis as i128 * 1_000_000,
            format: QuantityFormat::DecimalSI,
        }
    }

    pub fn format(&self) -> QuantityFormat {
        self.format
    }

    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    pub fn is_negative(&self) -> bool {
        self.nanos < 0
    }

    pub fn is_positive(&self) -> bool {
        self.nanos > 0
    }

    pub fn checked_add(&self, other: &Quantity) -> Result<Quantity, QuantityError> {
        let nanos = self
            .nanos
            .checked_add(other.nanos)
            .ok_or(QuantityError::Overflow)?;
        Ok(Quantity {
            nanos,
            format: self.merged_format(other),
        })
    }

    pub fn checked_sub(&self, other: &Quantity) -> Result<Quantity, QuantityError> {
        let nanos = self
            .nanos
            .checked_sub(other.nanos)
            .ok_or(QuantityError::Overflow)?;
        Ok(Quantity {
            nanos,
            format: self.merged_format(other),
        })
    }

    /// The negated quantity, keeping its format.
    pub fn negated(&self) -> Quantity {
        Quantity {
            nanos: -self.nanos,
            format: self.format,
        }
    }

    /// Zero when negative, unchanged otherwise.
    pub fn clamp_non_negative(&self) -> Quantity {
        if self.nanos < 0 {
            Quantity {
                nanos: 0,
                format: self.format,
            }
        } else {
            *self
        }
    }

    /// A zero operand has no opinion on format; otherwise the left side wins.
    fn merged_format(&self, other: &Quantity) -> QuantityFormat {
        if self.nanos == 0 && other.nanos != 0 {
            other.format
        } else {
            self.format
        }
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.nanos == other.nanos
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.nanos.cmp(&other.nanos)
    }
}

impl Hash for Quantity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nanos.hash(state);
    }
}

/// Multiplier (in nano-units) and extra power-of-ten divisor for a suffix.
fn parse_suffix(suffix: &str, input: &str) -> Result<(i128, u32, QuantityFormat), QuantityError> {
    if let Some((_, mult)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Ok((*mult as i128 * NANOS_PER_UNIT, 0, QuantityFormat::BinarySI));
    }
    if let Some((_, nanos)) = DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Ok((*nanos as i128, 0, QuantityFormat::DecimalSI));
    }
    // Decimal exponent: 1e3, 5E-3
    if let Some(exp) = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))
    {
        let exp: i32 = exp
            .parse()
            .map_err(|_| QuantityError::Invalid(input.to_string()))?;
        let pow = exp + 9;
        if pow >= 0 {
            let mult = 10i128
                .checked_pow(pow as u32)
                .ok_or_else(|| QuantityError::OutOfRange(input.to_string()))?;
            return Ok((mult, 0, QuantityFormat::DecimalSI));
        }
        return Ok((1, pow.unsigned_abs(), QuantityFormat::DecimalSI));
    }
    Err(QuantityError::Invalid(input.to_string()))
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let s = input.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, rest) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(number_end);
        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
        if frac_part.contains('.') || (int_part.is_empty() && frac_part.is_empty()) {
            return Err(QuantityError::Invalid(input.to_string()));
        }

        let digits = format!("{}{}", int_part, frac_part);
        let mantissa: i128 = digits
            .parse()
            .map_err(|_| QuantityError::OutOfRange(input.to_string()))?;

        let (mult, extra_div, format) = parse_suffix(suffix, input)?;
        let divisor = 10i128
            .checked_pow(frac_part.len() as u32 + extra_div)
            .ok_or_else(|| QuantityError::OutOfRange(input.to_string()))?;
        let scaled = mantissa
            .checked_mul(mult)
            .ok_or_else(|| QuantityError::OutOfRange(input.to_string()))?;
        if scaled % divisor != 0 {
            return Err(QuantityError::TooPrecise(input.to_string()));
        }

        let nanos = scaled / divisor;
        Ok(Quantity {
            nanos: if negative { -nanos } else { nanos },
            format,
        })
    }
}

impl fmt::Display for Quantity {
    /// Canonical form: the largest suffix that keeps the mantissa an integer.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos == 0 {
            return write!(f, "0");
        }
        let sign = if self.nanos < 0 { "-" } else { "" };
        let abs = self.nanos.unsigned_abs();
        let unit = NANOS_PER_UNIT as u128;

        if self.format == QuantityFormat::BinarySI && abs % unit == 0 {
            let units = abs / unit;
            for (suffix, mult) in BINARY_SUFFIXES {
                if units % mult == 0 {
                    return write!(f, "{}{}{}", sign, units / mult, suffix);
                }
            }
            return write!(f, "{}{}", sign, units);
        }

        for (suffix, size) in DECIMAL_SUFFIXES {
            if abs % size == 0 {
                return write!(f, "{}{}{}", sign, abs / size, suffix);
            }
        }
        write!(f, "{}{}n", sign, abs)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct QuantityVisitor;

        impl serde::de::Visitor<'_> for QuantityVisitor {
            type Value = Quantity;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a quantity string such as \"500m\" or \"1Gi\", or an integer")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Quantity, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Quantity, E> {
                Ok(Quantity::from_units(v))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Quantity, E> {
                i64::try_from(v)
                    .map(Quantity::from_units)
                    .map_err(|_| E::custom(QuantityError::OutOfRange(v.to_string())))
            }
        }

        deserializer.deserialize_any(QuantityVisitor)
    }
}
