//! Exact fixed-point decimal values
//!
//! Stored as an `i128` mantissa with a base-10 scale, the same shape as a
//! `DECIMAL(p, s)` column.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Largest scale a decimal may carry
pub const MAX_SCALE: u32 = 28;

/// Fixed-point decimal number (`mantissa * 10^-scale`)
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    /// Zero with no fractional digits
    pub const ZERO: Decimal = Decimal {
        mantissa: 0,
        scale: 0,
    };

    /// Create a decimal from its mantissa and scale, `None` if the scale is too large
    pub fn new(mantissa: i128, scale: u32) -> Option<Self> {
        (scale <= MAX_SCALE).then_some(Decimal { mantissa, scale })
    }

    /// Raw mantissa
    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    /// Number of fractional digits
    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_negative(&self) -> bool {
        self.mantissa < 0
    }

    /// Drop trailing fractional zeros
    pub fn normalize(&self) -> Self {
        let mut mantissa = self.mantissa;
        let mut scale = self.scale;
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }
        Decimal { mantissa, scale }
    }

    /// Re-express at a larger scale, `None` on overflow
    pub fn rescale(&self, scale: u32) -> Option<Self> {
        if scale < self.scale || scale > MAX_SCALE {
            return None;
        }
        let factor = 10i128.checked_pow(scale - self.scale)?;
        Some(Decimal {
            mantissa: self.mantissa.checked_mul(factor)?,
            scale,
        })
    }

    /// Integer part, rounding half away from zero
    pub fn round_to_integer(&self) -> i128 {
        if self.scale == 0 {
            return self.mantissa;
        }
        let divisor = 10i128.pow(self.scale);
        let quotient = self.mantissa / divisor;
        let remainder = (self.mantissa % divisor).abs();
        if remainder * 2 >= divisor {
            quotient + self.mantissa.signum()
        } else {
            quotient
        }
    }

    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / 10f64.powi(self.scale as i32)
    }

    /// Convert from a float using its shortest round-trip text form
    ///
    /// Values with more fractional digits than [`MAX_SCALE`] are rounded to it.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let text = value.to_string();
        let fraction = text.split_once('.').map_or(0, |(_, f)| f.len());
        if fraction <= MAX_SCALE as usize {
            return text.parse().ok();
        }
        let rounded: Decimal = format!("{:.*}", MAX_SCALE as usize, value).parse().ok()?;
        Some(rounded.normalize())
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self {
        Decimal {
            mantissa: v as i128,
            scale: 0,
        }
    }
}

impl From<i32> for Decimal {
    fn from(v: i32) -> Self {
        Decimal::from(v as i64)
    }
}

impl Default for Decimal {
    fn default() -> Self {
        Decimal::ZERO
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (self.normalize(), other.normalize());
        let scale = a.scale.max(b.scale);
        match (a.rescale(scale), b.rescale(scale)) {
            (Some(a), Some(b)) => a.mantissa.cmp(&b.mantissa),
            _ => a.to_f64().total_cmp(&b.to_f64()),
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let sign = if self.mantissa < 0 { "-" } else { "" };
        if self.scale == 0 {
            return write!(f, "{}{}", sign, digits);
        }
        let scale = self.scale as usize;
        let padded = format!("{:0>width$}", digits, width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{}{}.{}", sign, int_part, frac_part)
    }
}

/// Error returned when text is not a plain decimal number
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid decimal literal: '{0}'")]
pub struct ParseDecimalError(String);

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseDecimalError(s.to_string());
        let text = s.trim();
        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let scale = frac_part.len() as u32;
        if scale > MAX_SCALE {
            return Err(invalid());
        }

        let mut mantissa: i128 = 0;
        for c in int_part.chars().chain(frac_part.chars()) {
            let digit = (c as u8 - b'0') as i128;
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(digit))
                .ok_or_else(invalid)?;
        }
        if negative {
            mantissa = -mantissa;
        }
        Ok(Decimal { mantissa, scale })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let d: Decimal = "19.99".parse().unwrap();
        assert_eq!(d.mantissa(), 1999);
        assert_eq!(d.scale(), 2);
        assert_eq!(d.to_string(), "19.99");

        let d: Decimal = "-0.05".parse().unwrap();
        assert_eq!(d.to_string(), "-0.05");

        assert_eq!(Decimal::from(42).to_string(), "42");
        assert!("1e5".parse::<Decimal>().is_err());
        assert!(".".parse::<Decimal>().is_err());
        assert!("abc".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_equality_ignores_trailing_zeros() {
        let a: Decimal = "1.50".parse().unwrap();
        let b: Decimal = "1.5".parse().unwrap();
        assert_eq!(a, b);
        assert!(a < "1.51".parse().unwrap());
    }

    #[test]
    fn test_rounding() {
        assert_eq!("2.5".parse::<Decimal>().unwrap().round_to_integer(), 3);
        assert_eq!("-2.5".parse::<Decimal>().unwrap().round_to_integer(), -3);
        assert_eq!("2.49".parse::<Decimal>().unwrap().round_to_integer(), 2);
    }

    #[test]
    fn test_from_f64() {
        assert_eq!(Decimal::from_f64(0.1).unwrap().to_string(), "0.1");
        assert_eq!(Decimal::from_f64(1e-30).unwrap(), Decimal::ZERO);
        assert_eq!(
            Decimal::from_f64(2.5e-27).unwrap(),
            "0.0000000000000000000000000025".parse::<Decimal>().unwrap()
        );
        assert!(Decimal::from_f64(f64::NAN).is_none());
    }
}
