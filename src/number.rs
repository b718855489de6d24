//! Exact DynamoDB numbers
//!
//! DynamoDB numbers carry up to 38 significant digits, more than `f64` holds. The emulator
//! compares and keys numbers through [`CanonicalNumber`], which keeps every digit.

use std::cmp::Ordering;
use std::fmt;

/// A decimal number normalized so that equal values have equal representations
///
/// The value is `0.<digits> x 10^exponent`, negated when `negative` is set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CanonicalNumber {
    negative: bool,
    /// Significant digits without leading or trailing zeros, empty for zero
    digits: String,
    exponent: i64,
}

impl CanonicalNumber {
    /// Parses a number in DynamoDB's textual form, e.g. `-12.50`, `1e3` or `.5`
    pub(crate) fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (negative, unsigned) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };

        let (mantissa, exponent) = match unsigned.find(|c| c == 'e' || c == 'E') {
            Some(at) => (&unsigned[..at], unsigned[at + 1..].parse::<i64>().ok()?),
            None => (unsigned, 0),
        };
        let (integer, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));

        if integer.is_empty() && fraction.is_empty() {
            return None;
        }
        if !integer.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let all = format!("{}{}", integer, fraction);
        let significant = all.trim_start_matches('0');
        let leading_zeros = all.len() - significant.len();
        let digits = significant.trim_end_matches('0');

        if digits.is_empty() {
            return Some(Self::zero());
        }

        let exponent = i64::try_from(integer.len()).ok()? + exponent
            - i64::try_from(leading_zeros).ok()?;
        Some(Self {
            negative,
            digits: digits.to_string(),
            exponent,
        })
    }

    fn zero() -> Self {
        Self {
            negative: false,
            digits: String::new(),
            exponent: 0,
        }
    }

    fn signum(&self) -> i8 {
        match (self.digits.is_empty(), self.negative) {
            (true, _) => 0,
            (false, true) => -1,
            (false, false) => 1,
        }
    }

    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        // Digits never start with zero, so a larger exponent means a larger magnitude and equal
        // exponents compare digit by digit.
        self.exponent
            .cmp(&other.exponent)
            .then_with(|| self.digits.cmp(&other.digits))
    }
}

impl Ord for CanonicalNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.signum().cmp(&other.signum()) {
            Ordering::Equal => match self.signum() {
                0 => Ordering::Equal,
                1 => self.cmp_magnitude(other),
                _ => other.cmp_magnitude(self),
            },
            unequal => unequal,
        }
    }
}

impl PartialOrd for CanonicalNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CanonicalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.digits.is_empty() {
            return f.write_str("0");
        }
        let sign = if self.negative { "-" } else { "" };
        write!(f, "{}0.{}e{}", sign, self.digits, self.exponent)
    }
}
