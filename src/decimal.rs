//! Exact decimal numbers.
//!
//! JSON numbers are arbitrary precision decimal literals. Comparing them as
//! `f64` breaks down for literals such as `1.0e400`, which do not fit in a
//! double at all, and for divisibility checks such as `0.3` being a multiple
//! of `0.1`. [`Decimal`](struct.Decimal.html) keeps the exact value of a
//! literal as a big integer coefficient scaled by a power of ten.

use num_bigint::{BigInt, Sign};
use num_traits::{One, Signed, Zero};
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;

/// The largest power of ten arithmetic will scale a coefficient by. Sums of
/// operands further apart than this would need that many digits.
const MAX_SHIFT: u32 = 1 << 16;

/// An exact decimal number: `coefficient * 10^exponent`.
///
/// Values are kept normalized (no trailing zeros in the coefficient, and zero
/// always has a zero exponent), so the derived equality is numeric equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    coefficient: BigInt,
    exponent: i64,
}

impl Decimal {
    fn new(coefficient: BigInt, exponent: i64) -> Self {
        let mut decimal = Decimal {
            coefficient,
            exponent,
        };
        decimal.normalize();
        decimal
    }

    fn normalize(&mut self) {
        if self.coefficient.is_zero() {
            self.exponent = 0;
            return;
        }

        let ten = BigInt::from(10);
        while (&self.coefficient % &ten).is_zero() {
            self.coefficient /= &ten;
            self.exponent += 1;
        }
    }

    /// Parses a JSON number literal, such as `-12.5e-3`.
    ///
    /// Returns `None` when the input is not a JSON number.
    pub fn parse(literal: &str) -> Option<Self> {
        let (mantissa, exponent) = match literal.find(|c| c == 'e' || c == 'E') {
            Some(index) => {
                let exponent = &literal[index + 1..];
                let exponent = exponent.strip_prefix('+').unwrap_or(exponent);
                (&literal[..index], i64::from_str(exponent).ok()?)
            }
            None => (literal, 0),
        };

        let (negative, mantissa) = match mantissa.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, mantissa),
        };

        let (integral, fractional) = match mantissa.find('.') {
            Some(index) => (&mantissa[..index], &mantissa[index + 1..]),
            None => (mantissa, ""),
        };

        if integral.is_empty() || !integral.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        if mantissa.contains('.') && fractional.is_empty() {
            return None;
        }

        if !fractional.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let digits = format!("{}{}", integral, fractional);
        let magnitude = BigInt::parse_bytes(digits.as_bytes(), 10)?;
        let coefficient = if negative { -magnitude } else { magnitude };
        let exponent = exponent.checked_sub(fractional.len() as i64)?;
        Some(Decimal::new(coefficient, exponent))
    }

    /// The exact value of a JSON number, or `None` for other JSON values.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_number().and_then(Self::from_number)
    }

    pub fn from_number(number: &Number) -> Option<Self> {
        Self::parse(&number.to_string())
    }

    pub fn from_integer(value: i64) -> Self {
        Decimal::new(BigInt::from(value), 0)
    }

    /// Converts back into a JSON number, keeping every digit.
    pub fn to_value(&self) -> Value {
        match serde_json::from_str::<Number>(&self.to_string()) {
            Ok(number) => Value::Number(number),
            Err(_) => Value::Null,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.coefficient.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.coefficient.is_negative()
    }

    /// Whether this number has no fractional part. `1.0` is an integer.
    pub fn is_integer(&self) -> bool {
        self.exponent >= 0
    }

    /// The number of decimal digits of the coefficient. Zero has one.
    fn digits(&self) -> i128 {
        self.coefficient.magnitude().to_string().len() as i128
    }

    /// The exponent of the leading digit plus one: the magnitude lies in
    /// `[10^(adjusted - 1), 10^adjusted)`.
    fn adjusted_exponent(&self) -> i128 {
        i128::from(self.exponent) + self.digits()
    }

    /// The value as a `usize`, when it is a non-negative integer that fits.
    pub fn to_usize(&self) -> Option<usize> {
        if !self.is_integer() || self.is_negative() {
            return None;
        }

        if self.adjusted_exponent() > 20 {
            return None;
        }

        let exponent = u32::try_from(self.exponent).ok()?;
        let value = &self.coefficient * BigInt::from(10).pow(exponent);
        let (_, digits) = value.to_u64_digits();
        match digits.len() {
            0 => Some(0),
            1 => usize::try_from(digits[0]).ok(),
            _ => None,
        }
    }

    /// Whether this number is an exact integer multiple of `divisor`.
    ///
    /// Dividing by zero never yields a multiple.
    pub fn is_multiple_of(&self, divisor: &Decimal) -> bool {
        if divisor.is_zero() {
            return false;
        }

        if self.is_zero() {
            return true;
        }

        // Coefficients carry no factor of ten, so a divisor with a larger
        // exponent cannot divide.
        if self.exponent < divisor.exponent {
            return false;
        }

        // The divisor has at most `bits` factors of two or five, so more
        // powers of ten than that cannot make it divide.
        let gap = i128::from(self.exponent) - i128::from(divisor.exponent);
        let bits = i128::from(u32::try_from(divisor.coefficient.bits()).unwrap_or(u32::MAX));
        let shift = u32::try_from(gap.min(bits)).unwrap_or(u32::MAX);
        let dividend = &self.coefficient * BigInt::from(10).pow(shift);
        (dividend % &divisor.coefficient).is_zero()
    }

    /// The coefficients of both numbers written with their common smaller
    /// exponent, when the exponents are at most `MAX_SHIFT` apart.
    fn aligned(&self, other: &Decimal) -> Option<(BigInt, BigInt, i64)> {
        let exponent = self.exponent.min(other.exponent);
        let scale = |decimal: &Decimal| -> Option<BigInt> {
            let shift = u32::try_from(i128::from(decimal.exponent) - i128::from(exponent)).ok()?;
            if shift > MAX_SHIFT {
                return None;
            }
            Some(&decimal.coefficient * BigInt::from(10).pow(shift))
        };
        Some((scale(self)?, scale(other)?, exponent))
    }

    /// The exact sum, or `None` when the operands are so far apart that the
    /// sum would need more than `MAX_SHIFT` digits.
    pub fn checked_add(&self, other: &Decimal) -> Option<Decimal> {
        if other.is_zero() {
            return Some(self.clone());
        }
        if self.is_zero() {
            return Some(other.clone());
        }

        let (left, right, exponent) = self.aligned(other)?;
        Some(Decimal::new(left + right, exponent))
    }

    /// The exact difference, with the same limits as `checked_add`.
    pub fn checked_sub(&self, other: &Decimal) -> Option<Decimal> {
        self.checked_add(&-other)
    }

    /// The greatest integer less than or equal to this number.
    pub fn floor(&self) -> Self {
        if self.is_integer() {
            return self.clone();
        }

        // The magnitude is below one when every digit is fractional.
        let quotient = match u32::try_from(-i128::from(self.exponent)) {
            Ok(shift) if i128::from(shift) <= self.digits() => {
                &self.coefficient / BigInt::from(10).pow(shift)
            }
            _ => BigInt::zero(),
        };
        let quotient = if self.is_negative() {
            quotient - BigInt::one()
        } else {
            quotient
        };
        Decimal::new(quotient, 0)
    }

    /// The least integer greater than or equal to this number.
    pub fn ceil(&self) -> Self {
        -(-self).floor()
    }

    /// Rounds to the given number of significant digits, with ties going to
    /// the even neighbour.
    pub fn round_significant(&self, digits: usize) -> Self {
        let length = self.coefficient.magnitude().to_string().len();
        if digits == 0 || length <= digits {
            return self.clone();
        }

        let drop = (length - digits) as u32;
        let divisor = BigInt::from(10).pow(drop);
        let magnitude = self.coefficient.abs();
        let mut quotient = &magnitude / &divisor;
        let remainder = &magnitude % &divisor;
        let doubled = remainder * BigInt::from(2);
        let rounds_up = match doubled.cmp(&divisor) {
            Ordering::Greater => true,
            Ordering::Equal => !(&quotient % BigInt::from(2)).is_zero(),
            Ordering::Less => false,
        };

        if rounds_up {
            quotient += BigInt::one();
        }

        let coefficient = if self.is_negative() {
            -quotient
        } else {
            quotient
        };
        Decimal::new(coefficient, self.exponent + i64::from(drop))
    }
}

impl FromStr for Decimal {
    type Err = ();

    fn from_str(literal: &str) -> Result<Self, Self::Err> {
        Decimal::parse(literal).ok_or(())
    }
}

impl fmt::Display for Decimal {
    /// Prints a valid JSON number literal.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.exponent == 0 {
            write!(f, "{}", self.coefficient)
        } else {
            write!(f, "{}e{}", self.coefficient, self.exponent)
        }
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let sign = |decimal: &Decimal| match decimal.coefficient.sign() {
            Sign::Minus => -1,
            Sign::NoSign => 0,
            Sign::Plus => 1,
        };

        match sign(self).cmp(&sign(other)) {
            Ordering::Equal => {}
            ordering => return ordering,
        }

        let magnitude = match self.adjusted_exponent().cmp(&other.adjusted_exponent()) {
            Ordering::Equal => {
                // Equal adjusted exponents keep the shift below the digit count.
                let exponent = self.exponent.min(other.exponent);
                let scale = |decimal: &Decimal| {
                    let shift = u32::try_from(i128::from(decimal.exponent) - i128::from(exponent))
                        .unwrap_or(0);
                    decimal.coefficient.magnitude() * num_bigint::BigUint::from(10u32).pow(shift)
                };
                scale(self).cmp(&scale(other))
            }
            ordering => ordering,
        };

        if self.is_negative() {
            magnitude.reverse()
        } else {
            magnitude
        }
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal::new(-self.coefficient, self.exponent)
    }
}

impl<'a> Neg for &'a Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal::new(-self.coefficient.clone(), self.exponent)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decimal(literal: &str) -> Decimal {
        Decimal::parse(literal).expect("valid literal")
    }

    #[test]
    fn parse_normalizes() {
        assert_eq!(decimal("1.0"), decimal("1"));
        assert_eq!(decimal("100"), decimal("1e2"));
        assert_eq!(decimal("-0"), decimal("0"));
        assert_eq!(decimal("1.50E+1"), decimal("15"));
        assert_eq!(None, Decimal::parse("1."));
        assert_eq!(None, Decimal::parse(".5"));
        assert_eq!(None, Decimal::parse("foo"));
        assert_eq!(None, Decimal::parse(""));
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(decimal("1.0e400") > decimal("9.99e399"));
        assert!(decimal("-1e400") < decimal("-5"));
        assert!(decimal("0.1") < decimal("0.10000000000000000001"));
        assert!(decimal("0") > decimal("-0.0001"));
    }

    #[test]
    fn integers() {
        assert!(decimal("1.0").is_integer());
        assert!(decimal("1e400").is_integer());
        assert!(!decimal("1.5").is_integer());
        assert_eq!(Some(12), decimal("1.2e1").to_usize());
        assert_eq!(None, decimal("-1").to_usize());
        assert_eq!(None, decimal("0.5").to_usize());
    }

    #[test]
    fn multiples() {
        assert!(decimal("0.3").is_multiple_of(&decimal("0.1")));
        assert!(decimal("4.5").is_multiple_of(&decimal("1.5")));
        assert!(!decimal("35").is_multiple_of(&decimal("1.5")));
        assert!(decimal("1e308").is_multiple_of(&decimal("0.0001")));
        assert!(!decimal("0.0075").is_multiple_of(&decimal("0.01")));
        assert!(!decimal("1").is_multiple_of(&decimal("0")));
    }

    #[test]
    fn floor_and_ceil() {
        assert_eq!(decimal("1"), decimal("1.5").floor());
        assert_eq!(decimal("2"), decimal("1.5").ceil());
        assert_eq!(decimal("-2"), decimal("-1.5").floor());
        assert_eq!(decimal("-1"), decimal("-1.5").ceil());
        assert_eq!(decimal("1e400"), decimal("1.0e400").ceil());
    }

    #[test]
    fn integer_bounds_from_exclusive_bounds() {
        let one = Decimal::from_integer(1);

        let maximum = decimal("1.0e400").ceil().checked_sub(&one).expect("difference");
        assert_eq!(
            decimal("10.00000000000000e+399"),
            maximum.round_significant(16)
        );

        let maximum = decimal("9.99999999999999999999999999999e400")
            .ceil()
            .checked_sub(&one)
            .expect("difference");
        assert_eq!(
            decimal("100.0000000000000e+399"),
            maximum.round_significant(16)
        );

        let minimum = decimal("1.0e400").floor().checked_add(&one).expect("sum");
        assert_eq!(decimal("1.0e+400"), minimum.round_significant(16));

        let minimum = decimal("9.99999999999999999999999999999e400")
            .floor()
            .checked_add(&one)
            .expect("sum");
        assert_eq!(decimal("1.0e+401"), minimum.round_significant(16));
    }

    #[test]
    fn exponents_far_apart() {
        let huge = decimal("1e99999999999");
        let tiny = decimal("1e-99999999999");
        let one = Decimal::from_integer(1);

        assert!(huge > one);
        assert!(-&huge < -&one);
        assert!(tiny < one);
        assert!(tiny > Decimal::from_integer(0));
        assert!(decimal("-1e-99999999999") > -&one);
        assert!(decimal("1e4000000000") > decimal("9e3999999999"));
        assert_eq!(Ordering::Equal, decimal("10e99999999998").cmp(&huge));

        assert_eq!(None, huge.checked_add(&one));
        assert_eq!(None, one.checked_sub(&tiny));
        assert_eq!(Some(huge.clone()), huge.checked_add(&Decimal::from_integer(0)));

        assert_eq!(Decimal::from_integer(0), tiny.floor());
        assert_eq!(-&one, (-&tiny).floor());
        assert_eq!(one, tiny.ceil());
        assert_eq!(huge, huge.floor());
        assert_eq!(None, decimal("1e4000000000").to_usize());
    }

    #[test]
    fn multiples_far_apart() {
        assert!(decimal("1e4000000000").is_multiple_of(&decimal("8")));
        assert!(decimal("1e4000000000").is_multiple_of(&decimal("0.5")));
        assert!(!decimal("1e4000000000").is_multiple_of(&decimal("3")));
        assert!(!decimal("1e-4000000000").is_multiple_of(&decimal("1")));
        assert!(decimal("3e99999999999").is_multiple_of(&decimal("1.5e-99999999999")));
    }

    #[test]
    fn display_is_json() -> Result<(), serde_json::Error> {
        let value: Value = serde_json::from_str(&decimal("-12.5e-3").to_string())?;
        assert_eq!(Some(decimal("-0.0125")), Decimal::from_value(&value));
        assert_eq!("15e-1", decimal("1.5").to_string());
        assert_eq!("1e2", decimal("100").floor().to_string());
        Ok(())
    }
}
