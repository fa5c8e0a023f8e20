use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Fixed-point quantity stored as integer base units.
///
/// The number of decimal places belongs to the asset, not to the value, so
/// parsing and rendering take `decimals` explicitly. All arithmetic is exact.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("can't parse amount {0:?}")]
    Malformed(String),
    #[error("amount {value:?} has more than {decimals} decimal places")]
    TooPrecise { value: String, decimals: u32 },
    #[error("amount {0:?} overflows")]
    Overflow(String),
    #[error("{0} decimal places is more than the supported {max}", max = MAX_DECIMALS)]
    TooManyDecimals(u32),
}

/// Most decimal places an asset may declare.
pub const MAX_DECIMALS: u32 = 18;

/// Rejects assets whose base units can't be rendered or parsed.
pub fn check_decimals(decimals: u32) -> Result<(), AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::TooManyDecimals(decimals));
    }
    Ok(())
}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_units(units: u64) -> Self {
        Self(units)
    }

    pub const fn units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    /// Parses a decimal string such as `"2.5"` into base units of an asset
    /// with `decimals` places.
    pub fn parse(value: &str, decimals: u32) -> Result<Amount, AmountError> {
        let trimmed = value.trim();
        let (int_part, frac_part) = match trimmed.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (trimmed, ""),
        };
        if (int_part.is_empty() && frac_part.is_empty())
            || !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AmountError::Malformed(value.to_string()));
        }
        let frac_part = frac_part.trim_end_matches('0');
        if frac_part.len() > decimals as usize {
            return Err(AmountError::TooPrecise {
                value: value.to_string(),
                decimals,
            });
        }

        let overflow = || AmountError::Overflow(value.to_string());
        let scale = 10u64.checked_pow(decimals).ok_or_else(overflow)?;
        let int_units = if int_part.is_empty() {
            0
        } else {
            int_part.parse::<u64>().map_err(|_| overflow())?
        };
        let frac_units = if frac_part.is_empty() {
            0
        } else {
            let padding = 10u64.pow(decimals - frac_part.len() as u32);
            frac_part.parse::<u64>().map_err(|_| overflow())? * padding
        };

        int_units
            .checked_mul(scale)
            .and_then(|units| units.checked_add(frac_units))
            .map(Amount)
            .ok_or_else(overflow)
    }

    /// Renders the amount with exactly `decimals` fractional digits.
    pub fn fixed(&self, decimals: u32) -> FixedAmount {
        FixedAmount {
            amount: *self,
            decimals,
        }
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Amount(units)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign<&Amount> for Amount {
    fn add_assign(&mut self, rhs: &Amount) {
        self.0 += rhs.0;
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, item| acc + item)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, item| acc + *item)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct FixedAmount {
    amount: Amount,
    decimals: u32,
}

impl fmt::Display for FixedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.decimals == 0 {
            return write!(f, "{}", self.amount.0);
        }
        let scale = match 10u128.checked_pow(self.decimals) {
            Some(scale) => scale,
            None => return write!(f, "{}e-{}", self.amount.0, self.decimals),
        };
        let units = self.amount.0 as u128;
        write!(
            f,
            "{}.{:0width$}",
            units / scale,
            units % scale,
            width = self.decimals as usize
        )
    }
}

/// Result of subtracting amounts from each other.
///
/// `Excess` means more came in than went out, `Debt` the opposite.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Balance {
    Debt(Amount),
    #[default]
    Balanced,
    Excess(Amount),
}

impl Balance {
    pub fn zero() -> Self {
        Balance::Balanced
    }

    pub fn balanced(&self) -> bool {
        matches!(self, Balance::Balanced)
    }

    fn signed(&self) -> i128 {
        match self {
            Balance::Debt(value) => -(value.0 as i128),
            Balance::Balanced => 0,
            Balance::Excess(value) => value.0 as i128,
        }
    }

    fn from_signed(value: i128) -> Self {
        match value {
            0 => Balance::Balanced,
            v if v > 0 => Balance::Excess(Amount(v as u64)),
            v => Balance::Debt(Amount((-v) as u64)),
        }
    }

    pub fn fixed(&self, decimals: u32) -> String {
        match self {
            Balance::Debt(value) => format!("-{}", value.fixed(decimals)),
            Balance::Balanced => Amount::ZERO.fixed(decimals).to_string(),
            Balance::Excess(value) => value.fixed(decimals).to_string(),
        }
    }
}

impl AddAssign<&Amount> for Balance {
    fn add_assign(&mut self, rhs: &Amount) {
        *self = Balance::from_signed(self.signed() + rhs.0 as i128);
    }
}

impl SubAssign<&Amount> for Balance {
    fn sub_assign(&mut self, rhs: &Amount) {
        *self = Balance::from_signed(self.signed() - rhs.0 as i128);
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signed())
    }
}

#[cfg(test)]
mod tests {
    use crate::amount::{check_decimals, Amount, AmountError, Balance};

    #[test]
    fn parse_and_render() {
        let amount = Amount::parse("2.5", 8).unwrap();
        assert_eq!(amount, Amount::from_units(250_000_000));
        assert_eq!(amount.fixed(8).to_string(), "2.50000000");
        assert_eq!(Amount::parse("0.00000001", 8).unwrap().units(), 1);
        assert_eq!(Amount::parse("7", 0).unwrap().units(), 7);
        assert_eq!(Amount::parse(".5", 2).unwrap().units(), 50);
        assert_eq!(Amount::parse("1.500", 1).unwrap().units(), 15);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            Amount::parse("1.2.3", 8),
            Err(AmountError::Malformed(_))
        ));
        assert!(matches!(
            Amount::parse("-1", 8),
            Err(AmountError::Malformed(_))
        ));
        assert!(matches!(
            Amount::parse("0.001", 2),
            Err(AmountError::TooPrecise { .. })
        ));
        assert!(matches!(
            Amount::parse("200000000000", 8),
            Err(AmountError::Overflow(_))
        ));
    }

    #[test]
    fn balance_tracks_sign() {
        let mut balance = Balance::zero();
        balance += &Amount::from(10);
        assert_eq!(balance, Balance::Excess(Amount::from(10)));
        balance -= &Amount::from(25);
        assert_eq!(balance, Balance::Debt(Amount::from(15)));
        balance += &Amount::from(15);
        assert!(balance.balanced());
        assert_eq!(Balance::Debt(Amount::from(150)).fixed(2), "-1.50");
    }

    #[test]
    fn arithmetic_never_wraps() {
        let half = Amount::from(u64::MAX / 2 + 1);
        assert_eq!(half.checked_add(half), None);
        assert_eq!(half.saturating_add(half), Amount::from(u64::MAX));
        assert_eq!(Amount::from(1).checked_sub(Amount::from(2)), None);
    }

    #[test]
    fn decimals_are_bounded() {
        assert!(check_decimals(18).is_ok());
        assert!(matches!(
            check_decimals(40),
            Err(AmountError::TooManyDecimals(40))
        ));
        assert_eq!(Amount::from(5).fixed(40).to_string(), "5e-40");
    }
}
