//! Channel price computation and operator price adjustments.

use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Price pushed to a channel: the master price times the channel markup,
/// rounded to cents.
#[must_use]
pub fn effective_price(base_price: f64, markup: f64) -> f64 {
    ((base_price * markup) * 100.0).round() / 100.0
}

/// An operator price edit such as `"149.90"`, `"*1.2"` or `"-5"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceAdjustment {
    Set(f64),
    Multiply(f64),
    Divide(f64),
    Add(f64),
    Subtract(f64),
}

impl FromStr for PriceAdjustment {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let expr = raw.trim().replace(',', ".");
        let invalid = || CoreError::InvalidPriceExpression(raw.to_string());

        let first = expr.chars().next().ok_or_else(invalid)?;
        if first.is_ascii_digit() {
            return expr.parse::<f64>().map(Self::Set).map_err(|_| invalid());
        }

        let amount = expr[first.len_utf8()..]
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid())?;
        match first {
            '*' => Ok(Self::Multiply(amount)),
            '/' if amount == 0.0 => Err(invalid()),
            '/' => Ok(Self::Divide(amount)),
            '+' => Ok(Self::Add(amount)),
            '-' => Ok(Self::Subtract(amount)),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for PriceAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set(v) => write!(f, "{v}"),
            Self::Multiply(v) => write!(f, "*{v}"),
            Self::Divide(v) => write!(f, "/{v}"),
            Self::Add(v) => write!(f, "+{v}"),
            Self::Subtract(v) => write!(f, "-{v}"),
        }
    }
}

/// Result of applying a [`PriceAdjustment`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceChange {
    pub old_price: f64,
    pub new_price: f64,
    /// Set when the new price more than doubles the old one or drops below
    /// half of it; such changes must be confirmed by an operator.
    pub requires_confirmation: bool,
}

impl PriceAdjustment {
    #[must_use]
    pub fn apply(self, current: f64) -> PriceChange {
        let new_price = match self {
            Self::Set(v) => v,
            Self::Multiply(v) => current * v,
            Self::Divide(v) => current / v,
            Self::Add(v) => current + v,
            Self::Subtract(v) => current - v,
        };
        let requires_confirmation =
            new_price > current * 2.0 || (new_price < current * 0.5 && new_price != 0.0);
        PriceChange {
            old_price: current,
            new_price,
            requires_confirmation,
        }
    }
}
