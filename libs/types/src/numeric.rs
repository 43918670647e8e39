//! Fixed-point price and quantity scalars
//!
//! All user-visible arithmetic runs on rust_decimal: no floating point on
//! the matching path. Values serialize as strings so JSON transports cannot
//! silently lose precision.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// A strictly positive fixed-point price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(Decimal);

impl Price {
    /// # Panics
    /// Panics if `value <= 0`. Use [`Price::try_new`] on untrusted input.
    pub fn new(value: Decimal) -> Self {
        Self::try_new(value).expect("Price must be positive")
    }

    pub fn try_new(value: Decimal) -> Option<Self> {
        (value > Decimal::ZERO).then_some(Self(value))
    }

    pub fn from_u64(value: u64) -> Self {
        Self::new(Decimal::from(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Whether this price sits on the symbol's tick grid.
    pub fn is_aligned(&self, tick: Decimal) -> bool {
        tick > Decimal::ZERO && (self.0 % tick).is_zero()
    }

    /// Subtraction clamped at zero; `None` when the result would not be a
    /// valid (positive) price.
    pub fn checked_sub(&self, amount: Decimal) -> Option<Self> {
        Self::try_new(self.0 - amount)
    }
}

impl Add<Decimal> for Price {
    type Output = Price;

    fn add(self, rhs: Decimal) -> Price {
        Price::new(self.0 + rhs)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(Decimal::from_str(s)?))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Price {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let value = Decimal::from_str(&s).map_err(serde::de::Error::custom)?;
        Self::try_new(value).ok_or_else(|| serde::de::Error::custom("Price must be positive"))
    }
}

/// A non-negative fixed-point quantity.
///
/// Zero is a legal value (unfilled orders carry a zero filled quantity), but
/// order entry rejects zero-quantity intents before one is ever constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(Decimal);

impl Default for Quantity {
    fn default() -> Self {
        Self::zero()
    }
}

impl Quantity {
    /// # Panics
    /// Panics if `value <= 0`. Use [`Quantity::try_new`] on untrusted input.
    pub fn new(value: Decimal) -> Self {
        Self::try_new(value).expect("Quantity must be positive")
    }

    pub fn try_new(value: Decimal) -> Option<Self> {
        (value > Decimal::ZERO).then_some(Self(value))
    }

    pub const fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn from_u64(value: u64) -> Self {
        Self::new(Decimal::from(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Whether this quantity sits on the symbol's lot grid.
    pub fn is_aligned(&self, lot: Decimal) -> bool {
        lot > Decimal::ZERO && (self.0 % lot).is_zero()
    }

    /// `None` when `rhs` exceeds `self`; never goes negative.
    pub fn checked_sub(&self, rhs: Quantity) -> Option<Self> {
        (self.0 >= rhs.0).then(|| Self(self.0 - rhs.0))
    }

    pub fn min(self, rhs: Quantity) -> Quantity {
        if self.0 <= rhs.0 {
            self
        } else {
            rhs
        }
    }

    /// Notional value at a price.
    pub fn notional(&self, price: Price) -> Decimal {
        self.0 * price.as_decimal()
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    /// # Panics
    /// Panics on underflow. Use [`Quantity::checked_sub`] when the ordering
    /// is not already guaranteed by an invariant.
    fn sub(self, rhs: Quantity) -> Quantity {
        self.checked_sub(rhs)
            .expect("Quantity subtraction underflow")
    }
}

impl FromStr for Quantity {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(Decimal::from_str(s)?))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Quantity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let value = Decimal::from_str(&s).map_err(serde::de::Error::custom)?;
        // Zero is allowed here: filled quantities round-trip through serde.
        if value >= Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(serde::de::Error::custom("Quantity cannot be negative"))
        }
    }
}
