//! Monetary amounts accepted by the gateway.
//!
//! Any type that can report its value in minor units (cents) can be charged.
//! Plain integers are taken to be minor units of `USD`; `Money` or a host's
//! own money type carries its own currency.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CURRENCY: &str = "USD";

/// Capability of being sent to the API as an amount.
pub trait Amount {
    /// Value in the currency's minor unit.
    fn minor_units(&self) -> i64;

    /// ISO 4217 code.
    fn currency(&self) -> &str {
        DEFAULT_CURRENCY
    }
}

macro_rules! integer_amount {
    ($($t:ty),*) => {
        $(
            impl Amount for $t {
                fn minor_units(&self) -> i64 {
                    i64::from(*self)
                }
            }
        )*
    };
}

integer_amount!(i64, i32, i16, u32, u16, u8);

impl<A: Amount + ?Sized> Amount for &A {
    fn minor_units(&self) -> i64 {
        (**self).minor_units()
    }

    fn currency(&self) -> &str {
        (**self).currency()
    }
}

/// An amount in minor units with an explicit currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    minor_units: i64,
    currency: String,
}

impl Money {
    pub fn new(minor_units: i64, currency: impl Into<String>) -> Self {
        Self {
            minor_units,
            currency: currency.into().to_ascii_uppercase(),
        }
    }

    pub fn usd(minor_units: i64) -> Self {
        Self::new(minor_units, DEFAULT_CURRENCY)
    }
}

impl Amount for Money {
    fn minor_units(&self) -> i64 {
        self.minor_units
    }

    fn currency(&self) -> &str {
        &self.currency
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.minor_units, self.currency)
    }
}
