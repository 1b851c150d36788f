//! Fixed-point token amounts.
//!
//! Prices and deal costs are carried as integer atto-units (10^-18 of a
//! whole token) so every cost computation is exact and reproducible.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional decimal digits in a [`TokenAmount`].
pub const TOKEN_DECIMALS: u32 = 18;

/// Atto-units per whole token.
pub const ATTO_PER_TOKEN: u128 = 1_000_000_000_000_000_000;

/// Errors returned when parsing a decimal amount string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    /// Input was empty or only a decimal point.
    #[error("empty amount")]
    Empty,

    /// Input contained a character that is not a digit or a single '.'.
    #[error("invalid amount: {0}")]
    Invalid(String),

    /// More fractional digits than the fixed-point precision allows.
    #[error("amount {0} has more than 18 fractional digits")]
    TooPrecise(String),

    /// Value does not fit in 128 bits of atto-units.
    #[error("amount {0} overflows")]
    Overflow(String),
}

/// Non-negative token amount in atto-units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    pub const fn from_atto(atto: u128) -> Self {
        Self(atto)
    }

    pub const fn as_atto(&self) -> u128 {
        self.0
    }

    pub fn from_whole(tokens: u64) -> Self {
        Self((tokens as u128).saturating_mul(ATTO_PER_TOKEN))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl FromStr for TokenAmount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(AmountParseError::Empty);
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(AmountParseError::Invalid(s.to_string()));
        }
        if frac.len() > TOKEN_DECIMALS as usize {
            return Err(AmountParseError::TooPrecise(s.to_string()));
        }

        let overflow = || AmountParseError::Overflow(s.to_string());

        let whole_atto = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .map_err(|_| overflow())?
                .checked_mul(ATTO_PER_TOKEN)
                .ok_or_else(overflow)?
        };

        let frac_atto = if frac.is_empty() {
            0
        } else {
            let scale = 10u128.pow(TOKEN_DECIMALS - frac.len() as u32);
            frac.parse::<u128>().map_err(|_| overflow())? * scale
        };

        whole_atto
            .checked_add(frac_atto)
            .map(Self)
            .ok_or_else(overflow)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / ATTO_PER_TOKEN;
        let frac = self.0 % ATTO_PER_TOKEN;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:018}", frac);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct TokenAmountVisitor;

impl<'de> Visitor<'de> for TokenAmountVisitor {
    type Value = TokenAmount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative decimal token amount as a string or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(TokenAmount::from_whole(v))
    }

    // TOML hands every integer over as i64.
    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map(TokenAmount::from_whole)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    // `f64`'s Display is the shortest round-trip form and never uses an
    // exponent, so its text parses like a quoted amount.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if !v.is_finite() || v.is_sign_negative() {
            return Err(E::invalid_value(de::Unexpected::Float(v), &self));
        }
        v.to_string().parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TokenAmountVisitor)
    }
}
