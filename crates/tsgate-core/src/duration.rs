//! Flux duration literals (`1m`, `1h30m`, `500ms`).
//!
//! Task schedules are handed to the engine as Flux duration literals, so they
//! are validated here before any task script is rendered.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static WHOLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[0-9]+(?:ns|us|µs|ms|mo|s|m|h|d|w|y))+$").unwrap());
static PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]+)(ns|us|µs|ms|mo|s|m|h|d|w|y)").unwrap());

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// A validated, strictly positive Flux duration literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FluxDuration {
    literal: String,
}

impl FluxDuration {
    /// Parse a literal, rejecting anything that is not a positive duration.
    pub fn parse(literal: &str) -> Result<Self> {
        let literal = literal.trim();
        if !WHOLE.is_match(literal) {
            return Err(Error::validation(format!(
                "invalid duration literal: {:?}",
                literal
            )));
        }

        let mut nanos: u128 = 0;
        for cap in PART.captures_iter(literal) {
            let magnitude: u128 = cap[1]
                .parse()
                .map_err(|_| Error::validation(format!("duration out of range: {}", literal)))?;
            let unit = unit_nanos(&cap[2]);
            nanos = magnitude
                .checked_mul(unit)
                .and_then(|n| nanos.checked_add(n))
                .ok_or_else(|| Error::validation(format!("duration out of range: {}", literal)))?;
        }

        if nanos == 0 {
            return Err(Error::validation(format!(
                "duration must be strictly positive: {}",
                literal
            )));
        }

        Ok(Self {
            literal: literal.to_string(),
        })
    }

    pub(crate) fn new_unchecked(literal: &str) -> Self {
        Self {
            literal: literal.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.literal
    }
}

fn unit_nanos(unit: &str) -> u128 {
    match unit {
        "ns" => 1,
        "us" | "µs" => 1_000,
        "ms" => 1_000_000,
        "s" => NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        "h" => 3_600 * NANOS_PER_SEC,
        "d" => 86_400 * NANOS_PER_SEC,
        "w" => 7 * 86_400 * NANOS_PER_SEC,
        "mo" => 30 * 86_400 * NANOS_PER_SEC,
        "y" => 365 * 86_400 * NANOS_PER_SEC,
        _ => 0,
    }
}

impl fmt::Display for FluxDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal)
    }
}

impl FromStr for FluxDuration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FluxDuration {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<FluxDuration> for String {
    fn from(value: FluxDuration) -> Self {
        value.literal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_units() {
        for literal in ["1m", "500ms", "2h", "1mo", "3w", "10us", "1y"] {
            assert_eq!(FluxDuration::parse(literal).unwrap().as_str(), literal);
        }
        assert_eq!(FluxDuration::parse(" 5s ").unwrap().as_str(), "5s");
    }

    #[test]
    fn test_compound_literal() {
        let d = FluxDuration::parse("1h30m").unwrap();
        assert_eq!(d.to_string(), "1h30m");
        assert_eq!("1h30m".parse::<FluxDuration>().unwrap(), d);
    }

    #[test]
    fn test_rejects_overflow() {
        assert!(FluxDuration::parse("100000000000000000000000y").is_err());
    }

    #[test]
    fn test_rejects_zero_and_garbage() {
        assert!(FluxDuration::parse("0m").is_err());
        assert!(FluxDuration::parse("0s0m").is_err());
        assert!(FluxDuration::parse("").is_err());
        assert!(FluxDuration::parse("-1m").is_err());
        assert!(FluxDuration::parse("1 m").is_err());
        assert!(FluxDuration::parse("1m\") |> drop()").is_err());
    }
}
