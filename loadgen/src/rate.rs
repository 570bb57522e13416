use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("rate must be a number within [0, 1], got {0:?}")]
pub struct InvalidRate(pub String);

/// A share within `[0, 1]`: the duplicate rate of a batch, or the tolerance
/// allowed around it. NaN is rejected.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Rate(f64);

impl Rate {
    pub fn new(rate: f64) -> Result<Self, InvalidRate> {
        if (0.0..=1.0).contains(&rate) {
            Ok(Rate(rate))
        } else {
            Err(InvalidRate(rate.to_string()))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// `floor(size × rate)`
    pub fn duplicates_for(self, size: usize) -> usize {
        let duplicates = (size as f64 * self.0).floor() as usize;
        duplicates.min(size)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0 * 100.0)
    }
}

impl FromStr for Rate {
    type Err = InvalidRate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rate = s
            .trim()
            .parse::<f64>()
            .map_err(|_| InvalidRate(s.to_owned()))?;
        Rate::new(rate)
    }
}
