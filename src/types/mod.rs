//! Shared vocabulary types.
//!
//! # Granularities
//!
//! Every mention is scored against four label sets that share one feature
//! space but use different fixed label-embedding matrices:
//!
//! | Granularity | Used for | Backpropagated |
//! |-------------|----------|----------------|
//! | [`Granularity::Train`] | training loss, dev evaluation, prediction | yes |
//! | [`Granularity::Test`] | overall test evaluation | no |
//! | [`Granularity::Level1`] | coarse (level-1) evaluation | no |
//! | [`Granularity::Level2`] | fine (level-2) evaluation | no |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// One of the four label-set views scored by the projector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Training label set.
    Train,
    /// Test label set (overall evaluation).
    Test,
    /// First level of the type hierarchy.
    Level1,
    /// Second level of the type hierarchy.
    Level2,
}

impl Granularity {
    /// All granularities, in label-embedding file order.
    pub const ALL: [Granularity; 4] = [
        Granularity::Train,
        Granularity::Test,
        Granularity::Level1,
        Granularity::Level2,
    ];

    /// Stable name, also the tensor key in the label-embedding file.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Train => "train",
            Granularity::Test => "test",
            Granularity::Level1 => "level1",
            Granularity::Level2 => "level2",
        }
    }

    /// Position in [`Granularity::ALL`].
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Granularity::Train => 0,
            Granularity::Test => 1,
            Granularity::Level1 => 2,
            Granularity::Level2 => 3,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "train" => Ok(Granularity::Train),
            "test" => Ok(Granularity::Test),
            "level1" | "level_1" => Ok(Granularity::Level1),
            "level2" | "level_2" => Ok(Granularity::Level2),
            other => Err(Error::parse(format!("unknown granularity: {other}"))),
        }
    }
}

/// Optimizer used for parameter updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LrMethod {
    /// Adam (AdamW with zero weight decay).
    #[default]
    Adam,
    /// Plain stochastic gradient descent.
    Sgd,
}

impl FromStr for LrMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "adam" => Ok(LrMethod::Adam),
            "sgd" => Ok(LrMethod::Sgd),
            other => Err(Error::parse(format!("unknown lr_method: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_roundtrip_names() {
        for g in Granularity::ALL {
            assert_eq!(g.as_str().parse::<Granularity>().unwrap(), g);
            assert_eq!(Granularity::ALL[g.index()], g);
        }
        assert_eq!("LEVEL_1".parse::<Granularity>().unwrap(), Granularity::Level1);
        assert!("level3".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_lr_method_parse() {
        assert_eq!("Adam".parse::<LrMethod>().unwrap(), LrMethod::Adam);
        assert_eq!("sgd".parse::<LrMethod>().unwrap(), LrMethod::Sgd);
        assert!("adagrad".parse::<LrMethod>().is_err());
        assert_eq!(LrMethod::default(), LrMethod::Adam);
    }
}
