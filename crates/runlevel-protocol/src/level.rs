use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operating mode of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Runlevel {
    /// Terminal state: listeners and the control socket are closed.
    Halt,
    /// Administrative access only; no public listeners.
    Single,
    /// Intermediate level reserved for application use.
    Transitional,
    /// Public listeners are open.
    Multi,
    /// Application-defined listening level.
    Custom,
}

impl Runlevel {
    /// All levels in ascending order.
    pub const ALL: [Self; 5] = [
        Self::Halt,
        Self::Single,
        Self::Transitional,
        Self::Multi,
        Self::Custom,
    ];

    /// Numeric tag used on the wire and in configuration.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Halt => 0,
            Self::Single => 1,
            Self::Transitional => 2,
            Self::Multi => 3,
            Self::Custom => 4,
        }
    }

    /// Returns `true` for levels that keep the listener set open.
    #[must_use]
    pub const fn is_listening(self) -> bool {
        matches!(self, Self::Multi | Self::Custom)
    }
}

impl TryFrom<u8> for Runlevel {
    type Error = RunlevelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Halt),
            1 => Ok(Self::Single),
            2 => Ok(Self::Transitional),
            3 => Ok(Self::Multi),
            4 => Ok(Self::Custom),
            other => Err(RunlevelError::OutOfRange(other)),
        }
    }
}

impl From<Runlevel> for u8 {
    fn from(level: Runlevel) -> Self {
        level.as_u8()
    }
}

impl std::str::FromStr for Runlevel {
    type Err = RunlevelError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let value: u8 = input
            .trim()
            .parse()
            .map_err(|_| RunlevelError::NotANumber(input.to_owned()))?;
        Self::try_from(value)
    }
}

impl fmt::Display for Runlevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.as_u8())
    }
}

/// Errors raised when a runlevel cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunlevelError {
    /// The numeric tag is outside 0..=4.
    #[error("runlevel {0} is out of range (0-4)")]
    OutOfRange(u8),
    /// The text is not a number.
    #[error("invalid runlevel '{0}'")]
    NotANumber(String),
}
