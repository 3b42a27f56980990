use std::{fmt::{self, Display, Formatter}, ops::{Add, Deref}, str::FromStr};

mod error;
pub use error::ParsePositionError;

/// 1-based, inclusive base-pair position on a chromosome.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position(pub u64);

impl FromStr for Position {
    type Err = ParsePositionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| ParsePositionError(s.to_string()))
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Position {
    #[must_use]
    pub fn into_inner(self) -> u64 {
        self.0
    }

    /// Subtract `rhs` base pairs, clamping at zero.
    #[must_use]
    pub fn saturating_sub(self, rhs: u64) -> Self {
        Self(self.0.saturating_sub(rhs))
    }
}

impl From<u64> for Position {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Position> for u64 {
    fn from(val: Position) -> u64 {
        val.0
    }
}

impl Add<u64> for Position {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Deref for Position {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
