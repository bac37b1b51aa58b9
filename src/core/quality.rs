//! Data quality indicators.
//!
//! Every value delivered by the gateway carries a quality tag so the
//! application layer can distinguish trustworthy readings from stale or
//! suspect ones.

use serde::{Deserialize, Serialize};

/// Quality of a delivered value.
///
/// Successful reads and writes default to `Good`. Adapters downgrade the
/// quality when the transport reports a suspect value rather than dropping
/// the reading entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    /// Value is valid and current.
    #[default]
    Good,

    /// Value is known to be invalid (device or communication failure).
    Bad,

    /// Value may be stale or otherwise suspect.
    Uncertain,
}

impl Quality {
    /// Check if the quality is good.
    #[inline]
    pub const fn is_good(&self) -> bool {
        matches!(self, Self::Good)
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Good => "GOOD",
            Self::Bad => "BAD",
            Self::Uncertain => "UNCERTAIN",
        };
        write!(f, "{}", s)
    }
}
