//! Storage format identifiers.

use crate::error::SparseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage layouts a [`crate::DynamicMatrix`] can switch between.
///
/// The discriminant is the state index used by the tuners, so the order is
/// part of the public contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FormatId {
    Coo = 0,
    Csr = 1,
    Dia = 2,
    Ell = 3,
}

impl FormatId {
    pub const COUNT: usize = 4;
    pub const ALL: [FormatId; FormatId::COUNT] =
        [FormatId::Coo, FormatId::Csr, FormatId::Dia, FormatId::Ell];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            FormatId::Coo => "COO",
            FormatId::Csr => "CSR",
            FormatId::Dia => "DIA",
            FormatId::Ell => "ELL",
        }
    }
}

impl TryFrom<usize> for FormatId {
    type Error = SparseError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        FormatId::ALL
            .get(value)
            .copied()
            .ok_or(SparseError::UnknownFormat(value))
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_through_try_from() {
        for format in FormatId::ALL {
            assert_eq!(FormatId::try_from(format.index()).unwrap(), format);
        }
        assert!(matches!(
            FormatId::try_from(FormatId::COUNT),
            Err(SparseError::UnknownFormat(4))
        ));
    }
}
