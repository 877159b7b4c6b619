pub mod errors;

pub use errors::{HaloError, HaloErrorCategory, HaloResult};

use std::fmt::{Display, Formatter};

/// Non-fatal conditions reported alongside a successful run.
#[derive(Debug, Clone, PartialEq)]
pub enum TabulationWarning {
    /// Work could not be split evenly: `pending` redshifts across `workers`.
    UnevenLoad { pending: usize, workers: usize },
    /// No on-disk profile table; profiles are evaluated on the fly.
    ProfileTableMissing { path: String },
    /// A checkpoint log ended in a partially written record that was dropped.
    TruncatedCheckpoint { path: String, line: usize },
}

impl Display for TabulationWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnevenLoad { pending, workers } => write!(
                f,
                "uneven load: {} redshifts and {} workers",
                pending, workers
            ),
            Self::ProfileTableMissing { path } => write!(
                f,
                "did not find profile table '{}'; profiles will be generated on the fly",
                path
            ),
            Self::TruncatedCheckpoint { path, line } => write!(
                f,
                "dropped partially written checkpoint record at '{}' line {}",
                path, line
            ),
        }
    }
}

/// Which side of a halo-model integral is being computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HaloTerm {
    OneHalo,
    TwoHalo,
}

impl TryFrom<u8> for HaloTerm {
    type Error = HaloError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::OneHalo),
            2 => Ok(Self::TwoHalo),
            other => Err(HaloError::configuration(
                "CONFIG.HALO_TERM",
                format!("halo-model term must be 1 or 2, got {}", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HaloErrorCategory, HaloTerm, TabulationWarning};

    #[test]
    fn halo_term_accepts_only_one_and_two() {
        assert_eq!(HaloTerm::try_from(1).expect("term 1"), HaloTerm::OneHalo);
        assert_eq!(HaloTerm::try_from(2).expect("term 2"), HaloTerm::TwoHalo);

        let error = HaloTerm::try_from(3).expect_err("term 3 should fail");
        assert_eq!(error.category(), HaloErrorCategory::Configuration);
        assert_eq!(error.placeholder(), "CONFIG.HALO_TERM");
    }

    #[test]
    fn uneven_load_warning_mentions_counts() {
        let warning = TabulationWarning::UnevenLoad {
            pending: 7,
            workers: 3,
        };
        assert_eq!(warning.to_string(), "uneven load: 7 redshifts and 3 workers");
    }
}
