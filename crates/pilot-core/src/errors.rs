//! Error taxonomy shared by every Pilot crate.
//!
//! Each crate defines its own [`thiserror`] enum; all of them classify into
//! an [`ErrorKind`] so the layer above the core can decide how to react:
//!
//! - [`ErrorKind::InvariantViolation`]: a caller broke a precondition
//!   (e.g. creating a fork on an already-forked session). Always raised.
//! - [`ErrorKind::StaleReference`]: an action names something that no
//!   longer exists, usually because of a concurrent clear. Handled as a
//!   silent no-op wherever it can occur.
//! - [`ErrorKind::ProbeFailure`]: an endpoint's chain id could not be
//!   determined. The endpoint stays unclassified.
//! - [`ErrorKind::Host`]: an external collaborator (rule sink, fork
//!   executor, key-value store) reported a failure.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of an error for handling decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Programmer error; fatal to the calling operation.
    InvariantViolation,
    /// Reference to an entity that no longer exists; expected under races.
    StaleReference,
    /// Endpoint chain id undeterminable; degrades gracefully.
    ProbeFailure,
    /// External collaborator failure.
    Host,
}

impl ErrorKind {
    /// Whether errors of this kind must be surfaced to the caller.
    ///
    /// Stale references and probe failures are absorbed by the core.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::InvariantViolation | Self::Host)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvariantViolation => write!(f, "invariant_violation"),
            Self::StaleReference => write!(f, "stale_reference"),
            Self::ProbeFailure => write!(f, "probe_failure"),
            Self::Host => write!(f, "host"),
        }
    }
}

/// Implemented by every crate-level error enum.
pub trait Classify {
    /// Taxonomy bucket for this error.
    fn kind(&self) -> ErrorKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_snake_case() {
        assert_eq!(ErrorKind::InvariantViolation.to_string(), "invariant_violation");
        assert_eq!(ErrorKind::StaleReference.to_string(), "stale_reference");
        assert_eq!(ErrorKind::ProbeFailure.to_string(), "probe_failure");
        assert_eq!(ErrorKind::Host.to_string(), "host");
    }

    #[test]
    fn serde_matches_display() {
        let json = serde_json::to_string(&ErrorKind::ProbeFailure).unwrap();
        assert_eq!(json, "\"probe_failure\"");
    }

    #[test]
    fn only_invariant_and_host_are_fatal() {
        assert!(ErrorKind::InvariantViolation.is_fatal());
        assert!(ErrorKind::Host.is_fatal());
        assert!(!ErrorKind::StaleReference.is_fatal());
        assert!(!ErrorKind::ProbeFailure.is_fatal());
    }
}
