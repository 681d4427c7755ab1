use serde::{Deserialize, Serialize};
use simple_error::SimpleError;
use thiserror::Error;

pub type RadSimResult<T> = Result<T, RadSimError>;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RadSimError {
    /// The network definition is malformed. Raised while building a snapshot.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("unknown effect kind: {0}")]
    UnknownEffectKind(String),

    /// Effect or experiment parameters are out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Engine bug, e.g. a dead neuron observed spiking. Never corrected silently.
    #[error("simulation invariant violated: {0}")]
    SimulationInvariantViolation(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl RadSimError {
    pub(crate) fn topology(err: SimpleError) -> Self {
        Self::InvalidTopology(err.as_str().to_owned())
    }

    pub(crate) fn parameter(err: SimpleError) -> Self {
        Self::InvalidParameter(err.as_str().to_owned())
    }

    pub(crate) fn invariant(err: SimpleError) -> Self {
        Self::SimulationInvariantViolation(err.as_str().to_owned())
    }

    pub fn is_config_error(&self) -> bool {
        !matches!(self, Self::SimulationInvariantViolation(_))
    }
}
