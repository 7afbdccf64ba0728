//! Errors for the multisignature key exchange.

use curve::PointError;
use state_machine::errors::StateMachineError;
use thiserror::Error;

/// An error while running a multisignature key exchange.
#[derive(Error, Debug)]
pub enum KeyExchangeError {
    /// A peer sent data that decodes but is semantically wrong.
    #[error("invalid peer data: {0}")]
    InvalidPeerData(String),

    /// The threshold configuration is out of range.
    #[error("threshold configuration out of range")]
    ThresholdOutOfRange,

    /// The number of supplied messages does not match the number of peers.
    #[error("expected {expected} peer messages, got {actual}")]
    PeerCountMismatch {
        /// How many messages the exchange needs per round.
        expected: usize,
        /// How many messages were supplied.
        actual: usize,
    },

    /// A message was tagged for a different round than the current one.
    #[error("expected a round {expected} message, got round {actual}")]
    RoundMismatch {
        /// The round the exchange is currently collecting.
        expected: u32,
        /// The round the message was tagged with.
        actual: u32,
    },

    /// A payload entry is not a valid curve point.
    #[error("malformed point: {0}")]
    MalformedPoint(#[from] PointError),

    /// The exchange has not converged yet.
    #[error("key exchange has not converged")]
    NotConverged,

    /// The aggregated key degenerated to an unusable value.
    #[error("aggregated key is degenerate")]
    DegenerateKey,

    /// An internal invariant was broken.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

// Lets protocol errors cross the generic state machine boundary with `?`. The driver on the
// other side downcasts them back into this type.
impl From<KeyExchangeError> for StateMachineError {
    fn from(error: KeyExchangeError) -> Self {
        StateMachineError::UnexpectedError(anyhow::Error::new(error))
    }
}
