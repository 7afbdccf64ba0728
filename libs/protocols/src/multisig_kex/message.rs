//! The wire blob exchanged between wallets.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// The envelope tag identifying the protocol and wire version.
pub const ENVELOPE_TAG: &str = "MultisigKexV1";

/// A single broadcast blob in the key exchange.
///
/// The payload is a list of compressed point encodings. Structural validity (the envelope,
/// the round tag, the payload being whole 32 byte chunks) is enforced when parsing; whether
/// each chunk is a usable curve point is only decided when the exchange consumes the message,
/// so a blob can be relayed by untrusted middleware without it needing curve arithmetic.
///
/// A message with an empty payload is the completion marker a wallet emits once its exchange
/// has converged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeMessage {
    round: u32,
    payload: Vec<[u8; 32]>,
}

impl ExchangeMessage {
    /// Construct a message for the given round.
    pub fn new(round: u32, payload: Vec<[u8; 32]>) -> Self {
        Self { round, payload }
    }

    /// Construct the completion marker for the given round.
    pub fn done(round: u32) -> Self {
        Self { round, payload: Vec::new() }
    }

    /// The round this message belongs to.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// The point encodings carried by this message.
    pub fn payload(&self) -> &[[u8; 32]] {
        &self.payload
    }

    /// Whether this is a completion marker.
    pub fn is_done(&self) -> bool {
        self.payload.is_empty()
    }
}

impl fmt::Display for ExchangeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ENVELOPE_TAG}:{}:", self.round)?;
        for chunk in &self.payload {
            write!(f, "{}", hex::encode(chunk))?;
        }
        Ok(())
    }
}

/// An error decoding an [ExchangeMessage] from its text envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageDecodeError {
    /// The envelope tag is missing or belongs to an unsupported version.
    #[error("unsupported message envelope")]
    UnsupportedEnvelope,

    /// The round tag is not a number.
    #[error("invalid round tag")]
    InvalidRound,

    /// The payload is not a whole number of hex encoded 32 byte chunks.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl FromStr for ExchangeMessage {
    type Err = MessageDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let tag = parts.next().ok_or(MessageDecodeError::UnsupportedEnvelope)?;
        if tag != ENVELOPE_TAG {
            return Err(MessageDecodeError::UnsupportedEnvelope);
        }
        let round =
            parts.next().ok_or(MessageDecodeError::InvalidRound)?.parse().map_err(|_| MessageDecodeError::InvalidRound)?;
        let payload = parts.next().ok_or_else(|| MessageDecodeError::InvalidPayload("missing payload".into()))?;
        let bytes = hex::decode(payload).map_err(|e| MessageDecodeError::InvalidPayload(e.to_string()))?;
        let chunks = bytes.chunks_exact(32);
        if !chunks.remainder().is_empty() {
            return Err(MessageDecodeError::InvalidPayload("truncated point encoding".into()));
        }
        let payload = chunks
            .map(|chunk| chunk.try_into().map_err(|_| MessageDecodeError::InvalidPayload("bad chunk".into())))
            .collect::<Result<Vec<[u8; 32]>, _>>()?;
        Ok(Self { round, payload })
    }
}
