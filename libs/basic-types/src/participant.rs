//! A participant id abstraction.

use std::{
    fmt,
    fmt::{Debug, Display, Formatter},
    str::FromStr,
};
use thiserror::Error;

/// Participant ID decode error.
#[derive(Error, Debug)]
#[error("invalid participant id: {0}")]
pub struct InvalidParticipantId(String);

/// Represents a participant in a key exchange.
///
/// Identifiers are content-addressed: a participant is identified by the byte
/// encoding of its base public point, so every participant derives the same
/// identifier for a given peer without any out-of-band coordination.
#[derive(Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParticipantId(Vec<u8>);

impl FromStr for ParticipantId {
    type Err = InvalidParticipantId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| InvalidParticipantId(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Display for ParticipantId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl Debug for ParticipantId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "ParticipantId({})", self)
    }
}

impl AsRef<[u8]> for ParticipantId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl From<Vec<u8>> for ParticipantId {
    fn from(data: Vec<u8>) -> Self {
        ParticipantId(data)
    }
}

impl From<&[u8]> for ParticipantId {
    fn from(data: &[u8]) -> Self {
        ParticipantId(data.to_vec())
    }
}

/// A message that was sent by a particular participant.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParticipantMessage<T> {
    /// The sender participant id.
    pub sender: ParticipantId,

    /// The message itself.
    pub message: T,
}

impl<T> ParticipantMessage<T> {
    /// Construct a new participant message.
    pub fn new(sender: ParticipantId, message: T) -> Self {
        Self { sender, message }
    }

    /// Decompose this message into its sender and inner message.
    pub fn into_parts(self) -> (ParticipantId, T) {
        (self.sender, self.message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn id_equality_by_bytes() {
        let id_1 = ParticipantId::from(vec![1, 2, 3, 4]);
        let id_2 = ParticipantId::from(vec![1, 2, 3, 4]);
        let id_3 = ParticipantId::from(vec![1, 2, 3]);
        assert_eq!(id_1, id_2);
        assert_eq!(id_1.as_ref(), &[1, 2, 3, 4]);
        assert_ne!(id_1, id_3);
    }

    #[test]
    fn hex_round_trip() {
        let id = ParticipantId::from(vec![0xde, 0xad, 0xbe, 0xef]);
        let parsed: ParticipantId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn invalid_hex_rejected() {
        assert!("zz".parse::<ParticipantId>().is_err());
    }
}
