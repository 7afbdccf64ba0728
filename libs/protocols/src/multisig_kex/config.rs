//! Threshold configuration for an exchange.

use crate::multisig_kex::errors::KeyExchangeError;
use serde::{Deserialize, Serialize};

/// The maximum number of participants in an exchange.
///
/// The amount of derived key material grows quickly with `parties - threshold`, so exchanges
/// are capped at a size where every supported configuration stays cheap.
pub const MAX_PARTIES: u32 = 16;

/// An M-of-N threshold configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    threshold: u32,
    parties: u32,
}

impl ThresholdConfig {
    /// Construct a configuration, enforcing `2 <= threshold <= parties <= MAX_PARTIES`.
    pub fn new(threshold: u32, parties: u32) -> Result<Self, KeyExchangeError> {
        if threshold < 2 || threshold > parties || parties > MAX_PARTIES {
            return Err(KeyExchangeError::ThresholdOutOfRange);
        }
        Ok(Self { threshold, parties })
    }

    /// The number of participants needed to spend.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// The total number of participants.
    pub fn parties(&self) -> u32 {
        self.parties
    }

    /// The number of derivation levels the exchange walks through.
    pub fn kex_levels(&self) -> u32 {
        self.parties - self.threshold + 1
    }

    /// Total broadcast rounds, counting the initial announcement and the final confirmation.
    pub fn rounds_required(&self) -> u32 {
        self.kex_levels() + 1
    }
}
