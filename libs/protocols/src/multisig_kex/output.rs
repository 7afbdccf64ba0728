//! Output of the multisignature key exchange.

use crate::multisig_kex::config::ThresholdConfig;
use basic_types::ParticipantId;
use curve::{PublicPoint, SecretKey};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// The key material a wallet holds after a successful exchange.
///
/// All wallets in the exchange end up with the same shared public key and participant roster;
/// the secret share and the chain secrets it is the sum of are unique per wallet. The chain
/// secrets are retained because follow-on signing protocols need to know which final level
/// keys this wallet can produce.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultisigKeySet {
    config: ThresholdConfig,
    participants: Vec<ParticipantId>,
    shared_public_key: PublicPoint,
    secret_share: SecretKey,
    chain_secrets: Vec<SecretKey>,
}

impl MultisigKeySet {
    pub(crate) fn new(
        config: ThresholdConfig,
        participants: Vec<ParticipantId>,
        shared_public_key: PublicPoint,
        secret_share: SecretKey,
        chain_secrets: Vec<SecretKey>,
    ) -> Self {
        Self { config, participants, shared_public_key, secret_share, chain_secrets }
    }

    /// The threshold configuration the exchange ran under.
    pub fn config(&self) -> ThresholdConfig {
        self.config
    }

    /// The participant roster, identical on every wallet.
    pub fn participants(&self) -> &[ParticipantId] {
        &self.participants
    }

    /// The shared public spend key.
    pub fn shared_public_key(&self) -> &PublicPoint {
        &self.shared_public_key
    }

    /// This wallet's share of the spend capability.
    pub fn secret_share(&self) -> &SecretKey {
        &self.secret_share
    }

    /// The final level secrets this wallet holds.
    pub fn chain_secrets(&self) -> &[SecretKey] {
        &self.chain_secrets
    }
}

impl Display for MultisigKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MultisigKeySet({}-of-{}, shared key {})",
            self.config.threshold(),
            self.config.parties(),
            self.shared_public_key
        )
    }
}
