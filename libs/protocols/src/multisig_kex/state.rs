//! Multisignature key exchange state machine.

use crate::multisig_kex::{
    config::ThresholdConfig, errors::KeyExchangeError, message::ExchangeMessage, output::MultisigKeySet,
};
use basic_types::{jar::ContributionJar, ParticipantId, ParticipantMessage};
use curve::{PublicPoint, SecretKey};
use serde::{Deserialize, Serialize};
use state_machine::{
    state::{Recipient, StateMachineMessage},
    StateMachineState, StateMachineStateExt, StateMachineStateOutput, StateMachineStateResult,
};
use std::collections::{BTreeMap, BTreeSet};

/// Each of the key exchange state definitions.
pub mod states {
    use super::*;

    /// We are collecting the derived points peers broadcast for the current round.
    pub struct CollectingRound {
        /// The threshold configuration of this exchange.
        pub config: ThresholdConfig,

        /// The round whose messages we are collecting.
        pub round: u32,

        /// The full participant roster, sorted by identity.
        pub roster: Vec<ParticipantId>,

        /// The peers we exchange messages with, in the order their infos were supplied.
        pub peers: Vec<ParticipantId>,

        /// The base points of every peer, used to recognize derivations extending our chains.
        pub peer_points: Vec<PublicPoint>,

        /// Our blinded base secret, the constant side of every derivation we apply ourselves.
        pub base: SecretKey,

        /// Every previous level secret we hold, keyed by its public point.
        pub ancestor_secrets: BTreeMap<PublicPoint, SecretKey>,

        /// The current level secrets we derived ourselves, keyed by their public points.
        pub derived_secrets: BTreeMap<PublicPoint, SecretKey>,

        /// The per peer payloads received for the current round.
        pub contributions: ContributionJar<Vec<PublicPoint>>,
    }

    /// We aggregated the shared key and are waiting for peers to confirm theirs matches.
    pub struct CollectingVerification {
        /// The round whose messages we are collecting.
        pub round: u32,

        /// The peers we exchange messages with.
        pub peers: Vec<ParticipantId>,

        /// The key material this wallet converged to.
        pub key_set: MultisigKeySet,

        /// The aggregate each peer claims to have computed.
        pub contributions: ContributionJar<PublicPoint>,
    }
}

/// The state of the key exchange protocol.
pub enum KeyExchangeState {
    /// We are collecting a derivation round.
    CollectingRound(states::CollectingRound),

    /// We are collecting aggregate confirmations.
    CollectingVerification(states::CollectingVerification),
}

use KeyExchangeState::*;

impl std::fmt::Display for KeyExchangeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectingRound(state) => write!(f, "CollectingRound({})", state.round),
            CollectingVerification(state) => write!(f, "CollectingVerification({})", state.round),
        }
    }
}

impl KeyExchangeState {
    /// Constructs a new key exchange state.
    ///
    /// # Arguments
    /// - `spend_key` - This wallet's secret spend key. Only its blinded form enters the exchange.
    /// - `peer_infos` - The round 1 announcement of every other participant.
    /// - `threshold` - The number of participants that must cooperate to spend.
    ///
    /// Returns the initial state along with the broadcast for round 2.
    pub fn new(
        spend_key: &SecretKey,
        peer_infos: Vec<ExchangeMessage>,
        threshold: u32,
    ) -> Result<(Self, Vec<StateMachineMessage<Self>>), KeyExchangeError> {
        let parties = u32::try_from(peer_infos.len())
            .ok()
            .and_then(|count| count.checked_add(1))
            .ok_or(KeyExchangeError::ThresholdOutOfRange)?;
        let config = ThresholdConfig::new(threshold, parties)?;
        let base = spend_key.blind();
        let own_point = base.public_point();
        let own_id = ParticipantId::from(own_point.as_bytes().as_slice());

        let mut peer_points = Vec::with_capacity(peer_infos.len());
        for info in &peer_infos {
            if info.round() != 1 {
                return Err(KeyExchangeError::InvalidPeerData(format!(
                    "initial info tagged for round {}",
                    info.round()
                )));
            }
            match info.payload() {
                [bytes] => peer_points.push(PublicPoint::from_bytes(bytes)?),
                _ => return Err(KeyExchangeError::InvalidPeerData("initial info must carry exactly one point".into())),
            }
        }
        let peers: Vec<ParticipantId> =
            peer_points.iter().map(|point| ParticipantId::from(point.as_bytes().as_slice())).collect();

        // The roster is sorted by identity so every participant derives the same order no
        // matter how the infos were passed around. Identities are the base point encodings,
        // so a duplicate base point collapses the roster and is caught here.
        let roster: BTreeSet<ParticipantId> = peers.iter().cloned().chain([own_id]).collect();
        if roster.len() != parties as usize {
            return Err(KeyExchangeError::InvalidPeerData("duplicate base point across participants".into()));
        }
        let roster: Vec<ParticipantId> = roster.into_iter().collect();

        if config.kex_levels() == 1 {
            // With threshold == parties the base points are already the final level: skip
            // straight to aggregation and broadcast the confirmation.
            let final_points: BTreeSet<PublicPoint> = peer_points.iter().copied().chain([own_point]).collect();
            let key_set = Self::build_key_set(config, roster, &final_points, vec![base])?;
            let message = ExchangeMessage::new(2, vec![key_set.shared_public_key().to_bytes()]);
            let state = CollectingVerification(states::CollectingVerification {
                round: 2,
                peers: peers.clone(),
                contributions: ContributionJar::new(peers.clone()),
                key_set,
            });
            Ok((state, Self::broadcast(peers, message)))
        } else {
            let mut derived_secrets = BTreeMap::new();
            for point in &peer_points {
                let secret = base.derive_from_point(point);
                derived_secrets.insert(secret.public_point(), secret);
            }
            let message = ExchangeMessage::new(2, derived_secrets.keys().map(PublicPoint::to_bytes).collect());
            let ancestor_secrets = BTreeMap::from([(own_point, base.clone())]);
            let state = CollectingRound(states::CollectingRound {
                config,
                round: 2,
                roster,
                peers: peers.clone(),
                peer_points,
                base,
                ancestor_secrets,
                derived_secrets,
                contributions: ContributionJar::new(peers.clone()),
            });
            Ok((state, Self::broadcast(peers, message)))
        }
    }

    /// The threshold configuration this exchange runs under.
    pub fn config(&self) -> ThresholdConfig {
        match self {
            CollectingRound(state) => state.config,
            CollectingVerification(state) => state.key_set.config(),
        }
    }

    /// The round this exchange is currently collecting.
    pub fn round(&self) -> u32 {
        match self {
            CollectingRound(state) => state.round,
            CollectingVerification(state) => state.round,
        }
    }

    fn transition_collecting_round(state: states::CollectingRound) -> StateMachineStateResult<Self> {
        let states::CollectingRound {
            config,
            round,
            roster,
            peers,
            peer_points,
            base,
            ancestor_secrets,
            derived_secrets,
            contributions,
        } = state;
        // Peers broadcast overlapping sets whenever a chain is shared, so collapse everything
        // received this round into one set first.
        let received: BTreeSet<PublicPoint> = contributions.into_elements().flat_map(|(_, points)| points).collect();
        let next_round = round + 1;

        // Our secrets for this level are the ones we derived ourselves plus the ones peers
        // produced by extending a chain we belong to. A peer applying its base `b` to our
        // ancestor point `P` broadcast the point of `Hs(b * P)`, and `Hs(b * P) = Hs(p * B)`
        // with `p` our ancestor secret, so we recompute those secrets from our side of the
        // exchange and match them against the received points.
        let mut level_secrets = derived_secrets;
        for ancestor in ancestor_secrets.values() {
            for point in &peer_points {
                let secret = ancestor.derive_from_point(point);
                let public = secret.public_point();
                if received.contains(&public) {
                    level_secrets.insert(public, secret);
                }
            }
        }

        if round < config.kex_levels() {
            let fresh: Vec<&PublicPoint> = received.iter().filter(|point| !level_secrets.contains_key(point)).collect();
            if fresh.is_empty() {
                return Err(KeyExchangeError::InvalidPeerData("peers contributed no new points".into()).into());
            }
            let mut next_secrets = BTreeMap::new();
            for point in fresh {
                let secret = base.derive_from_point(point);
                next_secrets.insert(secret.public_point(), secret);
            }
            let message = ExchangeMessage::new(next_round, next_secrets.keys().map(PublicPoint::to_bytes).collect());
            let next_state = CollectingRound(states::CollectingRound {
                config,
                round: next_round,
                roster,
                peers: peers.clone(),
                peer_points,
                base,
                ancestor_secrets: level_secrets,
                derived_secrets: next_secrets,
                contributions: ContributionJar::new(peers.clone()),
            });
            Ok(StateMachineStateOutput::Messages(next_state, Self::broadcast(peers, message)))
        } else {
            // Final level: the shared key is the sum over the union of everyone's points, and
            // our share is the sum over every final level secret we hold.
            let mut final_points = received;
            final_points.extend(level_secrets.keys().copied());
            let chain_secrets: Vec<SecretKey> = level_secrets.into_values().collect();
            let key_set = Self::build_key_set(config, roster, &final_points, chain_secrets)?;
            let message = ExchangeMessage::new(next_round, vec![key_set.shared_public_key().to_bytes()]);
            let next_state = CollectingVerification(states::CollectingVerification {
                round: next_round,
                peers: peers.clone(),
                contributions: ContributionJar::new(peers.clone()),
                key_set,
            });
            Ok(StateMachineStateOutput::Messages(next_state, Self::broadcast(peers, message)))
        }
    }

    fn build_key_set(
        config: ThresholdConfig,
        roster: Vec<ParticipantId>,
        final_points: &BTreeSet<PublicPoint>,
        chain_secrets: Vec<SecretKey>,
    ) -> Result<MultisigKeySet, KeyExchangeError> {
        let shared = PublicPoint::aggregate(final_points).map_err(|_| KeyExchangeError::DegenerateKey)?;
        let share = SecretKey::sum(&chain_secrets).map_err(|_| KeyExchangeError::DegenerateKey)?;
        Ok(MultisigKeySet::new(config, roster, shared, share, chain_secrets))
    }

    fn broadcast(peers: Vec<ParticipantId>, message: ExchangeMessage) -> Vec<StateMachineMessage<Self>> {
        vec![StateMachineMessage::<Self>::new(Recipient::Multiple(peers), KeyExchangeStateMessage(message))]
    }

    fn check_round(expected: u32, message: &ExchangeMessage) -> Result<(), KeyExchangeError> {
        if message.round() != expected {
            return Err(KeyExchangeError::RoundMismatch { expected, actual: message.round() });
        }
        if message.is_done() {
            return Err(KeyExchangeError::InvalidPeerData("unexpected completion marker".into()));
        }
        Ok(())
    }
}

impl StateMachineState for KeyExchangeState {
    type RecipientId = ParticipantId;
    type InputMessage = ParticipantMessage<KeyExchangeStateMessage>;
    type OutputMessage = KeyExchangeStateMessage;
    type FinalResult = MultisigKeySet;

    fn is_completed(&self) -> bool {
        match self {
            CollectingRound(state) => state.contributions.is_full(),
            CollectingVerification(state) => state.contributions.is_full(),
        }
    }

    fn try_next(self) -> StateMachineStateResult<Self> {
        match self {
            CollectingRound(state) => Self::transition_collecting_round(state),
            CollectingVerification(state) => Ok(StateMachineStateOutput::Final(state.key_set)),
        }
    }

    fn handle_message(mut self, message: Self::InputMessage) -> StateMachineStateResult<Self> {
        let (sender, KeyExchangeStateMessage(message)) = message.into_parts();
        match &mut self {
            CollectingRound(state) => {
                Self::check_round(state.round, &message)?;
                let mut points = Vec::with_capacity(message.payload().len());
                for bytes in message.payload() {
                    points.push(PublicPoint::from_bytes(bytes).map_err(KeyExchangeError::MalformedPoint)?);
                }
                state
                    .contributions
                    .add(sender, points)
                    .map_err(|e| KeyExchangeError::InvalidPeerData(e.to_string()))?;
            }
            CollectingVerification(state) => {
                Self::check_round(state.round, &message)?;
                let point = match message.payload() {
                    [bytes] => PublicPoint::from_bytes(bytes).map_err(KeyExchangeError::MalformedPoint)?,
                    _ => {
                        return Err(KeyExchangeError::InvalidPeerData(
                            "confirmation must carry exactly one point".into(),
                        )
                        .into());
                    }
                };
                if point != *state.key_set.shared_public_key() {
                    return Err(KeyExchangeError::InvalidPeerData(format!(
                        "participant {sender} aggregated a different shared key"
                    ))
                    .into());
                }
                state
                    .contributions
                    .add(sender, point)
                    .map_err(|e| KeyExchangeError::InvalidPeerData(e.to_string()))?;
            }
        }
        self.advance_if_completed()
    }
}

/// A message for the key exchange state machine carrying a peer's broadcast blob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyExchangeStateMessage(pub ExchangeMessage);
