//! High level driver for a single wallet's view of the key exchange.

use crate::multisig_kex::{
    config::ThresholdConfig,
    errors::KeyExchangeError,
    message::ExchangeMessage,
    output::MultisigKeySet,
    state::{KeyExchangeState, KeyExchangeStateMessage},
    KeyExchangeStateMachine,
};
use anyhow::anyhow;
use basic_types::{ParticipantId, ParticipantMessage};
use curve::SecretKey;
use state_machine::{errors::StateMachineError, sm::StateMachineOutput, state::StateMachineMessage, StateMachine};
use std::fmt;

/// A wallet's view of an in-flight key exchange.
///
/// Wallets start by publishing [initial_info][MultisigKeyExchange::initial_info], call
/// [begin][MultisigKeyExchange::begin] once every peer's info arrived, and then relay every
/// round's broadcasts into [advance][MultisigKeyExchange::advance] until it hands back a
/// completion marker. After that [finalize][MultisigKeyExchange::finalize] yields the key
/// material.
///
/// The wire blobs carry no sender. `advance` attributes `incoming[k]` to the peer whose info
/// was at position `k` of `peer_infos` at `begin`, so callers must keep that order stable
/// across rounds.
pub struct MultisigKeyExchange {
    sm: KeyExchangeStateMachine,
    config: ThresholdConfig,
    peers: Vec<ParticipantId>,
    round: u32,
    outcome: Option<MultisigKeySet>,
}

impl MultisigKeyExchange {
    /// Build the round 1 announcement for a wallet, carrying its blinded base point.
    pub fn initial_info(spend_key: &SecretKey) -> ExchangeMessage {
        ExchangeMessage::new(1, vec![spend_key.blind().public_point().to_bytes()])
    }

    /// Start the exchange, returning the round 2 broadcast along with the driver.
    pub fn begin(
        spend_key: &SecretKey,
        peer_infos: Vec<ExchangeMessage>,
        threshold: u32,
    ) -> Result<(ExchangeMessage, Self), KeyExchangeError> {
        let mut peers = Vec::with_capacity(peer_infos.len());
        for info in &peer_infos {
            match info.payload() {
                [bytes] => peers.push(ParticipantId::from(bytes.as_slice())),
                _ => return Err(KeyExchangeError::InvalidPeerData("initial info must carry exactly one point".into())),
            }
        }
        let (state, messages) = KeyExchangeState::new(spend_key, peer_infos, threshold)?;
        let config = state.config();
        let outgoing = Self::single_broadcast(messages)?;
        let round = outgoing.round();
        tracing::debug!("started {}-of-{} exchange with {} peers", threshold, config.parties(), peers.len());
        let exchange = Self { sm: StateMachine::new(state), config, peers, round, outcome: None };
        Ok((outgoing, exchange))
    }

    /// The threshold configuration of this exchange.
    pub fn config(&self) -> ThresholdConfig {
        self.config
    }

    /// The round whose peer messages `advance` expects next.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Whether the exchange converged and can be finalized.
    pub fn is_ready(&self) -> bool {
        self.outcome.is_some()
    }

    /// Feed one round of peer broadcasts and produce the next broadcast.
    ///
    /// `incoming` must hold exactly one message per peer, in the order the peer infos were
    /// supplied at `begin`. Once the exchange converges this returns the completion marker;
    /// any error leaves the exchange unusable apart from reporting further errors.
    pub fn advance(&mut self, incoming: &[ExchangeMessage]) -> Result<ExchangeMessage, KeyExchangeError> {
        if self.outcome.is_some() || self.sm.is_finished() {
            return Err(KeyExchangeError::Internal(anyhow!("key exchange already converged")));
        }
        if incoming.len() != self.peers.len() {
            return Err(KeyExchangeError::PeerCountMismatch { expected: self.peers.len(), actual: incoming.len() });
        }

        let mut outgoing = None;
        for (peer, message) in self.peers.iter().zip(incoming) {
            let input = ParticipantMessage::new(peer.clone(), KeyExchangeStateMessage(message.clone()));
            match self.sm.handle_message(input).map_err(Self::as_exchange_error)? {
                StateMachineOutput::Messages(messages) => outgoing = Some(Self::single_broadcast(messages)?),
                StateMachineOutput::Final(key_set) => self.outcome = Some(key_set),
                StateMachineOutput::Empty => (),
            }
        }
        self.round += 1;

        match (&self.outcome, outgoing) {
            (Some(_), _) => {
                tracing::debug!("exchange converged after round {}", self.round - 1);
                Ok(ExchangeMessage::done(self.round))
            }
            (None, Some(message)) => Ok(message),
            (None, None) => Err(KeyExchangeError::Internal(anyhow!("no broadcast produced by a full round"))),
        }
    }

    /// Consume the exchange and hand out the key material.
    pub fn finalize(self) -> Result<MultisigKeySet, KeyExchangeError> {
        self.outcome.ok_or(KeyExchangeError::NotConverged)
    }

    // Protocol errors travel through the state machine wrapped in anyhow; recover the typed
    // error so callers can match on it.
    fn as_exchange_error(error: StateMachineError) -> KeyExchangeError {
        match error {
            StateMachineError::UnexpectedError(inner) => match inner.downcast::<KeyExchangeError>() {
                Ok(error) => error,
                Err(inner) => KeyExchangeError::Internal(inner),
            },
            other => KeyExchangeError::Internal(anyhow::Error::new(other)),
        }
    }

    fn single_broadcast(messages: Vec<StateMachineMessage<KeyExchangeState>>) -> Result<ExchangeMessage, KeyExchangeError> {
        let mut messages = messages.into_iter();
        match (messages.next(), messages.next()) {
            (Some(message), None) => Ok(message.into_contents().0),
            _ => Err(KeyExchangeError::Internal(anyhow!("expected exactly one broadcast"))),
        }
    }
}

impl fmt::Debug for MultisigKeyExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MultisigKeyExchange({}-of-{}, round {}, {})",
            self.config.threshold(),
            self.config.parties(),
            self.round,
            self.sm
        )
    }
}
