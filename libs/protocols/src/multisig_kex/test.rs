//! End to end tests for the multisignature key exchange.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

use super::{
    ExchangeMessage, KeyExchangeError, KeyExchangeState, MultisigKeyExchange, MultisigKeySet,
};
use crate::simulator::symmetric::{InitializedProtocol, Protocol, SymmetricProtocolSimulator};
use anyhow::{anyhow, Error};
use basic_types::ParticipantId;
use curve::SecretKey;
use rand::rngs::OsRng;
use rstest::rstest;
use std::collections::{BTreeMap, BTreeSet};

struct KeyExchangeProtocol {
    parties: usize,
    threshold: u32,
}

impl KeyExchangeProtocol {
    fn new(parties: usize, threshold: u32) -> Self {
        Self { parties, threshold }
    }
}

struct PreparedExchange {
    wallets: Vec<(ParticipantId, SecretKey, ExchangeMessage)>,
}

impl Protocol for KeyExchangeProtocol {
    type State = KeyExchangeState;
    type PrepareOutput = PreparedExchange;

    fn prepare(&self) -> Result<PreparedExchange, Error> {
        let mut wallets = Vec::new();
        for _ in 0..self.parties {
            let spend_key = SecretKey::random(&mut OsRng);
            let info = MultisigKeyExchange::initial_info(&spend_key);
            let id = ParticipantId::from(info.payload()[0].as_slice());
            wallets.push((id, spend_key, info));
        }
        Ok(PreparedExchange { wallets })
    }

    fn participants(&self, prepare_output: &PreparedExchange) -> Vec<ParticipantId> {
        prepare_output.wallets.iter().map(|(id, ..)| id.clone()).collect()
    }

    fn initialize(
        &self,
        participant: ParticipantId,
        prepare_output: &PreparedExchange,
    ) -> Result<InitializedProtocol<KeyExchangeState>, Error> {
        let (_, spend_key, _) = prepare_output
            .wallets
            .iter()
            .find(|(id, ..)| *id == participant)
            .ok_or_else(|| anyhow!("unknown participant"))?;
        let peer_infos = prepare_output
            .wallets
            .iter()
            .filter(|(id, ..)| *id != participant)
            .map(|(.., info)| info.clone())
            .collect();
        let (state, messages) = KeyExchangeState::new(spend_key, peer_infos, self.threshold)?;
        Ok(InitializedProtocol::new(state, messages))
    }
}

fn random_spend_keys(count: usize) -> Vec<SecretKey> {
    (0..count).map(|_| SecretKey::random(&mut OsRng)).collect()
}

fn without<T: Clone>(items: &[T], index: usize) -> Vec<T> {
    items.iter().enumerate().filter(|(i, _)| *i != index).map(|(_, item)| item.clone()).collect()
}

/// Drives a full set of [MultisigKeyExchange] wallets by relaying broadcasts between them.
struct Relay {
    exchanges: Vec<MultisigKeyExchange>,
    messages: Vec<ExchangeMessage>,
    advances: usize,
}

impl Relay {
    fn begin(threshold: u32, spend_keys: &[SecretKey]) -> Self {
        let infos: Vec<_> = spend_keys.iter().map(MultisigKeyExchange::initial_info).collect();
        let mut exchanges = Vec::new();
        let mut messages = Vec::new();
        for (i, spend_key) in spend_keys.iter().enumerate() {
            let (message, exchange) = MultisigKeyExchange::begin(spend_key, without(&infos, i), threshold).unwrap();
            messages.push(message);
            exchanges.push(exchange);
        }
        Self { exchanges, messages, advances: 0 }
    }

    fn step(&mut self) {
        // Hand every wallet the other wallets' latest broadcasts, in index order to match
        // the peer order each wallet was begun with.
        let mut next = Vec::new();
        for (i, exchange) in self.exchanges.iter_mut().enumerate() {
            let incoming = without(&self.messages, i);
            next.push(exchange.advance(&incoming).unwrap());
        }
        self.messages = next;
        self.advances += 1;
    }

    fn run_to_completion(mut self) -> (Vec<MultisigKeySet>, usize) {
        while !self.exchanges.iter().all(MultisigKeyExchange::is_ready) {
            assert!(self.advances < 32, "relay did not converge");
            self.step();
        }
        assert!(self.messages.iter().all(ExchangeMessage::is_done));
        let advances = self.advances;
        let key_sets = self.exchanges.into_iter().map(|e| e.finalize().unwrap()).collect();
        (key_sets, advances)
    }
}

fn subsets_of_size(count: usize, size: usize) -> Vec<Vec<usize>> {
    let mut subsets = Vec::new();
    let mut current = Vec::new();
    fill_subsets(0, count, size, &mut current, &mut subsets);
    subsets
}

fn fill_subsets(start: usize, count: usize, size: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
    if current.len() == size {
        out.push(current.clone());
        return;
    }
    for index in start..count {
        current.push(index);
        fill_subsets(index + 1, count, size, current, out);
        current.pop();
    }
}

fn assert_consistent(key_sets: &[MultisigKeySet], threshold: u32) {
    let first = &key_sets[0];
    assert_eq!(first.config().threshold(), threshold);
    assert_eq!(first.participants().len(), key_sets.len());
    for key_set in key_sets {
        assert_eq!(key_set.shared_public_key(), first.shared_public_key());
        assert_eq!(key_set.participants(), first.participants());
    }
    for (i, left) in key_sets.iter().enumerate() {
        for right in key_sets.iter().skip(i + 1) {
            assert_ne!(left.secret_share(), right.secret_share());
        }
    }

    // The shared key must be the sum over the union of everyone's final level secrets.
    let mut unique_chain_secrets = BTreeMap::new();
    for key_set in key_sets {
        for secret in key_set.chain_secrets() {
            unique_chain_secrets.insert(secret.to_bytes(), secret.clone());
        }
    }
    let total = SecretKey::sum(unique_chain_secrets.values()).unwrap();
    assert_eq!(&total.public_point(), first.shared_public_key());

    // Every final level secret must be held by one wallet per derivation level, the members
    // of the chain it was derived through.
    let levels = key_sets.len() - threshold as usize + 1;
    let mut holder_counts: BTreeMap<[u8; 32], usize> = BTreeMap::new();
    for key_set in key_sets {
        for secret in key_set.chain_secrets() {
            *holder_counts.entry(secret.public_point().to_bytes()).or_insert(0) += 1;
        }
    }
    for (point, holders) in &holder_counts {
        assert_eq!(*holders, levels, "point {} held by {holders} wallets", hex::encode(point));
    }

    // Any threshold sized subset of wallets must jointly cover the whole aggregate.
    for subset in subsets_of_size(key_sets.len(), threshold as usize) {
        let mut secrets = BTreeMap::new();
        for index in &subset {
            for secret in key_sets[*index].chain_secrets() {
                secrets.insert(secret.to_bytes(), secret.clone());
            }
        }
        let joint = SecretKey::sum(secrets.values()).unwrap();
        assert_eq!(&joint.public_point(), first.shared_public_key(), "subset {subset:?} cannot reconstruct the key");
    }
}

#[rstest]
#[case::two_of_two(2, 2)]
#[case::two_of_three(2, 3)]
#[case::three_of_three(3, 3)]
#[case::two_of_four(2, 4)]
#[case::three_of_four(3, 4)]
#[case::four_of_four(4, 4)]
#[case::two_of_five(2, 5)]
#[case::three_of_five(3, 5)]
#[case::four_of_five(4, 5)]
#[case::five_of_five(5, 5)]
fn end_to_end(#[case] threshold: u32, #[case] parties: usize) {
    let protocol = KeyExchangeProtocol::new(parties, threshold);
    let simulator = SymmetricProtocolSimulator::new(30);
    let outputs = simulator.run_protocol(&protocol).expect("protocol run failed");
    assert_eq!(outputs.len(), parties);

    let key_sets: Vec<_> = outputs.into_iter().map(|output| output.output).collect();
    assert_consistent(&key_sets, threshold);
}

#[rstest]
#[case::two_of_two(2, 2, 1)]
#[case::three_of_three(3, 3, 1)]
#[case::two_of_three(2, 3, 2)]
#[case::two_of_four(2, 4, 3)]
fn advance_counts(#[case] threshold: u32, #[case] parties: usize, #[case] expected_advances: usize) {
    let relay = Relay::begin(threshold, &random_spend_keys(parties));
    let (key_sets, advances) = relay.run_to_completion();
    assert_eq!(advances, expected_advances);
    assert_consistent(&key_sets, threshold);
}

#[test]
fn final_level_secrets_are_shared_across_their_chains() {
    let (key_sets, _) = Relay::begin(2, &random_spend_keys(4)).run_to_completion();

    // A 2-of-4 run walks three derivation levels, so the final level holds one point per
    // ordered extension of each 3 wallet chain: 4 chains times 3 last appliers.
    let mut points = BTreeSet::new();
    for key_set in &key_sets {
        assert_eq!(key_set.chain_secrets().len(), 9);
        for secret in key_set.chain_secrets() {
            points.insert(secret.public_point());
        }
    }
    assert_eq!(points.len(), 12);
    assert_consistent(&key_sets, 2);
}

#[test]
fn participant_order_does_not_change_the_key() {
    let spend_keys = random_spend_keys(3);
    let (straight, _) = Relay::begin(2, &spend_keys).run_to_completion();

    let mut reversed_keys = spend_keys;
    reversed_keys.reverse();
    let (reversed, _) = Relay::begin(2, &reversed_keys).run_to_completion();

    assert_eq!(straight[0].shared_public_key(), reversed[0].shared_public_key());
    assert_eq!(straight[0].participants(), reversed[0].participants());
}

#[test]
fn tampered_point_is_rejected() {
    let mut relay = Relay::begin(2, &random_spend_keys(3));

    // Swap the first point of wallet 1's broadcast for the identity encoding.
    let mut identity = [0u8; 32];
    identity[0] = 1;
    let mut payload = relay.messages[1].payload().to_vec();
    payload[0] = identity;
    let tampered = ExchangeMessage::new(relay.messages[1].round(), payload);

    let incoming = vec![tampered, relay.messages[2].clone()];
    let result = relay.exchanges[0].advance(&incoming);
    assert!(matches!(result, Err(KeyExchangeError::MalformedPoint(_))), "{result:?}");

    // The failure is terminal for this wallet.
    let incoming = vec![relay.messages[1].clone(), relay.messages[2].clone()];
    let retry = relay.exchanges[0].advance(&incoming);
    assert!(matches!(retry, Err(KeyExchangeError::Internal(_))), "{retry:?}");
}

#[test]
fn conflicting_aggregate_is_rejected() {
    let mut relay = Relay::begin(2, &random_spend_keys(2));

    // With threshold == parties the first broadcast is already the aggregate confirmation.
    // Replace wallet 1's with a random point.
    let decoy = SecretKey::random(&mut OsRng).public_point();
    let forged = ExchangeMessage::new(relay.messages[1].round(), vec![decoy.to_bytes()]);
    let result = relay.exchanges[0].advance(&[forged]);
    assert!(matches!(result, Err(KeyExchangeError::InvalidPeerData(_))), "{result:?}");
}

#[test]
fn stale_round_is_rejected() {
    let spend_keys = random_spend_keys(3);
    let infos: Vec<_> = spend_keys.iter().map(MultisigKeyExchange::initial_info).collect();
    let (_, mut exchange) = MultisigKeyExchange::begin(&spend_keys[0], without(&infos, 0), 2).unwrap();

    // Replaying the round 1 infos instead of the round 2 broadcasts must fail.
    let result = exchange.advance(&without(&infos, 0));
    assert!(matches!(result, Err(KeyExchangeError::RoundMismatch { expected: 2, actual: 1 })), "{result:?}");
}

#[test]
fn wrong_peer_count_is_rejected() {
    let spend_keys = random_spend_keys(3);
    let infos: Vec<_> = spend_keys.iter().map(MultisigKeyExchange::initial_info).collect();
    let (_, mut exchange) = MultisigKeyExchange::begin(&spend_keys[0], without(&infos, 0), 2).unwrap();

    let result = exchange.advance(&[]);
    assert!(matches!(result, Err(KeyExchangeError::PeerCountMismatch { expected: 2, actual: 0 })), "{result:?}");
}

#[test]
fn finalize_before_convergence_fails() {
    let spend_keys = random_spend_keys(2);
    let infos: Vec<_> = spend_keys.iter().map(MultisigKeyExchange::initial_info).collect();
    let (_, exchange) = MultisigKeyExchange::begin(&spend_keys[0], without(&infos, 0), 2).unwrap();

    assert!(matches!(exchange.finalize(), Err(KeyExchangeError::NotConverged)));
}

#[test]
fn out_of_range_thresholds_are_rejected() {
    let spend_keys = random_spend_keys(3);
    let infos: Vec<_> = spend_keys.iter().map(MultisigKeyExchange::initial_info).collect();

    let too_low = MultisigKeyExchange::begin(&spend_keys[0], without(&infos, 0), 1);
    assert!(matches!(too_low, Err(KeyExchangeError::ThresholdOutOfRange)));

    let too_high = MultisigKeyExchange::begin(&spend_keys[0], without(&infos, 0), 4);
    assert!(matches!(too_high, Err(KeyExchangeError::ThresholdOutOfRange)));
}

#[test]
fn duplicate_peer_info_is_rejected() {
    let spend_keys = random_spend_keys(2);
    let infos: Vec<_> = spend_keys.iter().map(MultisigKeyExchange::initial_info).collect();

    let result = MultisigKeyExchange::begin(&spend_keys[0], vec![infos[1].clone(), infos[1].clone()], 2);
    assert!(matches!(result, Err(KeyExchangeError::InvalidPeerData(_))), "{result:?}");
}

#[test]
fn exchange_reports_its_state() {
    let spend_keys = random_spend_keys(3);
    let infos: Vec<_> = spend_keys.iter().map(MultisigKeyExchange::initial_info).collect();
    let (_, exchange) = MultisigKeyExchange::begin(&spend_keys[0], without(&infos, 0), 2).unwrap();

    let rendered = format!("{exchange:?}");
    assert!(rendered.contains("2-of-3"), "{rendered}");
    assert!(rendered.contains("CollectingRound"), "{rendered}");
}

#[test]
fn completion_markers_carry_the_next_round() {
    let relay = Relay::begin(2, &random_spend_keys(3));
    let config = relay.exchanges[0].config();
    let mut relay = relay;
    while !relay.exchanges.iter().all(MultisigKeyExchange::is_ready) {
        relay.step();
    }
    for message in &relay.messages {
        assert!(message.is_done());
        assert_eq!(message.round(), config.rounds_required() + 1);
    }
}
