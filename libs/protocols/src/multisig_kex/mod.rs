//! The M-of-N multisignature key exchange protocol.
//!
//! N wallets run this protocol to end up sharing a single public spend key such that any M of
//! them can cooperate to spend. Every wallet first blinds its spend key and announces the
//! corresponding public point, then the wallets walk through `N - M + 1` levels of pairwise
//! Diffie-Hellman derivations, one broadcast round per level. The shared key is the sum over
//! the deduplicated union of everyone's final level points, and a last round confirms that all
//! wallets aggregated the same key.
//!
//! Each derivation is symmetric, so every wallet in a derivation chain can recompute the
//! chain's secret: a final level secret is held by `N - M + 1` wallets, which is what lets any
//! `M` of the `N` wallets jointly cover the whole aggregate.
//!
//! [MultisigKeyExchange] is the wallet-facing driver; [KeyExchangeState] is the underlying
//! state machine for callers that want to route messages themselves.

pub mod config;
pub mod errors;
pub mod exchange;
pub mod message;
pub mod output;
pub mod state;

pub use config::ThresholdConfig;
pub use errors::KeyExchangeError;
pub use exchange::MultisigKeyExchange;
pub use message::ExchangeMessage;
pub use output::MultisigKeySet;
pub use state::*;

#[cfg(test)]
mod test;

use state_machine::StateMachine;

/// The multisig key exchange state machine.
pub type KeyExchangeStateMachine = StateMachine<KeyExchangeState>;
