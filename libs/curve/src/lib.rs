//! Curve25519 primitives for the multisignature key exchange.
//!
//! This crate wraps `curve25519-dalek` behind two types: [SecretKey], a canonical non-zero
//! scalar that zeroizes on drop, and [PublicPoint], a validated point on the prime-order
//! subgroup. All hashing into the scalar field uses Keccak-256 with a domain tag.

#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::iterator_step_by_zero,
    clippy::invalid_regex,
    clippy::string_slice,
    clippy::unimplemented,
    clippy::todo
)]

pub mod errors;
pub mod point;
pub mod scalar;

pub use errors::{PointError, ScalarError};
pub use point::PublicPoint;
pub use scalar::SecretKey;
