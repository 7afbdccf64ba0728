//! Secret scalars and hashing into the scalar field.

use crate::{errors::ScalarError, point::PublicPoint};
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use sha3::{Digest, Keccak256};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Domain tag mixed into the base secret blinding hash.
const DOMAIN_BLIND: &[u8] = b"MultisigKexV1/blind";

/// Domain tag mixed into the Diffie-Hellman derivation hash.
const DOMAIN_DERIVE: &[u8] = b"MultisigKexV1/derive";

/// Hash arbitrary bytes into the scalar field under a domain tag.
fn hash_to_scalar(domain: &[u8], data: &[u8]) -> Scalar {
    let mut hasher = Keccak256::new();
    hasher.update(domain);
    hasher.update(data);
    let digest: [u8; 32] = hasher.finalize().into();
    Scalar::from_bytes_mod_order(digest)
}

/// A secret scalar.
///
/// Instances are guaranteed to hold a canonical, non-zero scalar. The scalar is wiped from
/// memory on drop and comparisons run in constant time.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Scalar);

impl SecretKey {
    /// Construct a secret key from its canonical byte encoding.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, ScalarError> {
        let scalar = Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes)).ok_or(ScalarError::NonCanonical)?;
        if scalar == Scalar::ZERO {
            return Err(ScalarError::Zero);
        }
        Ok(Self(scalar))
    }

    /// Construct a secret key from a hex encoded canonical scalar.
    pub fn from_hex(input: &str) -> Result<Self, ScalarError> {
        let bytes = hex::decode(input).map_err(|e| ScalarError::InvalidHex(e.to_string()))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| ScalarError::InvalidHex("expected 32 bytes".into()))?;
        Self::from_bytes(bytes)
    }

    /// Generate a random secret key.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let scalar = Scalar::random(rng);
            if scalar != Scalar::ZERO {
                return Self(scalar);
            }
        }
    }

    /// The canonical byte encoding of this scalar.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// The public point for this secret, i.e. the scalar times the basepoint.
    pub fn public_point(&self) -> PublicPoint {
        PublicPoint::mul_base(&self.0)
    }

    /// Derive the blinded base secret for a key exchange.
    ///
    /// The wallet's spend scalar never enters the exchange directly; only the hash of it does,
    /// so a compromised exchange transcript cannot reveal the original key.
    pub fn blind(&self) -> Self {
        Self(hash_to_scalar(DOMAIN_BLIND, &self.0.to_bytes()))
    }

    /// Derive a new secret from this secret and a peer's public point.
    ///
    /// Both sides of the pairwise channel arrive at the same value: hashing the shared
    /// Diffie-Hellman point `self * point` is symmetric in who performs the multiplication.
    pub fn derive_from_point(&self, point: &PublicPoint) -> Self {
        let shared = point.mul_bytes(&self.0);
        Self(hash_to_scalar(DOMAIN_DERIVE, &shared))
    }

    /// Sum a collection of secrets into a single aggregated secret.
    #[allow(clippy::arithmetic_side_effects)]
    pub fn sum<'a, I>(keys: I) -> Result<Self, ScalarError>
    where
        I: IntoIterator<Item = &'a SecretKey>,
    {
        let total = keys.into_iter().fold(Scalar::ZERO, |acc, key| acc + key.0);
        if total == Scalar::ZERO {
            return Err(ScalarError::Zero);
        }
        Ok(Self(total))
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bytes().ct_eq(&other.0.to_bytes()).into()
    }
}

impl Eq for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(..)")
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for SecretKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_bytes()))
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for SecretKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_hex(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn canonical_encoding_round_trip() {
        let key = SecretKey::random(&mut OsRng);
        let decoded = SecretKey::from_bytes(key.to_bytes()).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn non_canonical_scalar_rejected() {
        assert_eq!(SecretKey::from_bytes([0xff; 32]), Err(ScalarError::NonCanonical));
    }

    #[test]
    fn zero_scalar_rejected() {
        assert_eq!(SecretKey::from_bytes([0; 32]), Err(ScalarError::Zero));
    }

    #[test]
    fn blinding_changes_the_scalar() {
        let key = SecretKey::random(&mut OsRng);
        assert_ne!(key.blind().to_bytes(), key.to_bytes());
        // Blinding is deterministic.
        assert_eq!(key.blind(), key.blind());
    }

    #[test]
    fn derivation_is_symmetric() {
        let a = SecretKey::random(&mut OsRng);
        let b = SecretKey::random(&mut OsRng);
        let from_a = a.derive_from_point(&b.public_point());
        let from_b = b.derive_from_point(&a.public_point());
        assert_eq!(from_a, from_b);
    }

    #[test]
    fn derivation_depends_on_both_sides() {
        let a = SecretKey::random(&mut OsRng);
        let b = SecretKey::random(&mut OsRng);
        let c = SecretKey::random(&mut OsRng);
        assert_ne!(a.derive_from_point(&b.public_point()), a.derive_from_point(&c.public_point()));
    }

    #[test]
    fn sum_matches_group_structure() {
        let a = SecretKey::random(&mut OsRng);
        let b = SecretKey::random(&mut OsRng);
        let total = SecretKey::sum([&a, &b]).unwrap();
        let aggregated = PublicPoint::aggregate([&a.public_point(), &b.public_point()]).unwrap();
        assert_eq!(total.public_point(), aggregated);
    }
}
