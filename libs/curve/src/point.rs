//! Validated points on the prime-order subgroup.

use crate::errors::PointError;
use curve25519_dalek::{
    edwards::{CompressedEdwardsY, EdwardsPoint},
    scalar::Scalar,
    traits::{Identity, IsIdentity},
};
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

/// A validated public point.
///
/// Construction from bytes enforces that the encoding decompresses, is canonical, is not the
/// identity and carries no small order component. Anything crossing a trust boundary goes
/// through [PublicPoint::from_bytes], so the rest of the exchange can assume every point it
/// holds is a usable Diffie-Hellman base.
#[derive(Clone, Copy)]
pub struct PublicPoint {
    point: EdwardsPoint,
    compressed: CompressedEdwardsY,
}

impl PublicPoint {
    /// Validate a compressed encoding and construct a point from it.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, PointError> {
        let compressed = CompressedEdwardsY(*bytes);
        let point = compressed.decompress().ok_or(PointError::NotOnCurve)?;
        if point.compress().as_bytes() != bytes {
            return Err(PointError::NonCanonicalEncoding);
        }
        if point.is_identity() {
            return Err(PointError::Identity);
        }
        if !point.is_torsion_free() {
            return Err(PointError::TorsionComponent);
        }
        Ok(Self { point, compressed })
    }

    /// The basepoint multiplied by the given scalar.
    pub(crate) fn mul_base(scalar: &Scalar) -> Self {
        let point = EdwardsPoint::mul_base(scalar);
        Self { point, compressed: point.compress() }
    }

    /// The compressed encoding of this point multiplied by the given scalar.
    #[allow(clippy::arithmetic_side_effects)]
    pub(crate) fn mul_bytes(&self, scalar: &Scalar) -> [u8; 32] {
        (scalar * self.point).compress().to_bytes()
    }

    /// Sum a collection of points into their aggregate.
    ///
    /// Fails if the aggregate degenerates to the identity, which would make the resulting
    /// shared key unspendable.
    #[allow(clippy::arithmetic_side_effects)]
    pub fn aggregate<'a, I>(points: I) -> Result<Self, PointError>
    where
        I: IntoIterator<Item = &'a PublicPoint>,
    {
        let total = points.into_iter().fold(EdwardsPoint::identity(), |acc, point| acc + point.point);
        if total.is_identity() {
            return Err(PointError::Identity);
        }
        Ok(Self { point: total, compressed: total.compress() })
    }

    /// The compressed encoding of this point.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.compressed.as_bytes()
    }

    /// The compressed encoding of this point, by value.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.compressed.to_bytes()
    }
}

impl PartialEq for PublicPoint {
    fn eq(&self, other: &Self) -> bool {
        self.compressed == other.compressed
    }
}

impl Eq for PublicPoint {}

impl PartialOrd for PublicPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compressed.as_bytes().cmp(other.compressed.as_bytes())
    }
}

impl Hash for PublicPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.compressed.as_bytes().hash(state);
    }
}

impl fmt::Display for PublicPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.compressed.as_bytes()))
    }
}

impl fmt::Debug for PublicPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicPoint({})", hex::encode(self.compressed.as_bytes()))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for PublicPoint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.as_bytes()))
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for PublicPoint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| D::Error::custom("expected 32 bytes"))?;
        Self::from_bytes(&bytes).map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod test {
    use super::*;
    use crate::SecretKey;
    use rand::rngs::OsRng;

    #[test]
    fn encoding_round_trip() {
        let point = SecretKey::random(&mut OsRng).public_point();
        let decoded = PublicPoint::from_bytes(point.as_bytes()).unwrap();
        assert_eq!(point, decoded);
    }

    #[test]
    fn identity_rejected() {
        let mut bytes = [0u8; 32];
        bytes[0] = 1;
        assert_eq!(PublicPoint::from_bytes(&bytes), Err(PointError::Identity));
    }

    #[test]
    fn torsion_point_rejected() {
        // The order 4 point with y = 0.
        let bytes = [0u8; 32];
        assert_eq!(PublicPoint::from_bytes(&bytes), Err(PointError::TorsionComponent));
    }

    #[test]
    fn non_canonical_encoding_rejected() {
        // y = p, which decompresses as y = 0 but re-encodes differently.
        let mut bytes = [0xffu8; 32];
        bytes[0] = 0xed;
        bytes[31] = 0x7f;
        assert_eq!(PublicPoint::from_bytes(&bytes), Err(PointError::NonCanonicalEncoding));
    }

    #[test]
    fn garbage_encoding_rejected() {
        // Roughly half of all y coordinates don't decompress. Find one deterministically so
        // the assertion exercises the same input on every run.
        let mut bytes = [4u8; 32];
        for candidate in 0u8..=255 {
            bytes[0] = candidate;
            if CompressedEdwardsY(bytes).decompress().is_none() {
                assert_eq!(PublicPoint::from_bytes(&bytes), Err(PointError::NotOnCurve));
                return;
            }
        }
        panic!("no invalid encoding found");
    }

    #[test]
    fn aggregate_of_opposite_points_is_degenerate() {
        let key = SecretKey::random(&mut OsRng).public_point();
        let negated = {
            let point = -key.point;
            PublicPoint { point, compressed: point.compress() }
        };
        assert_eq!(PublicPoint::aggregate([&key, &negated]), Err(PointError::Identity));
    }

    #[test]
    fn ordering_follows_encodings() {
        let a = SecretKey::random(&mut OsRng).public_point();
        let b = SecretKey::random(&mut OsRng).public_point();
        assert_eq!(a.cmp(&b), a.as_bytes().cmp(b.as_bytes()));
    }
}
