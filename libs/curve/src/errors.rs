//! Errors produced when validating curve material.

use thiserror::Error;

/// An invalid compressed point encoding.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointError {
    /// The encoding does not decompress to a curve point.
    #[error("encoding is not a curve point")]
    NotOnCurve,

    /// The encoding is not the canonical one for its point.
    #[error("encoding is not canonical")]
    NonCanonicalEncoding,

    /// The point is the identity element.
    #[error("point is the identity")]
    Identity,

    /// The point has a small order component.
    #[error("point has a small order component")]
    TorsionComponent,
}

/// An invalid scalar encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScalarError {
    /// The encoding is not a reduced scalar.
    #[error("scalar encoding is not canonical")]
    NonCanonical,

    /// The scalar is zero.
    #[error("scalar is zero")]
    Zero,

    /// The hex input could not be decoded.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}
