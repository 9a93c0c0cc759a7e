//! Cryptographic primitives: digests, RS256 signatures, key resolution and
//! the envelope verification pipeline.

pub mod digest;
pub mod keyring;
pub mod pipeline;
pub mod signing;
