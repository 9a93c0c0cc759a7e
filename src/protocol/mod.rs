//! License wire formats: business models, canonical payload bytes and the
//! signed envelope.

pub mod canonical;
pub mod envelope;
pub mod models;
