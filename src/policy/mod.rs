//! License policy: tier lattice, request rules, lifecycle and access checks.

pub mod access;
pub mod status;
pub mod tiers;
pub mod validation;
