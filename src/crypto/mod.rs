//! Cryptographic utilities for the ticketing core
//!
//! Provides:
//! - Ticket signing (Ed25519) and wallet signature verification
//! - At-rest encryption for escrow secrets (AES-256-GCM)
//! - Stellar StrKey encoding for account ids and seeds

mod encrypt;
mod signing;
pub mod strkey;

pub use encrypt::*;
pub use signing::*;
