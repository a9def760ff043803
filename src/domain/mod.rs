//! Domain types for the ticketing core
//!
//! Payments back tickets; tickets are minted once per confirmed transaction
//! and transition `valid -> used` exactly once. Events carry the escrow
//! account that holds ticket revenue until completion or cancellation.

mod event;
mod notification;
mod payment;
mod ticket;
mod types;
mod wallet;

pub use event::*;
pub use notification::*;
pub use payment::*;
pub use ticket::*;
pub use types::*;
pub use wallet::*;
