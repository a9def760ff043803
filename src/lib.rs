//! Stellar Ticketing Library
//!
//! Event ticketing on the Stellar network: signed ticket issuance against
//! confirmed payments, single-use gate verification, per-event escrow
//! accounts and refunds for cancelled events.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (payments, tickets, events, users)
//! - [`crypto`] - Ticket signing, StrKey encoding, secret encryption
//! - [`infra`] - Storage traits and implementations (PostgreSQL, Redis, in-memory)
//! - [`service`] - Ticketing, escrow, refund and wallet services
//! - [`auth`] - Authentication (JWT)
//! - [`api`] - REST API routes
//! - [`server`] - Configuration and HTTP server bootstrap

pub mod api;
pub mod auth;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod server;
pub mod service;

// Re-export commonly used types
pub use domain::{
    Event, EventId, EventStatus, Payment, PaymentId, PaymentStatus, Ticket, TicketId,
    TicketPayload, TicketStatus, User, UserId,
};

pub use infra::{LedgerClient, Result, TicketingError};

pub use service::{EscrowService, RefundService, TicketService, WalletService};
