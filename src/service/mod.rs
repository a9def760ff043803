//! Ticketing services
//!
//! - [`TicketService`] - issuance, transfer and gate verification
//! - [`EscrowService`] - per-event escrow account lifecycle
//! - [`RefundService`] - refunds for cancelled events
//! - [`WalletService`] - nonce-challenge wallet linking
//! - [`NotificationWorker`] - queued email delivery

mod escrow;
mod notifications;
mod refunds;
mod tickets;
mod wallet;

pub use escrow::{CancellationSnapshot, EscrowRelease, EscrowService};
pub use notifications::{
    LogMailer, MailError, Mailer, NotificationWorker, OutgoingEmail, SmtpConfig, SmtpMailer,
};
pub use refunds::{RefundOutcome, RefundResult, RefundService};
pub use tickets::{IssuedTicket, TicketService};
pub use wallet::{WalletChallenge, WalletService};
