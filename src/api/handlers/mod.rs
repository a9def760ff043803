//! REST API handlers organized by domain.

pub mod escrow;
pub mod health;
pub mod refunds;
pub mod tickets;
pub mod wallet;

pub use escrow::*;
pub use health::*;
pub use refunds::*;
pub use tickets::*;
pub use wallet::*;
