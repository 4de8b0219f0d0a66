//! Custodial ticket-weighted lottery over the Potluck escrow core.
//!
//! Participants deposit into a shared pot held by a dedicated escrow
//! account; the pot rides an external yield venue until the draw, where one
//! participant wins the principal with probability proportional to their
//! cumulative deposit. Residual yield goes to the administrator.

pub mod error;
pub mod lottery;
pub mod registry;

pub use error::{LotteryError, Result};
pub use lottery::{Lottery, LotteryInfo};
pub use registry::LotteryRegistry;
