//! Potluck SDK - Core collaborators for the custodial lottery
//!
//! This library provides the escrow, ledger, yield-venue, randomness and
//! event interfaces the lottery core settles through, together with
//! in-memory reference implementations for local simulation and tests.

pub mod error;
pub mod escrow;
pub mod events;
pub mod ledger;
pub mod random;
pub mod storage;
pub mod types;
pub mod venue;

pub use error::{CoreError, Result};
pub use escrow::{create_escrow, EscrowIdentity, SigningCapability, SigningContext};
pub use events::{Event, EventSink, MemorySink, TracingSink};
pub use ledger::{InMemoryLedger, Ledger};
pub use random::{FixedSequence, RandomnessSource, ThreadRngSource};
pub use storage::{LotteryRecord, LotteryStore, RegistryRecord, Storage};
pub use types::Address;
pub use venue::{FixedRateVenue, YieldVenue};
