use crate::error::{CoreError, Result};
use crate::escrow::SigningContext;
use crate::types::Address;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Value-transfer primitive the lottery settles through. Transfers are
/// authorized by a signing context for the source account.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn balance_of(&self, address: &Address) -> Result<u64>;

    async fn transfer(&self, from: &SigningContext, to: &Address, amount: u64) -> Result<()>;
}

/// In-memory ledger for local simulation and tests. Unknown accounts read
/// as zero balance.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: RwLock<HashMap<Address, u64>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Faucet: credit an account out of thin air.
    pub fn credit(&self, address: &Address, amount: u64) {
        let mut balances = self.balances.write();
        *balances.entry(address.clone()).or_insert(0) += amount;
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn balance_of(&self, address: &Address) -> Result<u64> {
        Ok(self.balances.read().get(address).copied().unwrap_or(0))
    }

    async fn transfer(&self, from: &SigningContext, to: &Address, amount: u64) -> Result<()> {
        let mut balances = self.balances.write();

        let available = balances.get(from.address()).copied().unwrap_or(0);
        if available < amount {
            return Err(CoreError::InsufficientFunds {
                need: amount,
                available,
            });
        }

        *balances.entry(from.address().clone()).or_insert(0) -= amount;
        *balances.entry(to.clone()).or_insert(0) += amount;
        Ok(())
    }
}
