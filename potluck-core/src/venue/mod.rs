use crate::error::{CoreError, Result};
use crate::escrow::{create_escrow, EscrowIdentity, SigningCapability, SigningContext};
use crate::ledger::{InMemoryLedger, Ledger};
use crate::types::Address;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// External facility escrowed funds sit in between deposit and draw.
/// Withdrawal always returns the entire position; no partial withdrawal.
#[async_trait]
pub trait YieldVenue: Send + Sync {
    async fn deposit(&self, from: &SigningContext, amount: u64) -> Result<()>;

    async fn withdraw(&self, to: &SigningContext) -> Result<()>;
}

/// Simulated venue paying a fixed rate in signed basis points on the
/// deposited principal. A negative rate models a venue loss.
pub struct FixedRateVenue {
    ledger: Arc<InMemoryLedger>,
    identity: EscrowIdentity,
    capability: SigningCapability,
    rate_bps: i64,
    positions: RwLock<HashMap<Address, u64>>,
}

impl FixedRateVenue {
    pub fn new(ledger: Arc<InMemoryLedger>, rate_bps: i64) -> Result<Self> {
        let (identity, capability) = create_escrow(b"fixed-rate-venue")?;
        Ok(Self {
            ledger,
            identity,
            capability,
            rate_bps,
            positions: RwLock::new(HashMap::new()),
        })
    }

    pub fn address(&self) -> &Address {
        self.identity.address()
    }
}

#[async_trait]
impl YieldVenue for FixedRateVenue {
    async fn deposit(&self, from: &SigningContext, amount: u64) -> Result<()> {
        self.ledger
            .transfer(from, self.identity.address(), amount)
            .await?;

        let mut positions = self.positions.write();
        *positions.entry(from.address().clone()).or_insert(0) += amount;
        Ok(())
    }

    async fn withdraw(&self, to: &SigningContext) -> Result<()> {
        let principal = {
            let mut positions = self.positions.write();
            positions
                .remove(to.address())
                .ok_or_else(|| CoreError::venue(format!("No position for {}", to.address())))?
        };

        let accrued = principal as i128 * self.rate_bps as i128 / 10_000;
        let payout = (principal as i128 + accrued).max(0) as u64;

        if payout > principal {
            // Yield is minted into the venue's own account before paying out.
            self.ledger.credit(self.identity.address(), payout - principal);
        }
        if payout < principal {
            tracing::warn!(
                "Venue returned {} of {} principal to {}",
                payout,
                principal,
                to.address()
            );
        }

        self.ledger
            .transfer(&self.capability.sign_as(), to.address(), payout)
            .await?;
        Ok(())
    }
}
