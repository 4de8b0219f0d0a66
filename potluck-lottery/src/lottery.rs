use crate::error::{LotteryError, Result};
use chrono::{DateTime, Utc};
use potluck_core::{
    Address, EscrowIdentity, Event, EventSink, Ledger, LotteryRecord, RandomnessSource,
    SigningCapability, SigningContext, YieldVenue,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One pot: participants, cumulative ticket weights, lifecycle flag and
/// draw result. All funds sit in the pot's dedicated escrow account (or the
/// yield venue) while the lottery is open.
#[derive(Debug)]
pub struct Lottery {
    id: u64,
    escrow: EscrowIdentity,
    capability: SigningCapability,
    is_open: bool,
    participants: Vec<Address>,
    weights: HashMap<Address, u64>,
    total_amount: u64,
    winning_ticket: Option<u64>,
    winner: Option<Address>,
    yield_earned: u64,
    yield_claimed: bool,
    created_at: DateTime<Utc>,
}

impl Lottery {
    pub(crate) fn new(id: u64, escrow: EscrowIdentity, capability: SigningCapability) -> Self {
        Self {
            id,
            escrow,
            capability,
            is_open: true,
            participants: Vec::new(),
            weights: HashMap::new(),
            total_amount: 0,
            winning_ticket: None,
            winner: None,
            yield_earned: 0,
            yield_claimed: false,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn escrow(&self) -> &EscrowIdentity {
        &self.escrow
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn total_amount(&self) -> u64 {
        self.total_amount
    }

    pub fn participants(&self) -> &[Address] {
        &self.participants
    }

    pub fn weight_of(&self, address: &Address) -> u64 {
        self.weights.get(address).copied().unwrap_or(0)
    }

    pub fn winning_ticket(&self) -> Option<u64> {
        self.winning_ticket
    }

    pub fn winner(&self) -> Option<&Address> {
        self.winner.as_ref()
    }

    pub fn yield_earned(&self) -> u64 {
        self.yield_earned
    }

    pub fn yield_claimed(&self) -> bool {
        self.yield_claimed
    }

    /// Deposit `amount` from the caller into the pot and forward it to the
    /// yield venue. Collaborator calls run before any accounting, so a
    /// failed transfer leaves the pot untouched.
    pub async fn place_bet(
        &mut self,
        ledger: &dyn Ledger,
        venue: &dyn YieldVenue,
        events: &dyn EventSink,
        caller: &SigningContext,
        amount: u64,
    ) -> Result<()> {
        if !self.is_open {
            return Err(LotteryError::LotteryClosed(self.id));
        }
        if amount == 0 {
            return Err(LotteryError::InvalidAmount);
        }

        // Check balance before moving anything
        let available = ledger.balance_of(caller.address()).await?;
        if available < amount {
            return Err(LotteryError::InsufficientFunds {
                need: amount,
                available,
            });
        }

        ledger
            .transfer(caller, self.escrow.address(), amount)
            .await?;
        venue.deposit(&self.capability.sign_as(), amount).await?;

        let bettor = caller.address().clone();
        if let Some(weight) = self.weights.get_mut(&bettor) {
            *weight += amount;
        } else {
            self.participants.push(bettor.clone());
            self.weights.insert(bettor.clone(), amount);
        }
        self.total_amount += amount;

        tracing::info!(
            "Lottery {}: {} bet {} (pot now {})",
            self.id,
            bettor,
            amount,
            self.total_amount
        );
        events.emit(Event::Ticket {
            address: bettor,
            amount,
            lottery_id: self.id,
        });

        Ok(())
    }

    /// Close the pot: pick a winner over the cumulative ticket ranges, pull
    /// the position back from the venue, pay out the principal.
    pub async fn draw_winner(
        &mut self,
        ledger: &dyn Ledger,
        venue: &dyn YieldVenue,
        randomness: &dyn RandomnessSource,
        events: &dyn EventSink,
    ) -> Result<Address> {
        if !self.is_open {
            return Err(LotteryError::LotteryClosed(self.id));
        }
        if self.participants.is_empty() {
            return Err(LotteryError::NoPlayers(self.id));
        }

        let total_tickets = self.total_amount;
        let winning_ticket = randomness.uniform_range(total_tickets);
        let winner = self.pick_by_ticket(winning_ticket)?.clone();

        let escrow_ctx = self.capability.sign_as();
        let before = ledger.balance_of(self.escrow.address()).await?;
        venue.withdraw(&escrow_ctx).await?;
        let after = ledger.balance_of(self.escrow.address()).await?;

        // Only the surplus above principal counts as yield; a venue loss
        // clamps to zero and the winner absorbs the shortfall.
        let returned = after.saturating_sub(before);
        let yield_earned = returned.saturating_sub(total_tickets);
        if returned < total_tickets {
            tracing::warn!(
                "Lottery {}: venue returned {} of {} principal",
                self.id,
                returned,
                total_tickets
            );
        }

        let payout = total_tickets.min(after);
        ledger.transfer(&escrow_ctx, &winner, payout).await?;

        self.winning_ticket = Some(winning_ticket);
        self.winner = Some(winner.clone());
        self.yield_earned = yield_earned;
        self.is_open = false;

        tracing::info!(
            "Lottery {} closed: ticket {} of {}, winner {}, payout {}, yield {}",
            self.id,
            winning_ticket,
            total_tickets,
            winner,
            payout,
            yield_earned
        );
        events.emit(Event::Winner {
            address: winner.clone(),
            amount: payout,
            lottery_id: self.id,
        });

        Ok(winner)
    }

    /// Move the measured surplus to `to`. The principal is already paid out
    /// at this point; only `yield_earned` remains in escrow.
    pub async fn claim_yield(&mut self, ledger: &dyn Ledger, to: &Address) -> Result<u64> {
        if self.is_open {
            return Err(LotteryError::LotteryNotClosed(self.id));
        }
        if self.yield_claimed {
            return Err(LotteryError::YieldAlreadyClaimed(self.id));
        }

        if self.yield_earned > 0 {
            ledger
                .transfer(&self.capability.sign_as(), to, self.yield_earned)
                .await?;
        }
        self.yield_claimed = true;

        tracing::info!(
            "Lottery {}: yield of {} claimed by {}",
            self.id,
            self.yield_earned,
            to
        );
        Ok(self.yield_earned)
    }

    /// Cumulative-weight selection: participant `i` owns the half-open
    /// ticket range `[prefix_{i-1}, prefix_i)`; the first prefix sum
    /// strictly above the ticket wins, so ticket `total - 1` resolves to
    /// the last participant with positive weight.
    fn pick_by_ticket(&self, ticket: u64) -> Result<&Address> {
        let mut prefix = 0u64;
        for participant in &self.participants {
            prefix += self.weight_of(participant);
            if prefix > ticket {
                return Ok(participant);
            }
        }
        Err(LotteryError::Internal(format!(
            "Ticket {} outside pot of {}",
            ticket, self.total_amount
        )))
    }

    pub fn info(&self) -> LotteryInfo {
        LotteryInfo {
            id: self.id,
            escrow_address: self.escrow.address().clone(),
            is_open: self.is_open,
            total_amount: self.total_amount,
            participants: self
                .participants
                .iter()
                .map(|p| (p.clone(), self.weight_of(p)))
                .collect(),
            winning_ticket: self.winning_ticket,
            winner: self.winner.clone(),
            yield_earned: self.yield_earned,
            yield_claimed: self.yield_claimed,
            created_at: self.created_at,
        }
    }

    pub(crate) fn snapshot(&self) -> LotteryRecord {
        LotteryRecord {
            id: self.id,
            escrow_identity: self.escrow.clone(),
            escrow_secret: self.capability.secret_bytes().to_vec(),
            is_open: self.is_open,
            total_amount: self.total_amount,
            participants: self
                .participants
                .iter()
                .map(|p| (p.clone(), self.weight_of(p)))
                .collect(),
            winning_ticket: self.winning_ticket,
            winner: self.winner.clone(),
            yield_earned: self.yield_earned,
            yield_claimed: self.yield_claimed,
            created_at: self.created_at,
        }
    }

    pub(crate) fn restore(record: LotteryRecord) -> Self {
        let capability = SigningCapability::from_parts(
            record.escrow_identity.address().clone(),
            record.escrow_secret,
        );

        let mut participants = Vec::with_capacity(record.participants.len());
        let mut weights = HashMap::with_capacity(record.participants.len());
        for (address, weight) in record.participants {
            participants.push(address.clone());
            weights.insert(address, weight);
        }

        Self {
            id: record.id,
            escrow: record.escrow_identity,
            capability,
            is_open: record.is_open,
            participants,
            weights,
            total_amount: record.total_amount,
            winning_ticket: record.winning_ticket,
            winner: record.winner,
            yield_earned: record.yield_earned,
            yield_claimed: record.yield_claimed,
            created_at: record.created_at,
        }
    }
}

/// Queryable view of a lottery. Closed lotteries stay queryable forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotteryInfo {
    pub id: u64,
    pub escrow_address: Address,
    pub is_open: bool,
    pub total_amount: u64,
    pub participants: Vec<(Address, u64)>,
    pub winning_ticket: Option<u64>,
    pub winner: Option<Address>,
    pub yield_earned: u64,
    pub yield_claimed: bool,
    pub created_at: DateTime<Utc>,
}
