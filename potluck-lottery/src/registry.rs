use crate::error::{LotteryError, Result};
use crate::lottery::{Lottery, LotteryInfo};
use parking_lot::RwLock;
use potluck_core::{
    create_escrow, Address, EscrowIdentity, EventSink, Ledger, LotteryStore, RandomnessSource,
    RegistryRecord, SigningCapability, SigningContext, Storage, YieldVenue,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Owns every lottery and mediates all external operations by id lookup.
/// The registry's own escrow identity is the administrator principal; it
/// never custodies pot funds.
pub struct LotteryRegistry {
    storage: Arc<Storage>,
    admin: EscrowIdentity,
    admin_capability: SigningCapability,
    ledger: Arc<dyn Ledger>,
    venue: Arc<dyn YieldVenue>,
    randomness: Arc<dyn RandomnessSource>,
    events: Arc<dyn EventSink>,
    inner: RwLock<Inner>,
}

struct Inner {
    next_id: u64,
    lotteries: HashMap<u64, Arc<Mutex<Lottery>>>,
}

impl LotteryRegistry {
    pub async fn new(
        data_dir: &Path,
        ledger: Arc<dyn Ledger>,
        venue: Arc<dyn YieldVenue>,
        randomness: Arc<dyn RandomnessSource>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let db_path = data_dir.join("potluck.db");
        let storage = Arc::new(Storage::new(&db_path).await?);

        let store = LotteryStore::new(&storage);
        let (admin, admin_capability) = match store.load_registry().await? {
            Some(record) => {
                let capability = SigningCapability::from_parts(
                    record.admin_identity.address().clone(),
                    record.admin_secret,
                );
                (record.admin_identity, capability)
            }
            None => {
                let (identity, capability) = create_escrow(b"potluck-admin")?;
                store
                    .save_registry(&RegistryRecord {
                        admin_identity: identity.clone(),
                        admin_secret: capability.secret_bytes().to_vec(),
                    })
                    .await?;
                (identity, capability)
            }
        };

        // Lotteries persist forever, so the next id is one past the highest
        // stored one.
        let mut next_id = 0;
        let mut lotteries = HashMap::new();
        for record in store.list_lotteries().await? {
            let lottery = Lottery::restore(record);
            next_id = next_id.max(lottery.id() + 1);
            lotteries.insert(lottery.id(), Arc::new(Mutex::new(lottery)));
        }
        if !lotteries.is_empty() {
            tracing::info!("Loaded {} persisted lotteries", lotteries.len());
        }

        Ok(Self {
            storage,
            admin,
            admin_capability,
            ledger,
            venue,
            randomness,
            events,
            inner: RwLock::new(Inner { next_id, lotteries }),
        })
    }

    pub fn admin_address(&self) -> &Address {
        self.admin.address()
    }

    /// Signing context for the administrator account.
    pub fn admin_signer(&self) -> SigningContext {
        self.admin_capability.sign_as()
    }

    /// Register a new pot with a fresh escrow account. Ids are allocated
    /// strictly increasing and never reused. Anyone may open a lottery.
    pub async fn create_lottery(&self, caller: &Address) -> Result<u64> {
        let (id, handle) = {
            let mut inner = self.inner.write();
            let id = inner.next_id;
            let (escrow, capability) = create_escrow(&id.to_le_bytes())?;
            let handle = Arc::new(Mutex::new(Lottery::new(id, escrow, capability)));
            inner.lotteries.insert(id, handle.clone());
            inner.next_id += 1;
            (id, handle)
        };

        let lottery = handle.lock().await;
        LotteryStore::new(&self.storage)
            .save_lottery(&lottery.snapshot())
            .await?;

        tracing::info!(
            "Created lottery {} for {} with escrow {}",
            id,
            caller,
            lottery.escrow().address()
        );
        Ok(id)
    }

    pub async fn place_bet(
        &self,
        caller: &SigningContext,
        lottery_id: u64,
        amount: u64,
    ) -> Result<()> {
        let handle = self.lookup(lottery_id)?;
        let mut lottery = handle.lock().await;

        lottery
            .place_bet(
                self.ledger.as_ref(),
                self.venue.as_ref(),
                self.events.as_ref(),
                caller,
                amount,
            )
            .await?;

        LotteryStore::new(&self.storage)
            .save_lottery(&lottery.snapshot())
            .await?;
        Ok(())
    }

    /// Trigger the draw. Permissionless: any caller may close a lottery
    /// once it has participants.
    pub async fn draw_winner(&self, caller: &Address, lottery_id: u64) -> Result<Address> {
        let handle = self.lookup(lottery_id)?;
        let mut lottery = handle.lock().await;

        tracing::info!("Draw on lottery {} triggered by {}", lottery_id, caller);
        let winner = lottery
            .draw_winner(
                self.ledger.as_ref(),
                self.venue.as_ref(),
                self.randomness.as_ref(),
                self.events.as_ref(),
            )
            .await?;

        LotteryStore::new(&self.storage)
            .save_lottery(&lottery.snapshot())
            .await?;
        Ok(winner)
    }

    /// Move a closed lottery's yield to the administrator. Only the
    /// administrator may claim, and only once per lottery.
    pub async fn claim_yield(&self, caller: &SigningContext, lottery_id: u64) -> Result<u64> {
        if caller.address() != self.admin.address() {
            return Err(LotteryError::Unauthorized);
        }

        let handle = self.lookup(lottery_id)?;
        let mut lottery = handle.lock().await;

        let claimed = lottery
            .claim_yield(self.ledger.as_ref(), caller.address())
            .await?;

        LotteryStore::new(&self.storage)
            .save_lottery(&lottery.snapshot())
            .await?;
        Ok(claimed)
    }

    pub async fn lottery_info(&self, lottery_id: u64) -> Result<LotteryInfo> {
        let handle = self.lookup(lottery_id)?;
        let lottery = handle.lock().await;
        Ok(lottery.info())
    }

    pub fn list_lotteries(&self) -> Vec<u64> {
        let inner = self.inner.read();
        let mut ids: Vec<u64> = inner.lotteries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn lottery_count(&self) -> usize {
        self.inner.read().lotteries.len()
    }

    fn lookup(&self, lottery_id: u64) -> Result<Arc<Mutex<Lottery>>> {
        self.inner
            .read()
            .lotteries
            .get(&lottery_id)
            .cloned()
            .ok_or(LotteryError::NotFound(lottery_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use potluck_core::{Event, FixedRateVenue, FixedSequence, InMemoryLedger, MemorySink};
    use tempfile::tempdir;

    struct Harness {
        registry: LotteryRegistry,
        ledger: Arc<InMemoryLedger>,
        events: Arc<MemorySink>,
        _dir: tempfile::TempDir,
    }

    async fn harness(rate_bps: i64, draws: &[u64]) -> Harness {
        let dir = tempdir().unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        let venue = Arc::new(FixedRateVenue::new(ledger.clone(), rate_bps).unwrap());
        let randomness = Arc::new(FixedSequence::new(draws.iter().copied()));
        let events = Arc::new(MemorySink::new());

        let registry = LotteryRegistry::new(
            dir.path(),
            ledger.clone(),
            venue,
            randomness,
            events.clone(),
        )
        .await
        .unwrap();

        Harness {
            registry,
            ledger,
            events,
            _dir: dir,
        }
    }

    fn player(ledger: &InMemoryLedger, seed: &[u8], funds: u64) -> (Address, SigningContext) {
        let (identity, capability) = create_escrow(seed).unwrap();
        ledger.credit(identity.address(), funds);
        (identity.address().clone(), capability.sign_as())
    }

    #[tokio::test]
    async fn ids_are_strictly_increasing_and_gap_free() {
        let h = harness(0, &[]).await;

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(h.registry.create_lottery(&Address::new("operator")).await.unwrap());
        }

        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(h.registry.list_lotteries(), vec![0, 1, 2]);
        assert_eq!(h.registry.lottery_count(), 3);
    }

    #[tokio::test]
    async fn end_to_end_forced_draw_pays_weighted_winner() {
        let h = harness(0, &[150]).await;
        let (alice, alice_ctx) = player(&h.ledger, b"alice", 1_000);
        let (bob, bob_ctx) = player(&h.ledger, b"bob", 1_000);
        let (charlie, _) = player(&h.ledger, b"charlie", 0);

        let id = h.registry.create_lottery(&Address::new("operator")).await.unwrap();
        h.registry.place_bet(&alice_ctx, id, 100).await.unwrap();
        h.registry.place_bet(&bob_ctx, id, 300).await.unwrap();

        // Ticket 150 falls in bob's range [100, 400); anyone may trigger.
        let winner = h.registry.draw_winner(&charlie, id).await.unwrap();
        assert_eq!(winner, bob);

        assert_eq!(h.ledger.balance_of(&alice).await.unwrap(), 900);
        assert_eq!(h.ledger.balance_of(&bob).await.unwrap(), 1_100);

        let info = h.registry.lottery_info(id).await.unwrap();
        assert!(!info.is_open);
        assert_eq!(info.total_amount, 400);
        assert_eq!(info.winning_ticket, Some(150));
        assert_eq!(info.winner, Some(bob.clone()));
        assert_eq!(info.yield_earned, 0);

        assert_eq!(
            h.events.events(),
            vec![
                Event::Ticket {
                    address: alice,
                    amount: 100,
                    lottery_id: id
                },
                Event::Ticket {
                    address: bob.clone(),
                    amount: 300,
                    lottery_id: id
                },
                Event::Winner {
                    address: bob,
                    amount: 400,
                    lottery_id: id
                },
            ]
        );
    }

    #[tokio::test]
    async fn pot_equals_sum_of_weights_after_every_bet() {
        let h = harness(0, &[]).await;
        let (alice, alice_ctx) = player(&h.ledger, b"alice", 1_000);
        let (_, bob_ctx) = player(&h.ledger, b"bob", 1_000);

        let id = h.registry.create_lottery(&Address::new("operator")).await.unwrap();

        for (ctx, amount) in [(&alice_ctx, 100), (&bob_ctx, 250), (&alice_ctx, 50)] {
            h.registry.place_bet(ctx, id, amount).await.unwrap();

            let info = h.registry.lottery_info(id).await.unwrap();
            let weight_sum: u64 = info.participants.iter().map(|(_, w)| w).sum();
            assert_eq!(info.total_amount, weight_sum);
        }

        // Repeat bettor is upserted, not appended
        let info = h.registry.lottery_info(id).await.unwrap();
        assert_eq!(info.participants.len(), 2);
        assert_eq!(info.participants[0], (alice, 150));
        assert_eq!(info.total_amount, 400);
    }

    #[tokio::test]
    async fn second_draw_is_rejected() {
        let h = harness(0, &[0, 0]).await;
        let (alice, alice_ctx) = player(&h.ledger, b"alice", 100);

        let id = h.registry.create_lottery(&Address::new("operator")).await.unwrap();
        h.registry.place_bet(&alice_ctx, id, 100).await.unwrap();
        h.registry.draw_winner(&alice, id).await.unwrap();

        let err = h.registry.draw_winner(&alice, id).await.unwrap_err();
        assert!(matches!(err, LotteryError::LotteryClosed(i) if i == id));

        // Winner keeps exactly one payout
        assert_eq!(h.ledger.balance_of(&alice).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn draw_without_players_is_rejected() {
        let h = harness(0, &[]).await;
        let (alice, _) = player(&h.ledger, b"alice", 0);

        let id = h.registry.create_lottery(&Address::new("operator")).await.unwrap();
        let err = h.registry.draw_winner(&alice, id).await.unwrap_err();
        assert!(matches!(err, LotteryError::NoPlayers(i) if i == id));
    }

    #[tokio::test]
    async fn unknown_lottery_is_not_found() {
        let h = harness(0, &[]).await;
        let (alice, alice_ctx) = player(&h.ledger, b"alice", 100);

        assert!(matches!(
            h.registry.place_bet(&alice_ctx, 99, 10).await.unwrap_err(),
            LotteryError::NotFound(99)
        ));
        assert!(matches!(
            h.registry.draw_winner(&alice, 99).await.unwrap_err(),
            LotteryError::NotFound(99)
        ));
        let admin_ctx = h.registry.admin_signer();
        assert!(matches!(
            h.registry.claim_yield(&admin_ctx, 99).await.unwrap_err(),
            LotteryError::NotFound(99)
        ));
        assert!(matches!(
            h.registry.lottery_info(99).await.unwrap_err(),
            LotteryError::NotFound(99)
        ));
    }

    #[tokio::test]
    async fn zero_bet_is_rejected() {
        let h = harness(0, &[]).await;
        let (_, alice_ctx) = player(&h.ledger, b"alice", 100);

        let id = h.registry.create_lottery(&Address::new("operator")).await.unwrap();
        let err = h.registry.place_bet(&alice_ctx, id, 0).await.unwrap_err();
        assert!(matches!(err, LotteryError::InvalidAmount));

        let info = h.registry.lottery_info(id).await.unwrap();
        assert!(info.participants.is_empty());
    }

    #[tokio::test]
    async fn insufficient_funds_leaves_state_untouched() {
        let h = harness(0, &[]).await;
        let (alice, alice_ctx) = player(&h.ledger, b"alice", 50);

        let id = h.registry.create_lottery(&Address::new("operator")).await.unwrap();
        let err = h.registry.place_bet(&alice_ctx, id, 100).await.unwrap_err();
        assert!(matches!(
            err,
            LotteryError::InsufficientFunds {
                need: 100,
                available: 50
            }
        ));

        let info = h.registry.lottery_info(id).await.unwrap();
        assert_eq!(info.total_amount, 0);
        assert!(info.participants.is_empty());
        assert_eq!(h.ledger.balance_of(&alice).await.unwrap(), 50);
        assert!(h.events.events().is_empty());
    }

    #[tokio::test]
    async fn bet_after_close_is_rejected() {
        let h = harness(0, &[0]).await;
        let (alice, alice_ctx) = player(&h.ledger, b"alice", 200);

        let id = h.registry.create_lottery(&Address::new("operator")).await.unwrap();
        h.registry.place_bet(&alice_ctx, id, 100).await.unwrap();
        h.registry.draw_winner(&alice, id).await.unwrap();

        let err = h.registry.place_bet(&alice_ctx, id, 100).await.unwrap_err();
        assert!(matches!(err, LotteryError::LotteryClosed(i) if i == id));
    }

    #[tokio::test]
    async fn admin_claims_yield_exactly_once() {
        let h = harness(500, &[150]).await;
        let (alice, alice_ctx) = player(&h.ledger, b"alice", 1_000);
        let (_, bob_ctx) = player(&h.ledger, b"bob", 1_000);

        let id = h.registry.create_lottery(&Address::new("operator")).await.unwrap();
        h.registry.place_bet(&alice_ctx, id, 100).await.unwrap();
        h.registry.place_bet(&bob_ctx, id, 300).await.unwrap();
        h.registry.draw_winner(&alice, id).await.unwrap();

        // 5% on a 400 pot
        let info = h.registry.lottery_info(id).await.unwrap();
        assert_eq!(info.yield_earned, 20);

        let admin_ctx = h.registry.admin_signer();
        let claimed = h.registry.claim_yield(&admin_ctx, id).await.unwrap();
        assert_eq!(claimed, 20);
        assert_eq!(
            h.ledger
                .balance_of(h.registry.admin_address())
                .await
                .unwrap(),
            20
        );

        let err = h.registry.claim_yield(&admin_ctx, id).await.unwrap_err();
        assert!(matches!(err, LotteryError::YieldAlreadyClaimed(i) if i == id));
        assert!(h.registry.lottery_info(id).await.unwrap().yield_claimed);
    }

    #[tokio::test]
    async fn only_admin_may_claim_yield() {
        let h = harness(500, &[0]).await;
        let (alice, alice_ctx) = player(&h.ledger, b"alice", 100);

        let id = h.registry.create_lottery(&Address::new("operator")).await.unwrap();
        h.registry.place_bet(&alice_ctx, id, 100).await.unwrap();
        h.registry.draw_winner(&alice, id).await.unwrap();

        let err = h.registry.claim_yield(&alice_ctx, id).await.unwrap_err();
        assert!(matches!(err, LotteryError::Unauthorized));
    }

    #[tokio::test]
    async fn claim_before_close_is_rejected() {
        let h = harness(500, &[]).await;
        let (_, alice_ctx) = player(&h.ledger, b"alice", 100);

        let id = h.registry.create_lottery(&Address::new("operator")).await.unwrap();
        h.registry.place_bet(&alice_ctx, id, 100).await.unwrap();

        let admin_ctx = h.registry.admin_signer();
        let err = h.registry.claim_yield(&admin_ctx, id).await.unwrap_err();
        assert!(matches!(err, LotteryError::LotteryNotClosed(i) if i == id));
    }

    #[tokio::test]
    async fn venue_loss_clamps_yield_to_zero() {
        // 10% venue loss: 400 in, 360 back
        let h = harness(-1_000, &[150]).await;
        let (alice, alice_ctx) = player(&h.ledger, b"alice", 1_000);
        let (bob, bob_ctx) = player(&h.ledger, b"bob", 1_000);

        let id = h.registry.create_lottery(&Address::new("operator")).await.unwrap();
        h.registry.place_bet(&alice_ctx, id, 100).await.unwrap();
        h.registry.place_bet(&bob_ctx, id, 300).await.unwrap();

        let winner = h.registry.draw_winner(&alice, id).await.unwrap();
        assert_eq!(winner, bob);

        let info = h.registry.lottery_info(id).await.unwrap();
        assert_eq!(info.yield_earned, 0);
        assert_eq!(h.ledger.balance_of(&bob).await.unwrap(), 1_060);

        // Nothing left to claim, but the claim itself still succeeds once
        let admin_ctx = h.registry.admin_signer();
        assert_eq!(h.registry.claim_yield(&admin_ctx, id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn snapshots_survive_reopen() {
        let dir = tempdir().unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        let venue = Arc::new(FixedRateVenue::new(ledger.clone(), 500).unwrap());
        let events = Arc::new(MemorySink::new());

        let (alice, alice_ctx) = player(&ledger, b"alice", 1_000);
        let (bob, bob_ctx) = player(&ledger, b"bob", 1_000);

        let id = {
            let registry = LotteryRegistry::new(
                dir.path(),
                ledger.clone(),
                venue.clone(),
                Arc::new(FixedSequence::new([150])),
                events.clone(),
            )
            .await
            .unwrap();

            let id = registry.create_lottery(&Address::new("operator")).await.unwrap();
            registry.place_bet(&alice_ctx, id, 100).await.unwrap();
            registry.place_bet(&bob_ctx, id, 300).await.unwrap();
            registry.draw_winner(&alice, id).await.unwrap();
            id
        };

        let reopened = LotteryRegistry::new(
            dir.path(),
            ledger.clone(),
            venue,
            Arc::new(FixedSequence::new([])),
            events,
        )
        .await
        .unwrap();

        let info = reopened.lottery_info(id).await.unwrap();
        assert!(!info.is_open);
        assert_eq!(info.total_amount, 400);
        assert_eq!(info.winner, Some(bob));
        assert_eq!(info.yield_earned, 20);

        // Admin account and escrow capability both survive the reopen
        let admin_ctx = reopened.admin_signer();
        assert_eq!(reopened.claim_yield(&admin_ctx, id).await.unwrap(), 20);
        assert_eq!(
            ledger
                .balance_of(reopened.admin_address())
                .await
                .unwrap(),
            20
        );

        // Id allocation continues past the persisted lotteries
        assert_eq!(reopened.create_lottery(&Address::new("operator")).await.unwrap(), id + 1);
    }
}
