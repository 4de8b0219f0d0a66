use potluck_core::{create_escrow, FixedRateVenue, InMemoryLedger, Ledger, ThreadRngSource, TracingSink};
use potluck_lottery::LotteryRegistry;
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Create temp dir
    let temp_dir = tempdir()?;
    println!("Using temporary directory: {:?}", temp_dir.path());

    // Wire up the simulated collaborators: ledger, 5% yield venue, OS rng
    let ledger = Arc::new(InMemoryLedger::new());
    let venue = Arc::new(FixedRateVenue::new(ledger.clone(), 500)?);
    let registry = LotteryRegistry::new(
        temp_dir.path(),
        ledger.clone(),
        venue,
        Arc::new(ThreadRngSource),
        Arc::new(TracingSink),
    )
    .await?;

    println!("Admin account: {}", registry.admin_address());

    // Fund two players
    let (alice, alice_capability) = create_escrow(b"alice")?;
    let (bob, bob_capability) = create_escrow(b"bob")?;
    ledger.credit(alice.address(), 1_000);
    ledger.credit(bob.address(), 1_000);

    println!("\nCreating lottery...");
    let id = registry.create_lottery(alice.address()).await?;
    println!("Lottery id: {}", id);

    registry.place_bet(&alice_capability.sign_as(), id, 100).await?;
    registry.place_bet(&bob_capability.sign_as(), id, 300).await?;

    let info = registry.lottery_info(id).await?;
    println!("\nPot: {} across {} participants", info.total_amount, info.participants.len());

    let winner = registry.draw_winner(alice.address(), id).await?;
    println!("\nWinner: {}", winner);
    println!("Winner balance: {}", ledger.balance_of(&winner).await?);

    let admin_ctx = registry.admin_signer();
    let claimed = registry.claim_yield(&admin_ctx, id).await?;
    println!("Yield claimed by admin: {}", claimed);

    println!("\nExample completed successfully!");

    Ok(())
}
