use crate::error::Result;
use crate::types::Address;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A dedicated custody account. Created once, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowIdentity {
    id: Uuid,
    address: Address,
    created_at: DateTime<Utc>,
}

impl EscrowIdentity {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Owned credential for an escrow account. Exposes a narrow act-as
/// capability rather than the underlying secret.
#[derive(Clone, Serialize, Deserialize)]
pub struct SigningCapability {
    address: Address,
    secret: Vec<u8>,
}

impl SigningCapability {
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Ephemeral signing context acting as the account.
    pub fn sign_as(&self) -> SigningContext {
        SigningContext {
            address: self.address.clone(),
        }
    }

    /// Raw secret, for persistence only.
    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }

    /// Rebuild a capability from persisted parts.
    pub fn from_parts(address: Address, secret: Vec<u8>) -> Self {
        Self { address, secret }
    }
}

impl std::fmt::Debug for SigningCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCapability")
            .field("address", &self.address)
            .finish()
    }
}

/// Proof of authority to move funds out of an account.
#[derive(Debug, Clone)]
pub struct SigningContext {
    address: Address,
}

impl SigningContext {
    pub fn address(&self) -> &Address {
        &self.address
    }
}

/// Create a fresh escrow account from a caller-chosen seed. The address is
/// the hex-encoded SHA-256 over the seed and a random secret, so repeated
/// calls with the same seed still yield distinct accounts.
pub fn create_escrow(seed: &[u8]) -> Result<(EscrowIdentity, SigningCapability)> {
    let mut secret = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);

    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(&secret);
    let address = Address::new(hex::encode(hasher.finalize()));

    let identity = EscrowIdentity {
        id: Uuid::new_v4(),
        address: address.clone(),
        created_at: Utc::now(),
    };
    let capability = SigningCapability { address, secret };

    tracing::info!("Created escrow account {}", identity.address());
    Ok((identity, capability))
}
