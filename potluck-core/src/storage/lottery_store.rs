use crate::error::Result;
use crate::escrow::EscrowIdentity;
use crate::storage::Storage;
use crate::types::Address;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Persisted form of a lottery. Participants keep first-deposit order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotteryRecord {
    pub id: u64,
    pub escrow_identity: EscrowIdentity,
    pub escrow_secret: Vec<u8>,
    pub is_open: bool,
    pub total_amount: u64,
    pub participants: Vec<(Address, u64)>,
    pub winning_ticket: Option<u64>,
    pub winner: Option<Address>,
    pub yield_earned: u64,
    pub yield_claimed: bool,
    pub created_at: chrono::DateTime<Utc>,
}

/// Persisted administrator account.
#[derive(Debug, Clone)]
pub struct RegistryRecord {
    pub admin_identity: EscrowIdentity,
    pub admin_secret: Vec<u8>,
}

// Raw column values; JSON columns are decoded after the rusqlite closure.
struct LotteryRow {
    id: i64,
    escrow_identity: String,
    escrow_secret: Vec<u8>,
    is_open: bool,
    total_amount: i64,
    participants: String,
    winning_ticket: Option<i64>,
    winner: Option<String>,
    yield_earned: i64,
    yield_claimed: bool,
    created_at: i64,
}

impl LotteryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            escrow_identity: row.get(1)?,
            escrow_secret: row.get(2)?,
            is_open: row.get(3)?,
            total_amount: row.get(4)?,
            participants: row.get(5)?,
            winning_ticket: row.get(6)?,
            winner: row.get(7)?,
            yield_earned: row.get(8)?,
            yield_claimed: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn decode(self) -> Result<LotteryRecord> {
        Ok(LotteryRecord {
            id: self.id as u64,
            escrow_identity: serde_json::from_str(&self.escrow_identity)?,
            escrow_secret: self.escrow_secret,
            is_open: self.is_open,
            total_amount: self.total_amount as u64,
            participants: serde_json::from_str(&self.participants)?,
            winning_ticket: self.winning_ticket.map(|t| t as u64),
            winner: self.winner.map(Address::new),
            yield_earned: self.yield_earned as u64,
            yield_claimed: self.yield_claimed,
            created_at: chrono::DateTime::from_timestamp(self.created_at, 0)
                .unwrap_or_else(Utc::now),
        })
    }
}

const LOTTERY_COLUMNS: &str = "id, escrow_identity, escrow_secret, is_open, total_amount, \
     participants, winning_ticket, winner, yield_earned, yield_claimed, created_at";

pub struct LotteryStore<'a> {
    storage: &'a Storage,
}

impl<'a> LotteryStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn save_registry(&self, record: &RegistryRecord) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT OR REPLACE INTO registry (id, admin_identity, admin_secret)
             VALUES (0, ?1, ?2)",
            params![
                serde_json::to_string(&record.admin_identity)?,
                record.admin_secret,
            ],
        )?;

        Ok(())
    }

    pub async fn load_registry(&self) -> Result<Option<RegistryRecord>> {
        let conn = self.storage.get_connection().await;

        let row: Option<(String, Vec<u8>)> = conn
            .query_row(
                "SELECT admin_identity, admin_secret FROM registry WHERE id = 0",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((identity_json, admin_secret)) => Ok(Some(RegistryRecord {
                admin_identity: serde_json::from_str(&identity_json)?,
                admin_secret,
            })),
            None => Ok(None),
        }
    }

    pub async fn save_lottery(&self, record: &LotteryRecord) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT OR REPLACE INTO lotteries (id, escrow_identity, escrow_secret, is_open,
                 total_amount, participants, winning_ticket, winner, yield_earned,
                 yield_claimed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.id as i64,
                serde_json::to_string(&record.escrow_identity)?,
                record.escrow_secret,
                record.is_open,
                record.total_amount as i64,
                serde_json::to_string(&record.participants)?,
                record.winning_ticket.map(|t| t as i64),
                record.winner.as_ref().map(|w| w.as_str().to_string()),
                record.yield_earned as i64,
                record.yield_claimed,
                record.created_at.timestamp(),
            ],
        )?;

        Ok(())
    }

    pub async fn load_lottery(&self, id: u64) -> Result<Option<LotteryRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM lotteries WHERE id = ?1",
            LOTTERY_COLUMNS
        ))?;

        let row = stmt
            .query_row(params![id as i64], LotteryRow::from_row)
            .optional()?;
        row.map(LotteryRow::decode).transpose()
    }

    pub async fn list_lotteries(&self) -> Result<Vec<LotteryRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM lotteries ORDER BY id ASC",
            LOTTERY_COLUMNS
        ))?;

        let rows = stmt.query_map([], LotteryRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.decode()?);
        }
        Ok(records)
    }
}
