pub mod lottery_store;

pub use lottery_store::{LotteryRecord, LotteryStore, RegistryRecord};

use crate::error::{CoreError, Result};
use rusqlite::Connection;
use std::path::Path;
use tokio::sync::Mutex;

pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub async fn new(db_path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::internal(format!("Failed to create directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        // Registry table: single row carrying the administrator account
        conn.execute(
            "CREATE TABLE IF NOT EXISTS registry (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                admin_identity TEXT NOT NULL,
                admin_secret BLOB NOT NULL
            )",
            [],
        )?;

        // Lotteries table: one row per pot, kept forever
        conn.execute(
            "CREATE TABLE IF NOT EXISTS lotteries (
                id INTEGER PRIMARY KEY,
                escrow_identity TEXT NOT NULL,
                escrow_secret BLOB NOT NULL,
                is_open INTEGER NOT NULL,
                total_amount INTEGER NOT NULL,
                participants TEXT NOT NULL,
                winning_ticket INTEGER,
                winner TEXT,
                yield_earned INTEGER NOT NULL,
                yield_claimed INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    pub async fn get_connection(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
