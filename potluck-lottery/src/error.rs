use potluck_core::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LotteryError>;

#[derive(Error, Debug)]
pub enum LotteryError {
    #[error("Potluck core error: {0}")]
    Core(#[from] CoreError),

    #[error("Lottery not found: {0}")]
    NotFound(u64),

    #[error("Lottery {0} is already closed")]
    LotteryClosed(u64),

    #[error("Lottery {0} is not closed yet")]
    LotteryNotClosed(u64),

    #[error("Lottery {0} has no players")]
    NoPlayers(u64),

    #[error("Insufficient funds: need {need}, have {available}")]
    InsufficientFunds { need: u64, available: u64 },

    #[error("Caller is not the administrator")]
    Unauthorized,

    #[error("Yield for lottery {0} already claimed")]
    YieldAlreadyClaimed(u64),

    #[error("Bet amount must be positive")]
    InvalidAmount,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
