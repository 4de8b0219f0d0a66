use crate::types::Address;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Observational events emitted by the lottery core. Fire-and-forget; the
/// core never reads them back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Ticket {
        address: Address,
        amount: u64,
        lottery_id: u64,
    },
    Winner {
        address: Address,
        amount: u64,
        lottery_id: u64,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// One log line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        match event {
            Event::Ticket {
                address,
                amount,
                lottery_id,
            } => {
                tracing::info!("Ticket: {} bet {} on lottery {}", address, amount, lottery_id);
            }
            Event::Winner {
                address,
                amount,
                lottery_id,
            } => {
                tracing::info!("Winner: {} won {} on lottery {}", address, amount, lottery_id);
            }
        }
    }
}

/// Captures events for test assertions.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: RwLock<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        self.events.write().push(event);
    }
}
