//! In-memory repository implementations.
//!
//! Every trait is implemented on [`MemoryStore`], which guards all tables
//! with a single Tokio mutex. Holding the lock for the whole operation
//! gives the same one-winner semantics as the conditional updates of the
//! PostgreSQL implementation. Suitable for tests and single-node use.

mod code;
mod job;
mod mother;
mod seat;
mod switch;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use seatbroker_core::types::{CodeId, GroupId, JobId, MotherId, SeatId, SwitchRequestId};
use seatbroker_entity::{
    BatchJob, CodeEvent, MotherAccount, MotherGroup, RedeemCode, SeatAllocation, SwitchRequest,
};

/// Tables held by the memory store.
#[derive(Debug, Default)]
struct Tables {
    codes: HashMap<CodeId, RedeemCode>,
    code_hashes: HashMap<String, CodeId>,
    events: Vec<CodeEvent>,
    seats: HashMap<SeatId, SeatAllocation>,
    mothers: HashMap<MotherId, MotherAccount>,
    groups: HashMap<GroupId, MotherGroup>,
    switches: HashMap<SwitchRequestId, SwitchRequest>,
    jobs: HashMap<JobId, BatchJob>,
}

/// In-memory implementation of every repository trait.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}
