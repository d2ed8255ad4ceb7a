use std::sync::Arc;
use crate::model::transaction::TransactionSnapshot;
use crate::model::types::{Timestamp, TIMESTAMP_NONE};
use crate::model::update::{last_sequence, Update};

// 检查点：创建时的事务快照、稳定时间戳和最后一次写入的序号
#[derive(Debug, Clone)]
pub struct Checkpoint {
    name: String,
    snapshot: Arc<TransactionSnapshot>,
    stable_timestamp: Timestamp,
    sequence: u64,
}

impl Checkpoint {
    pub fn new(name: impl Into<String>, snapshot: Arc<TransactionSnapshot>, stable_timestamp: Timestamp) -> Self {
        Self {
            name: name.into(),
            snapshot,
            stable_timestamp,
            sequence: last_sequence(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> &TransactionSnapshot {
        &self.snapshot
    }

    pub fn stable_timestamp(&self) -> Timestamp {
        self.stable_timestamp
    }

    pub fn visible(&self, update: &Update) -> bool {
        update.committed()
            && update.sequence() <= self.sequence
            && self.snapshot.contains(update.txn_id())
            && (self.stable_timestamp == TIMESTAMP_NONE || update.durable_point() <= self.stable_timestamp)
    }
}
