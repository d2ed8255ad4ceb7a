use std::sync::atomic::{AtomicU64, Ordering};
use crate::error::{Error, Result};
use crate::model::types::{Timestamp, TxnId, Value, TIMESTAMP_NONE, TXN_ID_NONE};

// 全局写入序号，每条 update 创建时分配一个，检查点用它来冻结 "当时" 的版本链
static WRITE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_sequence() -> u64 {
    WRITE_SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

// 最近一次分配出去的序号
pub fn last_sequence() -> u64 {
    WRITE_SEQUENCE.load(Ordering::SeqCst) - 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Pending,   // 事务内写入，提交时间戳还没确定
    Committed,
    Aborted,
}

// key 的一个版本
#[derive(Debug, Clone)]
pub struct Update {
    value: Value,  // NONE 即删除标记
    commit_timestamp: Timestamp,
    durable_timestamp: Timestamp,
    txn_id: TxnId,
    sequence: u64,
    state: UpdateState,
}

impl Update {
    // 非事务写入，直接就是已提交状态
    pub fn new(value: Value, timestamp: Timestamp) -> Self {
        Self {
            value,
            commit_timestamp: timestamp,
            durable_timestamp: timestamp,
            txn_id: TXN_ID_NONE,
            sequence: next_sequence(),
            state: UpdateState::Committed,
        }
    }

    // 事务写入，等事务提交时再通过 fix_timestamps 补上时间戳
    pub fn new_txn(value: Value, txn_id: TxnId) -> Self {
        Self {
            value,
            commit_timestamp: TIMESTAMP_NONE,
            durable_timestamp: TIMESTAMP_NONE,
            txn_id,
            sequence: next_sequence(),
            state: UpdateState::Pending,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn commit_timestamp(&self) -> Timestamp {
        self.commit_timestamp
    }

    pub fn durable_timestamp(&self) -> Timestamp {
        self.durable_timestamp
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    pub fn committed(&self) -> bool {
        self.state == UpdateState::Committed
    }

    pub fn aborted(&self) -> bool {
        self.state == UpdateState::Aborted
    }

    // 按时间戳读是否可见：读时间戳为 NONE 表示读最新，没有时间戳的写入对所有读可见
    pub fn visible_at(&self, timestamp: Timestamp) -> bool {
        self.committed()
            && (timestamp == TIMESTAMP_NONE
                || self.commit_timestamp == TIMESTAMP_NONE
                || self.commit_timestamp <= timestamp)
    }

    // 持久化的时间点，未设置 durable 时退化为 commit
    pub fn durable_point(&self) -> Timestamp {
        if self.durable_timestamp == TIMESTAMP_NONE {
            self.commit_timestamp
        } else {
            self.durable_timestamp
        }
    }

    // commit <= durable
    pub fn check_timestamps(commit_timestamp: Timestamp, durable_timestamp: Timestamp) -> Result<()> {
        if durable_timestamp != TIMESTAMP_NONE && durable_timestamp < commit_timestamp {
            return Err(Error::Model(format!(
                "[Fix Timestamps] durable timestamp {} is before commit timestamp {}",
                durable_timestamp, commit_timestamp
            )));
        }
        Ok(())
    }

    pub(crate) fn fix_timestamps(&mut self, commit_timestamp: Timestamp, durable_timestamp: Timestamp) {
        self.commit_timestamp = commit_timestamp;
        self.durable_timestamp = if durable_timestamp == TIMESTAMP_NONE {
            commit_timestamp
        } else {
            durable_timestamp
        };
        self.state = UpdateState::Committed;
    }

    pub(crate) fn abort(&mut self) {
        self.state = UpdateState::Aborted;
    }
}
