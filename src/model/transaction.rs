use std::collections::BTreeSet;
use std::sync::Arc;
use parking_lot::Mutex;
use tracing::debug;
use crate::error::{Error, Result};
use crate::model::table::Table;
use crate::model::types::{Timestamp, TxnId, Value, TIMESTAMP_NONE, TXN_ID_NONE};
use crate::model::update::Update;

// 活跃事务列表，由数据库持有，事务结束时把自己删掉
pub type ActiveTransactions = Arc<Mutex<BTreeSet<TxnId>>>;

// 读者眼中 "已经发生" 的事务集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSnapshot {
    snap_min: TxnId,  // 小于它的事务都可见
    snap_max: TxnId,  // 大于等于它的事务都不可见
    concurrent: BTreeSet<TxnId>,  // 两者之间仍然活跃的事务
}

impl TransactionSnapshot {
    pub fn new(snap_min: TxnId, snap_max: TxnId, concurrent: impl IntoIterator<Item = TxnId>) -> Self {
        Self {
            snap_min,
            snap_max,
            concurrent: concurrent.into_iter().collect(),
        }
    }

    pub fn contains(&self, txn_id: TxnId) -> bool {
        if txn_id == TXN_ID_NONE || txn_id < self.snap_min {
            return true;
        }
        txn_id < self.snap_max && !self.concurrent.contains(&txn_id)
    }
}

// 默认快照能看到所有事务
impl Default for TransactionSnapshot {
    fn default() -> Self {
        Self::new(TxnId::MAX, TxnId::MAX, [])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    InProgress,
    Committed,
    RolledBack,
}

pub struct Transaction {
    id: TxnId,
    read_timestamp: Timestamp,
    snapshot: Arc<TransactionSnapshot>,
    state: Mutex<TransactionState>,
    updates: Mutex<Vec<(Arc<Table>, Value)>>,  // 写过哪些 (表, key)，提交和回滚时用
    registry: Option<ActiveTransactions>,
}

impl Transaction {
    pub fn new(id: TxnId, read_timestamp: Timestamp, snapshot: Arc<TransactionSnapshot>) -> Self {
        Self {
            id,
            read_timestamp,
            snapshot,
            state: Mutex::new(TransactionState::InProgress),
            updates: Mutex::new(Vec::new()),
            registry: None,
        }
    }

    pub(crate) fn registered(
        id: TxnId,
        read_timestamp: Timestamp,
        snapshot: Arc<TransactionSnapshot>,
        registry: ActiveTransactions,
    ) -> Self {
        let mut txn = Self::new(id, read_timestamp, snapshot);
        txn.registry = Some(registry);
        txn
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn read_timestamp(&self) -> Timestamp {
        self.read_timestamp
    }

    pub fn snapshot(&self) -> &TransactionSnapshot {
        &self.snapshot
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn ensure_active(&self) -> Result<()> {
        match self.state() {
            TransactionState::InProgress => Ok(()),
            state => Err(Error::Model(format!("[Transaction] {} is no longer active ({:?})", self.id, state))),
        }
    }

    // 本事务能否看到这条 update，timestamped 为 false 时忽略读时间戳
    pub fn visible(&self, update: &Update, timestamped: bool) -> bool {
        if update.aborted() {
            return false;
        }
        if update.txn_id() == self.id {
            return true;  // 读自己的写
        }
        if !update.committed() || !self.snapshot.contains(update.txn_id()) {
            return false;
        }
        !(timestamped
            && self.read_timestamp != TIMESTAMP_NONE
            && update.commit_timestamp() != TIMESTAMP_NONE
            && update.commit_timestamp() > self.read_timestamp)
    }

    // 记录本事务写过的 key
    pub fn add_update(&self, table: &Arc<Table>, key: &Value) {
        let mut updates = self.updates.lock();
        if !updates.iter().any(|(t, k)| Arc::ptr_eq(t, table) && k == key) {
            updates.push((table.clone(), key.clone()));
        }
    }

    pub fn commit(&self, commit_timestamp: Timestamp, durable_timestamp: Timestamp) -> Result<()> {
        let mut state = self.state.lock();
        if *state != TransactionState::InProgress {
            return Err(Error::Model(format!("[Transaction Commit] {} is no longer active", self.id)));
        }
        Update::check_timestamps(commit_timestamp, durable_timestamp)?;

        let updates = std::mem::take(&mut *self.updates.lock());
        for (table, key) in &updates {
            table.fix_timestamps(key, self.id, commit_timestamp, durable_timestamp)?;
        }
        *state = TransactionState::Committed;
        self.finish();
        debug!(txn_id = self.id, commit_timestamp, keys = updates.len(), "transaction committed");
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != TransactionState::InProgress {
            return Err(Error::Model(format!("[Transaction Rollback] {} is no longer active", self.id)));
        }
        let updates = std::mem::take(&mut *self.updates.lock());
        for (table, key) in &updates {
            table.rollback_updates(key, self.id);
        }
        *state = TransactionState::RolledBack;
        self.finish();
        debug!(txn_id = self.id, keys = updates.len(), "transaction rolled back");
        Ok(())
    }

    fn finish(&self) {
        if let Some(registry) = &self.registry {
            registry.lock().remove(&self.id);
        }
    }
}

// 没有提交就被丢弃的事务，等同于回滚
impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state() == TransactionState::InProgress {
            let _ = self.rollback();
        }
    }
}
