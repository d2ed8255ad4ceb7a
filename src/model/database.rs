use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};
use crate::config::TableConfig;
use crate::error::{Error, Result, EBUSY};
use crate::model::checkpoint::Checkpoint;
use crate::model::table::Table;
use crate::model::transaction::{ActiveTransactions, Transaction, TransactionSnapshot};
use crate::model::types::{Timestamp, TxnId, TIMESTAMP_NONE};

pub const DEFAULT_CHECKPOINT_NAME: &str = "WiredTigerCheckpoint";

// 数据库：持有所有表、活跃事务、检查点和稳定时间戳
pub struct Database {
    tables: RwLock<HashMap<String, Arc<Table>>>,
    checkpoints: RwLock<HashMap<String, Arc<Checkpoint>>>,
    next_txn_id: AtomicU64,
    active: ActiveTransactions,
    stable_timestamp: AtomicU64,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            checkpoints: RwLock::new(HashMap::new()),
            next_txn_id: AtomicU64::new(1),
            active: Arc::new(Mutex::new(BTreeSet::new())),
            stable_timestamp: AtomicU64::new(TIMESTAMP_NONE),
        }
    }

    pub fn create_table(&self, name: &str, config: TableConfig) -> Result<Arc<Table>> {
        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return Err(Error::Model(format!("[Create Table] Table {} already exists", name)));
        }
        let table = Arc::new(Table::new(name, config));
        tables.insert(name.to_string(), table.clone());
        debug!(table = name, timestamped = config.timestamped, "table created");
        Ok(table)
    }

    pub fn table(&self, name: &str) -> Result<Arc<Table>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Model(format!("[Get Table] Table {} does not exist", name)))
    }

    // 开始事务，快照排除所有仍在运行的事务
    pub fn begin_transaction(&self, read_timestamp: Timestamp) -> Arc<Transaction> {
        let mut active = self.active.lock();
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let snapshot = Self::snapshot_of(&active, id);
        active.insert(id);
        Arc::new(Transaction::registered(
            id,
            read_timestamp,
            Arc::new(snapshot),
            self.active.clone(),
        ))
    }

    // 当前时刻的事务快照
    pub fn txn_snapshot(&self) -> TransactionSnapshot {
        let active = self.active.lock();
        Self::snapshot_of(&active, self.next_txn_id.load(Ordering::SeqCst))
    }

    fn snapshot_of(active: &BTreeSet<TxnId>, snap_max: TxnId) -> TransactionSnapshot {
        let snap_min = active.iter().next().copied().unwrap_or(snap_max);
        TransactionSnapshot::new(snap_min, snap_max, active.iter().copied())
    }

    pub fn stable_timestamp(&self) -> Timestamp {
        self.stable_timestamp.load(Ordering::SeqCst)
    }

    pub fn set_stable_timestamp(&self, timestamp: Timestamp) {
        self.stable_timestamp.store(timestamp, Ordering::SeqCst);
    }

    pub fn create_checkpoint(&self, name: Option<&str>) -> Arc<Checkpoint> {
        let name = name.unwrap_or(DEFAULT_CHECKPOINT_NAME);
        let ckpt = Arc::new(Checkpoint::new(
            name,
            Arc::new(self.txn_snapshot()),
            self.stable_timestamp(),
        ));
        self.checkpoints.write().insert(name.to_string(), ckpt.clone());
        debug!(checkpoint = name, stable_timestamp = ckpt.stable_timestamp(), "checkpoint created");
        ckpt
    }

    pub fn checkpoint(&self, name: Option<&str>) -> Result<Arc<Checkpoint>> {
        let name = name.unwrap_or(DEFAULT_CHECKPOINT_NAME);
        self.checkpoints.read().get(name).cloned().ok_or(Error::NotFound)
    }

    // 所有表回滚到稳定时间戳，有活跃事务时返回 EBUSY
    pub fn rollback_to_stable(&self) -> Result<()> {
        if !self.active.lock().is_empty() {
            return Err(Error::Engine(EBUSY));
        }
        let timestamp = self.stable_timestamp();
        let snapshot = self.txn_snapshot();
        let tables: Vec<Arc<Table>> = self.tables.read().values().cloned().collect();
        for table in &tables {
            table.rollback_to_stable(timestamp, Some(&snapshot));
        }
        info!(stable_timestamp = timestamp, tables = tables.len(), "rollback to stable");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{Value, NONE};

    fn k(key: &str) -> Value {
        Value::from(key)
    }

    #[test]
    fn test_tables() -> Result<()> {
        let db = Database::new();
        let table = db.create_table("t1", TableConfig::default())?;
        assert!(db.create_table("t1", TableConfig::default()).is_err());
        assert!(Arc::ptr_eq(&table, &db.table("t1")?));
        assert!(db.table("t2").is_err());
        Ok(())
    }

    #[test]
    fn test_snapshot_isolation() -> Result<()> {
        let db = Database::new();
        let table = db.create_table("t", TableConfig::default())?;

        let txn1 = db.begin_transaction(TIMESTAMP_NONE);
        table.insert_txn(&txn1, k("a"), Value::from(1), false)?;

        let txn2 = db.begin_transaction(TIMESTAMP_NONE);
        txn1.commit(10, 10)?;
        assert_eq!(table.get_txn(&txn2, &k("a"))?, NONE);  // 提交发生在 txn2 开始之后

        let txn3 = db.begin_transaction(TIMESTAMP_NONE);
        assert_eq!(table.get_txn(&txn3, &k("a"))?, Value::from(1));
        assert_eq!(table.update_txn(&txn2, k("a"), Value::from(2), false), Err(Error::Rollback));
        txn2.rollback()?;
        txn3.commit(11, 11)?;
        Ok(())
    }

    #[test]
    fn test_checkpoint() -> Result<()> {
        let db = Database::new();
        let table = db.create_table("t", TableConfig::default())?;
        table.insert(k("a"), Value::from(1), 10, false)?;

        let running = db.begin_transaction(TIMESTAMP_NONE);
        table.insert_txn(&running, k("b"), Value::from(2), false)?;

        db.set_stable_timestamp(15);
        let ckpt = db.create_checkpoint(None);
        running.commit(12, 12)?;
        table.insert(k("a"), Value::from(3), 14, true)?;

        assert!(Arc::ptr_eq(&ckpt, &db.checkpoint(None)?));
        assert_eq!(db.checkpoint(Some("other")).err(), Some(Error::NotFound));
        assert_eq!(table.get_ckpt(&ckpt, &k("a"), TIMESTAMP_NONE)?, Value::from(1));
        assert_eq!(table.get_ckpt(&ckpt, &k("b"), TIMESTAMP_NONE)?, NONE);
        assert_eq!(table.get(&k("b"), TIMESTAMP_NONE)?, Value::from(2));
        Ok(())
    }

    #[test]
    fn test_rollback_to_stable() -> Result<()> {
        let db = Database::new();
        let table = db.create_table("t", TableConfig::default())?;
        let plain = db.create_table("plain", TableConfig::not_timestamped())?;

        let txn = db.begin_transaction(TIMESTAMP_NONE);
        table.insert_txn(&txn, k("a"), Value::from(1), false)?;
        plain.insert_txn(&txn, k("a"), Value::from(1), false)?;
        assert_eq!(db.rollback_to_stable(), Err(Error::Engine(EBUSY)));
        txn.commit(20, 20)?;

        let txn = db.begin_transaction(TIMESTAMP_NONE);
        table.update_txn(&txn, k("a"), Value::from(2), false)?;
        txn.commit(30, 30)?;

        db.set_stable_timestamp(25);
        db.rollback_to_stable()?;
        assert_eq!(table.get(&k("a"), TIMESTAMP_NONE)?, Value::from(1));
        assert_eq!(plain.get(&k("a"), TIMESTAMP_NONE)?, Value::from(1));

        db.set_stable_timestamp(10);
        db.rollback_to_stable()?;
        db.rollback_to_stable()?;
        assert_eq!(table.get(&k("a"), TIMESTAMP_NONE)?, NONE);
        assert_eq!(table.remove(k("a"), 40), Err(Error::NotFound));
        Ok(())
    }
}
