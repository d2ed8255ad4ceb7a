use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use parking_lot::RwLock;
use tracing::{debug, warn};
use crate::config::TableConfig;
use crate::error::{Error, Result, WT_NOTFOUND};
use crate::model::checkpoint::Checkpoint;
use crate::model::item::TableItem;
use crate::model::transaction::{Transaction, TransactionSnapshot};
use crate::model::types::{Timestamp, TxnId, Value, NONE, TIMESTAMP_NONE};
use crate::model::update::Update;

// 多版本 key-value 表。key 空间是读写锁保护的 BTreeMap，只有结构变化（新 key、clear、truncate、
// rollback_to_stable）才拿写锁；每条版本链有自己的锁
pub struct Table {
    name: String,
    config: TableConfig,
    data: RwLock<BTreeMap<Value, Arc<TableItem>>>,
}

impl Table {
    pub fn new(name: impl Into<String>, config: TableConfig) -> Self {
        Self {
            name: name.into(),
            config,
            data: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timestamped(&self) -> bool {
        self.config.timestamped
    }

    // 统一的时间戳处理：非时间戳表忽略所有时间戳
    fn fix_timestamp(&self, timestamp: Timestamp) -> Timestamp {
        if self.timestamped() {
            timestamp
        } else {
            TIMESTAMP_NONE
        }
    }

    // 查找 key 对应的版本链，空链等同于不存在
    fn item_if_exists(&self, key: &Value) -> Option<Arc<TableItem>> {
        self.data.read().get(key).filter(|item| !item.is_empty()).cloned()
    }

    // 写版本链时一直持有 key 空间的读锁，rollback_to_stable 不会在中途把这条链删掉。
    // key 不存在时拿写锁创建
    fn with_item<T>(&self, key: &Value, f: impl FnOnce(&TableItem) -> T) -> T {
        {
            let data = self.data.read();
            if let Some(item) = data.get(key) {
                return f(item);
            }
        }
        let mut data = self.data.write();
        debug!(table = %self.name, %key, "new key");
        f(data.entry(key.clone()).or_default())
    }

    // 同上，但 key 必须已经写过，否则 NotFound
    fn with_existing_item<T>(&self, key: &Value, f: impl FnOnce(&TableItem) -> Result<T>) -> Result<T> {
        let data = self.data.read();
        match data.get(key).filter(|item| !item.is_empty()) {
            Some(item) => f(item),
            None => Err(Error::NotFound),
        }
    }

    pub fn contains_any(&self, key: &Value, value: &Value, timestamp: Timestamp) -> bool {
        match self.item_if_exists(key) {
            Some(item) => item.contains_any(value, self.fix_timestamp(timestamp)),
            None => false,
        }
    }

    pub fn contains_any_ckpt(&self, ckpt: &Checkpoint, key: &Value, value: &Value) -> bool {
        match self.item_if_exists(key) {
            Some(item) => item.contains_any_ckpt(ckpt, value),
            None => false,
        }
    }

    // 读 timestamp 时可见的值，没有则返回 NONE
    pub fn get(&self, key: &Value, timestamp: Timestamp) -> Result<Value> {
        Ok(match self.item_if_exists(key) {
            Some(item) => item.get(self.fix_timestamp(timestamp)),
            None => NONE,
        })
    }

    pub fn get_ckpt(&self, ckpt: &Checkpoint, key: &Value, timestamp: Timestamp) -> Result<Value> {
        Ok(match self.item_if_exists(key) {
            Some(item) => item.get_ckpt(ckpt, self.fix_timestamp(timestamp)),
            None => NONE,
        })
    }

    pub fn get_txn(&self, txn: &Transaction, key: &Value) -> Result<Value> {
        txn.ensure_active()?;
        Ok(match self.item_if_exists(key) {
            Some(item) if self.timestamped() => item.get_txn(txn),
            Some(item) => item.get_latest(txn),
            None => NONE,
        })
    }

    // 以下三个 _ext 方法返回错误码而不是 Result，失败时 out 一律写入 NONE
    pub fn get_ext(&self, key: &Value, out: &mut Value, timestamp: Timestamp) -> i32 {
        Self::translate(self.get(key, timestamp), out)
    }

    pub fn get_ckpt_ext(&self, ckpt: &Checkpoint, key: &Value, out: &mut Value, timestamp: Timestamp) -> i32 {
        Self::translate(self.get_ckpt(ckpt, key, timestamp), out)
    }

    pub fn get_txn_ext(&self, txn: &Transaction, key: &Value, out: &mut Value) -> i32 {
        Self::translate(self.get_txn(txn, key), out)
    }

    fn translate(res: Result<Value>, out: &mut Value) -> i32 {
        match res {
            Ok(value) => {
                let code = if value.is_none() { WT_NOTFOUND } else { 0 };
                *out = value;
                code
            }
            Err(e) => {
                *out = NONE;
                e.code()
            }
        }
    }

    pub fn insert(&self, key: Value, value: Value, timestamp: Timestamp, overwrite: bool) -> Result<()> {
        let update = Update::new(value, self.fix_timestamp(timestamp));
        self.with_item(&key, |item| item.add_update(update, false, !overwrite, None))
    }

    pub fn insert_txn(self: &Arc<Self>, txn: &Transaction, key: Value, value: Value, overwrite: bool) -> Result<()> {
        txn.ensure_active()?;
        let update = Update::new_txn(value, txn.id());
        self.with_item(&key, |item| item.add_update(update, false, !overwrite, Some(txn)))?;
        txn.add_update(self, &key);
        Ok(())
    }

    // 写入删除标记，只有 key 从未写过时才返回 NotFound
    pub fn remove(&self, key: Value, timestamp: Timestamp) -> Result<()> {
        let update = Update::new(NONE, self.fix_timestamp(timestamp));
        self.with_existing_item(&key, |item| item.add_update(update, false, false, None))
    }

    pub fn remove_txn(self: &Arc<Self>, txn: &Transaction, key: Value) -> Result<()> {
        txn.ensure_active()?;
        let update = Update::new_txn(NONE, txn.id());
        self.with_existing_item(&key, |item| item.add_update(update, false, false, Some(txn)))?;
        txn.add_update(self, &key);
        Ok(())
    }

    // 不允许覆盖时要求已有存活的值，否则 NotFound
    pub fn update(&self, key: Value, value: Value, timestamp: Timestamp, overwrite: bool) -> Result<()> {
        let update = Update::new(value, self.fix_timestamp(timestamp));
        self.with_item(&key, |item| item.add_update(update, !overwrite, false, None))
    }

    pub fn update_txn(self: &Arc<Self>, txn: &Transaction, key: Value, value: Value, overwrite: bool) -> Result<()> {
        txn.ensure_active()?;
        let update = Update::new_txn(value, txn.id());
        self.with_item(&key, |item| item.add_update(update, !overwrite, false, Some(txn)))?;
        txn.add_update(self, &key);
        Ok(())
    }

    // start 和 stop 都不是 NONE 时必须有序
    fn check_range(start: &Value, stop: &Value) -> Result<()> {
        if !start.is_none() && !stop.is_none() && start > stop {
            return Err(Error::Model(format!(
                "[Truncate] The start key {} and the stop key {} are not in the right order",
                start, stop
            )));
        }
        Ok(())
    }

    // NONE 表示开区间
    fn range_bounds<'a>(start: &'a Value, stop: &'a Value) -> (Bound<&'a Value>, Bound<&'a Value>) {
        let lower = if start.is_none() { Bound::Unbounded } else { Bound::Included(start) };
        let upper = if stop.is_none() { Bound::Unbounded } else { Bound::Included(stop) };
        (lower, upper)
    }

    // [start, stop] 内的每个 key 写入删除标记
    pub fn truncate(&self, start: &Value, stop: &Value, timestamp: Timestamp) -> Result<()> {
        let data = self.data.write();
        Self::check_range(start, stop)?;

        let timestamp = self.fix_timestamp(timestamp);
        let mut count = 0;
        for (_, item) in data.range::<Value, _>(Self::range_bounds(start, stop)) {
            item.add_update(Update::new(NONE, timestamp), false, false, None)?;
            count += 1;
        }
        debug!(table = %self.name, %start, %stop, timestamp, count, "truncate");
        Ok(())
    }

    pub fn truncate_txn(self: &Arc<Self>, txn: &Transaction, start: &Value, stop: &Value) -> Result<()> {
        txn.ensure_active()?;
        let data = self.data.write();
        Self::check_range(start, stop)?;

        let mut count = 0;
        for (key, item) in data.range::<Value, _>(Self::range_bounds(start, stop)) {
            item.add_update(Update::new_txn(NONE, txn.id()), false, false, Some(txn))?;
            txn.add_update(self, key);
            count += 1;
        }
        debug!(table = %self.name, %start, %stop, txn_id = txn.id(), count, "truncate");
        Ok(())
    }

    // 事务提交时给未提交的版本补上时间戳
    pub fn fix_timestamps(
        &self,
        key: &Value,
        txn_id: TxnId,
        commit_timestamp: Timestamp,
        durable_timestamp: Timestamp,
    ) -> Result<()> {
        let Some(item) = self.data.read().get(key).cloned() else {
            return Ok(());  // 事务提交前表已被清空
        };
        item.fix_timestamps(txn_id, self.fix_timestamp(commit_timestamp), self.fix_timestamp(durable_timestamp))?;
        Ok(())
    }

    // 回滚中止事务的写入
    pub fn rollback_updates(&self, key: &Value, txn_id: TxnId) {
        if let Some(item) = self.data.read().get(key).cloned() {
            item.rollback_updates(txn_id);
        }
    }

    pub fn clear(&self) {
        let mut data = self.data.write();
        debug!(table = %self.name, keys = data.len(), "clear");
        data.clear();
    }

    // 回滚到稳定时间戳，变空的版本链从 key 空间删除；非时间戳表什么都不做
    pub fn rollback_to_stable(&self, timestamp: Timestamp, snapshot: Option<&TransactionSnapshot>) {
        let mut data = self.data.write();
        if !self.timestamped() {
            return;
        }
        let removed: usize = data.values().map(|item| item.rollback_to_stable(timestamp, snapshot)).sum();
        let keys = data.len();
        data.retain(|_, item| !item.is_empty());
        debug!(
            table = %self.name,
            timestamp,
            removed,
            dropped_keys = keys - data.len(),
            "rollback to stable"
        );
    }

    // 校验游标只在创建时拿一下锁，之后不加锁遍历，存活期间调用方必须保证没有并发写入
    pub fn verify_cursor(&self) -> VerifyCursor {
        let items: Vec<(Value, Arc<TableItem>)> =
            self.data.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        VerifyCursor {
            items: items.into_iter(),
            peeked: None,
        }
    }

    // 按 key 顺序比较存储引擎读出的数据
    pub fn verify<I>(&self, engine: I) -> Result<()>
    where
        I: IntoIterator<Item = (Value, Value)>,
    {
        let mut cursor = self.verify_cursor();
        for (key, value) in engine {
            let expected = cursor.peek().cloned();
            if !cursor.verify_next(&key, &value) {
                warn!(table = %self.name, %key, %value, ?expected, "verification failed");
                return Err(Error::Internal(format!(
                    "[Verify] Table {}: engine has ({}, {}), model expected {:?}",
                    self.name, key, value, expected
                )));
            }
        }
        if let Some((key, value)) = cursor.next() {
            warn!(table = %self.name, %key, %value, "verification failed: engine ended early");
            return Err(Error::Internal(format!(
                "[Verify] Table {}: engine is missing ({}, {})",
                self.name, key, value
            )));
        }
        Ok(())
    }

    // 以 JSON 输出所有存活的 key
    pub fn dump(&self) -> Result<String> {
        let rows: Vec<(Value, Value)> = self.verify_cursor().collect();
        Ok(serde_json::to_string(&rows)?)
    }
}

// 按 key 顺序遍历最新已提交状态下存活的 (key, value)
pub struct VerifyCursor {
    items: std::vec::IntoIter<(Value, Arc<TableItem>)>,
    peeked: Option<(Value, Value)>,
}

impl VerifyCursor {
    pub fn has_next(&mut self) -> bool {
        self.peek().is_some()
    }

    pub fn peek(&mut self) -> Option<&(Value, Value)> {
        if self.peeked.is_none() {
            self.peeked = self.advance();
        }
        self.peeked.as_ref()
    }

    // 比较下一个 key-value 并前进
    pub fn verify_next(&mut self, key: &Value, value: &Value) -> bool {
        match self.next() {
            Some((k, v)) => k == *key && v == *value,
            None => false,
        }
    }

    // 跳过已删除或为空的 key
    fn advance(&mut self) -> Option<(Value, Value)> {
        self.items
            .by_ref()
            .find_map(|(key, item)| item.latest_live().map(|value| (key, value)))
    }
}

impl Iterator for VerifyCursor {
    type Item = (Value, Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.peeked.take().or_else(|| self.advance())
    }
}
