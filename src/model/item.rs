use parking_lot::Mutex;
use tracing::{trace, warn};
use crate::error::{Error, Result};
use crate::model::checkpoint::Checkpoint;
use crate::model::transaction::{Transaction, TransactionSnapshot};
use crate::model::types::{Timestamp, TxnId, Value, NONE, TIMESTAMP_NONE};
use crate::model::update::Update;

// 一个 key 的版本链：已提交的版本按提交时间戳排序（相同时间戳保持写入顺序，没有时间戳的排在最后），
// 之后是未提交的事务写入。最后一个元素总是最新的
pub struct TableItem {
    updates: Mutex<Vec<Update>>,
}

impl Default for TableItem {
    fn default() -> Self {
        Self::new()
    }
}

impl TableItem {
    pub fn new() -> Self {
        Self {
            updates: Mutex::new(Vec::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.updates.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.updates.lock().len()
    }

    // 给定时间戳下，最新可见时间戳对应的所有版本里是否有这个值
    pub fn contains_any(&self, value: &Value, timestamp: Timestamp) -> bool {
        let updates = self.updates.lock();
        Self::contains_any_visible(&updates, value, |u| u.visible_at(timestamp))
    }

    pub fn contains_any_ckpt(&self, ckpt: &Checkpoint, value: &Value) -> bool {
        let updates = self.updates.lock();
        Self::contains_any_visible(&updates, value, |u| ckpt.visible(u))
    }

    pub fn get(&self, timestamp: Timestamp) -> Value {
        let updates = self.updates.lock();
        Self::newest_value(&updates, |u| u.visible_at(timestamp))
    }

    pub fn get_ckpt(&self, ckpt: &Checkpoint, timestamp: Timestamp) -> Value {
        let updates = self.updates.lock();
        Self::newest_value(&updates, |u| ckpt.visible(u) && u.visible_at(timestamp))
    }

    // 事务读，受快照和读时间戳约束
    pub fn get_txn(&self, txn: &Transaction) -> Value {
        let updates = self.updates.lock();
        Self::newest_value(&updates, |u| txn.visible(u, true))
    }

    // 非时间戳表的事务读，只看事务可见性
    pub fn get_latest(&self, txn: &Transaction) -> Value {
        let updates = self.updates.lock();
        Self::newest_value(&updates, |u| txn.visible(u, false))
    }

    // 最新的已提交且不是删除标记的值，校验游标使用
    pub fn latest_live(&self) -> Option<Value> {
        let updates = self.updates.lock();
        updates
            .iter()
            .rev()
            .find(|u| u.committed())
            .filter(|u| !u.is_tombstone())
            .map(|u| u.value().clone())
    }

    // 先做冲突和存在性检查再写入，出错时版本链保持不变
    pub fn add_update(
        &self,
        update: Update,
        must_exist: bool,
        must_not_exist: bool,
        txn: Option<&Transaction>,
    ) -> Result<()> {
        let mut updates = self.updates.lock();

        // 1. 事务写入先检测写写冲突：最新的版本必须对本事务可见
        if let Some(txn) = txn {
            if let Some(newest) = updates.iter().rev().find(|u| !u.aborted()) {
                if newest.txn_id() != txn.id() && !txn.visible(newest, true) {
                    warn!(txn_id = txn.id(), conflict_txn_id = newest.txn_id(), "write conflict");
                    return Err(Error::Rollback);
                }
            }
        }

        // 2. 存在性检查：事务看自己可见的最新版本；非事务写入看最新版本以及写入时间戳上可见的版本
        if must_exist || must_not_exist {
            let exists = match txn {
                Some(txn) => Self::live(updates.iter().rev().find(|u| txn.visible(u, true))),
                None => {
                    let timestamp = update.commit_timestamp();
                    Self::live(updates.iter().rev().find(|u| u.committed()))
                        || Self::live(updates.iter().rev().find(|u| u.visible_at(timestamp)))
                }
            };
            if must_exist && !exists {
                return Err(Error::NotFound);
            }
            if must_not_exist && exists {
                return Err(Error::DuplicateKey);
            }
        }

        // 3. 写入
        trace!(
            txn_id = update.txn_id(),
            timestamp = update.commit_timestamp(),
            tombstone = update.is_tombstone(),
            "add update"
        );
        Self::insert_sorted(&mut updates, update);
        Ok(())
    }

    // 事务提交时补上时间戳，返回处理的版本数
    pub fn fix_timestamps(
        &self,
        txn_id: TxnId,
        commit_timestamp: Timestamp,
        durable_timestamp: Timestamp,
    ) -> Result<usize> {
        Update::check_timestamps(commit_timestamp, durable_timestamp)?;
        let mut updates = self.updates.lock();

        // 取出本事务未提交的版本，补上时间戳之后重新按序插入
        let (mine, others): (Vec<Update>, Vec<Update>) = std::mem::take(&mut *updates)
            .into_iter()
            .partition(|u| u.txn_id() == txn_id && !u.committed() && !u.aborted());
        *updates = others;
        let count = mine.len();
        for mut update in mine {
            update.fix_timestamps(commit_timestamp, durable_timestamp);
            Self::insert_sorted(&mut updates, update);
        }
        Ok(count)
    }

    // 事务中止：删除该事务写入的所有版本
    pub fn rollback_updates(&self, txn_id: TxnId) -> usize {
        let mut updates = self.updates.lock();
        let before = updates.len();
        for update in updates.iter_mut().filter(|u| u.txn_id() == txn_id) {
            update.abort();
        }
        updates.retain(|u| !u.aborted());
        before - updates.len()
    }

    // 只保留已提交、持久化时间点不晚于 timestamp 且快照可见的版本，返回删除的版本数
    pub fn rollback_to_stable(&self, timestamp: Timestamp, snapshot: Option<&TransactionSnapshot>) -> usize {
        let mut updates = self.updates.lock();
        let before = updates.len();
        updates.retain(|u| {
            u.committed()
                && u.durable_point() <= timestamp
                && snapshot.map_or(true, |s| s.contains(u.txn_id()))
        });
        before - updates.len()
    }

    // 已提交的版本二分插入到相同时间戳的最后，未提交的直接放在末尾
    fn insert_sorted(updates: &mut Vec<Update>, update: Update) {
        if !update.committed() {
            updates.push(update);
            return;
        }
        let committed = updates.partition_point(|u| u.committed());
        let order = Self::order(update.commit_timestamp());
        let pos = updates[..committed].partition_point(|u| Self::order(u.commit_timestamp()) <= order);
        updates.insert(pos, update);
    }

    // 没有时间戳的写入对所有读可见，排序时当作最新
    fn order(timestamp: Timestamp) -> Timestamp {
        if timestamp == TIMESTAMP_NONE {
            Timestamp::MAX
        } else {
            timestamp
        }
    }

    fn live(update: Option<&Update>) -> bool {
        update.map_or(false, |u| !u.is_tombstone())
    }

    fn newest_value(updates: &[Update], visible: impl Fn(&Update) -> bool) -> Value {
        updates
            .iter()
            .rev()
            .find(|u| visible(*u))
            .map_or(NONE, |u| u.value().clone())
    }

    fn contains_any_visible(updates: &[Update], value: &Value, visible: impl Fn(&Update) -> bool) -> bool {
        let mut iter = updates.iter().rev().filter(|u| visible(*u));
        let Some(newest) = iter.next() else {
            return false;
        };
        let timestamp = newest.commit_timestamp();
        std::iter::once(newest)
            .chain(iter.take_while(|u| u.commit_timestamp() == timestamp))
            .any(|u| u.value() == value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use super::*;

    fn v(i: i64) -> Value {
        Value::from(i)
    }

    #[test]
    fn test_get_by_timestamp() -> Result<()> {
        let item = TableItem::new();
        item.add_update(Update::new(v(1), 10), false, true, None)?;
        item.add_update(Update::new(v(3), 30), false, false, None)?;
        item.add_update(Update::new(v(2), 20), false, false, None)?;  // 乱序写入

        assert_eq!(item.get(5), NONE);
        assert_eq!(item.get(10), v(1));
        assert_eq!(item.get(25), v(2));
        assert_eq!(item.get(30), v(3));
        assert_eq!(item.get(TIMESTAMP_NONE), v(3));
        Ok(())
    }

    #[test]
    fn test_contains_any_same_timestamp() -> Result<()> {
        let item = TableItem::new();
        item.add_update(Update::new(v(1), 10), false, false, None)?;
        item.add_update(Update::new(v(2), 10), false, false, None)?;
        item.add_update(Update::new(v(3), 20), false, false, None)?;

        assert_eq!(item.get(10), v(2));
        assert!(item.contains_any(&v(1), 10));
        assert!(item.contains_any(&v(2), 10));
        assert!(!item.contains_any(&v(3), 10));
        assert!(!item.contains_any(&v(1), 20));
        assert!(!item.contains_any(&v(1), 5));
        Ok(())
    }

    #[test]
    fn test_tombstone() -> Result<()> {
        let item = TableItem::new();
        item.add_update(Update::new(v(1), 10), false, false, None)?;
        item.add_update(Update::new(NONE, 20), false, false, None)?;

        assert_eq!(item.get(15), v(1));
        assert_eq!(item.get(20), NONE);
        assert!(item.contains_any(&NONE, 20));
        assert_eq!(item.latest_live(), None);
        Ok(())
    }

    #[test]
    fn test_exclusivity() -> Result<()> {
        let item = TableItem::new();
        assert_eq!(item.add_update(Update::new(v(1), 10), true, false, None), Err(Error::NotFound));
        assert!(item.is_empty());

        item.add_update(Update::new(v(1), 10), false, true, None)?;
        assert_eq!(item.add_update(Update::new(v(2), 20), false, true, None), Err(Error::DuplicateKey));
        assert_eq!(item.len(), 1);

        item.add_update(Update::new(v(2), 20), true, false, None)?;
        item.add_update(Update::new(NONE, 30), false, false, None)?;
        item.add_update(Update::new(v(4), 40), false, true, None)?;  // 删除之后可以重新插入
        assert_eq!(item.get(40), v(4));
        Ok(())
    }

    #[test]
    fn test_exclusivity_at_write_timestamp() -> Result<()> {
        let item = TableItem::new();
        item.add_update(Update::new(v(1), 10), false, true, None)?;
        item.add_update(Update::new(NONE, 20), false, false, None)?;

        // 最新版本是删除标记，但时间戳 15 上仍然能读到 1
        assert_eq!(item.get(15), v(1));
        assert_eq!(item.add_update(Update::new(v(2), 15), false, true, None), Err(Error::DuplicateKey));
        item.add_update(Update::new(v(3), 15), true, false, None)?;
        assert_eq!(item.get(15), v(3));

        // 时间戳 5 上什么都没有，最新版本也已删除
        assert_eq!(item.add_update(Update::new(v(4), 5), true, false, None), Err(Error::NotFound));
        item.add_update(Update::new(v(4), 5), false, true, None)?;
        assert_eq!(item.get(5), v(4));
        assert_eq!(item.len(), 4);
        Ok(())
    }

    #[test]
    fn test_untimestamped_write_is_newest() -> Result<()> {
        let item = TableItem::new();
        item.add_update(Update::new(v(1), 10), false, false, None)?;
        item.add_update(Update::new(v(2), TIMESTAMP_NONE), false, false, None)?;

        assert_eq!(item.get(TIMESTAMP_NONE), v(2));
        assert_eq!(item.get(5), v(2));  // 对所有读时间戳可见
        assert_eq!(item.get(100), v(2));
        assert!(item.contains_any(&v(2), 10));
        assert!(!item.contains_any(&v(1), 10));

        // 之后带时间戳的写入排在它前面
        item.add_update(Update::new(v(3), 20), false, false, None)?;
        assert_eq!(item.get(30), v(2));
        assert_eq!(item.add_update(Update::new(v(4), 30), false, true, None), Err(Error::DuplicateKey));
        Ok(())
    }

    #[test]
    fn test_transaction_read_and_fix() -> Result<()> {
        let item = TableItem::new();
        item.add_update(Update::new(v(1), 10), false, false, None)?;

        let txn = Transaction::new(5, TIMESTAMP_NONE, Arc::default());
        item.add_update(Update::new_txn(v(2), 5), false, false, Some(&txn))?;

        assert_eq!(item.get_txn(&txn), v(2));  // 读自己的写
        assert_eq!(item.get(TIMESTAMP_NONE), v(1));  // 未提交对外不可见

        assert_eq!(item.fix_timestamps(5, 20, 25)?, 1);
        assert_eq!(item.get(15), v(1));
        assert_eq!(item.get(20), v(2));
        assert_eq!(item.fix_timestamps(5, 30, 30)?, 0);
        assert!(item.fix_timestamps(6, 30, 29).is_err());
        Ok(())
    }

    #[test]
    fn test_write_conflict() -> Result<()> {
        let item = TableItem::new();
        let snapshot = Arc::new(TransactionSnapshot::new(1, 3, [1, 2]));
        let txn1 = Transaction::new(1, TIMESTAMP_NONE, snapshot.clone());
        let txn2 = Transaction::new(2, TIMESTAMP_NONE, snapshot);

        item.add_update(Update::new_txn(v(1), 1), false, true, Some(&txn1))?;
        assert_eq!(
            item.add_update(Update::new_txn(v(2), 2), false, false, Some(&txn2)),
            Err(Error::Rollback)
        );
        item.add_update(Update::new_txn(v(3), 1), false, false, Some(&txn1))?;
        assert_eq!(item.get_latest(&txn1), v(3));
        assert_eq!(item.get_latest(&txn2), NONE);
        Ok(())
    }

    #[test]
    fn test_rollback_updates() -> Result<()> {
        let item = TableItem::new();
        item.add_update(Update::new(v(1), 10), false, false, None)?;
        let txn = Transaction::new(8, TIMESTAMP_NONE, Arc::default());
        item.add_update(Update::new_txn(v(2), 8), false, false, Some(&txn))?;
        item.add_update(Update::new_txn(NONE, 8), false, false, Some(&txn))?;

        assert_eq!(item.rollback_updates(8), 2);
        assert_eq!(item.len(), 1);
        assert_eq!(item.get(TIMESTAMP_NONE), v(1));
        Ok(())
    }

    #[test]
    fn test_rollback_to_stable() -> Result<()> {
        let item = TableItem::new();
        item.add_update(Update::new(v(1), 10), false, false, None)?;
        item.add_update(Update::new(v(2), 20), false, false, None)?;

        let txn = Transaction::new(4, TIMESTAMP_NONE, Arc::default());
        item.add_update(Update::new_txn(v(3), 4), false, false, Some(&txn))?;
        item.fix_timestamps(4, 15, 15)?;

        // 事务 4 不在快照中，即使时间戳在稳定点之前也要回滚
        let snapshot = TransactionSnapshot::new(4, 5, [4]);
        assert_eq!(item.rollback_to_stable(15, Some(&snapshot)), 2);
        assert_eq!(item.get(TIMESTAMP_NONE), v(1));
        assert_eq!(item.rollback_to_stable(15, Some(&snapshot)), 0);

        assert_eq!(item.rollback_to_stable(5, None), 1);
        assert!(item.is_empty());
        assert_eq!(item.get(TIMESTAMP_NONE), NONE);
        Ok(())
    }
}
