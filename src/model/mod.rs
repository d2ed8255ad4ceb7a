// 多版本键值表模型：表 -> 每个 key 的版本链 -> 单个版本
pub mod checkpoint;
pub mod database;
pub mod item;
pub mod table;
pub mod transaction;
pub mod types;
pub mod update;

pub use checkpoint::Checkpoint;
pub use database::Database;
pub use item::TableItem;
pub use table::{Table, VerifyCursor};
pub use transaction::{Transaction, TransactionSnapshot, TransactionState};
pub use types::{Timestamp, TxnId, Value, NONE, TIMESTAMP_NONE, TXN_ID_NONE};
pub use update::{Update, UpdateState};
