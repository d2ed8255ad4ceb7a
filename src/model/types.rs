use std::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};

pub type Timestamp = u64;
pub type TxnId = u64;

pub const TIMESTAMP_NONE: Timestamp = 0;  // 未指定时间戳
pub const TXN_ID_NONE: TxnId = 0;  // 非事务写入

// 表中的键和值
// None 是 "没有值" 的哨兵，既表示删除标记，也表示查找不到
// 派生的 Ord 先比较枚举序号再比较内容，所以 None 小于任何真实值
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Clone)]
pub enum Value {
    None,
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    String(String),
}

pub const NONE: Value = Value::None;

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    // 命令行输入的值：能解析成数字就当数字，否则当字符串
    pub fn parse(input: &str) -> Self {
        match input {
            "-" => Value::None,
            "true" => Value::Boolean(true),
            "false" => Value::Boolean(false),
            _ => match input.parse::<i64>() {
                Ok(int) => Value::Integer(int),
                Err(_) => Value::String(input.to_string()),
            },
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::None => write!(f, "NONE"),
            Value::Boolean(b) if *b => write!(f, "TRUE"),
            Value::Boolean(_) => write!(f, "FALSE"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Unsigned(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

// 整数字面量默认推断为 i32
impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Unsigned(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}
