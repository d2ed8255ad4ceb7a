// 交互式命令行：对一张模型表执行命令，方便手工对照存储引擎的行为
use std::str::FromStr;
use std::sync::Arc;
use strum_macros::{Display, EnumString};
use crate::config::TableConfig;
use crate::error::{Error, Result};
use crate::model::{Table, Timestamp, Value, TIMESTAMP_NONE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Verb {
    Insert,
    Put,  // 允许覆盖的 insert
    Update,
    Remove,
    Get,
    Contains,
    Truncate,
    Rts,
    Clear,
    Dump,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Insert { key: Value, value: Value, timestamp: Timestamp, overwrite: bool },
    Update { key: Value, value: Value, timestamp: Timestamp },
    Remove { key: Value, timestamp: Timestamp },
    Get { key: Value, timestamp: Timestamp },
    Contains { key: Value, value: Value, timestamp: Timestamp },
    Truncate { start: Value, stop: Value, timestamp: Timestamp },
    Rts { timestamp: Timestamp },
    Clear,
    Dump,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let verb = Verb::from_str(tokens.next().ok_or(Error::Parse("empty command".into()))?)?;
        let args: Vec<&str> = tokens.collect();

        // 检查参数个数，最后一个可选参数是时间戳
        let arity = |required: usize, optional: usize| -> Result<()> {
            if args.len() < required || args.len() > required + optional {
                return Err(Error::Parse(format!(
                    "{} expects {} argument(s), got {}",
                    verb,
                    required,
                    args.len()
                )));
            }
            Ok(())
        };
        let timestamp = |index: usize| -> Result<Timestamp> {
            Ok(match args.get(index) {
                Some(ts) => ts.parse::<Timestamp>()?,
                None => TIMESTAMP_NONE,
            })
        };

        Ok(match verb {
            Verb::Insert | Verb::Put => {
                arity(2, 1)?;
                Command::Insert {
                    key: Value::parse(args[0]),
                    value: Value::parse(args[1]),
                    timestamp: timestamp(2)?,
                    overwrite: verb == Verb::Put,
                }
            }
            Verb::Update => {
                arity(2, 1)?;
                Command::Update { key: Value::parse(args[0]), value: Value::parse(args[1]), timestamp: timestamp(2)? }
            }
            Verb::Remove => {
                arity(1, 1)?;
                Command::Remove { key: Value::parse(args[0]), timestamp: timestamp(1)? }
            }
            Verb::Get => {
                arity(1, 1)?;
                Command::Get { key: Value::parse(args[0]), timestamp: timestamp(1)? }
            }
            Verb::Contains => {
                arity(2, 1)?;
                Command::Contains { key: Value::parse(args[0]), value: Value::parse(args[1]), timestamp: timestamp(2)? }
            }
            Verb::Truncate => {
                arity(2, 1)?;
                Command::Truncate { start: Value::parse(args[0]), stop: Value::parse(args[1]), timestamp: timestamp(2)? }
            }
            Verb::Rts => {
                arity(1, 0)?;
                Command::Rts { timestamp: timestamp(0)? }
            }
            Verb::Clear => Command::Clear,
            Verb::Dump => Command::Dump,
            Verb::Quit => Command::Quit,
        })
    }
}

pub struct Shell {
    table: Arc<Table>,
}

impl Shell {
    pub fn new(config: TableConfig) -> Self {
        Self {
            table: Arc::new(Table::new("shell", config)),
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    // 执行一条命令，返回要打印的结果
    pub fn execute(&self, command: Command) -> Result<String> {
        let table = &self.table;
        match command {
            Command::Insert { key, value, timestamp, overwrite } => table.insert(key, value, timestamp, overwrite)?,
            Command::Update { key, value, timestamp } => table.update(key, value, timestamp, false)?,
            Command::Remove { key, timestamp } => table.remove(key, timestamp)?,
            Command::Get { key, timestamp } => return Ok(table.get(&key, timestamp)?.to_string()),
            Command::Contains { key, value, timestamp } => {
                return Ok(table.contains_any(&key, &value, timestamp).to_string())
            }
            Command::Truncate { start, stop, timestamp } => table.truncate(&start, &stop, timestamp)?,
            Command::Rts { timestamp } => table.rollback_to_stable(timestamp, None),
            Command::Clear => table.clear(),
            Command::Dump => return table.dump(),
            Command::Quit => {}
        }
        Ok("OK".to_string())
    }
}
