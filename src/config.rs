use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

// 表配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub timestamped: bool,  // 是否按时间戳判断可见性
}

impl Default for TableConfig {
    fn default() -> Self {
        Self { timestamped: true }
    }
}

impl TableConfig {
    pub fn not_timestamped() -> Self {
        Self { timestamped: false }
    }
}

pub const ENV_TIMESTAMPED: &str = "KV_MODEL_TIMESTAMPED";
pub const ENV_HISTORY: &str = "KV_MODEL_HISTORY";
pub const ENV_LOG: &str = "KV_MODEL_LOG";

// 命令行工具的配置，来自环境变量或 .env 文件
#[derive(Debug, Clone, PartialEq)]
pub struct ShellConfig {
    pub table: TableConfig,
    pub history: Option<PathBuf>,  // 历史命令文件
    pub log_filter: String,
}

impl ShellConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();  // .env 文件不存在也没关系
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let timestamped = match lookup(ENV_TIMESTAMPED) {
            Some(value) => value
                .trim()
                .parse::<bool>()
                .map_err(|e| Error::Parse(format!("{}: {}", ENV_TIMESTAMPED, e)))?,
            None => true,
        };
        let history = match lookup(ENV_HISTORY) {
            Some(path) if path.is_empty() => None,
            Some(path) => Some(PathBuf::from(path)),
            None => dirs::home_dir().map(|home| home.join(".kv_model_history")),
        };
        Ok(Self {
            table: TableConfig { timestamped },
            history,
            log_filter: lookup(ENV_LOG).unwrap_or_else(|| "info".to_string()),
        })
    }
}
