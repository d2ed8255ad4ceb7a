// 自定义Result返回的错误类型
// 对标准的Result进行重写即可，并且每种错误都能映射回存储引擎的错误码

use std::fmt::{Display, Formatter};
use std::num::ParseIntError;

pub type Result<T> = std::result::Result<T, Error>;

// 存储引擎的错误码，_ext 接口直接返回这些值
pub const WT_ROLLBACK: i32 = -31800;
pub const WT_DUPLICATE_KEY: i32 = -31801;
pub const WT_ERROR: i32 = -31802;
pub const WT_NOTFOUND: i32 = -31803;
pub const EBUSY: i32 = 16;
pub const EINVAL: i32 = 22;

// 自定义错误类型
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Parse(String),    // 命令解析阶段报错
    Model(String),    // 调用方违反了接口约定，例如 truncate 的区间顺序不对
    NotFound,         // key 不存在
    DuplicateKey,     // key 已存在
    Rollback,         // 写写冲突
    Engine(i32),      // 带有引擎错误码的错误
    Internal(String), // 其他内部错误
}

impl Error {
    // 转换为引擎错误码
    pub fn code(&self) -> i32 {
        match self {
            Error::Parse(_) | Error::Model(_) => EINVAL,
            Error::NotFound => WT_NOTFOUND,
            Error::DuplicateKey => WT_DUPLICATE_KEY,
            Error::Rollback => WT_ROLLBACK,
            Error::Engine(code) => *code,
            Error::Internal(_) => WT_ERROR,
        }
    }
}

// 把 Result<()> 转为错误码，成功为 0
pub fn status(res: Result<()>) -> i32 {
    match res {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse(msg) => write!(f, "parse error: {}", msg),
            Error::Model(msg) => write!(f, "model error: {}", msg),
            Error::NotFound => write!(f, "WT_NOTFOUND: item not found"),
            Error::DuplicateKey => write!(f, "WT_DUPLICATE_KEY: attempt to insert an existing key"),
            Error::Rollback => write!(f, "WT_ROLLBACK: conflict between concurrent operations"),
            Error::Engine(code) => write!(f, "engine error {}", code),
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// 兼容系统本身的解析数字报错
impl From<ParseIntError> for Error {
    fn from(value: ParseIntError) -> Self {
        Error::Parse(value.to_string()) // 直接将系统报错信息兼容进我们的报错系统即可
    }
}

impl From<strum::ParseError> for Error {
    fn from(value: strum::ParseError) -> Self {
        Error::Parse(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Internal(value.to_string())
    }
}
