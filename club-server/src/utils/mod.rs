//! 工具模块 - 通用工具函数和类型
//!
//! - [`AppError`] / [`AppResponse`] - 应用错误类型和响应结构
//! - [`time`] - 业务时区转换
//! - [`logger`] - 日志初始化

pub mod error;
pub mod logger;
pub mod result;
pub mod time;

pub use error::{AppError, AppResponse};
pub use result::AppResult;
