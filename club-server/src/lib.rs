//! Club Server - 会员权益与年费计费引擎
//!
//! # 架构概述
//!
//! 四个引擎组件共享一个 SQLite 存储：
//!
//! - **到店会话** (`visits`): 打卡/离店、时长取整、按小时扣点、过期扫描
//! - **积分流水** (`db/repository/ledger`): 余额变更的唯一入口，append-only
//! - **年费周期** (`billing`): 扣款、续费链、会员周期解析、每日扫描
//! - **兑换权益** (`entitlement`): 配额计算 (时长加成)、两阶段兑换
//!
//! # 模块结构
//!
//! ```text
//! club-server/src/
//! ├── core/          # 配置、状态、服务器、后台任务
//! ├── api/           # HTTP 路由和处理器
//! ├── db/            # 数据库层 + repository
//! ├── visits.rs      # 到店会话引擎
//! ├── billing.rs     # 年费计费引擎
//! ├── entitlement.rs # 兑换权益引擎
//! └── utils/         # 错误、时间、日志
//! ```

pub mod api;
pub mod billing;
pub mod core;
pub mod db;
pub mod entitlement;
pub mod utils;
pub mod visits;

// Re-export 公共类型
pub use crate::core::{Config, Server, ServerState};
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 设置运行环境 (dotenv + 日志)
pub fn setup_environment() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let log_dir = std::env::var("LOG_DIR").ok();
    let log_level = std::env::var("LOG_LEVEL").ok();
    init_logger_with_file(log_level.as_deref(), log_dir.as_deref());

    Ok(())
}

pub fn print_banner() {
    println!(
        r#"
   ________      __
  / ____/ /_  __/ /_
 / /   / / / / / __ \
/ /___/ / /_/ / /_/ /
\____/_/\__,_/_.___/
   _____
  / ___/___  ______   _____  _____
  \__ \/ _ \/ ___/ | / / _ \/ ___/
 ___/ /  __/ /   | |/ /  __/ /
/____/\___/_/    |___/\___/_/
    "#
    );
}
