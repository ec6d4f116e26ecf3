use sqlx::SqlitePool;
use std::path::PathBuf;

use crate::billing::FeeSweepScheduler;
use crate::core::{BackgroundTasks, Config, TaskKind};
use crate::db::DbService;
use crate::visits::ExpirySweepScheduler;

/// 服务器状态 - 持有共享资源的单例引用
///
/// 使用 Clone 实现浅拷贝 (SqlitePool 内部是 Arc)，所有权成本极低。
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | pool | SqlitePool | SQLite 连接池 |
#[derive(Clone, Debug)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    /// SQLite 连接池
    pub pool: SqlitePool,
}

impl ServerState {
    pub fn new(config: Config, pool: SqlitePool) -> Self {
        Self { config, pool }
    }

    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 工作目录结构 (确保目录存在)
    /// 2. 数据库 (work_dir/database/club.db, 自动执行 migration)
    ///
    /// # Panics
    ///
    /// 数据库初始化失败时 panic
    pub async fn initialize(config: &Config) -> Self {
        config
            .ensure_work_dir_structure()
            .expect("Failed to create work directory structure");

        let db_path = config.database_dir().join("club.db");
        let db_service = DbService::new(&db_path.to_string_lossy())
            .await
            .expect("Failed to initialize database");

        Self::new(config.clone(), db_service.pool)
    }

    /// 启动后台任务
    ///
    /// 必须在 `Server::run()` 之前调用
    ///
    /// 启动的任务：
    /// - 过期会话扫描 (expiry sweep)
    /// - 年费扣款扫描 (fee sweep)
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();

        let expiry = ExpirySweepScheduler::new(self.clone(), tasks.shutdown_token());
        tasks.spawn("expiry_sweep", TaskKind::Periodic, expiry.run());

        let fees = FeeSweepScheduler::new(self.clone(), tasks.shutdown_token());
        tasks.spawn("fee_sweep", TaskKind::Periodic, fees.run());

        tasks.log_summary();
        tasks
    }

    /// 获取工作目录
    pub fn work_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.work_dir)
    }
}
